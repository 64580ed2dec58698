//! Array-backed ordered index.
//!
//! [`OrderedIndex`] keeps a `Vec` in comparator order. Besides the usual
//! binary-search insert and remove it offers a merge-based bulk insert and a
//! search that keeps working when some elements are known to be out of
//! place ("dirty"). The projection layer uses the latter to defer
//! repositioning of items whose sort fields changed.

use std::{cmp::Ordering, fmt, sync::Arc};

/// Shared comparison function.
pub type Comparator<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// What a search should report when it meets an element comparing equal to the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Stop at the equal element and report it as found.
    Locate,
    /// Ignore equality and keep going right; the result is always an insertion
    /// point after any run of equal elements.
    InsertionPoint,
}

/// A sequence kept sorted under a comparator.
///
/// # Invariant
/// For every adjacent pair `(a, b)` where neither element is dirty,
/// `compare(a, b) != Greater`. Plain operations on this type treat every
/// element as clean; dirtiness is supplied by the caller to [`search`](Self::search).
pub struct OrderedIndex<E> {
    items: Vec<E>,
    compare: Comparator<E>,
}

impl<E: fmt::Debug> fmt::Debug for OrderedIndex<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedIndex")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl<E> OrderedIndex<E> {
    /// Create an empty index ordered by `compare`.
    pub fn new(compare: impl Fn(&E, &E) -> Ordering + Send + Sync + 'static) -> Self {
        Self::with_comparator(Arc::new(compare))
    }

    /// Create an empty index from a shared comparator.
    pub fn with_comparator(compare: Comparator<E>) -> Self {
        Self {
            items: Vec::new(),
            compare,
        }
    }

    /// The comparator currently in effect.
    pub fn comparator(&self) -> &Comparator<E> {
        &self.compare
    }

    /// Replace the comparator and re-sort every element.
    pub fn set_comparator(&mut self, compare: Comparator<E>) {
        self.items.sort_by(|a, b| compare(a, b));
        self.compare = compare;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&E> {
        self.items.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[E] {
        &self.items
    }

    /// Remove every element, returning them in index order.
    pub fn clear(&mut self) -> Vec<E> {
        std::mem::take(&mut self.items)
    }

    /// Binary search that tolerates dirty elements.
    ///
    /// When the probed midpoint is dirty the search scans toward the high end,
    /// then toward the low end, for the nearest clean element in the current
    /// sub-range and compares against that one instead. If the whole sub-range
    /// is dirty nothing can be said about its internal order, so the result is
    /// the position just past it.
    ///
    /// Returns `Ok(i)` when `mode` is [`SearchMode::Locate`] and a clean element
    /// comparing equal was found, otherwise `Err(insertion_point)`.
    pub fn search<D>(&self, probe: &E, is_dirty: D, mode: SearchMode) -> Result<usize, usize>
    where
        D: Fn(&E) -> bool,
    {
        let items = &self.items;
        let mut lo = 0;
        let mut hi = items.len();

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let clean = (mid..hi)
                .find(|&i| !is_dirty(&items[i]))
                .or_else(|| (lo..mid).rev().find(|&i| !is_dirty(&items[i])));

            let Some(pivot) = clean else {
                return Err(hi);
            };

            match (self.compare)(&items[pivot], probe) {
                Ordering::Equal if mode == SearchMode::Locate => return Ok(pivot),
                Ordering::Greater => hi = pivot,
                Ordering::Equal | Ordering::Less => lo = pivot + 1,
            }
        }

        Err(lo)
    }

    /// Position of `item` if present, otherwise `Err` with the position it would be inserted at.
    ///
    /// This is the Rust form of returning either the index or the bitwise
    /// complement of the insertion point: one call answers both questions.
    pub fn index_of(&self, item: &E) -> Result<usize, usize> {
        self.search(item, |_| false, SearchMode::Locate)
    }

    /// Where `item` would be inserted, after any elements comparing equal.
    pub fn insertion_point(&self, item: &E) -> usize {
        self.search(item, |_| false, SearchMode::InsertionPoint)
            .unwrap_or_else(|p| p)
    }

    /// Linear scan for the first element matching `pred`.
    pub fn position<P>(&self, pred: P) -> Option<usize>
    where
        P: FnMut(&E) -> bool,
    {
        self.items.iter().position(pred)
    }

    /// Insert `item` at its sorted position and return that position.
    pub fn add(&mut self, item: E) -> usize {
        let position = self.insertion_point(&item);
        self.items.insert(position, item);
        position
    }

    /// Insert `item` at a position already computed by the caller.
    ///
    /// Used by the projection, which searches with its own dirtiness view.
    pub(crate) fn insert_at(&mut self, position: usize, item: E) {
        self.items.insert(position, item);
    }

    /// Remove and return the element at `position`.
    ///
    /// # Panics
    /// Panics if `position` is out of bounds.
    pub fn remove_at(&mut self, position: usize) -> E {
        self.items.remove(position)
    }

    /// Remove an element comparing equal to `item`. Returns the position it had,
    /// or `None` if no such element exists.
    pub fn remove(&mut self, item: &E) -> Option<usize> {
        let position = self.index_of(item).ok()?;
        self.items.remove(position);
        Some(position)
    }

    /// Relocate one element from `from` to `to`, shifting the elements between
    /// them by one in a single direction.
    ///
    /// # Panics
    /// Panics if either index is out of bounds.
    pub fn move_item(&mut self, from: usize, to: usize) {
        match from.cmp(&to) {
            Ordering::Less => self.items[from..=to].rotate_left(1),
            Ordering::Greater => self.items[to..=from].rotate_right(1),
            Ordering::Equal => {}
        }
    }

    /// Check the ordering invariant, skipping pairs with a dirty element.
    pub fn is_ordered<D>(&self, is_dirty: D) -> bool
    where
        D: Fn(&E) -> bool,
    {
        self.items.windows(2).all(|pair| {
            is_dirty(&pair[0])
                || is_dirty(&pair[1])
                || (self.compare)(&pair[0], &pair[1]) != Ordering::Greater
        })
    }
}

impl<E: Clone> OrderedIndex<E> {
    /// Insert a batch of items with one linear merge.
    ///
    /// The batch is sorted first (O(k log k)) and then merged with the existing
    /// elements (O(n + k)), which beats `k` separate inserts once `k > 1`.
    /// Elements already present come before new elements comparing equal,
    /// matching what repeated [`add`](Self::add) produces.
    ///
    /// Returns every inserted item with its final position, in ascending
    /// position order. Applying them as single inserts in that order
    /// reproduces the final sequence.
    pub fn add_bulk(&mut self, items: Vec<E>) -> Vec<(E, usize)> {
        let compare = Arc::clone(&self.compare);
        let mut batch = items;
        batch.sort_by(|a, b| compare(a, b));

        let existing = std::mem::take(&mut self.items);
        let mut merged = Vec::with_capacity(existing.len() + batch.len());
        let mut placed = Vec::with_capacity(batch.len());
        let mut existing = existing.into_iter().peekable();

        for item in batch {
            while let Some(e) = existing.next_if(|e| compare(e, &item) != Ordering::Greater) {
                merged.push(e);
            }
            placed.push((item.clone(), merged.len()));
            merged.push(item);
        }
        merged.extend(existing);

        self.items = merged;
        placed
    }

    /// Remove every element matching `pred` in one pass.
    ///
    /// Returns the removed elements with the positions they had, in descending
    /// position order, so they stay valid when applied one removal at a time.
    pub fn remove_where<P>(&mut self, mut pred: P) -> Vec<(E, usize)>
    where
        P: FnMut(&E) -> bool,
    {
        let mut removed = Vec::new();
        let mut position = 0;
        self.items.retain(|e| {
            let drop = pred(e);
            if drop {
                removed.push((e.clone(), position));
            }
            position += 1;
            !drop
        });
        removed.reverse();
        removed
    }
}
