//! Live sorted and filtered projection.
//!
//! [`LiveProjection`] keeps the visible items of a store in an
//! [`OrderedIndex`] and repairs that order incrementally as items change.
//!
//! When an item reports a change to a sort field its dirty flag is set and the
//! change is queued, but the item is not moved right away. Queued changes are
//! drained at the start of every mutating operation and by
//! [`process_pending`](LiveProjection::process_pending); each dirty item is then
//! moved once, however many notifications it produced. Searches performed while
//! dirty items are present skip over them.
//!
//! Items failing the active filter live in a side partition. Every tracked item
//! is in exactly one of the index or the partition.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{debug, trace, warn};

use crate::{
    Result,
    index::{Comparator, OrderedIndex, SearchMode},
    observe::{Observable, SubscriptionId},
    shaping::{Filter, SortOrder},
    store::{StoreError, StoreKey},
};

mod events;
mod live;

pub use events::ChangeEvent;
pub use live::{FieldCategory, FieldRoles, LiveFields, WakeFn};

use live::Shared;

/// An index element: the item, its key, and its dirty flag.
pub(crate) struct Slot<K, T> {
    key: K,
    item: Arc<T>,
    dirty: Arc<AtomicBool>,
}

impl<K: Clone, T> Clone for Slot<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            item: Arc::clone(&self.item),
            dirty: Arc::clone(&self.dirty),
        }
    }
}

impl<K, T> Slot<K, T> {
    fn new(key: K, item: Arc<T>) -> Self {
        Self {
            key,
            item,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}

struct Tracked<K, T> {
    slot: Slot<K, T>,
    subscription: SubscriptionId,
}

/// Ordered, filtered, self-repairing view over a set of keyed items.
///
/// Comparator ties are broken by key, so the order is total and independent of
/// insertion order.
pub struct LiveProjection<K: StoreKey, T: Observable> {
    index: OrderedIndex<Slot<K, T>>,
    sort: SortOrder<T>,
    filter: Option<Filter<T>>,
    tracked: HashMap<K, Tracked<K, T>>,
    partition: BTreeSet<K>,
    live_sorting: bool,
    live_filtering: bool,
    shared: Arc<Shared<K>>,
    events: Vec<ChangeEvent<T>>,
    resetting: bool,
}

impl<K: StoreKey, T: Observable> fmt::Debug for LiveProjection<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveProjection")
            .field("visible", &self.index.len())
            .field("filtered", &self.partition.len())
            .field("sort", &self.sort)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<K: StoreKey, T: Observable> Drop for LiveProjection<K, T> {
    fn drop(&mut self) {
        for tracked in self.tracked.values() {
            tracked.slot.item.unsubscribe(tracked.subscription);
        }
    }
}

impl<K: StoreKey, T: Observable> LiveProjection<K, T> {
    /// Create an empty projection ordered by `sort`, with no filter.
    pub fn new(sort: SortOrder<T>) -> Self {
        let mut projection = Self {
            index: OrderedIndex::with_comparator(Self::comparator(&sort)),
            sort,
            filter: None,
            tracked: HashMap::new(),
            partition: BTreeSet::new(),
            live_sorting: true,
            live_filtering: true,
            shared: Arc::new(Shared::new()),
            events: Vec::new(),
            resetting: false,
        };
        projection.refresh_live_fields();
        projection
    }

    fn comparator(sort: &SortOrder<T>) -> Comparator<Slot<K, T>> {
        let sort = sort.clone();
        Arc::new(move |a: &Slot<K, T>, b: &Slot<K, T>| {
            sort.compare(&a.item, &b.item)
                .then_with(|| a.key.cmp(&b.key))
        })
    }

    fn refresh_live_fields(&mut self) {
        let mut live = LiveFields::default();
        if self.live_sorting {
            for field in self.sort.fields() {
                live.insert(field, FieldCategory::Sort);
            }
        }
        if self.live_filtering
            && let Some(filter) = &self.filter
        {
            for field in filter.fields() {
                live.insert(field, FieldCategory::Filter);
            }
        }
        self.shared.set_live(live);
    }

    /// Turn live sorting and live filtering on or off.
    ///
    /// Changes queued so far are applied under the old settings first. With
    /// live sorting off, sort field changes are ignored until the next
    /// [`set_sort`](Self::set_sort). With live filtering off, filter field
    /// changes are ignored until [`recalculate_filter`](Self::recalculate_filter).
    ///
    /// Turning live sorting back on re-sorts the index (one `Reset`), and
    /// turning live filtering back on re-runs the filter, so items changed
    /// in the meantime end up where they belong.
    pub fn set_live_shaping(&mut self, live_sorting: bool, live_filtering: bool) {
        self.process_pending();
        let resort = live_sorting && !self.live_sorting;
        let refilter = live_filtering && !self.live_filtering && self.filter.is_some();
        self.live_sorting = live_sorting;
        self.live_filtering = live_filtering;
        self.refresh_live_fields();
        if refilter {
            self.recalculate_filter();
        }
        if resort {
            self.set_sort(self.sort.clone());
        }
    }

    /// The live field table currently in effect.
    pub fn live_fields(&self) -> LiveFields {
        self.shared.live()
    }

    /// Install a callback run whenever a change is queued on an empty queue.
    ///
    /// The callback may run on any thread. It is typically used to schedule
    /// [`process_pending`](Self::process_pending) on the owning thread.
    pub fn set_wake(&self, wake: Option<WakeFn>) {
        self.shared.set_wake(wake);
    }

    pub fn sort(&self) -> &SortOrder<T> {
        &self.sort
    }

    pub fn filter(&self) -> Option<&Filter<T>> {
        self.filter.as_ref()
    }

    /// Number of visible items.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of items hidden by the filter.
    pub fn filtered_len(&self) -> usize {
        self.partition.len()
    }

    /// Number of tracked items, visible or not.
    pub fn total_len(&self) -> usize {
        self.tracked.len()
    }

    /// Visible item at `position`.
    pub fn get(&self, position: usize) -> Option<&Arc<T>> {
        self.index.get(position).map(|slot| &slot.item)
    }

    /// Visible items in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.index.iter().map(|slot| &slot.item)
    }

    /// Items hidden by the filter, in key order.
    pub fn filtered(&self) -> impl Iterator<Item = &Arc<T>> {
        self.partition
            .iter()
            .filter_map(|key| self.tracked.get(key))
            .map(|tracked| &tracked.slot.item)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.tracked.contains_key(key)
    }

    /// Whether the item under `key` is currently hidden by the filter.
    pub fn is_filtered(&self, key: &K) -> bool {
        self.partition.contains(key)
    }

    /// Whether the item under `key` is waiting to be repositioned.
    pub fn is_dirty(&self, key: &K) -> bool {
        self.tracked
            .get(key)
            .is_some_and(|tracked| tracked.slot.is_dirty())
    }

    /// Whether item changes are queued and not yet applied.
    pub fn has_pending(&self) -> bool {
        self.shared.has_pending()
    }

    /// Visible position of the item under `key`.
    pub fn index_of(&self, key: &K) -> Option<usize> {
        if self.partition.contains(key) {
            return None;
        }
        let tracked = self.tracked.get(key)?;
        self.locate(&tracked.slot)
    }

    /// Drain the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<ChangeEvent<T>> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: ChangeEvent<T>) {
        if !self.resetting {
            self.events.push(event);
        }
    }

    /// Run `rebuild` with per-item events suppressed, then emit one `Reset`.
    fn reset_scope<R>(&mut self, rebuild: impl FnOnce(&mut Self) -> R) -> R {
        let outer = std::mem::replace(&mut self.resetting, true);
        let result = rebuild(self);
        self.resetting = outer;
        if !outer {
            self.events.push(ChangeEvent::Reset);
        }
        result
    }

    fn passes(&self, item: &T) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter.matches(item))
    }

    fn track(&mut self, key: K, item: Arc<T>) -> Slot<K, T> {
        let slot = Slot::new(key.clone(), item);
        let listener = self.shared.listener(key.clone(), Arc::clone(&slot.dirty));
        let subscription = slot.item.subscribe(listener);
        self.tracked.insert(
            key,
            Tracked {
                slot: slot.clone(),
                subscription,
            },
        );
        slot
    }

    fn untrack(&mut self, key: &K) -> Option<Tracked<K, T>> {
        let tracked = self.tracked.remove(key)?;
        tracked.slot.item.unsubscribe(tracked.subscription);
        Some(tracked)
    }

    /// Current position of a slot in the index.
    ///
    /// Tries the tolerant binary search first and falls back to a linear scan
    /// when dirty neighbours (or the slot itself being dirty) hide it.
    fn locate(&self, slot: &Slot<K, T>) -> Option<usize> {
        match self.index.search(slot, Slot::is_dirty, SearchMode::Locate) {
            Ok(position) if self.index.as_slice()[position].key == slot.key => Some(position),
            _ => self.index.position(|e| e.key == slot.key),
        }
    }

    /// Where a slot not currently in the index belongs.
    fn insertion_point(&self, slot: &Slot<K, T>) -> usize {
        self.index
            .search(slot, Slot::is_dirty, SearchMode::InsertionPoint)
            .unwrap_or_else(|position| position)
    }

    fn admit(&mut self, slot: Slot<K, T>) -> usize {
        slot.take_dirty();
        let position = self.insertion_point(&slot);
        self.index.insert_at(position, slot.clone());
        self.emit(ChangeEvent::Added {
            item: slot.item,
            index: position,
        });
        position
    }

    /// Track a new item. Returns its visible position, or `None` if the filter hides it.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateKey`] if `key` is already tracked.
    pub fn insert(&mut self, key: K, item: Arc<T>) -> Result<Option<usize>> {
        self.process_pending();
        if self.tracked.contains_key(&key) {
            return Err(StoreError::duplicate(&key).into());
        }

        let slot = self.track(key, item);
        if self.passes(&slot.item) {
            Ok(Some(self.admit(slot)))
        } else {
            trace!(key = ?slot.key, "inserted into filter partition");
            self.partition.insert(slot.key);
            Ok(None)
        }
    }

    /// Track a batch of items with one merge pass over the index.
    ///
    /// The filter is evaluated once per item; passing items are merged into
    /// the index and failing items go straight to the partition. `Added`
    /// events are emitted in ascending position order.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateKey`] if any key is already tracked or
    /// repeated in the batch. Nothing is inserted in that case.
    pub fn insert_bulk(&mut self, items: Vec<(K, Arc<T>)>) -> Result<()> {
        self.process_pending();
        let mut seen = HashSet::with_capacity(items.len());
        for (key, _) in &items {
            if self.tracked.contains_key(key) || !seen.insert(key) {
                return Err(StoreError::duplicate(key).into());
            }
        }

        let verdicts: Vec<bool> = items.iter().map(|(_, item)| self.passes(item)).collect();
        let mut passing = Vec::with_capacity(items.len());
        let mut hidden = 0;
        for ((key, item), visible) in items.into_iter().zip(verdicts) {
            let slot = self.track(key, item);
            if visible {
                passing.push(slot);
            } else {
                self.partition.insert(slot.key);
                hidden += 1;
            }
        }

        let placed = self.index.add_bulk(passing);
        debug!(visible = placed.len(), hidden, "bulk insert");
        for (slot, position) in placed {
            self.emit(ChangeEvent::Added {
                item: slot.item,
                index: position,
            });
        }
        Ok(())
    }

    /// Stop tracking the item under `key`. Returns the item, or `None` if it was not tracked.
    pub fn remove(&mut self, key: &K) -> Option<Arc<T>> {
        self.process_pending();
        let tracked = self.untrack(key)?;
        if self.partition.remove(key) {
            return Some(tracked.slot.item);
        }

        match self.locate(&tracked.slot) {
            Some(position) => {
                let slot = self.index.remove_at(position);
                self.emit(ChangeEvent::Removed {
                    item: slot.item,
                    index: position,
                });
            }
            None => warn!(?key, "tracked item missing from index"),
        }
        Some(tracked.slot.item)
    }

    /// Stop tracking every listed key with a single pass over the index.
    ///
    /// Unknown keys are skipped. `Removed` events are emitted in descending
    /// position order.
    pub fn remove_bulk(&mut self, keys: &[K]) -> Vec<Arc<T>> {
        self.process_pending();
        let mut removed = Vec::with_capacity(keys.len());
        let mut visible = HashSet::new();
        for key in keys {
            if let Some(tracked) = self.untrack(key) {
                if !self.partition.remove(key) {
                    visible.insert(key.clone());
                }
                removed.push(tracked.slot.item);
            }
        }

        if !visible.is_empty() {
            let gone = self.index.remove_where(|slot| visible.contains(&slot.key));
            debug!(count = gone.len(), "bulk remove");
            for (slot, position) in gone {
                self.emit(ChangeEvent::Removed {
                    item: slot.item,
                    index: position,
                });
            }
        }
        removed
    }

    /// Stop tracking everything. Emits a single `Reset`.
    pub fn clear(&mut self) {
        self.reset_scope(|p| p.clear_all());
    }

    fn clear_all(&mut self) {
        let keys: Vec<K> = self.tracked.keys().cloned().collect();
        for key in &keys {
            self.untrack(key);
        }
        self.index.clear();
        self.partition.clear();
        // Changes for items that are gone no longer matter
        self.shared.take_pending();
        debug!(count = keys.len(), "cleared projection");
    }

    /// Replace every tracked item. Emits a single `Reset`.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateKey`] if the batch repeats a key. The
    /// projection is left empty in that case.
    pub fn replace_all(&mut self, items: Vec<(K, Arc<T>)>) -> Result<()> {
        self.reset_scope(|p| {
            p.clear_all();
            p.insert_bulk(items)
        })
    }

    /// Change the sort order and rebuild the index. Emits a single `Reset`.
    pub fn set_sort(&mut self, sort: SortOrder<T>) {
        self.reset_scope(|p| {
            p.process_pending();
            p.sort = sort;
            p.index.set_comparator(Self::comparator(&p.sort));
            // A full sort leaves nothing out of place
            for slot in p.index.iter() {
                slot.take_dirty();
            }
            p.refresh_live_fields();
            debug!(sort = ?p.sort, visible = p.index.len(), "sort order changed");
        });
    }

    /// Change the filter and recompute which items are visible.
    pub fn set_filter(&mut self, filter: Option<Filter<T>>) {
        self.filter = filter;
        self.refresh_live_fields();
        self.recalculate_filter();
    }

    /// Re-evaluate the filter for every item.
    ///
    /// Visible items that now fail are moved to the partition (one `Removed`
    /// each, highest position first); hidden items that now pass are admitted
    /// (one `Added` each, in key order).
    pub fn recalculate_filter(&mut self) {
        self.process_pending();

        let filter = self.filter.as_ref();
        let hidden = self
            .index
            .remove_where(|slot| !filter.is_none_or(|f| f.matches(&slot.item)));
        let hidden_count = hidden.len();
        for (slot, position) in hidden {
            self.partition.insert(slot.key.clone());
            self.emit(ChangeEvent::Removed {
                item: slot.item,
                index: position,
            });
        }

        let admitted: Vec<K> = self
            .partition
            .iter()
            .filter(|key| {
                self.tracked
                    .get(*key)
                    .is_some_and(|tracked| self.passes(&tracked.slot.item))
            })
            .cloned()
            .collect();
        for key in &admitted {
            self.partition.remove(key);
            if let Some(tracked) = self.tracked.get(key) {
                let slot = tracked.slot.clone();
                self.admit(slot);
            }
        }

        debug!(
            hidden = hidden_count,
            admitted = admitted.len(),
            filtered = self.partition.len(),
            "filter recalculated"
        );
    }

    /// Move the item under `old` to key `new` without structural events.
    ///
    /// The item is taken out and put back under its new key. If that changes
    /// its position (keys break comparator ties) a single `Moved` is emitted;
    /// if it changes its filter verdict an `Added` or `Removed` is emitted.
    ///
    /// # Errors
    /// - [`StoreError::KeyNotFound`] if `old` is not tracked.
    /// - [`StoreError::DuplicateKey`] if `new` is already tracked by another item.
    pub fn rekey(&mut self, old: &K, new: K) -> Result<()> {
        self.process_pending();
        if old == &new {
            return Ok(());
        }
        if self.tracked.contains_key(&new) {
            return Err(StoreError::duplicate(&new).into());
        }
        let tracked = self
            .untrack(old)
            .ok_or_else(|| StoreError::not_found(old))?;

        let from = if self.partition.remove(old) {
            None
        } else {
            let position = self.locate(&tracked.slot);
            if let Some(position) = position {
                self.index.remove_at(position);
            }
            position
        };

        let slot = self.track(new, Arc::clone(&tracked.slot.item));
        let visible = self.passes(&slot.item);
        match (from, visible) {
            (Some(from), true) => {
                let to = self.insertion_point(&slot);
                self.index.insert_at(to, slot.clone());
                if to != from {
                    self.emit(ChangeEvent::Moved {
                        item: slot.item,
                        from,
                        to,
                    });
                }
            }
            (Some(from), false) => {
                self.partition.insert(slot.key.clone());
                self.emit(ChangeEvent::Removed {
                    item: slot.item,
                    index: from,
                });
            }
            (None, true) => {
                self.admit(slot);
            }
            (None, false) => {
                self.partition.insert(slot.key);
            }
        }
        Ok(())
    }

    /// Apply every queued item change. Returns how many structural changes resulted.
    ///
    /// Filter changes are applied before sort changes, so an item that just
    /// became hidden is not repositioned.
    pub fn process_pending(&mut self) -> usize {
        let changes = self.shared.take_pending();
        if changes.is_empty() {
            return 0;
        }

        let mut applied = 0;
        for (key, roles) in &changes {
            if !self.tracked.contains_key(key) {
                trace!(?key, "change for untracked item ignored");
                continue;
            }
            if roles.filter && self.live_filtering && self.filter.is_some() && self.retest(key) {
                applied += 1;
            }
            if roles.sort {
                if !self.live_sorting {
                    // Raced with live sorting being turned off
                    if let Some(tracked) = self.tracked.get(key) {
                        tracked.slot.take_dirty();
                    }
                } else if self.reposition(key) {
                    applied += 1;
                }
            }
        }
        trace!(changes = changes.len(), applied, "processed pending changes");
        applied
    }

    /// Re-run the filter for one item. Returns whether its visibility changed.
    fn retest(&mut self, key: &K) -> bool {
        let Some(tracked) = self.tracked.get(key) else {
            return false;
        };
        let slot = tracked.slot.clone();
        let visible = self.passes(&slot.item);

        match (self.partition.contains(key), visible) {
            (false, false) => {
                let Some(position) = self.locate(&slot) else {
                    warn!(?key, "tracked item missing from index");
                    return false;
                };
                self.index.remove_at(position);
                self.partition.insert(key.clone());
                self.emit(ChangeEvent::Removed {
                    item: slot.item,
                    index: position,
                });
                true
            }
            (true, true) => {
                self.partition.remove(key);
                self.admit(slot);
                true
            }
            _ => false,
        }
    }

    /// Move one dirty item to where it belongs. Returns whether it moved.
    ///
    /// Clean items and hidden items are left alone, which is what makes repeated
    /// notifications for the same item cost one move.
    fn reposition(&mut self, key: &K) -> bool {
        let Some(tracked) = self.tracked.get(key) else {
            return false;
        };
        let slot = tracked.slot.clone();
        if self.partition.contains(key) {
            slot.take_dirty();
            return false;
        }
        if !slot.take_dirty() {
            return false;
        }

        let Some(from) = self.locate(&slot) else {
            warn!(?key, "dirty item missing from index");
            return false;
        };
        let target = self
            .index
            .search(
                &slot,
                |e| e.key == slot.key || e.is_dirty(),
                SearchMode::InsertionPoint,
            )
            .unwrap_or_else(|position| position);
        // The insertion point counts the item itself when it lies above it
        let to = if target > from { target - 1 } else { target };
        if to == from {
            trace!(?key, position = from, "dirty item already in place");
            return false;
        }

        self.index.move_item(from, to);
        trace!(?key, from, to, "repositioned");
        self.emit(ChangeEvent::Moved {
            item: slot.item,
            from,
            to,
        });
        true
    }

    /// Verify the structural invariants, describing the first violation found.
    ///
    /// - The index and the partition together hold exactly the tracked keys,
    ///   with no key in both.
    /// - Adjacent clean items in the index are in order.
    /// - No item is dirty unless a change is still queued.
    ///
    /// Meant to be called while no item notifications are in flight.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::with_capacity(self.tracked.len());
        for slot in self.index.iter() {
            if !self.tracked.contains_key(&slot.key) {
                return Err(format!("index holds untracked key {:?}", slot.key));
            }
            if self.partition.contains(&slot.key) {
                return Err(format!("key {:?} is both visible and filtered", slot.key));
            }
            if !seen.insert(&slot.key) {
                return Err(format!("key {:?} appears twice in the index", slot.key));
            }
        }
        for key in &self.partition {
            if !self.tracked.contains_key(key) {
                return Err(format!("partition holds untracked key {key:?}"));
            }
        }
        if self.index.len() + self.partition.len() != self.tracked.len() {
            return Err(format!(
                "index ({}) + partition ({}) != tracked ({})",
                self.index.len(),
                self.partition.len(),
                self.tracked.len()
            ));
        }
        if !self.index.is_ordered(Slot::is_dirty) {
            return Err("clean items out of order".to_string());
        }
        if !self.shared.has_pending()
            && let Some(slot) = self.index.iter().find(|slot| slot.is_dirty())
        {
            return Err(format!("key {:?} is dirty with nothing queued", slot.key));
        }
        Ok(())
    }
}
