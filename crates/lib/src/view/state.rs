//! Owner-side view state.

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use tokio::sync::mpsc;
use tracing::debug;

use super::{
    ViewError, ViewEvent,
    observers::{ObserverId, ObserverSet, ViewObserver},
};
use crate::{
    Result,
    config::ViewConfig,
    observe::Observable,
    projection::{LiveProjection, WakeFn},
    shaping::{Filter, SortOrder},
    store::{KeyFn, KeyedStore, StoreKey},
};

/// Counters published after every mutation, readable from any thread.
///
/// Values lag the owner by at most one mutation.
#[derive(Debug, Default)]
pub struct ViewStats {
    visible: AtomicUsize,
    filtered: AtomicUsize,
    total: AtomicUsize,
    events: AtomicU64,
}

impl ViewStats {
    /// Visible items.
    pub fn len(&self) -> usize {
        self.visible.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items hidden by the filter.
    pub fn filtered_len(&self) -> usize {
        self.filtered.load(Ordering::Acquire)
    }

    /// Stored items, visible or not.
    pub fn total_len(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Change events published so far.
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Acquire)
    }
}

/// The store, the projection over it, and its observers.
///
/// Every mutating method applies pending item changes first and publishes
/// the resulting events to observers before returning. `ViewState` is meant
/// to live inside a [`SingleWriter`](crate::writer::SingleWriter); use
/// [`LiveView`](super::LiveView) to drive it from other threads.
pub struct ViewState<K: StoreKey, T: Observable> {
    store: KeyedStore<K, T>,
    projection: LiveProjection<K, T>,
    observers: ObserverSet<T>,
    stats: Arc<ViewStats>,
    config: ViewConfig,
}

impl<K: StoreKey, T: Observable> std::fmt::Debug for ViewState<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewState")
            .field("stored", &self.store.len())
            .field("projection", &self.projection)
            .field("observers", &self.observers)
            .field("config", &self.config)
            .finish()
    }
}

impl<K: StoreKey, T: Observable> ViewState<K, T> {
    pub fn new(key_fn: impl Fn(&T) -> K + Send + Sync + 'static, sort: SortOrder<T>) -> Self {
        Self::with_config(Arc::new(key_fn), sort, ViewConfig::default())
    }

    pub fn with_config(key_fn: KeyFn<K, T>, sort: SortOrder<T>, config: ViewConfig) -> Self {
        let mut projection = LiveProjection::new(sort);
        projection.set_live_shaping(config.live_sorting, config.live_filtering);
        let state = Self {
            store: KeyedStore::with_key_fn(key_fn),
            projection,
            observers: ObserverSet::new(),
            stats: Arc::new(ViewStats::default()),
            config,
        };
        state.refresh_stats();
        state
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn store(&self) -> &KeyedStore<K, T> {
        &self.store
    }

    pub fn projection(&self) -> &LiveProjection<K, T> {
        &self.projection
    }

    pub fn stats(&self) -> Arc<ViewStats> {
        Arc::clone(&self.stats)
    }

    pub(crate) fn set_wake(&self, wake: Option<WakeFn>) {
        self.projection.set_wake(wake);
    }

    fn refresh_stats(&self) {
        self.stats
            .visible
            .store(self.projection.len(), Ordering::Release);
        self.stats
            .filtered
            .store(self.projection.filtered_len(), Ordering::Release);
        self.stats.total.store(self.store.len(), Ordering::Release);
    }

    /// Send the projection's queued events to observers and refresh the counters.
    ///
    /// Mutating methods call this themselves; it only needs calling directly
    /// after driving the projection by other means.
    pub fn publish(&mut self) -> usize {
        let events = self.projection.take_events();
        self.refresh_stats();
        if events.is_empty() {
            return 0;
        }
        self.stats
            .events
            .fetch_add(events.len() as u64, Ordering::AcqRel);
        self.observers.dispatch(&events);
        events.len()
    }

    // Mutations

    /// Add one item.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateKey`](crate::store::StoreError::DuplicateKey)
    /// if its key is taken; nothing changes in that case.
    pub fn add(&mut self, item: Arc<T>) -> Result<K> {
        let key = self.store.add(Arc::clone(&item))?;
        let result = self.projection.insert(key.clone(), item);
        self.publish();
        result.map(|_| key)
    }

    /// Add one item unless its key is taken.
    pub fn try_add(&mut self, item: Arc<T>) -> bool {
        self.add(item).is_ok()
    }

    /// Add a batch of items with one merge pass.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateKey`](crate::store::StoreError::DuplicateKey)
    /// if any key is taken or repeated; nothing changes in that case.
    pub fn add_bulk(&mut self, items: Vec<Arc<T>>) -> Result<usize> {
        let added = self.store.add_bulk(items)?;
        let count = added.len();
        let result = self.projection.insert_bulk(added);
        self.publish();
        debug!(count, "added batch to view");
        result.map(|_| count)
    }

    /// Remove the item stored under `key`. Absent keys return `None`.
    pub fn remove_by_key(&mut self, key: &K) -> Option<Arc<T>> {
        let item = self.store.remove_by_key(key)?;
        self.projection.remove(key);
        self.publish();
        Some(item)
    }

    /// Remove `item` if this exact item is stored.
    pub fn remove(&mut self, item: &Arc<T>) -> bool {
        if !self.store.contains(item) {
            return false;
        }
        let key = self.store.key_of(item);
        self.remove_by_key(&key).is_some()
    }

    /// Remove every listed key. Returns how many were present.
    pub fn remove_bulk(&mut self, keys: &[K]) -> usize {
        let present: Vec<K> = keys
            .iter()
            .filter(|key| self.store.remove_by_key(key).is_some())
            .cloned()
            .collect();
        self.projection.remove_bulk(&present);
        self.publish();
        present.len()
    }

    /// Remove everything. Observers see a single `Reset`.
    pub fn clear(&mut self) {
        let removed = self.store.clear();
        self.projection.clear();
        self.publish();
        debug!(count = removed.len(), "cleared view");
    }

    /// Replace the whole content. Observers see a single `Reset`.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateKey`](crate::store::StoreError::DuplicateKey)
    /// if the batch repeats a key; the view is left empty in that case.
    pub fn replace_all(&mut self, items: Vec<Arc<T>>) -> Result<()> {
        self.store.clear();
        let result = self
            .store
            .add_bulk(items)
            .and_then(|added| self.projection.replace_all(added));
        if result.is_err() {
            self.store.clear();
            self.projection.clear();
        }
        self.publish();
        result
    }

    /// Change the key field of the item under `key` through `mutate`.
    ///
    /// The item keeps its place in the view unless the key change moves it
    /// among items that compare equal, in which case observers see one `Moved`.
    ///
    /// # Errors
    /// - [`StoreError::KeyNotFound`](crate::store::StoreError::KeyNotFound) if `key` is not stored.
    /// - [`StoreError::DuplicateKey`](crate::store::StoreError::DuplicateKey) if the new key is
    ///   taken. The item is then no longer stored and observers see a `Removed`.
    pub fn update_key<F>(&mut self, key: &K, mutate: F) -> Result<K>
    where
        F: FnOnce(&T),
    {
        let item = Arc::clone(self.store.item(key)?);
        let result = match self.store.update_key(&item, mutate) {
            Ok((old, new)) => self.projection.rekey(&old, new.clone()).map(|_| new),
            Err(err) => {
                if err.is_conflict() {
                    debug!(?key, "key update collided, dropping item from view");
                    self.projection.remove(key);
                }
                Err(err)
            }
        };
        self.publish();
        result
    }

    // Shaping

    /// Change the sort order. Observers see a single `Reset`.
    pub fn set_sort(&mut self, sort: SortOrder<T>) {
        self.projection.set_sort(sort);
        self.publish();
    }

    /// Change the filter and recompute visibility.
    pub fn set_filter(&mut self, filter: Option<Filter<T>>) {
        self.projection.set_filter(filter);
        self.publish();
    }

    /// Re-run the filter for every item.
    ///
    /// For predicates that depend on state outside the items, call this when
    /// that state changes.
    pub fn notify_filter_dependency_changed(&mut self) {
        self.projection.recalculate_filter();
        self.publish();
    }

    /// Apply queued item changes. Returns how many structural changes resulted.
    pub fn process_pending(&mut self) -> usize {
        let applied = self.projection.process_pending();
        self.publish();
        applied
    }

    pub fn set_live_shaping(&mut self, live_sorting: bool, live_filtering: bool) {
        self.config.live_sorting = live_sorting;
        self.config.live_filtering = live_filtering;
        self.projection
            .set_live_shaping(live_sorting, live_filtering);
        self.publish();
    }

    // Reads

    /// Visible items.
    pub fn len(&self) -> usize {
        self.projection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projection.is_empty()
    }

    /// Stored items, visible or not.
    pub fn total_len(&self) -> usize {
        self.store.len()
    }

    pub fn get(&self, key: &K) -> Option<&Arc<T>> {
        self.store.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    /// Visible item at `index`.
    ///
    /// # Errors
    /// Returns [`ViewError::IndexOutOfRange`] past the end.
    pub fn at(&self, index: usize) -> Result<&Arc<T>> {
        self.projection.get(index).ok_or_else(|| {
            ViewError::IndexOutOfRange {
                index,
                len: self.projection.len(),
            }
            .into()
        })
    }

    /// Visible position of the item under `key`, `None` if absent or filtered out.
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.projection.index_of(key)
    }

    pub fn is_filtered(&self, key: &K) -> bool {
        self.projection.is_filtered(key)
    }

    /// Visible items in order.
    pub fn visible(&self) -> impl Iterator<Item = &Arc<T>> {
        self.projection.iter()
    }

    /// A copy of the visible sequence.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.projection.iter().cloned().collect()
    }

    // Observers

    pub fn observe(&mut self, observer: Arc<dyn ViewObserver<T>>) -> ObserverId {
        self.observers.add(observer)
    }

    /// Subscribe to change events through a channel.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ViewEvent<T>> {
        self.observers.add_channel().1
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Verify that the store, the index and the filter partition agree.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.projection.check_invariants()?;
        if self.store.len() != self.projection.total_len() {
            return Err(format!(
                "store holds {} items, projection tracks {}",
                self.store.len(),
                self.projection.total_len()
            ));
        }
        if let Some(key) = self.store.keys().find(|key| !self.projection.contains(key)) {
            return Err(format!("stored key {key:?} is not tracked"));
        }
        Ok(())
    }
}
