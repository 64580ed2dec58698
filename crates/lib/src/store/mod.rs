//! Keyed storage of shared items.
//!
//! [`KeyedStore`] maps a unique key to each item. The key is produced by an
//! injected extraction function, so the store never needs to know what an item
//! looks like. It owns identity and existence only; ordering and filtering are
//! handled by [`LiveProjection`](crate::projection::LiveProjection).

use std::{
    collections::{HashMap, HashSet},
    fmt,
    hash::Hash,
    sync::Arc,
};

use tracing::{debug, trace};

use crate::Result;

pub mod errors;

pub use errors::StoreError;

/// Key extraction function shared between the store and the projection.
pub type KeyFn<K, T> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Bounds every key type must satisfy.
///
/// `Ord` is required because the projection breaks comparator ties by key.
pub trait StoreKey: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

impl<K> StoreKey for K where K: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

/// A map from unique key to item.
///
/// # Invariants
/// - Every stored key maps to exactly one item, and `key_fn(item) == key`.
/// - `len()` equals the number of entries.
pub struct KeyedStore<K, T> {
    key_fn: KeyFn<K, T>,
    entries: HashMap<K, Arc<T>>,
}

impl<K, T> fmt::Debug for KeyedStore<K, T>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStore")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<K: StoreKey, T> KeyedStore<K, T> {
    /// Create an empty store using `key_fn` to derive each item's key.
    pub fn new(key_fn: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::with_key_fn(Arc::new(key_fn))
    }

    /// Create an empty store from an already shared key function.
    pub fn with_key_fn(key_fn: KeyFn<K, T>) -> Self {
        Self {
            key_fn,
            entries: HashMap::new(),
        }
    }

    /// The key function this store was built with.
    pub fn key_fn(&self) -> &KeyFn<K, T> {
        &self.key_fn
    }

    /// Compute the key of `item` with the store's key function.
    pub fn key_of(&self, item: &T) -> K {
        (self.key_fn)(item)
    }

    /// Insert `item` unless its key is already present.
    ///
    /// Returns `false` and leaves the store untouched on a collision.
    pub fn try_add(&mut self, item: Arc<T>) -> bool {
        let key = self.key_of(&item);
        if self.entries.contains_key(&key) {
            trace!(?key, "try_add rejected duplicate key");
            return false;
        }
        self.entries.insert(key, item);
        true
    }

    /// Insert `item`, returning its key.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateKey`] if the key is already present. The
    /// store is not modified in that case.
    pub fn add(&mut self, item: Arc<T>) -> Result<K> {
        let key = self.key_of(&item);
        if self.entries.contains_key(&key) {
            return Err(StoreError::duplicate(&key).into());
        }
        self.entries.insert(key.clone(), item);
        Ok(key)
    }

    /// Insert a batch of items.
    ///
    /// The whole batch is validated first, both against stored keys and
    /// against itself, so a collision anywhere leaves the store unchanged.
    pub fn add_bulk(&mut self, items: Vec<Arc<T>>) -> Result<Vec<(K, Arc<T>)>> {
        let mut seen = HashSet::with_capacity(items.len());
        let keyed: Vec<(K, Arc<T>)> = items
            .into_iter()
            .map(|item| (self.key_of(&item), item))
            .collect();

        for (key, _) in &keyed {
            if self.entries.contains_key(key) || !seen.insert(key) {
                return Err(StoreError::duplicate(key).into());
            }
        }

        self.entries.reserve(keyed.len());
        for (key, item) in &keyed {
            self.entries.insert(key.clone(), Arc::clone(item));
        }
        debug!(count = keyed.len(), total = self.entries.len(), "bulk insert");
        Ok(keyed)
    }

    /// Remove the entry stored under `key`, returning its item.
    ///
    /// An absent key is a normal outcome and yields `None`.
    pub fn remove_by_key(&mut self, key: &K) -> Option<Arc<T>> {
        self.entries.remove(key)
    }

    /// Look up an item by key.
    pub fn get(&self, key: &K) -> Option<&Arc<T>> {
        self.entries.get(key)
    }

    /// Look up an item by key, treating absence as an error.
    ///
    /// # Errors
    /// Returns [`StoreError::KeyNotFound`] when the key is not stored.
    pub fn item(&self, key: &K) -> Result<&Arc<T>> {
        self.entries
            .get(key)
            .ok_or_else(|| StoreError::not_found(key).into())
    }

    /// Check whether `key` is stored.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Check whether this exact item (not merely one with the same key) is stored.
    pub fn contains(&self, item: &Arc<T>) -> bool {
        self.entries
            .get(&self.key_of(item))
            .is_some_and(|stored| Arc::ptr_eq(stored, item))
    }

    /// Change the key of a stored item.
    ///
    /// The old mapping is removed, `mutate` runs (it is expected to change the
    /// field the key is derived from) and the item is re-inserted under its new
    /// key. Returns `(old_key, new_key)`.
    ///
    /// # Errors
    /// - [`StoreError::KeyNotFound`] if `item` is not stored under its current key.
    ///   `mutate` is not called.
    /// - [`StoreError::DuplicateKey`] if the new key belongs to another item. The
    ///   mutation has already happened, so the entry stays removed.
    pub fn update_key<F>(&mut self, item: &Arc<T>, mutate: F) -> Result<(K, K)>
    where
        F: FnOnce(&T),
    {
        let old_key = self.key_of(item);
        match self.entries.get(&old_key) {
            Some(stored) if Arc::ptr_eq(stored, item) => {}
            _ => return Err(StoreError::not_found(&old_key).into()),
        }

        let entry = self
            .entries
            .remove(&old_key)
            .ok_or_else(|| StoreError::not_found(&old_key))?;
        mutate(&entry);
        let new_key = self.key_of(&entry);

        if self.entries.contains_key(&new_key) {
            debug!(?old_key, ?new_key, "update_key collided, entry dropped");
            return Err(StoreError::duplicate(&new_key).into());
        }
        self.entries.insert(new_key.clone(), entry);
        Ok((old_key, new_key))
    }

    /// Remove every entry, returning the removed items.
    pub fn clear(&mut self) -> Vec<Arc<T>> {
        self.entries.drain().map(|(_, item)| item).collect()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over stored keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Iterate over stored items in arbitrary order.
    pub fn values(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.values()
    }

    /// Iterate over `(key, item)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Arc<T>)> {
        self.entries.iter()
    }
}
