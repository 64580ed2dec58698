//! Shared state between a projection and the listeners it installs on items.
//!
//! Listeners run on whatever thread mutates an item. They only touch the
//! pieces in here: the per-item dirty flag, the live field table and the
//! pending change queue. The projection drains the queue on its own thread.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::observe::FieldListener;

/// How a field is used by the current sort order and filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldCategory {
    Sort,
    Filter,
}

/// The categories a single field belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldRoles {
    pub sort: bool,
    pub filter: bool,
}

impl FieldRoles {
    pub fn is_empty(self) -> bool {
        !self.sort && !self.filter
    }

    fn union(self, other: FieldRoles) -> FieldRoles {
        FieldRoles {
            sort: self.sort || other.sort,
            filter: self.filter || other.filter,
        }
    }
}

/// Per-projection table of live fields, keyed by field name and category.
///
/// Rebuilt whenever the sort order, the filter or the live shaping switches
/// change. Changes to fields not listed here are ignored.
#[derive(Debug, Clone, Default)]
pub struct LiveFields {
    roles: HashMap<String, FieldRoles>,
}

impl LiveFields {
    pub fn insert(&mut self, field: &str, category: FieldCategory) {
        let roles = self.roles.entry(field.to_string()).or_default();
        match category {
            FieldCategory::Sort => roles.sort = true,
            FieldCategory::Filter => roles.filter = true,
        }
    }

    pub fn roles(&self, field: &str) -> FieldRoles {
        self.roles.get(field).copied().unwrap_or_default()
    }

    pub fn contains(&self, field: &str, category: FieldCategory) -> bool {
        let roles = self.roles(field);
        match category {
            FieldCategory::Sort => roles.sort,
            FieldCategory::Filter => roles.filter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Called when the pending queue goes from empty to non-empty.
pub type WakeFn = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct Shared<K> {
    live: RwLock<LiveFields>,
    pending: Mutex<Vec<(K, FieldRoles)>>,
    wake: RwLock<Option<WakeFn>>,
}

impl<K: Clone + Eq + Send + Sync + 'static> Shared<K> {
    pub(crate) fn new() -> Self {
        Self {
            live: RwLock::new(LiveFields::default()),
            pending: Mutex::new(Vec::new()),
            wake: RwLock::new(None),
        }
    }

    pub(crate) fn set_live(&self, live: LiveFields) {
        *self.live.write().unwrap_or_else(|e| e.into_inner()) = live;
    }

    pub(crate) fn live(&self) -> LiveFields {
        self.live.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_wake(&self, wake: Option<WakeFn>) {
        *self.wake.write().unwrap_or_else(|e| e.into_inner()) = wake;
    }

    /// Build the listener installed on the item stored under `key`.
    pub(crate) fn listener(self: &Arc<Self>, key: K, dirty: Arc<AtomicBool>) -> FieldListener {
        let shared = Arc::clone(self);
        Arc::new(move |field: &str| shared.field_changed(&key, &dirty, field))
    }

    fn field_changed(&self, key: &K, dirty: &AtomicBool, field: &str) {
        let roles = self
            .live
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .roles(field);
        if roles.is_empty() {
            return;
        }
        if roles.sort {
            dirty.store(true, Ordering::Release);
        }

        let was_empty = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let was_empty = pending.is_empty();
            // Coalesce with the previous notification for the same item
            match pending.last_mut() {
                Some((last, last_roles)) if last == key => {
                    *last_roles = last_roles.union(roles);
                }
                _ => pending.push((key.clone(), roles)),
            }
            was_empty
        };

        if was_empty {
            let wake = self
                .wake
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(wake) = wake {
                wake();
            }
        }
    }

    pub(crate) fn take_pending(&self) -> Vec<(K, FieldRoles)> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}
