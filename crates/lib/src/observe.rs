//! Field-level change notification.
//!
//! The engine never polls items. Instead every item implements [`Observable`]
//! so the projection can register a listener when the item is admitted and
//! remove it when the item leaves. Listeners receive the name of the field
//! that changed and may be called from any thread.

use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

/// Callback invoked with the name of a changed field.
pub type FieldListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle returned by [`Observable::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// An item that reports changes to its fields.
///
/// Implementations must call every registered listener after a field that
/// may affect sorting or filtering has changed. Listener calls must not hold
/// locks the listener could need; the projection's listener only flips an
/// atomic flag and pushes onto a queue, so it never blocks for long.
pub trait Observable: Send + Sync + 'static {
    /// Register `listener`, returning a handle for [`unsubscribe`](Self::unsubscribe).
    fn subscribe(&self, listener: FieldListener) -> SubscriptionId;

    /// Remove a listener. Returns `false` if the handle was unknown.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Reusable listener registry for [`Observable`] implementations.
///
/// Embed one in an item and forward `subscribe`/`unsubscribe` to it, then call
/// [`notify`](Self::notify) after mutating a field.
///
/// ```
/// use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
/// use sortview::{FieldNotifier, Observable, SubscriptionId, observe::FieldListener};
///
/// struct Entry {
///     size: AtomicU64,
///     notifier: FieldNotifier,
/// }
///
/// impl Entry {
///     fn set_size(&self, size: u64) {
///         self.size.store(size, Ordering::Relaxed);
///         self.notifier.notify("size");
///     }
/// }
///
/// impl Observable for Entry {
///     fn subscribe(&self, listener: FieldListener) -> SubscriptionId {
///         self.notifier.subscribe(listener)
///     }
///     fn unsubscribe(&self, id: SubscriptionId) -> bool {
///         self.notifier.unsubscribe(id)
///     }
/// }
/// ```
#[derive(Default)]
pub struct FieldNotifier {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, FieldListener)>>,
}

impl fmt::Debug for FieldNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl FieldNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: FieldListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Tell every listener that `field` changed.
    ///
    /// Listeners are called outside the registry lock, so a listener may
    /// subscribe or unsubscribe without deadlocking.
    pub fn notify(&self, field: &str) {
        let listeners: Vec<FieldListener> =
            self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(field);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, FieldListener)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Observable for FieldNotifier {
    fn subscribe(&self, listener: FieldListener) -> SubscriptionId {
        FieldNotifier::subscribe(self, listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        FieldNotifier::unsubscribe(self, id)
    }
}
