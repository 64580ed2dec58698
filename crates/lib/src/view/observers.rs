//! Observer registry for view change events.

use std::{fmt, sync::Arc};

use tokio::sync::mpsc;
use tracing::trace;

use super::ViewEvent;

/// Receives view change events on the owner context.
///
/// Observers get the event by shared reference and cannot mutate the view
/// while it is dispatching. Follow-up work can be posted through a
/// [`LiveView`](super::LiveView) handle; it runs after the current mutation.
pub trait ViewObserver<T>: Send + Sync {
    fn on_event(&self, event: &ViewEvent<T>);
}

impl<T, F> ViewObserver<T> for F
where
    F: Fn(&ViewEvent<T>) + Send + Sync,
{
    fn on_event(&self, event: &ViewEvent<T>) {
        self(event)
    }
}

/// Identifies one registration in an [`ObserverSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

enum Sink<T> {
    Callback(Arc<dyn ViewObserver<T>>),
    Channel(mpsc::UnboundedSender<ViewEvent<T>>),
}

/// Callback observers and channel subscribers, notified in registration order.
///
/// Channel subscribers whose receiver has been dropped are pruned on the next
/// dispatch.
pub struct ObserverSet<T> {
    next_id: u64,
    sinks: Vec<(ObserverId, Sink<T>)>,
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObserverSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.sinks.len())
            .finish()
    }
}

impl<T> ObserverSet<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            sinks: Vec::new(),
        }
    }

    fn next_id(&mut self) -> ObserverId {
        self.next_id += 1;
        ObserverId(self.next_id)
    }

    pub fn add(&mut self, observer: Arc<dyn ViewObserver<T>>) -> ObserverId {
        let id = self.next_id();
        self.sinks.push((id, Sink::Callback(observer)));
        id
    }

    /// Register a channel subscriber and return its receiving end.
    pub fn add_channel(&mut self) -> (ObserverId, mpsc::UnboundedReceiver<ViewEvent<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id();
        self.sinks.push((id, Sink::Channel(tx)));
        (id, rx)
    }

    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sink_id, _)| *sink_id != id);
        self.sinks.len() != before
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `events` in order to every registration.
    pub fn dispatch(&mut self, events: &[ViewEvent<T>]) {
        if events.is_empty() || self.sinks.is_empty() {
            return;
        }
        for event in events {
            self.sinks.retain(|(id, sink)| match sink {
                Sink::Callback(observer) => {
                    observer.on_event(event);
                    true
                }
                Sink::Channel(tx) => {
                    let open = tx.send(event.clone()).is_ok();
                    if !open {
                        trace!(?id, "pruned closed subscriber");
                    }
                    open
                }
            });
        }
    }
}
