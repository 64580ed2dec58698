//! Host-facing view adapter.
//!
//! [`ViewState`] is the synchronous composition of the keyed store, the live
//! projection and the observer registry. [`LiveView`] is a cloneable handle
//! that runs every operation on the state's [`SingleWriter`] and awaits the
//! result, so it can be used from any thread or task.
//!
//! Item change notifications arriving on other threads wake the writer, which
//! then applies them and publishes the resulting events; no caller needs to
//! poll.
//!
//! ```
//! # use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
//! # use sortview::{Direction, FieldNotifier, LiveView, Observable, SortOrder, SubscriptionId, ViewState};
//! # use sortview::observe::FieldListener;
//! struct Job {
//!     id: u32,
//!     priority: AtomicU64,
//!     notifier: FieldNotifier,
//! }
//!
//! impl Observable for Job {
//!     fn subscribe(&self, listener: FieldListener) -> SubscriptionId {
//!         self.notifier.subscribe(listener)
//!     }
//!     fn unsubscribe(&self, id: SubscriptionId) -> bool {
//!         self.notifier.unsubscribe(id)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sortview::Result<()> {
//! let sort = SortOrder::by("priority", |j: &Job| j.priority.load(Ordering::SeqCst), Direction::Descending);
//! let (view, _task) = LiveView::spawn(ViewState::new(|j: &Job| j.id, sort));
//!
//! for (id, priority) in [(1, 5), (2, 9), (3, 1)] {
//!     let job = Job { id, priority: AtomicU64::new(priority), notifier: FieldNotifier::new() };
//!     view.add(Arc::new(job)).await?;
//! }
//! let order: Vec<u32> = view.snapshot().await?.iter().map(|j| j.id).collect();
//! assert_eq!(order, vec![2, 1, 3]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    Result,
    observe::Observable,
    projection::ChangeEvent,
    shaping::{Filter, SortOrder},
    store::StoreKey,
    writer::{SingleWriter, WeakWriterHandle, WriterHandle},
};

mod errors;
mod observers;
mod state;

pub use errors::ViewError;
pub use observers::{ObserverId, ObserverSet, ViewObserver};
pub use state::{ViewState, ViewStats};

/// A change to the visible sequence, as delivered to observers.
pub type ViewEvent<T> = ChangeEvent<T>;

/// Cloneable, thread-safe handle to a [`ViewState`] running on its own writer.
pub struct LiveView<K: StoreKey, T: Observable> {
    handle: WriterHandle<ViewState<K, T>>,
    stats: Arc<ViewStats>,
}

impl<K: StoreKey, T: Observable> Clone for LiveView<K, T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<K: StoreKey, T: Observable> std::fmt::Debug for LiveView<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveView")
            .field("handle", &self.handle)
            .field("len", &self.stats.len())
            .finish()
    }
}

/// Install a wake hook that schedules pending item changes on the writer.
fn install_wake<K: StoreKey, T: Observable>(
    state: &ViewState<K, T>,
    weak: WeakWriterHandle<ViewState<K, T>>,
) {
    state.set_wake(Some(Arc::new(move || {
        let Some(handle) = weak.upgrade() else {
            return;
        };
        if handle
            .submit(|state: &mut ViewState<K, T>| {
                state.process_pending();
            })
            .is_err()
        {
            trace!("writer closed, item change not scheduled");
        }
    })));
}

impl<K: StoreKey, T: Observable> LiveView<K, T> {
    /// Put `state` under a new writer and return a view together with the owner.
    ///
    /// The caller drives the owner, for example with
    /// [`SingleWriter::pump`] from an existing event loop.
    pub fn attach(state: ViewState<K, T>) -> (Self, SingleWriter<ViewState<K, T>>) {
        let stats = state.stats();
        let (writer, handle) = SingleWriter::new(state);
        install_wake(writer.state(), handle.downgrade());
        debug!(writer = writer.id(), "view attached");
        (Self { handle, stats }, writer)
    }

    /// Run `state` as a task on the current tokio runtime.
    ///
    /// The task ends, returning the state, once every view handle is dropped.
    pub fn spawn(state: ViewState<K, T>) -> (Self, tokio::task::JoinHandle<ViewState<K, T>>) {
        let (view, writer) = Self::attach(state);
        (view, writer.spawn())
    }

    /// Run `state` on a dedicated thread named after its config.
    pub fn spawn_thread(
        state: ViewState<K, T>,
    ) -> std::io::Result<(Self, std::thread::JoinHandle<ViewState<K, T>>)> {
        let name = state.config().writer_thread_name.clone();
        let (view, writer) = Self::attach(state);
        let thread = writer.spawn_thread(name)?;
        Ok((view, thread))
    }

    /// The underlying writer handle, for blocking calls or custom jobs.
    pub fn handle(&self) -> &WriterHandle<ViewState<K, T>> {
        &self.handle
    }

    /// Counters updated after every mutation.
    pub fn stats(&self) -> &Arc<ViewStats> {
        &self.stats
    }

    /// Visible items as of the last completed mutation.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Stored items as of the last completed mutation.
    pub fn total_len(&self) -> usize {
        self.stats.total_len()
    }

    /// Run `f` with shared access to the state.
    pub async fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ViewState<K, T>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.call(move |state| f(state)).await
    }

    /// Run `f` with exclusive access to the state.
    pub async fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut ViewState<K, T>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.call(f).await
    }

    // Mutations

    pub async fn add(&self, item: Arc<T>) -> Result<K> {
        self.handle.call(move |s| s.add(item)).await?
    }

    pub async fn try_add(&self, item: Arc<T>) -> Result<bool> {
        self.handle.call(move |s| s.try_add(item)).await
    }

    pub async fn add_bulk(&self, items: Vec<Arc<T>>) -> Result<usize> {
        self.handle.call(move |s| s.add_bulk(items)).await?
    }

    pub async fn remove_by_key(&self, key: K) -> Result<Option<Arc<T>>> {
        self.handle.call(move |s| s.remove_by_key(&key)).await
    }

    pub async fn remove(&self, item: Arc<T>) -> Result<bool> {
        self.handle.call(move |s| s.remove(&item)).await
    }

    pub async fn remove_bulk(&self, keys: Vec<K>) -> Result<usize> {
        self.handle.call(move |s| s.remove_bulk(&keys)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.handle.call(|s| s.clear()).await
    }

    pub async fn replace_all(&self, items: Vec<Arc<T>>) -> Result<()> {
        self.handle.call(move |s| s.replace_all(items)).await?
    }

    /// See [`ViewState::update_key`].
    pub async fn update_key<F>(&self, key: K, mutate: F) -> Result<K>
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.handle
            .call(move |s| s.update_key(&key, mutate))
            .await?
    }

    // Shaping

    pub async fn set_sort(&self, sort: SortOrder<T>) -> Result<()> {
        self.handle.call(move |s| s.set_sort(sort)).await
    }

    pub async fn set_filter(&self, filter: Option<Filter<T>>) -> Result<()> {
        self.handle.call(move |s| s.set_filter(filter)).await
    }

    pub async fn notify_filter_dependency_changed(&self) -> Result<()> {
        self.handle
            .call(|s| s.notify_filter_dependency_changed())
            .await
    }

    /// Apply queued item changes now rather than waiting for the wake hook.
    pub async fn process_pending(&self) -> Result<usize> {
        self.handle.call(|s| s.process_pending()).await
    }

    // Reads

    pub async fn get(&self, key: K) -> Result<Option<Arc<T>>> {
        self.handle.call(move |s| s.get(&key).cloned()).await
    }

    pub async fn contains_key(&self, key: K) -> Result<bool> {
        self.handle.call(move |s| s.contains_key(&key)).await
    }

    /// See [`ViewState::at`].
    pub async fn at(&self, index: usize) -> Result<Arc<T>> {
        self.handle
            .call(move |s| s.at(index).cloned())
            .await?
    }

    pub async fn index_of(&self, key: K) -> Result<Option<usize>> {
        self.handle.call(move |s| s.index_of(&key)).await
    }

    pub async fn snapshot(&self) -> Result<Vec<Arc<T>>> {
        self.handle.call(|s| s.snapshot()).await
    }

    // Observers

    /// Subscribe to change events through a channel.
    ///
    /// Events published before the subscription took effect are not delivered.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<ViewEvent<T>>> {
        self.handle.call(|s| s.subscribe()).await
    }

    pub async fn observe(&self, observer: Arc<dyn ViewObserver<T>>) -> Result<ObserverId> {
        self.handle.call(move |s| s.observe(observer)).await
    }

    pub async fn unobserve(&self, id: ObserverId) -> Result<bool> {
        self.handle.call(move |s| s.unobserve(id)).await
    }
}
