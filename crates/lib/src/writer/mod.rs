//! Single-writer confinement.
//!
//! A [`SingleWriter`] owns some state `S` and is the only place that state is
//! mutated. Any number of [`WriterHandle`]s, on any thread, hand it closures
//! over an unbounded channel; the owner runs them one at a time, in the order
//! they were sent. Each posted closure yields a [`Deferred`] that resolves to
//! the closure's return value once it has run.
//!
//! The owner can be driven as a tokio task ([`SingleWriter::spawn`]), on a
//! dedicated thread ([`SingleWriter::spawn_thread`]), or by hand from an
//! existing loop ([`SingleWriter::pump`]).
//!
//! Code that already holds the owner runs against the state synchronously and
//! immediately, through [`SingleWriter::apply`] or [`SingleWriter::state_mut`].
//! A [`WriterHandle`] never runs anything inline, even when used from inside
//! one of its own writer's jobs. Posting from inside a running job is allowed
//! and queues behind it. Waiting for a result from inside a job on the same
//! writer is not, since the job being waited on cannot start until the current
//! one returns; such calls fail with [`WriterError::Reentrant`] instead of
//! deadlocking.

use std::{
    cell::RefCell,
    fmt,
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll},
};

use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info_span, trace};

use crate::Result;

mod errors;

pub use errors::WriterError;

/// A unit of work run against the owned state.
pub type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

static NEXT_WRITER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Writers whose jobs are running on this thread, innermost last.
    static ACTIVE: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks a writer as running a job on the current thread until dropped.
struct JobScope {
    id: u64,
}

impl JobScope {
    fn enter(id: u64) -> Self {
        ACTIVE.with_borrow_mut(|active| active.push(id));
        Self { id }
    }

    fn is_active(id: u64) -> bool {
        ACTIVE.with_borrow(|active| active.contains(&id))
    }
}

impl Drop for JobScope {
    fn drop(&mut self) {
        ACTIVE.with_borrow_mut(|active| {
            if let Some(pos) = active.iter().rposition(|&id| id == self.id) {
                active.remove(pos);
            }
        });
    }
}

/// The owner context: holds the state and runs queued jobs against it.
pub struct SingleWriter<S> {
    id: u64,
    state: S,
    jobs: mpsc::UnboundedReceiver<Job<S>>,
    sender: mpsc::WeakUnboundedSender<Job<S>>,
    processed: u64,
}

impl<S> fmt::Debug for SingleWriter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleWriter")
            .field("id", &self.id)
            .field("processed", &self.processed)
            .finish_non_exhaustive()
    }
}

impl<S> SingleWriter<S> {
    /// Take ownership of `state` and return the owner with a first handle.
    ///
    /// The owner stops once every strong handle has been dropped and the queue
    /// has drained.
    pub fn new(state: S) -> (Self, WriterHandle<S>) {
        let id = NEXT_WRITER_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Self {
            id,
            state,
            jobs: rx,
            sender: tx.downgrade(),
            processed: 0,
        };
        (writer, WriterHandle { id, tx })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Direct access for code already running in the owner context.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    /// A new handle, or `None` if all handles have been dropped.
    pub fn handle(&self) -> Option<WriterHandle<S>> {
        self.sender.upgrade().map(|tx| WriterHandle { id: self.id, tx })
    }

    /// Jobs run so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Run `f` against the state now, as if it were a queued job.
    ///
    /// This is the synchronous path for code on the owner side; jobs already
    /// queued are not run first. Blocking calls on this writer's handles made from inside `f` fail
    /// with [`WriterError::Reentrant`].
    pub fn apply<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> R {
        let _scope = JobScope::enter(self.id);
        f(&mut self.state)
    }

    fn run_job(&mut self, job: Job<S>) {
        let _scope = JobScope::enter(self.id);
        job(&mut self.state);
        self.processed += 1;
    }

    /// Run every job already queued, without waiting for more.
    ///
    /// Jobs posted by the jobs being run are included. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.jobs.try_recv() {
            self.run_job(job);
            count += 1;
        }
        if count > 0 {
            trace!(writer = self.id, count, "pumped jobs");
        }
        count
    }

    /// Process jobs until every handle is dropped, then return the state.
    pub async fn run(mut self) -> S {
        let id = self.id;
        async move {
            debug!("writer started");
            while let Some(job) = self.jobs.recv().await {
                self.run_job(job);
            }
            debug!(processed = self.processed, "writer stopped, all handles dropped");
            self.state
        }
        .instrument(info_span!("single_writer", id))
        .await
    }

    /// Blocking form of [`run`](Self::run) for a dedicated thread.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous runtime.
    pub fn run_blocking(mut self) -> S {
        let span = info_span!("single_writer", id = self.id);
        let _enter = span.enter();
        debug!("writer started");
        while let Some(job) = self.jobs.blocking_recv() {
            self.run_job(job);
        }
        debug!(processed = self.processed, "writer stopped, all handles dropped");
        self.state
    }
}

impl<S: Send + 'static> SingleWriter<S> {
    /// Run the owner as a task on the current tokio runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<S> {
        tokio::spawn(self.run())
    }

    /// Run the owner on a new named OS thread.
    pub fn spawn_thread(self, name: impl Into<String>) -> std::io::Result<std::thread::JoinHandle<S>> {
        std::thread::Builder::new()
            .name(name.into())
            .spawn(move || self.run_blocking())
    }
}

/// Sends jobs to a [`SingleWriter`]. Cheap to clone and usable from any thread.
pub struct WriterHandle<S> {
    id: u64,
    tx: mpsc::UnboundedSender<Job<S>>,
}

impl<S> Clone for WriterHandle<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<S> fmt::Debug for WriterHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterHandle")
            .field("id", &self.id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<S> WriterHandle<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the owner has stopped accepting jobs.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether the calling code is running inside one of this writer's jobs.
    pub fn in_owner_context(&self) -> bool {
        JobScope::is_active(self.id)
    }

    /// A handle that does not keep the owner alive.
    pub fn downgrade(&self) -> WeakWriterHandle<S> {
        WeakWriterHandle {
            id: self.id,
            tx: self.tx.downgrade(),
        }
    }

    /// Queue `f` and return its eventual result.
    ///
    /// Always queues, even from inside a job of this writer; owner-side code
    /// that wants `f` to run immediately uses [`SingleWriter::apply`]. Never
    /// blocks. If the owner is gone the returned [`Deferred`] resolves
    /// to [`WriterError::Closed`].
    pub fn post<R, F>(&self, f: F) -> Deferred<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |state: &mut S| {
            // The caller may have stopped waiting
            let _ = tx.send(f(state));
        });
        if self.tx.send(job).is_err() {
            trace!(writer = self.id, "post to closed writer");
        }
        Deferred { rx }
    }

    /// Queue `f` without waiting for it.
    ///
    /// # Errors
    /// Returns [`WriterError::Closed`] if the owner is gone.
    pub fn submit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx
            .send(Box::new(f))
            .map_err(|_| WriterError::Closed.into())
    }

    /// Queue `f` and wait for its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.post(f).await
    }

    /// Queue `f` and block the current thread until it has run.
    ///
    /// # Errors
    /// - [`WriterError::Reentrant`] when called from inside one of this
    ///   writer's jobs; nothing is queued.
    /// - [`WriterError::Closed`] if the owner is gone.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous runtime.
    pub fn call_blocking<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.in_owner_context() {
            return Err(WriterError::Reentrant.into());
        }
        self.post(f).wait()
    }
}

/// A [`WriterHandle`] that does not keep the owner running.
pub struct WeakWriterHandle<S> {
    id: u64,
    tx: mpsc::WeakUnboundedSender<Job<S>>,
}

impl<S> Clone for WeakWriterHandle<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<S> fmt::Debug for WeakWriterHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakWriterHandle")
            .field("id", &self.id)
            .finish()
    }
}

impl<S> WeakWriterHandle<S> {
    pub fn upgrade(&self) -> Option<WriterHandle<S>> {
        self.tx.upgrade().map(|tx| WriterHandle { id: self.id, tx })
    }
}

/// The pending result of a posted job.
///
/// Await it, or call [`wait`](Self::wait) from synchronous code.
#[must_use = "a Deferred does nothing unless awaited or waited on"]
#[derive(Debug)]
pub struct Deferred<R> {
    rx: oneshot::Receiver<R>,
}

impl<R> Deferred<R> {
    /// Block the current thread until the job has run.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous runtime.
    pub fn wait(self) -> Result<R> {
        self.rx
            .blocking_recv()
            .map_err(|_| WriterError::Closed.into())
    }

    /// The result, if the job has already run.
    ///
    /// Returns `Ok(None)` while the job is still queued.
    pub fn try_take(&mut self) -> Result<Option<R>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(WriterError::Closed.into()),
        }
    }
}

impl<R> Future for Deferred<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| WriterError::Closed.into()))
    }
}
