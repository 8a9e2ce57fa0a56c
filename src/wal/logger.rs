//! Asynchronous transaction logger.
//!
//! The logger wraps one [`LogBackend`] and decouples write submission from
//! persistence: callers enqueue mutations onto a bounded FIFO queue and
//! return immediately, while a single background persister task drains the
//! queue and appends to the backend. One persister per logger is what keeps
//! persist order equal to submission order, and the backend free of
//! concurrent writers.
//!
//! Persist failures never reach the submitting caller; they surface on the
//! error feed returned by [`TransactionLogger::errors`].

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use super::backend::LogBackend;
use super::event::{Event, Mutation};
use super::file::FileLog;
use super::sqlite::SqliteLog;
use super::{LogError, Result};

/// Capacity of the submission queue. A full queue applies backpressure to
/// producers; this is the only admission control.
const QUEUE_CAPACITY: usize = 16;

/// Capacity of the error feed. On overflow the error is dropped from the
/// feed and reported through the process log instead, so a slow monitor can
/// never stall the persister.
const ERROR_FEED_CAPACITY: usize = 1;

/// Capacity of the replay event feed handed out by `read_events`.
const REPLAY_FEED_CAPACITY: usize = 64;

/// Outstanding durability work, incremented on submission and retired by the
/// persister after each attempt, success or failure. Drain waits on this
/// reaching zero; a unit that is never retired would deadlock every drainer.
struct PendingWork {
    count: AtomicU64,
    drained: Notify,
}

impl PendingWork {
    fn new() -> Self {
        PendingWork {
            count: AtomicU64::new(0),
            drained: Notify::new(),
        }
    }

    fn submit(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn retire(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            let drained = self.drained.notified();
            // Re-check after registering so a retire between the load and the
            // registration cannot be missed.
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Asynchronous writer for the transaction log.
///
/// Lifecycle: construct bound to one backend, optionally replay via
/// [`read_events`](Self::read_events), then [`run`](Self::run) the persister,
/// submit writes, and finally [`close`](Self::close). Writes submitted before
/// `run` sit in the queue and are persisted once the persister starts.
pub struct TransactionLogger {
    backend: Arc<Mutex<Box<dyn LogBackend>>>,
    events: Mutex<Option<mpsc::Sender<Mutation>>>,
    queue: Mutex<Option<mpsc::Receiver<Mutation>>>,
    error_tx: mpsc::Sender<LogError>,
    error_rx: Mutex<Option<mpsc::Receiver<LogError>>>,
    pending: Arc<PendingWork>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionLogger {
    /// Create a logger owning `backend`.
    pub fn new(backend: Box<dyn LogBackend>) -> Self {
        let (events, queue) = mpsc::channel(QUEUE_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_FEED_CAPACITY);

        TransactionLogger {
            backend: Arc::new(Mutex::new(backend)),
            events: Mutex::new(Some(events)),
            queue: Mutex::new(Some(queue)),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
            pending: Arc::new(PendingWork::new()),
            worker: Mutex::new(None),
        }
    }

    /// Create a logger over a file backend at `path`.
    pub fn with_file(path: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(FileLog::open(path)?)))
    }

    /// Create a logger over a SQLite backend at `path`.
    pub fn with_sqlite(path: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(SqliteLog::open(path)?)))
    }

    /// Submit a put for asynchronous persistence.
    ///
    /// Returns once the mutation is queued; awaits only when the queue is
    /// full. The assigned sequence is not reported back to the caller.
    pub async fn write_put(&self, key: &str, value: &str) -> Result<()> {
        self.submit(Mutation::put(key, value)).await
    }

    /// Submit a delete for asynchronous persistence.
    pub async fn write_delete(&self, key: &str) -> Result<()> {
        self.submit(Mutation::delete(key)).await
    }

    async fn submit(&self, mutation: Mutation) -> Result<()> {
        let sender = match self.events.lock().as_ref() {
            Some(sender) => sender.clone(),
            None => return Err(LogError::Closed),
        };

        // Register the durability unit before the enqueue completes so a
        // concurrent drain cannot miss it.
        self.pending.submit();
        if sender.send(mutation).await.is_err() {
            self.pending.retire();
            return Err(LogError::Closed);
        }
        Ok(())
    }

    /// Take the error feed. Persist failures appear here, at most one
    /// buffered at a time. Can be taken once.
    pub fn errors(&self) -> Option<mpsc::Receiver<LogError>> {
        self.error_rx.lock().take()
    }

    /// Start the background persister. Must be called exactly once; a second
    /// call fails with [`LogError::AlreadyRunning`].
    pub fn run(&self) -> Result<()> {
        let mut queue = self.queue.lock().take().ok_or(LogError::AlreadyRunning)?;

        let backend = self.backend.clone();
        let error_tx = self.error_tx.clone();
        let pending = self.pending.clone();

        let handle = tokio::spawn(async move {
            while let Some(mutation) = queue.recv().await {
                let result = {
                    let mut backend = backend.lock();
                    backend.append(mutation.kind, &mutation.key, &mutation.value)
                };

                match result {
                    Ok(sequence) => {
                        log::trace!(
                            "persisted {:?} of {:?} at {}",
                            mutation.kind,
                            mutation.key,
                            sequence
                        );
                    }
                    Err(err) => {
                        // The store was already mutated; this is a durability
                        // gap, observable here and on the error feed.
                        log::error!("transaction log append failed: {}", err);
                        let _ = error_tx.try_send(err);
                    }
                }

                // Retire the unit whether or not the append succeeded.
                pending.retire();
            }
        });

        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Produce the replay feeds: an ordered stream of every persisted event,
    /// oldest first, and a side feed carrying at most one terminal error.
    ///
    /// Each call re-scans the backend from the beginning. Intended for
    /// startup replay, before [`run`](Self::run).
    pub fn read_events(&self) -> (mpsc::Receiver<Event>, mpsc::Receiver<LogError>) {
        let (event_tx, event_rx) = mpsc::channel(REPLAY_FEED_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);
        let backend = self.backend.clone();

        tokio::task::spawn_blocking(move || {
            let mut backend = backend.lock();
            let result = backend.scan(&mut |event| event_tx.blocking_send(event).is_ok());
            if let Err(err) = result {
                let _ = err_tx.blocking_send(err);
            }
        });

        (event_rx, err_rx)
    }

    /// Wait until every submitted write has finished its persistence attempt.
    pub async fn drain(&self) {
        self.pending.wait().await;
    }

    /// Stop admitting writes, drain pending work, stop the persister, and
    /// release the backend. Fails with [`LogError::Closed`] on a second call.
    pub async fn close(&self) -> Result<()> {
        // Dropping the sender stops admission; the persister keeps draining
        // whatever the queue already holds and then exits.
        let sender = self.events.lock().take().ok_or(LogError::Closed)?;
        drop(sender);

        self.pending.wait().await;

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.await.is_err() {
                log::error!("log persister panicked during shutdown");
            }
        }

        // The persister has exited, so no append can race the release.
        self.backend.lock().close()
    }
}
