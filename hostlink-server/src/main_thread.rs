//! Host main-thread executor
//!
//! Host state may only be mutated from one designated thread. Connection
//! tasks hand work to that thread through a bounded queue and await the
//! result with a deadline. The queue is drained either by a dedicated thread
//! ([`MainThread::spawn`]) or by a host-owned loop calling
//! [`MainQueue::run_pending`] from its own tick.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// A unit of work for the main thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors from handing work to the main thread
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MainThreadError {
    /// The task did not complete within the deadline. It may still run later.
    #[error("Timeout waiting for main thread")]
    Timeout,

    #[error("Main thread is not running")]
    Closed,
}

/// Cloneable handle for scheduling work on the main thread
#[derive(Clone)]
pub struct MainThreadHandle {
    tx: mpsc::Sender<Task>,
    thread_id: ThreadId,
}

impl std::fmt::Debug for MainThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadHandle")
            .field("thread_id", &self.thread_id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl MainThreadHandle {
    /// Designate the calling thread as the main thread
    ///
    /// The returned queue must be drained by this same thread.
    pub fn for_current_thread(capacity: usize) -> (Self, MainQueue) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            tx,
            thread_id: thread::current().id(),
        };
        (handle, MainQueue { rx })
    }

    /// Whether the caller is already running on the main thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue a task without waiting for it to run
    pub async fn schedule(&self, task: Task) -> Result<(), MainThreadError> {
        self.tx.send(task).await.map_err(|_| MainThreadError::Closed)
    }

    /// Run `f` on the main thread and wait up to `timeout` for its result
    ///
    /// Runs inline when called from the main thread itself. On timeout the
    /// task is not cancelled; it still runs once the main thread reaches it
    /// and its result is discarded.
    pub async fn call<F, T>(&self, f: F, timeout: Duration) -> Result<T, MainThreadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current() {
            return Ok(f());
        }

        let (result_tx, result_rx) = oneshot::channel();
        let task: Task = Box::new(move || {
            if result_tx.send(f()).is_err() {
                debug!("Main thread result discarded, caller stopped waiting");
            }
        });

        let round_trip = async {
            self.schedule(task).await?;
            result_rx.await.map_err(|_| MainThreadError::Closed)
        };

        match tokio::time::timeout(timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Main thread call timed out");
                Err(MainThreadError::Timeout)
            }
        }
    }
}

/// Receiving end of the main-thread queue
pub struct MainQueue {
    rx: mpsc::Receiver<Task>,
}

impl MainQueue {
    /// Run every task queued so far, returning how many ran
    ///
    /// Intended for hosts that own their loop and drain the queue on a tick.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            run_task(task);
            ran += 1;
        }
        ran
    }

    /// Block the current thread running tasks until every handle is dropped
    ///
    /// Must not be called from inside an async runtime.
    pub fn run(mut self) {
        while let Some(task) = self.rx.blocking_recv() {
            run_task(task);
        }
        debug!("Main thread queue closed");
    }
}

fn run_task(task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("Main thread task panicked");
    }
}

/// A dedicated OS thread acting as the host main thread
pub struct MainThread {
    handle: MainThreadHandle,
    thread: thread::JoinHandle<()>,
}

impl MainThread {
    /// Spawn a named thread that drains a queue of `capacity` tasks
    pub fn spawn(name: &str, capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(capacity);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || MainQueue { rx }.run())?;

        let handle = MainThreadHandle {
            tx,
            thread_id: thread.thread().id(),
        };

        Ok(Self { handle, thread })
    }

    pub fn handle(&self) -> MainThreadHandle {
        self.handle.clone()
    }

    /// Drop this handle and wait for the thread to exit
    ///
    /// Only returns once every other [`MainThreadHandle`] clone is dropped too.
    pub fn join(self) -> thread::Result<()> {
        drop(self.handle);
        self.thread.join()
    }
}
