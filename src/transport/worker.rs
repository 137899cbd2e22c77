//! Shared MI worker thread
//!
//! MI library calls are synchronous and may block for seconds (a sanitize
//! status read, a 4 KiB identify), so they never run on the reactor. One
//! worker serves every drive in the process: per-drive threads would
//! multiply kernel sockets and contend on the MCTP link for no benefit.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use tracing::debug;

/// Work item executed on the worker thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Process-wide registry so concurrently constructed drives share one worker.
static SHARED: OnceLock<Mutex<Weak<MiWorker>>> = OnceLock::new();

/// Dedicated thread executing MI tasks strictly FIFO.
///
/// The worker is reference counted across drives: it spins up lazily with the
/// first endpoint and is joined when the last endpoint drops. Tasks queued
/// before teardown are drained before the thread exits.
pub struct MiWorker {
    tx: Mutex<Option<mpsc::Sender<Task>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl MiWorker {
    /// Get the shared worker, starting it if no drive currently holds one.
    pub fn shared() -> Arc<Self> {
        let slot = SHARED.get_or_init(|| Mutex::new(Weak::new()));
        let mut guard = slot.lock();
        if let Some(worker) = guard.upgrade() {
            return worker;
        }
        let worker = Arc::new(Self::start());
        *guard = Arc::downgrade(&worker);
        worker
    }

    fn start() -> Self {
        let (tx, rx) = mpsc::channel::<Task>();
        let thread = thread::Builder::new()
            .name("nvme-mi-worker".into())
            .spawn(move || {
                debug!("MI worker thread started");
                // recv() parks until a task arrives or every sender is gone;
                // the loop drains whatever is still queued before exiting.
                while let Ok(task) = rx.recv() {
                    task();
                }
                debug!("MI worker thread exiting");
            })
            .expect("failed to spawn MI worker thread");
        Self {
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Queue a task for FIFO execution on the worker thread.
    ///
    /// Fails with [`Error::NoSuchDevice`] once the worker has been torn down;
    /// callers surface that to their completion callback as a transient
    /// failure.
    pub fn submit(&self, task: Task) -> Result<()> {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| Error::NoSuchDevice),
            None => Err(Error::NoSuchDevice),
        }
    }
}

impl Drop for MiWorker {
    fn drop(&mut self) {
        // Dropping the sender lets the thread drain the queue and stop.
        self.tx.lock().take();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}
