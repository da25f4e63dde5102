//! Persistence scheduler: decides when reconciliation and remote writes run.
//!
//! One cancellable pending-flush token per identity. Trailing-edge debounce
//! for ordinary mutations, an awaited preempting path for privileged ones,
//! and at most one flush in flight at a time.

use log::debug;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Default quiescence window before a debounced flush executes.
pub const DEFAULT_QUIESCENCE_WINDOW: Duration = Duration::from_millis(1000);

pub struct PersistenceScheduler {
    window: Duration,
    pending: StdMutex<Option<JoinHandle<()>>>,
    flush_lock: Mutex<()>,
    rerun_queued: AtomicBool,
}

impl PersistenceScheduler {
    pub fn new(window: Duration) -> Arc<Self> {
        Arc::new(Self {
            window,
            pending: StdMutex::new(None),
            flush_lock: Mutex::new(()),
            rerun_queued: AtomicBool::new(false),
        })
    }

    /// Reset the quiescence timer. The previous pending timer, if any, is
    /// cancelled; `flush` runs only if no further schedule call arrives
    /// within the window.
    pub fn schedule<F, Fut>(self: &Arc<Self>, flush: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        let scheduler = Arc::clone(self);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(scheduler.window).await;
            // Once the window elapses the flush is committed: detach it so a
            // later schedule() abort can no longer kill a queued rerun that is
            // waiting on the flush lock.
            tokio::spawn(async move {
                scheduler.run_serialized(flush).await;
            });
        }));
    }

    /// Preempting path for privileged flushes: cancels the pending timer and
    /// executes `flush` synchronously relative to the caller, serialized with
    /// any in-flight flush.
    pub async fn run_now<F, Fut>(&self, flush: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.cancel_pending();
        let _guard = self.flush_lock.lock().await;
        // This flush reads the freshest state; any queued rerun is absorbed.
        self.rerun_queued.store(false, Ordering::SeqCst);
        flush().await;
    }

    /// Serialize with coalescing: if a flush is already in flight, exactly one
    /// rerun is queued behind it; further requests fold into that rerun. The
    /// rerun reads state at its own execution time.
    async fn run_serialized<F, Fut>(&self, flush: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        if self.rerun_queued.swap(true, Ordering::SeqCst) {
            debug!("[ProfileSync] flush already queued; coalescing");
            return;
        }
        let _guard = self.flush_lock.lock().await;
        self.rerun_queued.store(false, Ordering::SeqCst);
        flush().await;
    }

    /// Identity switch path: drop the pending timer and the queued-rerun
    /// marker. Flushes already past scheduling are discarded by the caller's
    /// epoch check.
    pub fn cancel(&self) {
        self.cancel_pending();
        self.rerun_queued.store(false, Ordering::SeqCst);
    }

    fn cancel_pending(&self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = pending.take() {
            task.abort();
        }
    }
}
