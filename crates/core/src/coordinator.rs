//! Debounced, superseding request dispatch.
//!
//! Rapidly changing input (keystrokes, edited code) must not fan out
//! into overlapping network calls: per logical key there is at most one
//! request in flight, and a stale response can never overwrite a newer
//! one. Supersession is decided by handle identity at resolution time
//! (a generation number taken under a lock), so even a pathologically
//! reordered response cannot resurrect a cancelled request.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Coordinates requests for one logical key ("suggestions", "session
/// list", ...). Instantiate one coordinator per key.
pub struct RequestCoordinator<T> {
    debounce: Duration,
    shared: Arc<Shared<T>>,
    pending: Mutex<Option<JoinHandle<()>>>,
    results_rx: watch::Receiver<Option<T>>,
}

struct Shared<T> {
    /// The live generation. A task publishes only while it still holds
    /// the current value; bumping and comparing both happen under the
    /// lock so supersede-then-publish is atomic.
    generation: Mutex<u64>,
    results_tx: watch::Sender<Option<T>>,
}

impl<T: Send + Sync + 'static> RequestCoordinator<T> {
    /// Creates a coordinator whose continuous-input submissions wait out
    /// `debounce` of quiet before issuing the call.
    pub fn new(debounce: Duration) -> Self {
        let (results_tx, results_rx) = watch::channel(None);
        Self {
            debounce,
            shared: Arc::new(Shared {
                generation: Mutex::new(0),
                results_tx,
            }),
            pending: Mutex::new(None),
            results_rx,
        }
    }

    /// Schedules `request` after the quiet period, superseding any
    /// earlier submission for this key.
    pub fn submit<F>(&self, request: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.dispatch(request, Some(self.debounce));
    }

    /// Issues `request` immediately: an explicit user action skips the
    /// quiet period but keeps the single-outstanding discipline.
    pub fn submit_now<F>(&self, request: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.dispatch(request, None);
    }

    /// Cancels the pending request, if any, without issuing a new one.
    /// A resolution that arrives later is discarded.
    pub fn cancel(&self) {
        self.supersede();
    }

    /// Latest non-superseded resolution for this key.
    pub fn results(&self) -> watch::Receiver<Option<T>> {
        self.results_rx.clone()
    }

    fn dispatch<F>(&self, request: F, delay: Option<Duration>)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let generation = self.supersede();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let value = request.await;
            let current = shared.generation.lock().expect("coordinator lock poisoned");
            if *current == generation {
                let _ = shared.results_tx.send(Some(value));
            } else {
                // Superseded while in flight: dropped even on success.
                debug!("discarding superseded response");
            }
        });
        *self.pending.lock().expect("coordinator lock poisoned") = Some(task);
    }

    /// Aborts the in-flight task and claims the next generation.
    fn supersede(&self) -> u64 {
        let mut pending = self.pending.lock().expect("coordinator lock poisoned");
        if let Some(task) = pending.take() {
            task.abort();
        }
        let mut generation = self.shared.generation.lock().expect("coordinator lock poisoned");
        *generation += 1;
        *generation
    }
}

impl<T> Drop for RequestCoordinator<T> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(task) = pending.take() {
                task.abort();
            }
        }
    }
}
