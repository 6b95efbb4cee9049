use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Bounded-concurrency gate shared by probe fan-out and manifest resource
/// verification. `clear_queue()` cancels every pending (not-yet-admitted)
/// `acquire()` call without disturbing work already holding a permit, so a
/// caller can race several tasks against a limiter and drop the rest the
/// moment one wins.
pub struct Limiter {
    semaphore: Arc<Semaphore>,
    cancel: Mutex<CancellationToken>,
}

impl Limiter {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Waits for a permit. Returns `None` if `clear_queue()` was called
    /// while this call was still waiting.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let token = self.cancel.lock().unwrap().clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        }
    }

    /// Cancels every call currently blocked in `acquire()`. Permits already
    /// granted are unaffected; future `acquire()` calls use a fresh token.
    pub fn clear_queue(&self) {
        let mut guard = self.cancel.lock().unwrap();
        guard.cancel();
        *guard = CancellationToken::new();
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
