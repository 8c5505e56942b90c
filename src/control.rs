use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Cooperative pause/stop control shared between a running operation and
/// whoever drives it.
///
/// A token is cloned into each party; all clones observe the same flags.
/// Long-running operations check [`is_stop_requested`](Self::is_stop_requested)
/// at their loop boundaries and call [`wait_if_paused`](Self::wait_if_paused)
/// before transforming a chunk. Pausing suspends without consuming input;
/// stopping wakes paused waiters so a paused run can still be cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    flags: Mutex<Flags>,
    wake: Condvar,
}

#[derive(Debug, Default)]
struct Flags {
    paused: bool,
    stop: bool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.inner.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests suspension at the next chunk boundary.
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    /// Releases a pause and wakes any suspended worker.
    pub fn resume(&self) {
        self.lock().paused = false;
        self.inner.wake.notify_all();
    }

    /// Requests a stop at the next loop boundary. Also wakes paused
    /// workers so the stop can be honored.
    pub fn request_stop(&self) {
        self.lock().stop = true;
        self.inner.wake.notify_all();
    }

    /// Clears both flags so the token can drive another run.
    pub fn reset(&self) {
        let mut flags = self.lock();
        flags.paused = false;
        flags.stop = false;
        drop(flags);
        self.inner.wake.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_stop_requested(&self) -> bool {
        self.lock().stop
    }

    /// Blocks while the token is paused. Returns immediately when not
    /// paused, and also when a stop is pending, so the caller's next stop
    /// check can run.
    pub fn wait_if_paused(&self) {
        let mut flags = self.lock();
        while flags.paused && !flags.stop {
            flags = self
                .inner
                .wake
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
