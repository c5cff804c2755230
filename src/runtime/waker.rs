//! Job wakers and the executor's idle parking.
//!
//! A waker only records its job id in the shared woken queue; the executor
//! polls woken jobs on its own thread. Wakers are `Send + Sync` so foreign
//! futures may wake a job from another thread, which also unparks an
//! executor sleeping in [`WakerState::park_timeout`].

use crate::types::JobId;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::task::{Wake, Waker};
use std::time::Duration;

/// Shared state for job wakers.
#[derive(Debug, Default)]
pub struct WakerState {
    woken: Mutex<Vec<JobId>>,
    ready: Condvar,
}

impl WakerState {
    /// Creates an empty waker state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a waker for `job`.
    #[must_use]
    pub fn waker_for(self: &Arc<Self>, job: JobId) -> Waker {
        Waker::from(Arc::new(JobWaker {
            state: Arc::clone(self),
            job,
        }))
    }

    /// Takes every woken job id, in wake order.
    pub fn drain_woken(&self) -> Vec<JobId> {
        std::mem::take(&mut *self.woken.lock())
    }

    /// Returns true if any job is waiting to be polled.
    #[must_use]
    pub fn has_woken(&self) -> bool {
        !self.woken.lock().is_empty()
    }

    /// Blocks until a job is woken or `timeout` elapses.
    pub fn park_timeout(&self, timeout: Duration) {
        let mut woken = self.woken.lock();
        if woken.is_empty() {
            let _ = self.ready.wait_for(&mut woken, timeout);
        }
    }

    pub(crate) fn wake(&self, job: JobId) {
        let mut woken = self.woken.lock();
        if !woken.contains(&job) {
            woken.push(job);
        }
        drop(woken);
        self.ready.notify_one();
    }
}

struct JobWaker {
    state: Arc<WakerState>,
    job: JobId,
}

impl Wake for JobWaker {
    fn wake(self: Arc<Self>) {
        self.state.wake(self.job);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.state.wake(self.job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn job(n: u32) -> JobId {
        JobId::new_for_test(n, 0)
    }

    #[test]
    fn wake_and_drain_in_order() {
        let state = Arc::new(WakerState::new());
        state.waker_for(job(2)).wake_by_ref();
        state.waker_for(job(1)).wake();
        assert_eq!(state.drain_woken(), vec![job(2), job(1)]);
        assert!(!state.has_woken());
    }

    #[test]
    fn repeated_wakes_are_deduplicated() {
        let state = Arc::new(WakerState::new());
        let waker = state.waker_for(job(1));
        waker.wake_by_ref();
        waker.wake_by_ref();
        waker.wake();
        assert_eq!(state.drain_woken().len(), 1);
    }

    #[test]
    fn wake_from_another_thread_unparks() {
        let state = Arc::new(WakerState::new());
        let waker = state.waker_for(job(7));
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            waker.wake();
        });
        let started = Instant::now();
        while !state.has_woken() {
            state.park_timeout(Duration::from_secs(5));
        }
        handle.join().expect("waker thread panicked");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(state.drain_woken(), vec![job(7)]);
    }
}
