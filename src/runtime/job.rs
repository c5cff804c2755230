//! Executor jobs.
//!
//! A job is a type-erased `()`-returning future owned by the runtime: block
//! drive loops, frame teardowns, supervisors, and adapters that settle a
//! [`Future`](crate::sync::Future) from an async computation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::Waker;

pub(crate) type LocalJob = Pin<Box<dyn Future<Output = ()>>>;

/// A job stored in the runtime.
///
/// The future is taken out while it is being polled so the job table is not
/// borrowed during the poll.
pub struct StoredJob {
    pub(crate) label: &'static str,
    pub(crate) future: Option<LocalJob>,
    pub(crate) waker: Waker,
    pub(crate) poll_count: u64,
}

impl StoredJob {
    pub(crate) fn new(label: &'static str, future: LocalJob, waker: Waker) -> Self {
        Self {
            label,
            future: Some(future),
            waker,
            poll_count: 0,
        }
    }

    /// Number of times this job has been polled.
    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }
}

impl fmt::Debug for StoredJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredJob")
            .field("label", &self.label)
            .field("polls", &self.poll_count)
            .field("in_poll", &self.future.is_none())
            .finish()
    }
}
