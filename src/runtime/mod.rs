//! The executor and the frame/block/task handles it drives.
//!
//! A [`Runtime`] owns every frame, block, and job. It runs on the thread
//! that calls [`Runtime::block_on`]: woken jobs are polled in wake order,
//! expired timers fire between polls, and when nothing is runnable the
//! executor either parks (wall clock) or jumps the clock to the next timer
//! (virtual clock).
//!
//! # Example
//!
//! ```
//! use corral::runtime::RuntimeBuilder;
//!
//! let runtime = RuntimeBuilder::virtual_time().build().unwrap();
//! let task = runtime.run(|_cx| async { Ok(42) });
//! assert_eq!(runtime.block_on(&task).unwrap(), 42);
//! ```

pub mod block;
pub mod builder;
pub mod config;
pub mod env_config;
pub mod frame;
pub mod job;
pub mod state;
pub mod task_handle;
pub mod waker;

pub use block::Block;
pub use builder::RuntimeBuilder;
pub use config::{ClockKind, ConfigError, RuntimeConfig};
pub use frame::Frame;
pub use task_handle::Task;

use std::cell::{Cell, RefCell};
use std::future::Future as StdFuture;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::cx::{Cx, Scope};
use crate::error::{Error, ErrorKind, Result};
use crate::sync::Future;
use crate::time::driver::{Clock, TimerDriver, TimerHandle, VirtualClock, WallClock};
use crate::tracing_compat::{debug, trace};
use crate::types::{JobId, Time};
use crate::util::Arena;

use job::{LocalJob, StoredJob};
use state::RuntimeState;
use waker::WakerState;

/// Shared runtime internals. Every handle holds an `Rc` to this.
pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    pub(crate) state: RefCell<RuntimeState>,
    jobs: RefCell<Arena<StoredJob>>,
    wakers: Arc<WakerState>,
    timers: RefCell<TimerDriver>,
    steps: Cell<u64>,
    driving: Cell<bool>,
    shut_down: Cell<bool>,
}

impl RuntimeInner {
    fn new(config: RuntimeConfig) -> Self {
        let clock = match config.clock {
            ClockKind::Wall => Clock::Wall(WallClock::new()),
            ClockKind::Virtual => Clock::Virtual(VirtualClock::new()),
        };
        Self {
            config,
            state: RefCell::new(RuntimeState::default()),
            jobs: RefCell::new(Arena::new()),
            wakers: Arc::new(WakerState::new()),
            timers: RefCell::new(TimerDriver::new(clock)),
            steps: Cell::new(0),
            driving: Cell::new(false),
            shut_down: Cell::new(false),
        }
    }

    /// Hands `future` to the executor. It is first polled on the next turn.
    pub(crate) fn spawn_job(&self, label: &'static str, future: impl StdFuture<Output = ()> + 'static) {
        if self.shut_down.get() {
            return;
        }
        let future: LocalJob = Box::pin(future);
        let wakers = &self.wakers;
        let index = self.jobs.borrow_mut().insert_with(|index| {
            StoredJob::new(label, future, wakers.waker_for(JobId::from_arena(index)))
        });
        let id = JobId::from_arena(index);
        trace!(job = %id, label, "job spawned");
        self.wakers.wake(id);
    }

    /// Settles a [`Future`] with the output of `computation`.
    pub(crate) fn futurize<T: Clone + 'static>(
        &self,
        label: &'static str,
        computation: impl StdFuture<Output = Result<T>> + 'static,
    ) -> Future<T> {
        let (future, settle) = Future::create();
        self.spawn_job(label, async move {
            settle.settle(computation.await);
        });
        future
    }

    pub(crate) fn now(&self) -> Time {
        self.timers.borrow().now()
    }

    pub(crate) fn set_timeout(&self, after: Duration, callback: impl FnOnce() + 'static) -> TimerHandle {
        let mut timers = self.timers.borrow_mut();
        let deadline = timers.now() + after;
        trace!(deadline = %deadline, "timer registered");
        timers.register(deadline, callback)
    }

    pub(crate) fn clear_timeout(&self, handle: TimerHandle) -> bool {
        self.timers.borrow_mut().cancel(handle)
    }

    fn poll_job(&self, id: JobId) {
        let taken = {
            let mut jobs = self.jobs.borrow_mut();
            jobs.get_mut(id.arena_index()).and_then(|job| {
                let future = job.future.take()?;
                job.poll_count += 1;
                Some((future, job.waker.clone(), job.label, job.poll_count))
            })
        };
        let Some((mut future, waker, label, polls)) = taken else {
            return;
        };
        trace!(job = %id, label, polls, "job poll");
        let _ = (label, polls);
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                let finished = self.jobs.borrow_mut().remove(id.arena_index());
                drop(finished);
                drop(future);
            }
            Poll::Pending => {
                let mut jobs = self.jobs.borrow_mut();
                match jobs.get_mut(id.arena_index()) {
                    Some(job) => job.future = Some(future),
                    None => {
                        drop(jobs);
                        drop(future);
                    }
                }
            }
        }
    }

    fn count_step(&self) -> Result<()> {
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        match self.config.max_steps {
            Some(limit) if steps > limit => Err(Error::new(ErrorKind::StepLimit)
                .with_message(format!("exceeded {limit} job polls"))),
            _ => Ok(()),
        }
    }

    fn fire_due_timers(&self, now: Time) -> bool {
        let due = self.timers.borrow_mut().take_expired(now);
        let fired = !due.is_empty();
        for callback in due {
            callback();
        }
        fired
    }

    /// Polls every woken job once. Returns true if anything ran.
    fn run_ready(&self) -> Result<bool> {
        let mut progressed = false;
        if !self.config_is_virtual() {
            progressed |= self.fire_due_timers(self.now());
        }
        for id in self.wakers.drain_woken() {
            self.count_step()?;
            self.poll_job(id);
            progressed = true;
        }
        Ok(progressed)
    }

    /// Waits for work when nothing is runnable.
    fn idle(&self) -> Result<()> {
        let next = self.timers.borrow_mut().next_deadline();
        if self.config_is_virtual() {
            if self.wakers.has_woken() {
                return Ok(());
            }
            let Some(deadline) = next else {
                return Err(Error::new(ErrorKind::Stalled)
                    .with_message("no runnable jobs and no pending timers"));
            };
            self.timers.borrow().advance_to(deadline);
            trace!(now = %deadline, "virtual clock advanced");
            self.fire_due_timers(deadline);
            return Ok(());
        }
        let park = next.map_or(self.config.idle_park, |deadline| {
            deadline.saturating_since(self.now()).min(self.config.idle_park)
        });
        if !park.is_zero() {
            self.wakers.park_timeout(park);
        }
        self.fire_due_timers(self.now());
        Ok(())
    }

    fn config_is_virtual(&self) -> bool {
        self.config.clock == ClockKind::Virtual
    }

    fn block_on<T: Clone + 'static>(&self, target: &Future<T>) -> Result<T> {
        if self.shut_down.get() {
            return Err(Error::new(ErrorKind::InvalidStateTransition)
                .with_message("runtime has shut down"));
        }
        if self.driving.replace(true) {
            return Err(Error::new(ErrorKind::InvalidStateTransition)
                .with_message("block_on called from inside the runtime"));
        }
        let result = loop {
            if let Some(result) = target.result() {
                break result;
            }
            match self.run_ready() {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => break Err(err),
            }
            if let Err(err) = self.idle() {
                break Err(err);
            }
        };
        self.driving.set(false);
        result
    }

    fn shutdown(&self) {
        self.shut_down.set(true);
        loop {
            let jobs = self.jobs.borrow_mut().drain();
            if jobs.is_empty() {
                break;
            }
            debug!(jobs = jobs.len(), "dropping unfinished jobs at shutdown");
            drop(jobs);
        }
        let _ = self.wakers.drain_woken();
        let timers = self.timers.borrow_mut().clear();
        drop(timers);
        let state = std::mem::take(&mut *self.state.borrow_mut());
        drop(state);
    }

    fn job_count(&self) -> usize {
        self.jobs.borrow().len()
    }
}

/// A cloneable handle to a runtime.
#[derive(Clone)]
pub struct Handle {
    inner: Rc<RuntimeInner>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("clock", &self.inner.config.clock)
            .finish_non_exhaustive()
    }
}

impl Handle {
    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    /// Runs `operation` in a new root frame.
    ///
    /// The returned task settles with the operation's result once the
    /// operation returned and its frame has been torn down.
    pub fn run<T, F, Fut>(&self, operation: F) -> Task<T>
    where
        T: Clone + 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: StdFuture<Output = Result<T>> + 'static,
    {
        let frame = match Frame::root(&self.inner) {
            Ok(frame) => frame,
            Err(err) => return Task::failed(err),
        };
        match frame.run(operation) {
            Ok(block) => {
                let task = Task::for_frame(frame, block.clone());
                block.enter();
                task
            }
            Err(err) => Task::failed(err),
        }
    }

    /// Creates a scope over a new root frame.
    pub fn create_scope(&self) -> Result<Scope> {
        Frame::root(&self.inner).map(Scope::new)
    }

    /// The current time on the runtime's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.now()
    }

    /// Runs `callback` after `after` elapses on the runtime's clock.
    pub fn set_timeout(&self, after: Duration, callback: impl FnOnce() + 'static) -> TimerHandle {
        self.inner.set_timeout(after, callback)
    }

    /// Cancels a timer. Returns false if it already fired.
    pub fn clear_timeout(&self, handle: TimerHandle) -> bool {
        self.inner.clear_timeout(handle)
    }
}

/// The structured-concurrency runtime.
pub struct Runtime {
    handle: Handle,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.handle.inner.config)
            .field("jobs", &self.handle.inner.job_count())
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A wall-clock runtime with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// A runtime with explicit settings.
    #[must_use]
    pub fn with_config(mut config: RuntimeConfig) -> Self {
        config.normalize();
        debug!(clock = ?config.clock, max_steps = ?config.max_steps, "runtime created");
        Self {
            handle: Handle::from_inner(Rc::new(RuntimeInner::new(config))),
        }
    }

    /// A cloneable handle for use inside operations and callbacks.
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// The settings this runtime was built with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.handle.inner.config
    }

    /// See [`Handle::run`].
    pub fn run<T, F, Fut>(&self, operation: F) -> Task<T>
    where
        T: Clone + 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: StdFuture<Output = Result<T>> + 'static,
    {
        self.handle.run(operation)
    }

    /// See [`Handle::create_scope`].
    pub fn create_scope(&self) -> Result<Scope> {
        self.handle.create_scope()
    }

    /// Drives the runtime until `target` settles and returns its result.
    ///
    /// Fails with [`ErrorKind::Stalled`] on a virtual clock when nothing can
    /// make progress, and with [`ErrorKind::StepLimit`] past the configured
    /// poll limit.
    pub fn block_on<T: Clone + 'static>(&self, target: impl AsRef<Future<T>>) -> Result<T> {
        self.handle.inner.block_on(target.as_ref())
    }

    /// The current time on the runtime's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.handle.now()
    }

    /// Number of live frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.handle.inner.state.borrow().frames.len()
    }

    /// Number of live blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.handle.inner.state.borrow().blocks.len()
    }

    /// True when no frame is alive and no job is pending.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.frame_count() == 0 && self.handle.inner.job_count() == 0
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.handle.inner.shutdown();
    }
}
