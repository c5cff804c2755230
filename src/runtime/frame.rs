//! Frame handles and teardown.
//!
//! Teardown runs once per frame:
//!
//! 1. abort every running block, in registration order, waiting for each
//!    drain to finish;
//! 2. destroy child frames, most recently created first, until none remain;
//! 3. remove the record and settle the terminal future.
//!
//! The terminal result starts as `Ok` for [`Frame::destroy`] or as the crash
//! error for [`Frame::crash`]. Every failed abort or child destruction
//! overwrites it, so the last failure observed is the one reported.

use std::fmt;
use std::future::Future as StdFuture;
use std::rc::Rc;

use super::block::{launch, Block, BoxOperation};
use super::{Handle, RuntimeInner};
use crate::cx::{Context, Cx};
use crate::error::{Error, Result};
use crate::record::FrameState;
use crate::sync::Future;
use crate::tracing_compat::{debug, trace};
use crate::types::{BlockId, FrameId};

/// A handle to a frame: one node in the tree of lifetimes.
#[derive(Clone)]
pub struct Frame {
    id: FrameId,
    inner: Rc<RuntimeInner>,
    terminal: Future<()>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Frame {
    pub(crate) fn root(inner: &Rc<RuntimeInner>) -> Result<Self> {
        let (id, terminal) = inner.state.borrow_mut().insert_frame(None)?;
        debug!(frame = %id, "root frame created");
        Ok(Self {
            id,
            inner: Rc::clone(inner),
            terminal,
        })
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    /// This frame's id.
    #[must_use]
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// The enclosing frame, while this frame is alive.
    #[must_use]
    pub fn parent(&self) -> Option<FrameId> {
        self.inner.state.borrow().frame_parent(self.id)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.inner.state.borrow().frame_state(self.id)
    }

    /// True once teardown has started.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.state().is_closing()
    }

    /// A handle to the runtime this frame lives in.
    #[must_use]
    pub fn handle(&self) -> Handle {
        Handle::from_inner(Rc::clone(&self.inner))
    }

    /// Creates a child frame.
    ///
    /// Children may be created while this frame tears down (cleanup code may
    /// need them); they are destroyed by the same teardown. Fails once this
    /// frame is destroyed.
    pub fn create_child(&self) -> Result<Self> {
        let (id, terminal) = self.inner.state.borrow_mut().insert_frame(Some(self.id))?;
        trace!(frame = %id, parent = %self.id, "child frame created");
        Ok(Self {
            id,
            inner: Rc::clone(&self.inner),
            terminal,
        })
    }

    /// Registers a block running `operation` in this frame.
    ///
    /// The block does nothing until [`Block::enter`] is called. Fails once
    /// teardown has started.
    pub fn run<T, F, Fut>(&self, operation: F) -> Result<Block<T>>
    where
        T: Clone + 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: StdFuture<Output = Result<T>> + 'static,
    {
        launch(
            self,
            Box::new(move |cx: Cx| {
                let operation: BoxOperation<T> = Box::pin(operation(cx));
                operation
            }),
        )
    }

    /// Starts teardown with `error` as the terminal result.
    ///
    /// No-op if teardown already started; either way the terminal future is
    /// returned.
    pub fn crash(&self, error: Error) -> Future<()> {
        self.close(Err(error))
    }

    /// Starts teardown with a successful terminal result.
    ///
    /// No-op if teardown already started; either way the terminal future is
    /// returned.
    pub fn destroy(&self) -> Future<()> {
        self.close(Ok(()))
    }

    /// Settles once teardown has finished.
    #[must_use]
    pub fn terminal(&self) -> Future<()> {
        self.terminal.clone()
    }

    /// Child frame ids, in creation order.
    #[must_use]
    pub fn children(&self) -> Vec<FrameId> {
        self.inner
            .state
            .borrow()
            .children(self.id)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Running block ids, in registration order.
    #[must_use]
    pub fn running(&self) -> Vec<BlockId> {
        self.inner.state.borrow().running(self.id)
    }

    /// Sets a context value on this frame, shadowing any inherited one.
    pub fn set_context<T: 'static>(&self, key: &Context<T>, value: T) -> Result<()> {
        self.inner
            .state
            .borrow_mut()
            .set_context(self.id, key.name(), Rc::new(value))
    }

    /// Resolves a context value from this frame or its ancestors, falling
    /// back to the key's default.
    #[must_use]
    pub fn context<T: Clone + 'static>(&self, key: &Context<T>) -> Option<T> {
        let found = self.inner.state.borrow().lookup_context(self.id, key.name());
        found
            .and_then(|value| value.downcast_ref::<T>().cloned())
            .or_else(|| key.default_value())
    }

    fn close(&self, initial: Result<()>) -> Future<()> {
        let started = self.inner.state.borrow_mut().begin_teardown(self.id);
        if started {
            debug!(frame = %self.id, crashed = initial.is_err(), "frame teardown started");
            self.inner
                .spawn_job("frame-teardown", teardown(self.clone(), initial));
        }
        self.terminal.clone()
    }

    fn child_frames(&self) -> Vec<Self> {
        self.inner
            .state
            .borrow()
            .children(self.id)
            .into_iter()
            .map(|(id, terminal)| Self {
                id,
                inner: Rc::clone(&self.inner),
                terminal,
            })
            .collect()
    }
}

async fn teardown(frame: Frame, initial: Result<()>) {
    let mut outcome = initial;

    let blocks = frame.inner.state.borrow().abort_handles(frame.id);
    for (interrupt, drained) in blocks {
        interrupt.resolve(());
        if let Err(err) = drained.await {
            outcome = Err(err);
        }
    }

    loop {
        let children = frame.child_frames();
        if children.is_empty() {
            break;
        }
        for child in children.iter().rev() {
            if let Err(err) = child.destroy().await {
                outcome = Err(err);
            }
        }
    }

    let settle = frame.inner.state.borrow_mut().finish_frame(frame.id);
    debug!(frame = %frame.id, ok = outcome.is_ok(), "frame torn down");
    if let Some(settle) = settle {
        settle.settle(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, test_runtime};

    #[test]
    fn destroy_is_idempotent() {
        init_test_logging();
        let runtime = test_runtime();
        let scope = runtime.create_scope().expect("scope");
        let frame = scope.frame().clone();
        let first = frame.destroy();
        let second = frame.destroy();
        assert!(first.ptr_eq(&second));
        runtime.block_on(&first).expect("teardown");
        assert_eq!(frame.state(), FrameState::Destroyed);
        assert!(frame.destroy().result().is_some_and(|r| r.is_ok()));
    }

    #[test]
    fn crash_after_destroy_keeps_first_result() {
        init_test_logging();
        let runtime = test_runtime();
        let frame = runtime.create_scope().expect("scope").frame().clone();
        let destroyed = frame.destroy();
        let crashed = frame.crash(Error::user("late"));
        assert!(runtime.block_on(&crashed).is_ok());
        assert!(destroyed.result().is_some_and(|r| r.is_ok()));
    }

    #[test]
    fn crash_reports_error() {
        init_test_logging();
        let runtime = test_runtime();
        let frame = runtime.create_scope().expect("scope").frame().clone();
        let err = runtime
            .block_on(&frame.crash(Error::user("boom")))
            .expect_err("crash");
        assert_eq!(err.message(), Some("boom"));
    }

    /// Parks a block in `frame` whose cleanup fails with `message`.
    fn park_failing_cleanup(runtime: &crate::Runtime, frame: &Frame, message: &'static str) {
        let (ready, mark) = Future::<()>::create();
        let block = frame
            .run(move |cx| async move {
                mark.resolve(());
                let _ = cx.suspend().await;
                Err::<(), _>(Error::user(message))
            })
            .expect("block");
        block.enter();
        runtime.block_on(&ready).expect("parked");
    }

    #[test]
    fn last_block_cleanup_failure_overwrites_crash() {
        init_test_logging();
        let runtime = test_runtime();
        let frame = runtime.create_scope().expect("scope").frame().clone();
        park_failing_cleanup(&runtime, &frame, "first");
        park_failing_cleanup(&runtime, &frame, "second");
        let err = runtime
            .block_on(&frame.crash(Error::user("crash")))
            .expect_err("teardown failed");
        assert_eq!(err.message(), Some("second"));
        assert!(runtime.is_quiescent());
    }

    #[test]
    fn oldest_child_failure_is_reported_last() {
        init_test_logging();
        let runtime = test_runtime();
        let frame = runtime.create_scope().expect("scope").frame().clone();
        park_failing_cleanup(&runtime, &frame, "block");
        let older = frame.create_child().expect("older");
        let newer = frame.create_child().expect("newer");
        park_failing_cleanup(&runtime, &older, "older");
        park_failing_cleanup(&runtime, &newer, "newer");
        let err = runtime
            .block_on(&frame.destroy())
            .expect_err("teardown failed");
        assert_eq!(err.message(), Some("older"));
        let newer_err = runtime.block_on(&newer.terminal()).expect_err("newer failed");
        assert_eq!(newer_err.message(), Some("newer"));
    }

    #[test]
    fn run_after_teardown_started_fails() {
        init_test_logging();
        let runtime = test_runtime();
        let frame = runtime.create_scope().expect("scope").frame().clone();
        let _ = frame.destroy();
        let err = frame.run(|_cx| async { Ok(()) }).expect_err("closed");
        assert_eq!(err.kind(), crate::ErrorKind::FrameClosed);
    }

    #[test]
    fn children_are_destroyed_with_parent_and_detach() {
        init_test_logging();
        let runtime = test_runtime();
        let frame = runtime.create_scope().expect("scope").frame().clone();
        let a = frame.create_child().expect("a");
        let b = frame.create_child().expect("b");
        assert_eq!(frame.children(), vec![a.id(), b.id()]);
        runtime.block_on(&a.destroy()).expect("a");
        assert_eq!(frame.children(), vec![b.id()]);
        runtime.block_on(&frame.destroy()).expect("frame");
        assert_eq!(b.state(), FrameState::Destroyed);
        assert!(b.create_child().is_err());
        assert!(runtime.is_quiescent());
    }

    #[test]
    fn context_lookup_walks_ancestors() {
        static NAME: Context<&'static str> = Context::new("name");
        fn default_level() -> u8 {
            3
        }
        static LEVEL: Context<u8> = Context::with_default("level", default_level);
        init_test_logging();
        let runtime = test_runtime();
        let root = runtime.create_scope().expect("scope").frame().clone();
        let child = root.create_child().expect("child");
        assert_eq!(child.context(&NAME), None);
        assert_eq!(child.context(&LEVEL), Some(3));
        root.set_context(&NAME, "root").expect("set");
        assert_eq!(child.context(&NAME), Some("root"));
        child.set_context(&NAME, "child").expect("set");
        assert_eq!(child.context(&NAME), Some("child"));
        assert_eq!(root.context(&NAME), Some("root"));
    }
}
