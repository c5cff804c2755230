//! Ad hoc supervision over a frame.
//!
//! A [`Scope`] runs tasks in a frame that nobody else drives, typically a
//! fresh root frame from [`Runtime::create_scope`](crate::Runtime::create_scope)
//! or the caller's own frame from [`Cx::use_scope`](super::Cx::use_scope).
//! A task that fails on its own crashes the scope's frame, taking its
//! siblings down with it; [`Scope::close`] tears everything down cleanly.

use std::future::Future as StdFuture;
use std::rc::Rc;

use super::{Context, Cx};
use crate::error::Result;
use crate::runtime::{Frame, Task};
use crate::sync::Future;
use crate::tracing_compat::debug;
use crate::types::Exit;

/// A frame that tasks can be started in.
#[derive(Debug, Clone)]
pub struct Scope {
    frame: Frame,
}

impl Scope {
    pub(crate) fn new(frame: Frame) -> Self {
        Self { frame }
    }

    /// The underlying frame.
    #[must_use]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Starts `operation` in this scope's frame.
    ///
    /// The task settles when the operation is exhausted. Halting it aborts
    /// only this operation; the scope stays open. A task that fails crashes
    /// the scope and settles only after that teardown, with the teardown
    /// error when a sibling's cleanup failed.
    pub fn run<T, F, Fut>(&self, operation: F) -> Task<T>
    where
        T: Clone + 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: StdFuture<Output = Result<T>> + 'static,
    {
        let block = match self.frame.run(operation) {
            Ok(block) => block,
            Err(err) => return Task::failed(err),
        };
        let frame = self.frame.clone();
        let watched = block.clone();
        let runtime = Rc::clone(frame.inner());
        let future = runtime.futurize("scope-task", async move {
            let exhausted = watched.exhausted().await?;
            if let Exit::Completed(Err(err)) = &exhausted.exit {
                debug!(frame = %frame.id(), block = %watched.id(), error = %err, "scope task failed");
                frame.crash(err.clone()).await?;
            }
            exhausted.result?;
            watched.output().await
        });
        let halted = block.clone();
        let task = Task::new(future, move || halted.abort());
        block.enter();
        task
    }

    /// Destroys the scope's frame and everything running in it.
    pub fn close(&self) -> Future<()> {
        self.frame.destroy()
    }

    /// See [`Frame::set_context`].
    pub fn set_context<T: 'static>(&self, key: &Context<T>, value: T) -> Result<()> {
        self.frame.set_context(key, value)
    }

    /// See [`Frame::context`].
    #[must_use]
    pub fn context<T: Clone + 'static>(&self, key: &Context<T>) -> Option<T> {
        self.frame.context(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::{init_test_logging, test_runtime};

    #[test]
    fn failing_task_crashes_siblings() {
        init_test_logging();
        let runtime = test_runtime();
        let scope = runtime.create_scope().expect("scope");
        let sibling = scope.run(|cx| async move {
            cx.suspend().await?;
            Ok(())
        });
        let failing = scope.run(|_cx| async { Err::<(), _>(Error::user("bad")) });
        let err = runtime.block_on(&failing).expect_err("fails");
        assert_eq!(err.message(), Some("bad"));
        let terminal = runtime
            .block_on(&scope.frame().terminal())
            .expect_err("crashed");
        assert_eq!(terminal.message(), Some("bad"));
        assert!(runtime.block_on(&sibling).expect_err("aborted").is_halted());
    }

    #[test]
    fn failed_task_reports_sibling_cleanup_failure() {
        init_test_logging();
        let runtime = test_runtime();
        let scope = runtime.create_scope().expect("scope");
        let (ready, mark) = Future::<()>::create();
        let _sibling = scope.run(move |cx| async move {
            mark.resolve(());
            let _ = cx.suspend().await;
            Err::<(), _>(Error::user("sibling cleanup failed"))
        });
        runtime.block_on(&ready).expect("sibling parked");
        let failing = scope.run(|_cx| async { Err::<(), _>(Error::user("bad")) });
        let err = runtime.block_on(&failing).expect_err("fails");
        assert_eq!(err.message(), Some("sibling cleanup failed"));
        assert!(scope.frame().terminal().is_settled());
        let terminal = runtime
            .block_on(&scope.frame().terminal())
            .expect_err("crashed");
        assert_eq!(terminal.message(), Some("sibling cleanup failed"));
    }

    #[test]
    fn halting_a_task_keeps_scope_open() {
        init_test_logging();
        let runtime = test_runtime();
        let scope = runtime.create_scope().expect("scope");
        let parked = scope.run(|cx| async move {
            cx.suspend().await?;
            Ok(0_u8)
        });
        runtime.block_on(&parked.halt()).expect("halt");
        assert!(scope.frame().state().is_open());
        let next = scope.run(|_cx| async { Ok(1_u8) });
        assert_eq!(runtime.block_on(&next).expect("still usable"), 1);
        runtime.block_on(&scope.close()).expect("close");
        assert!(runtime.is_quiescent());
    }

    #[test]
    fn run_after_close_fails() {
        init_test_logging();
        let runtime = test_runtime();
        let scope = runtime.create_scope().expect("scope");
        runtime.block_on(&scope.close()).expect("close");
        let task = scope.run(|_cx| async { Ok(()) });
        assert!(task.is_settled());
        assert!(runtime.block_on(&task).is_err());
    }
}
