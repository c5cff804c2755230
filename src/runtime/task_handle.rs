//! Task handles: a result future plus a way to cancel the work behind it.

use std::cell::RefCell;
use std::fmt;
use std::future::Future as StdFuture;
use std::ops::Deref;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::{Block, Frame};
use crate::error::{Error, Result};
use crate::sync::Future;
use crate::tracing_compat::debug;

type HaltFn = Rc<dyn Fn() -> Future<()>>;

/// A [`Future`] with a cancellation handle.
///
/// Awaiting a task (or reading it through [`Deref`]) observes the result;
/// [`Task::halt`] tears down the frame the work runs in.
pub struct Task<T> {
    future: Future<T>,
    halt: Option<HaltFn>,
    halting: Rc<RefCell<Option<Future<()>>>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            halt: self.halt.clone(),
            halting: Rc::clone(&self.halting),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("settled", &self.future.is_settled())
            .field("halted", &self.halting.borrow().is_some())
            .finish()
    }
}

impl<T: Clone + 'static> Task<T> {
    pub(crate) fn new(future: Future<T>, halt: impl Fn() -> Future<()> + 'static) -> Self {
        Self {
            future,
            halt: Some(Rc::new(halt)),
            halting: Rc::new(RefCell::new(None)),
        }
    }

    /// The task of `block` running as the only operation of `frame`.
    ///
    /// Settles once the block exhausted and the frame was destroyed; a frame
    /// teardown failure takes precedence over the block's output.
    pub(crate) fn for_frame(frame: Frame, block: Block<T>) -> Self {
        let inner = Rc::clone(frame.inner());
        let joined = {
            let frame = frame.clone();
            let block = block.clone();
            inner.futurize("task-join", async move {
                let _ = block.exhausted().await;
                frame.destroy().await?;
                block.output().await
            })
        };
        Self::new(joined, move || {
            let frame = frame.clone();
            let block = block.clone();
            debug!(frame = %frame.id(), block = %block.id(), "task halted");
            let runtime = Rc::clone(frame.inner());
            runtime.futurize("task-halt", async move {
                let killed_block = block.abort().await;
                let killed_frame = frame.destroy().await;
                killed_frame.and(killed_block)
            })
        })
    }

    /// A task that has already failed and has nothing to halt.
    pub(crate) fn failed(error: Error) -> Self {
        Self {
            future: Future::rejected(error),
            halt: None,
            halting: Rc::new(RefCell::new(None)),
        }
    }

    /// Turns a failing task into one that always resolves, carrying the
    /// result as its value. Halting either task halts the same work.
    pub(crate) fn into_outcome(self) -> Task<Result<T>> {
        let (future, settle) = Future::create();
        self.future.on_settle(move |result| {
            settle.resolve(result);
        });
        Task {
            future,
            halt: self.halt,
            halting: self.halting,
        }
    }

    /// The task's result future.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        self.future.clone()
    }

    /// Cancels the work and returns a future that settles once its teardown
    /// finished. Rejects only if that teardown failed.
    ///
    /// Every call, on any clone, returns the same future.
    pub fn halt(&self) -> Future<()> {
        let mut halting = self.halting.borrow_mut();
        if let Some(existing) = halting.as_ref() {
            return existing.clone();
        }
        let started = match &self.halt {
            Some(halt) => halt(),
            None => Future::resolved(()),
        };
        *halting = Some(started.clone());
        started
    }
}

impl<T> Deref for Task<T> {
    type Target = Future<T>;

    fn deref(&self) -> &Future<T> {
        &self.future
    }
}

impl<T> AsRef<Future<T>> for Task<T> {
    fn as_ref(&self) -> &Future<T> {
        &self.future
    }
}

impl<T: Clone> StdFuture for Task<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        Pin::new(&mut self.future).poll(cx)
    }
}
