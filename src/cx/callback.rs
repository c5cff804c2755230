//! One-shot callbacks that operations can wait on.
//!
//! A [`Once`] is handed to code outside the runtime as a plain callable.
//! The first [`Once::call`] stores the value and wakes every operation
//! waiting in [`Once::wait`]; later calls are ignored.
//!
//! ```rust,ignore
//! let ready = corral::callback::<u32>();
//! let trigger = ready.clone();
//! runtime.handle().set_timeout(Duration::from_millis(5), move || {
//!     trigger.call(7);
//! });
//! let task = runtime.run(move |cx| async move { ready.wait(&cx).await });
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future as StdFuture;
use std::rc::Rc;

use super::Cx;
use crate::error::Result;
use crate::instruction::Resolve;
use crate::tracing_compat::trace;

struct OnceState<T> {
    value: RefCell<Option<T>>,
    waiting: RefCell<Vec<(u64, Resolve<T>)>>,
    next_waiter: Cell<u64>,
}

impl<T: Clone + 'static> OnceState<T> {
    fn value(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    fn add(&self, resolve: Resolve<T>) -> u64 {
        let id = self.next_waiter.get();
        self.next_waiter.set(id + 1);
        self.waiting.borrow_mut().push((id, resolve));
        id
    }

    fn remove(&self, id: u64) {
        self.waiting.borrow_mut().retain(|(waiter, _)| *waiter != id);
    }
}

/// A callable that settles at most once.
pub struct Once<T> {
    state: Rc<OnceState<T>>,
}

impl<T> Clone for Once<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Once<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Once")
            .field("called", &self.state.value.borrow().is_some())
            .field("waiting", &self.state.waiting.borrow().len())
            .finish()
    }
}

/// Creates an uncalled [`Once`].
#[must_use]
pub fn callback<T: Clone + 'static>() -> Once<T> {
    Once {
        state: Rc::new(OnceState {
            value: RefCell::new(None),
            waiting: RefCell::new(Vec::new()),
            next_waiter: Cell::new(0),
        }),
    }
}

impl<T: Clone + 'static> Once<T> {
    /// Stores `value` and wakes every waiter.
    ///
    /// Returns false, and drops `value`, if the callback was already called.
    pub fn call(&self, value: T) -> bool {
        if self.state.value.borrow().is_some() {
            return false;
        }
        *self.state.value.borrow_mut() = Some(value.clone());
        let waiting = self.state.waiting.borrow().clone();
        trace!(waiters = waiting.len(), "callback called");
        for (_, resolve) in waiting {
            resolve.resolve(value.clone());
        }
        true
    }

    /// True once [`Once::call`] has run.
    #[must_use]
    pub fn is_called(&self) -> bool {
        self.state.value.borrow().is_some()
    }

    /// The value passed to the first call, if any.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.state.value()
    }

    /// Number of operations currently waiting.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.waiting.borrow().len()
    }

    /// Waits for the first call.
    ///
    /// Returns at once when the callback was already called. Otherwise waits
    /// in an action; tearing the waiter down removes it from the callback.
    pub fn wait(&self, cx: &Cx) -> impl StdFuture<Output = Result<T>> {
        let early = Rc::clone(&self.state);
        let state = Rc::clone(&self.state);
        let pending = cx.action(move |cx, resolve, _reject| async move {
            if let Some(value) = state.value() {
                resolve.resolve(value);
                return Ok(());
            }
            let waiter = state.add(resolve);
            let _ = cx.suspend().await;
            state.remove(waiter);
            Ok(())
        });
        async move {
            if let Some(value) = early.value() {
                return Ok(value);
            }
            pending.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::test_utils::{init_test_logging, test_runtime};
    use crate::Time;

    #[test]
    fn waiter_receives_first_call() {
        init_test_logging();
        let runtime = test_runtime();
        let once = callback::<u32>();
        let trigger = once.clone();
        runtime
            .handle()
            .set_timeout(Duration::from_millis(20), move || {
                assert!(trigger.call(5));
                assert!(!trigger.call(6));
            });
        let waiter = once.clone();
        let task = runtime.run(move |cx| async move { waiter.wait(&cx).await });
        assert_eq!(runtime.block_on(&task).expect("called"), 5);
        assert_eq!(runtime.now(), Time::from_millis(20));
        assert_eq!(once.value(), Some(5));
        assert_eq!(once.waiting(), 0);
    }

    #[test]
    fn wait_after_call_returns_immediately() {
        init_test_logging();
        let runtime = test_runtime();
        let once = callback::<&'static str>();
        assert!(once.call("done"));
        let task = runtime.run(move |cx| async move {
            let first = once.wait(&cx).await?;
            let second = once.wait(&cx).await?;
            Ok((first, second))
        });
        assert_eq!(runtime.block_on(&task).expect("called"), ("done", "done"));
        assert_eq!(runtime.now(), Time::ZERO);
    }

    #[test]
    fn halted_waiter_is_removed() {
        init_test_logging();
        let runtime = test_runtime();
        let once = callback::<u8>();
        let waiter = once.clone();
        let task = runtime.run(move |cx| async move { waiter.wait(&cx).await });
        let _ = runtime.block_on(&runtime.run(|cx| async move {
            crate::time::sleep(&cx, Duration::from_millis(1)).await
        }));
        assert_eq!(once.waiting(), 1);
        runtime.block_on(&task.halt()).expect("halted");
        assert_eq!(once.waiting(), 0);
        assert!(runtime.block_on(&task).expect_err("halted").is_halted());
        assert!(!once.is_called());
    }
}
