//! Single-assignment result cell.
//!
//! A [`Future`] is settled at most once through its [`Settle`] handle and can
//! be observed any number of times, either by awaiting it (it implements
//! [`std::future::Future`]) or by registering a callback with
//! [`Future::on_settle`]. Watchers run in registration order, after the
//! value is stored, so a watcher that reads the future sees the settled
//! result.

use std::cell::RefCell;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::{Error, Result};

type Callback<T> = Box<dyn FnOnce(Result<T>)>;

enum Watcher<T> {
    Callback(Callback<T>),
    Waker(Waker),
}

struct Cell<T> {
    result: Option<Result<T>>,
    watchers: Vec<Watcher<T>>,
}

/// A value that becomes available later, or a failure.
pub struct Future<T> {
    cell: Rc<RefCell<Cell<T>>>,
}

/// The write side of a [`Future`]. The first settlement wins.
pub struct Settle<T> {
    cell: Rc<RefCell<Cell<T>>>,
}

/// A fresh unsettled future together with its write side.
pub struct NewFuture<T> {
    /// The readable side.
    pub future: Future<T>,
    /// The write side.
    pub settle: Settle<T>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T> fmt::Debug for Settle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle").finish_non_exhaustive()
    }
}

/// Creates an unsettled future.
#[must_use]
pub fn create_future<T>() -> NewFuture<T> {
    let cell = Rc::new(RefCell::new(Cell {
        result: None,
        watchers: Vec::new(),
    }));
    NewFuture {
        future: Future {
            cell: Rc::clone(&cell),
        },
        settle: Settle { cell },
    }
}

impl<T> Future<T> {
    /// Creates an unsettled future and its write side.
    #[must_use]
    pub fn create() -> (Self, Settle<T>) {
        let NewFuture { future, settle } = create_future();
        (future, settle)
    }

    /// A future that is already resolved.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// A future that is already rejected.
    #[must_use]
    pub fn rejected(error: Error) -> Self {
        Self::settled(Err(error))
    }

    fn settled(result: Result<T>) -> Self {
        Self {
            cell: Rc::new(RefCell::new(Cell {
                result: Some(result),
                watchers: Vec::new(),
            })),
        }
    }

    /// True once a value or error has been stored.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.cell.borrow().result.is_some()
    }

    /// Returns true if both handles read the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> AsRef<Self> for Future<T> {
    fn as_ref(&self) -> &Self {
        self
    }
}

impl<T: Clone + 'static> Future<T> {
    /// Synchronously polls the cell.
    #[must_use]
    pub fn result(&self) -> Option<Result<T>> {
        self.cell.borrow().result.clone()
    }

    /// Runs `callback` once the future settles; immediately if it already has.
    pub fn on_settle(&self, callback: impl FnOnce(Result<T>) + 'static) {
        let settled = {
            let mut cell = self.cell.borrow_mut();
            match &cell.result {
                Some(result) => Some(result.clone()),
                None => {
                    cell.watchers.push(Watcher::Callback(Box::new(callback)));
                    return;
                }
            }
        };
        if let Some(result) = settled {
            callback(result);
        }
    }
}

impl<T: Clone + 'static> Settle<T> {
    /// Stores `result` unless the cell is already settled.
    ///
    /// Returns true if this call settled the cell.
    pub fn settle(&self, result: Result<T>) -> bool {
        let watchers = {
            let mut cell = self.cell.borrow_mut();
            if cell.result.is_some() {
                return false;
            }
            cell.result = Some(result.clone());
            std::mem::take(&mut cell.watchers)
        };
        for watcher in watchers {
            match watcher {
                Watcher::Callback(callback) => callback(result.clone()),
                Watcher::Waker(waker) => waker.wake(),
            }
        }
        true
    }

    /// Resolves with `value`.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects with `error`.
    pub fn reject(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    /// True once the cell has been settled by anyone.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.cell.borrow().result.is_some()
    }

    /// The readable side of this cell.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        Future {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: Clone> std::future::Future for Future<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut cell = self.cell.borrow_mut();
        if let Some(result) = &cell.result {
            return Poll::Ready(result.clone());
        }
        let waker = cx.waker();
        let known = cell.watchers.iter().any(|watcher| match watcher {
            Watcher::Waker(existing) => existing.will_wake(waker),
            Watcher::Callback(_) => false,
        });
        if !known {
            cell.watchers.push(Watcher::Waker(waker.clone()));
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::future::Future as _;
    use std::task::Wake;

    struct CountingWaker(std::sync::atomic::AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: std::sync::Arc<Self>) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn first_settlement_wins() {
        let (future, settle) = Future::create();
        assert!(settle.resolve(1));
        assert!(!settle.resolve(2));
        assert!(!settle.reject(Error::user("late")));
        assert_eq!(future.result().map(|r| r.ok()), Some(Some(1)));
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let (future, settle) = Future::<u8>::create();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            future.on_settle(move |_| seen.borrow_mut().push(tag));
        }
        settle.resolve(0);
        assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let future = Future::rejected(Error::user("boom"));
        let seen = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&seen);
        future.on_settle(move |r: Result<()>| *slot.borrow_mut() = Some(r.is_err()));
        assert_eq!(*seen.borrow(), Some(true));
    }

    #[test]
    fn poll_registers_waker_once_and_wakes_on_settle() {
        let counter = std::sync::Arc::new(CountingWaker(0.into()));
        let waker = Waker::from(std::sync::Arc::clone(&counter));
        let mut cx = Context::from_waker(&waker);
        let (mut future, settle) = Future::<u8>::create();
        assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        settle.resolve(7);
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        match Pin::new(&mut future).poll(&mut cx) {
            Poll::Ready(Ok(7)) => {}
            other => panic!("unexpected poll result: {other:?}"),
        }
    }
}
