//! Synchronous multi-observer event stream.
//!
//! [`Observable::notify`] appends the event to the queue of every observer
//! registered at that moment and returns; it never waits. Each [`Observer`]
//! keeps its own FIFO queue, so a slow observer never loses events and never
//! sees events from before it subscribed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

struct Queue<T> {
    events: VecDeque<T>,
    waker: Option<Waker>,
    detached: bool,
}

type SharedQueue<T> = Rc<RefCell<Queue<T>>>;

struct Registry<T> {
    next_id: u64,
    observers: Vec<(u64, SharedQueue<T>)>,
}

/// The publishing side.
pub struct Observable<T> {
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl<T> Observable<T> {
    /// Creates an observable with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Registers a new observer. It receives events notified from now on.
    #[must_use]
    pub fn observe(&self) -> Observer<T> {
        let queue = Rc::new(RefCell::new(Queue {
            events: VecDeque::new(),
            waker: None,
            detached: false,
        }));
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.observers.push((id, Rc::clone(&queue)));
        Observer {
            id,
            queue,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.registry.borrow().observers.len()
    }
}

impl<T: Clone> Observable<T> {
    /// Delivers `event` to every currently attached observer.
    pub fn notify(&self, event: T) {
        let targets: Vec<SharedQueue<T>> = self
            .registry
            .borrow()
            .observers
            .iter()
            .map(|(_, queue)| Rc::clone(queue))
            .collect();
        for queue in targets {
            let waker = {
                let mut queue = queue.borrow_mut();
                queue.events.push_back(event.clone());
                queue.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }

    /// A future for the next event. The observer is registered right away,
    /// so events notified before the future is first polled are not missed.
    #[must_use]
    pub fn first(&self) -> First<T> {
        First {
            observer: Some(self.observe()),
        }
    }
}

/// A cursor into an [`Observable`].
///
/// Dropping the observer detaches it.
pub struct Observer<T> {
    id: u64,
    queue: SharedQueue<T>,
    registry: Weak<RefCell<Registry<T>>>,
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.borrow();
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("buffered", &queue.events.len())
            .field("detached", &queue.detached)
            .finish()
    }
}

impl<T> Observer<T> {
    /// Takes the next buffered event without waiting.
    pub fn try_next(&self) -> Option<T> {
        self.queue.borrow_mut().events.pop_front()
    }

    /// A future for the next event.
    ///
    /// Resolves to `None` once the observer is detached and its buffer is
    /// empty.
    #[must_use]
    pub fn next(&self) -> NextEvent<T> {
        NextEvent {
            queue: Rc::clone(&self.queue),
        }
    }

    /// Number of events waiting in this observer's queue.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.queue.borrow().events.len()
    }

    /// True once [`Observer::detach`] has run.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.queue.borrow().detached
    }

    /// Stops receiving events. Already buffered events stay readable.
    pub fn detach(&self) {
        let waker = {
            let mut queue = self.queue.borrow_mut();
            if queue.detached {
                return;
            }
            queue.detached = true;
            queue.waker.take()
        };
        if let Some(registry) = self.registry.upgrade() {
            registry
                .borrow_mut()
                .observers
                .retain(|(id, _)| *id != self.id);
        }
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Detaches and discards the observer.
    #[allow(clippy::should_implement_trait)]
    pub fn drop(self) {
        self.detach();
    }
}

impl<T> Drop for Observer<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Future returned by [`Observer::next`].
pub struct NextEvent<T> {
    queue: SharedQueue<T>,
}

impl<T> std::future::Future for NextEvent<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut queue = self.queue.borrow_mut();
        if let Some(event) = queue.events.pop_front() {
            return Poll::Ready(Some(event));
        }
        if queue.detached {
            return Poll::Ready(None);
        }
        queue.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Future returned by [`Observable::first`].
pub struct First<T> {
    observer: Option<Observer<T>>,
}

impl<T> std::future::Future for First<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let Some(observer) = self.observer.as_ref() else {
            return Poll::Ready(None);
        };
        let mut next = observer.next();
        match Pin::new(&mut next).poll(cx) {
            Poll::Ready(event) => {
                self.observer = None;
                Poll::Ready(event)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
