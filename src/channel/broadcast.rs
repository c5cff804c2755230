//! The broadcast channel implementation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::instruction::Instruct;
use crate::sync::{Observable, Observer};
use crate::tracing_compat::trace;

/// One item read from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next<T, C> {
    /// A value sent with [`Port::send`].
    Item(T),
    /// The terminal value passed to [`Port::close`].
    Done(C),
}

impl<T, C> Next<T, C> {
    /// True for [`Next::Done`].
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

type ListenerFn<T, C> = Rc<dyn Fn(&Next<T, C>) -> Result<()>>;

struct Shared<T, C> {
    subscribers: Observable<Next<T, C>>,
    listeners: RefCell<Vec<(u64, ListenerFn<T, C>)>>,
    next_listener: Cell<u64>,
    closed: Cell<bool>,
}

impl<T: Clone + 'static, C: Clone + 'static> Shared<T, C> {
    fn deliver(&self, item: &Next<T, C>) -> Result<()> {
        self.subscribers.notify(item.clone());
        let listeners: Vec<ListenerFn<T, C>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        let mut outcome = Ok(());
        for listener in listeners {
            if let Err(err) = listener(item) {
                trace!(error = %err, "channel listener failed");
                outcome = Err(err);
            }
        }
        outcome
    }

    fn add_listener(&self, listener: ListenerFn<T, C>) -> u64 {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: u64) {
        self.listeners.borrow_mut().retain(|(listener, _)| *listener != id);
    }
}

/// The write side of a channel.
pub struct Port<T, C = ()> {
    shared: Rc<Shared<T, C>>,
}

/// The read side of a channel.
pub struct Stream<T, C = ()> {
    shared: Rc<Shared<T, C>>,
}

/// Both ends of a new channel.
#[derive(Debug)]
pub struct Channel<T, C = ()> {
    /// Sends items.
    pub input: Port<T, C>,
    /// Attaches subscribers.
    pub output: Stream<T, C>,
}

/// Creates a channel carrying items of type `T` and closed with a `C`.
#[must_use]
pub fn channel<T: Clone + 'static, C: Clone + 'static>() -> Channel<T, C> {
    let shared = Rc::new(Shared {
        subscribers: Observable::new(),
        listeners: RefCell::new(Vec::new()),
        next_listener: Cell::new(0),
        closed: Cell::new(false),
    });
    Channel {
        input: Port {
            shared: Rc::clone(&shared),
        },
        output: Stream { shared },
    }
}

impl<T, C> Clone for Port<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T, C> Clone for Stream<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T, C> fmt::Debug for Port<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("closed", &self.shared.closed.get())
            .finish()
    }
}

impl<T, C> fmt::Debug for Stream<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("subscribers", &self.shared.subscribers.observer_count())
            .field("listeners", &self.shared.listeners.borrow().len())
            .finish()
    }
}

impl<T: Clone + 'static, C: Clone + 'static> Port<T, C> {
    /// Delivers `item` to every current subscriber.
    ///
    /// Delivery continues past failing listeners; the last listener error is
    /// returned. Fails with [`ChannelClosed`](crate::ErrorKind::ChannelClosed)
    /// after [`close`](Self::close), delivering nothing.
    pub fn send(&self, item: T) -> Result<()> {
        if self.shared.closed.get() {
            return Err(Error::channel_closed("send after close"));
        }
        self.shared.deliver(&Next::Item(item))
    }

    /// Delivers the terminal item to every current subscriber.
    ///
    /// Only the first close delivers anything; later calls fail with
    /// [`ChannelClosed`](crate::ErrorKind::ChannelClosed).
    pub fn close(&self, value: C) -> Result<()> {
        if self.shared.closed.replace(true) {
            return Err(Error::channel_closed("close after close"));
        }
        trace!("channel closed");
        self.shared.deliver(&Next::Done(value))
    }

    /// True once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.get()
    }
}

impl<T: Clone + 'static, C: Clone + 'static> Stream<T, C> {
    /// Attaches a buffered subscriber for the lifetime of the calling frame.
    ///
    /// Items sent after this resolves queue up in the subscription until
    /// read with [`Subscription::next`].
    pub fn subscribe(&self, cx: &Cx) -> Instruct<Subscription<T, C>> {
        let shared = Rc::clone(&self.shared);
        cx.resource(move |_cx, provide| async move {
            let observer = Rc::new(shared.subscribers.observe());
            let subscription = Subscription {
                observer: Rc::clone(&observer),
                terminal: Rc::new(RefCell::new(None)),
            };
            let parked = provide.provide(subscription).await;
            observer.detach();
            trace!("subscription removed");
            parked
        })
    }

    /// Calls `callback` synchronously for every item sent while the calling
    /// frame is alive.
    ///
    /// A callback error is reported to the sender; it does not detach the
    /// listener.
    pub fn listen<F>(&self, cx: &Cx, callback: F) -> Instruct<()>
    where
        F: Fn(&Next<T, C>) -> Result<()> + 'static,
    {
        let shared = Rc::clone(&self.shared);
        cx.resource(move |_cx, provide| async move {
            let id = shared.add_listener(Rc::new(callback));
            let parked = provide.provide(()).await;
            shared.remove_listener(id);
            parked
        })
    }

    /// Number of attached subscribers and listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.observer_count() + self.shared.listeners.borrow().len()
    }
}

/// A buffered subscriber handle.
pub struct Subscription<T, C = ()> {
    observer: Rc<Observer<Next<T, C>>>,
    terminal: Rc<RefCell<Option<C>>>,
}

impl<T, C> Clone for Subscription<T, C> {
    fn clone(&self) -> Self {
        Self {
            observer: Rc::clone(&self.observer),
            terminal: Rc::clone(&self.terminal),
        }
    }
}

impl<T, C> fmt::Debug for Subscription<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("buffered", &self.observer.buffered())
            .field("done", &self.terminal.borrow().is_some())
            .finish()
    }
}

impl<T: Clone + 'static, C: Clone + 'static> Subscription<T, C> {
    /// Reads the next item, waiting for one if none is buffered.
    ///
    /// Once the terminal item has been read, every further read returns it
    /// again. Fails with [`ChannelClosed`](crate::ErrorKind::ChannelClosed)
    /// if the subscription was removed before the channel closed.
    pub fn next(&self, cx: &Cx) -> Instruct<Next<T, C>> {
        let subscription = self.clone();
        cx.action(move |_cx, resolve, reject| async move {
            let cached = subscription.terminal.borrow().clone();
            if let Some(value) = cached {
                resolve.resolve(Next::Done(value));
                return Ok(());
            }
            match subscription.observer.next().await {
                Some(Next::Done(value)) => {
                    *subscription.terminal.borrow_mut() = Some(value.clone());
                    resolve.resolve(Next::Done(value));
                }
                Some(item) => resolve.resolve(item),
                None => reject.reject(Error::channel_closed("subscription removed")),
            }
            Ok(())
        })
    }

    /// Items waiting to be read.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.observer.buffered()
    }
}
