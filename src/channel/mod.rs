//! Broadcast channels.
//!
//! A [`channel`] is a pair of a [`Port`] (the write side) and a [`Stream`]
//! (the read side). Every item sent through the port is delivered, at the
//! moment of sending, to every subscriber that exists at that moment. There
//! is no replay: a subscriber attached later never sees earlier items.
//!
//! Subscriptions are resources. [`Stream::subscribe`] and
//! [`Stream::listen`] attach a subscriber for the lifetime of the calling
//! frame and remove it when that frame tears down.
//!
//! ```
//! use corral::channel::{channel, Next};
//! use corral::RuntimeBuilder;
//!
//! let runtime = RuntimeBuilder::virtual_time().build().unwrap();
//! let task = runtime.run(|cx| async move {
//!     let chan = channel::<&'static str, u32>();
//!     let subscription = chan.output.subscribe(&cx).await?;
//!     chan.input.send("hello")?;
//!     chan.input.close(7)?;
//!     let first = subscription.next(&cx).await?;
//!     let last = subscription.next(&cx).await?;
//!     Ok((first, last))
//! });
//! let (first, last) = runtime.block_on(&task).unwrap();
//! assert_eq!(first, Next::Item("hello"));
//! assert_eq!(last, Next::Done(7));
//! ```

pub mod broadcast;

pub use broadcast::{channel, Channel, Next, Port, Stream, Subscription};
