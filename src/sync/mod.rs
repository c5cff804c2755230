//! Single-threaded synchronization primitives the runtime is built from.
//!
//! - [`Future`]: a settle-once result cell, awaitable and observable
//! - [`Observable`]: synchronous fan-out of events to buffered observers

pub mod future;
pub mod observable;

pub use future::{create_future, Future, NewFuture, Settle};
pub use observable::{First, NextEvent, Observable, Observer};
