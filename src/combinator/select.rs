//! Biased two-way select.
//!
//! [`Select`] polls its first future before its second on every wakeup, so
//! when both are ready in the same turn the left one wins. Handlers rely on
//! that ordering: a settled value always beats the exhaustion of the body
//! that settled it.
//!
//! The losing future is dropped with the `Select`. Internally every raced
//! future is a clone of a settle-once cell, so dropping it only drops a waker
//! registration. A losing instruction future interrupts its handler when
//! dropped.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Which side of a [`Select`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<A, B> {
    /// The first future finished.
    Left(A),
    /// The second future finished.
    Right(B),
}

impl<A, B> Either<A, B> {
    /// Returns true for [`Either::Left`].
    pub const fn is_left(&self) -> bool {
        matches!(self, Self::Left(_))
    }

    /// Returns true for [`Either::Right`].
    pub const fn is_right(&self) -> bool {
        matches!(self, Self::Right(_))
    }
}

/// Future returned by [`select`].
#[derive(Debug)]
pub struct Select<A, B> {
    a: A,
    b: B,
}

impl<A, B> Select<A, B> {
    /// Races `a` against `b`, preferring `a`.
    pub const fn new(a: A, b: B) -> Self {
        Self { a, b }
    }
}

/// Races `a` against `b`, preferring `a`.
pub const fn select<A, B>(a: A, b: B) -> Select<A, B> {
    Select::new(a, b)
}

impl<A: Future + Unpin, B: Future + Unpin> Future for Select<A, B> {
    type Output = Either<A::Output, B::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Poll::Ready(value) = Pin::new(&mut this.a).poll(cx) {
            return Poll::Ready(Either::Left(value));
        }
        if let Poll::Ready(value) = Pin::new(&mut this.b).poll(cx) {
            return Poll::Ready(Either::Right(value));
        }
        Poll::Pending
    }
}
