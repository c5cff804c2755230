//! The instruction vocabulary and its handlers.
//!
//! An operation talks to its block only by awaiting the futures returned from
//! [`Cx`](crate::cx::Cx) methods. Each such future is an [`Instruct`]: on its
//! first poll it parks an [`Instruction`] in the block's slot and returns
//! `Pending`. The block's drive loop notices the parked instruction, runs the
//! matching handler against its frame, and stores the handler's result in the
//! slot under the instruction's ticket. The next poll of the `Instruct` picks
//! that result up.
//!
//! One block handles one instruction at a time. A second instruction issued
//! while another is in flight resolves immediately with a
//! [`ProtocolViolation`](crate::ErrorKind::ProtocolViolation).

pub mod action;
pub mod resource;
pub mod spawn;
pub mod suspend;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future as StdFuture;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::combinator::{select, Either};
use crate::error::{Error, Result};
use crate::runtime::block::OperationFactory;
use crate::runtime::{Block, Frame};
use crate::sync::{Future, Observable, Settle};
use crate::types::{BlockEvent, Exhausted, Exit, InstructionKind};

pub use action::{Reject, Resolve};
pub use resource::Provide;

/// Type-erased handler result fed back into an operation.
pub(crate) type Feed = Result<Box<dyn Any>>;

pub(crate) type NestedBody = Box<dyn FnOnce(Rc<Settlement>) -> OperationFactory<()>>;
pub(crate) type SpawnBody = Box<dyn FnOnce(&Frame) -> Result<spawn::Spawned>>;

/// A request from an operation to its block.
pub(crate) enum Instruction {
    Suspend,
    Action(NestedBody),
    Resource(NestedBody),
    Spawn { body: SpawnBody, supervised: bool },
    GetFrame,
}

impl Instruction {
    pub(crate) const fn kind(&self) -> InstructionKind {
        match self {
            Self::Suspend => InstructionKind::Suspend,
            Self::Action(_) => InstructionKind::Action,
            Self::Resource(_) => InstructionKind::Resource,
            Self::Spawn {
                supervised: true, ..
            } => InstructionKind::Spawn,
            Self::Spawn {
                supervised: false, ..
            } => InstructionKind::Go,
            Self::GetFrame => InstructionKind::GetFrame,
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction::{:?}", self.kind())
    }
}

/// Runs the handler for `instruction` on behalf of a block in `frame`.
pub(crate) async fn dispatch(
    instruction: Instruction,
    frame: &Frame,
    events: &Observable<BlockEvent>,
    interrupt: Interrupt,
) -> Feed {
    match instruction {
        Instruction::Suspend => suspend::handle(events, interrupt).await,
        Instruction::Action(body) => action::handle(frame, body, events, interrupt).await,
        Instruction::Resource(body) => resource::handle(frame, body, events, interrupt).await,
        Instruction::Spawn { body, supervised } => spawn::handle(frame, body, supervised),
        Instruction::GetFrame => Ok(Box::new(frame.clone())),
    }
}

/// The per-block mailbox between an operation and its drive loop.
#[derive(Debug, Default)]
pub(crate) struct InstructionSlot {
    next_ticket: u64,
    polling: bool,
    submitted: Option<(u64, Instruction)>,
    in_flight: Option<u64>,
    abandoned: Option<u64>,
    fed: Option<(u64, Feed)>,
}

pub(crate) type SharedSlot = Rc<RefCell<InstructionSlot>>;

impl InstructionSlot {
    pub(crate) fn shared() -> SharedSlot {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Marks whether the block is currently polling its operation.
    pub(crate) fn set_polling(&mut self, polling: bool) {
        self.polling = polling;
    }

    fn submit(&mut self, instruction: Instruction) -> Option<u64> {
        if self.submitted.is_some() || self.in_flight.is_some() {
            return None;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.submitted = Some((ticket, instruction));
        Some(ticket)
    }

    /// Takes the parked instruction for dispatch.
    pub(crate) fn take_submitted(&mut self) -> Option<(u64, Instruction)> {
        let (ticket, instruction) = self.submitted.take()?;
        self.in_flight = Some(ticket);
        Some((ticket, instruction))
    }

    /// Stores the handler result for `ticket`.
    pub(crate) fn feed(&mut self, ticket: u64, result: Feed) {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        self.fed = Some((ticket, result));
    }

    fn collect(&mut self, ticket: u64) -> Option<Feed> {
        match self.fed.take() {
            Some((fed, result)) if fed == ticket => Some(result),
            other => {
                self.fed = other;
                None
            }
        }
    }

    /// True once the instruction future holding `ticket` was dropped while
    /// its handler was still running.
    pub(crate) fn is_abandoned(&self, ticket: u64) -> bool {
        self.abandoned == Some(ticket)
    }

    fn withdraw(&mut self, ticket: u64) {
        if matches!(&self.submitted, Some((t, _)) if *t == ticket) {
            self.submitted = None;
        }
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
            self.abandoned = Some(ticket);
        }
        if matches!(&self.fed, Some((t, _)) if *t == ticket) {
            self.fed = None;
        }
    }
}

/// Future returned by every [`Cx`](crate::cx::Cx) instruction method.
#[must_use = "instructions do nothing unless awaited"]
pub struct Instruct<T> {
    slot: SharedSlot,
    instruction: Option<Instruction>,
    ticket: Option<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Instruct<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruct")
            .field("instruction", &self.instruction)
            .field("ticket", &self.ticket)
            .finish()
    }
}

impl<T> Instruct<T> {
    pub(crate) fn new(slot: SharedSlot, instruction: Instruction) -> Self {
        Self {
            slot,
            instruction: Some(instruction),
            ticket: None,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> StdFuture for Instruct<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<T>> {
        let this = &mut *self;
        if let Some(ticket) = this.ticket {
            let fed = this.slot.borrow_mut().collect(ticket);
            return match fed {
                Some(result) => {
                    this.ticket = None;
                    Poll::Ready(downcast(result))
                }
                None => Poll::Pending,
            };
        }
        let Some(instruction) = this.instruction.take() else {
            return Poll::Ready(Err(Error::protocol("instruction polled after completion")));
        };
        let mut slot = this.slot.borrow_mut();
        if !slot.polling {
            return Poll::Ready(Err(Error::protocol(
                "instruction awaited outside the block that issued it",
            )));
        }
        match slot.submit(instruction) {
            Some(ticket) => {
                this.ticket = Some(ticket);
                Poll::Pending
            }
            None => Poll::Ready(Err(Error::protocol(
                "another instruction is already in flight in this block",
            ))),
        }
    }
}

impl<T> Drop for Instruct<T> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket {
            if let Ok(mut slot) = self.slot.try_borrow_mut() {
                slot.withdraw(ticket);
            }
        }
    }
}

fn downcast<T: 'static>(result: Feed) -> Result<T> {
    result.and_then(|value| {
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| Error::internal("instruction produced a value of an unexpected type"))
    })
}

/// The abort signal as a handler sees it.
///
/// Fires when the block is aborted or when the operation drops the
/// instruction future the handler is working for. Handlers running during a
/// drain only see the second.
#[derive(Debug)]
pub(crate) struct Interrupt {
    signal: Option<Future<()>>,
    abandoned: Future<()>,
}

impl Interrupt {
    pub(crate) fn new(signal: Option<Future<()>>, abandoned: Future<()>) -> Self {
        Self { signal, abandoned }
    }
}

impl StdFuture for Interrupt {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        if let Some(signal) = this.signal.as_mut() {
            if Pin::new(signal).poll(cx).is_ready() {
                return Poll::Ready(());
            }
        }
        Pin::new(&mut this.abandoned).poll(cx).map(|_| ())
    }
}

/// First-settle-wins guard shared by a nested body and its handler.
pub(crate) struct Settlement {
    value: RefCell<Option<Feed>>,
    closed: Cell<bool>,
    signal: Future<()>,
    notify: Settle<()>,
}

impl Settlement {
    pub(crate) fn new() -> Rc<Self> {
        let (signal, notify) = Future::create();
        Rc::new(Self {
            value: RefCell::new(None),
            closed: Cell::new(false),
            signal,
            notify,
        })
    }

    /// Records `result` unless the settlement is already closed.
    pub(crate) fn settle(&self, result: Feed) -> bool {
        if self.closed.replace(true) {
            return false;
        }
        *self.value.borrow_mut() = Some(result);
        self.notify.resolve(());
        true
    }

    /// Closes the settlement without a value.
    ///
    /// Returns true if nothing had settled it yet.
    pub(crate) fn close(&self) -> bool {
        !self.closed.replace(true)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn take(&self) -> Feed {
        self.value
            .borrow_mut()
            .take()
            .unwrap_or_else(|| Err(Error::internal("settlement value already taken")))
    }
}

/// What ended the wait for a nested body.
pub(crate) enum Race {
    Settled(Feed),
    Exhausted(Exhausted),
    Interrupted,
}

/// Waits for the first of: the body settling, the body's block exhausting,
/// or the outer block being interrupted.
pub(crate) async fn race(settlement: &Settlement, block: &Block<()>, interrupt: Interrupt) -> Race {
    let outcome = select(
        select(settlement.signal.clone(), block.exhausted()),
        interrupt,
    )
    .await;
    match outcome {
        Either::Left(Either::Left(_)) => Race::Settled(settlement.take()),
        Either::Left(Either::Right(exhausted)) => {
            if settlement.close() {
                Race::Exhausted(exhausted.unwrap_or_else(|err| Exhausted::completed(Err(err))))
            } else {
                Race::Settled(settlement.take())
            }
        }
        Either::Right(()) => {
            settlement.close();
            Race::Interrupted
        }
    }
}

/// The result of a body that exhausted without settling.
pub(crate) fn unsettled(exhausted: Exhausted, violation: &str) -> Feed {
    if let Err(err) = exhausted.result {
        return Err(err);
    }
    match exhausted.exit {
        Exit::Completed(Err(err)) => Err(err),
        Exit::Completed(Ok(())) => Err(Error::protocol(violation)),
        Exit::Terminated => Err(Error::halted()),
    }
}

/// A teardown failure supersedes the outcome it follows.
pub(crate) fn after_teardown(teardown: Result<()>, outcome: Feed) -> Feed {
    match teardown {
        Err(err) => Err(err),
        Ok(()) => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_rejects_second_submission() {
        let mut slot = InstructionSlot::default();
        let first = slot.submit(Instruction::Suspend);
        assert_eq!(first, Some(0));
        assert_eq!(slot.submit(Instruction::GetFrame), None);
        let (ticket, instruction) = slot.take_submitted().expect("submitted");
        assert_eq!(instruction.kind(), InstructionKind::Suspend);
        assert_eq!(slot.submit(Instruction::GetFrame), None);
        slot.feed(ticket, Ok(Box::new(())));
        assert_eq!(slot.submit(Instruction::GetFrame), Some(1));
    }

    #[test]
    fn feed_is_collected_only_by_its_ticket() {
        let mut slot = InstructionSlot::default();
        let ticket = slot.submit(Instruction::Suspend).expect("ticket");
        slot.take_submitted();
        slot.feed(ticket, Ok(Box::new(5_u8)));
        assert!(slot.collect(ticket + 1).is_none());
        let value = slot.collect(ticket).expect("fed").expect("ok");
        assert_eq!(value.downcast_ref::<u8>(), Some(&5));
    }

    #[test]
    fn settlement_first_wins() {
        let settlement = Settlement::new();
        assert!(settlement.settle(Ok(Box::new(1_u32))));
        assert!(!settlement.settle(Ok(Box::new(2_u32))));
        assert!(!settlement.close());
        let value = downcast::<u32>(settlement.take()).expect("value");
        assert_eq!(value, 1);
    }

    #[test]
    fn closed_settlement_ignores_values() {
        let settlement = Settlement::new();
        assert!(settlement.close());
        assert!(settlement.is_closed());
        assert!(!settlement.settle(Ok(Box::new(()))));
        assert!(!settlement.signal.is_settled());
    }

    #[test]
    fn unsettled_reports_cause() {
        let violation = unsettled(Exhausted::completed(Ok(())), "never settled");
        assert_eq!(
            violation.err().map(|e| e.kind()),
            Some(crate::ErrorKind::ProtocolViolation)
        );
        let failed = unsettled(Exhausted::completed(Err(Error::user("moo"))), "x");
        assert_eq!(failed.err().and_then(|e| e.message().map(String::from)), Some("moo".into()));
        let drain = unsettled(Exhausted::terminated(Err(Error::user("drain"))), "x");
        assert_eq!(drain.err().and_then(|e| e.message().map(String::from)), Some("drain".into()));
        let halted = unsettled(Exhausted::terminated(Ok(())), "x");
        assert!(halted.err().is_some_and(|e| e.is_halted()));
    }

    #[test]
    fn downcast_mismatch_is_internal() {
        let err = downcast::<String>(Ok(Box::new(3_i32))).expect_err("mismatch");
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
    }
}
