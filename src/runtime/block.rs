//! Block handles and the drive loop.
//!
//! A block is one operation running in a frame. Its drive loop is an
//! executor job with two phases:
//!
//! - **Running**, abortable. The operation is polled; whenever it parks an
//!   instruction, the matching handler runs with access to the abort signal.
//!   The operation is still polled while the handler runs, so it can race an
//!   instruction against other futures; dropping the instruction future
//!   interrupts its handler. An operation parked on a plain future when the
//!   abort arrives is dropped on the spot.
//! - **Draining**, not abortable. Entered when the abort lands while a
//!   handler is in flight: the handler's result is replaced by the halted
//!   error and the operation keeps running so its cleanup code executes.
//!   Handlers dispatched from here never see an abort signal, and a drain that
//!   ends with the halted error counts as clean.

use std::fmt;
use std::future::{poll_fn, Future as StdFuture};
use std::pin::{pin, Pin};
use std::rc::Rc;
use std::task::Poll;

use super::{Frame, RuntimeInner};
use crate::combinator::select;
use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::instruction::{dispatch, Instruction, InstructionSlot, Interrupt, SharedSlot};
use crate::record::BlockState;
use crate::sync::{Future, Observable, Observer, Settle};
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{BlockEvent, BlockId, Exhausted, Exit, FrameId};

pub(crate) type BoxOperation<T> = Pin<Box<dyn StdFuture<Output = Result<T>>>>;
pub(crate) type OperationFactory<T> = Box<dyn FnOnce(Cx) -> BoxOperation<T>>;

/// A handle to a block.
pub struct Block<T> {
    id: BlockId,
    frame: FrameId,
    inner: Rc<RuntimeInner>,
    entered: Settle<()>,
    interrupt: Settle<()>,
    drained: Future<()>,
    exhausted: Future<Exhausted>,
    output: Future<T>,
    events: Observable<BlockEvent>,
}

impl<T> Clone for Block<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            frame: self.frame,
            inner: Rc::clone(&self.inner),
            entered: self.entered.clone(),
            interrupt: self.interrupt.clone(),
            drained: self.drained.clone(),
            exhausted: self.exhausted.clone(),
            output: self.output.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T> fmt::Debug for Block<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("frame", &self.frame)
            .field("state", &self.inner.state.borrow().block_state(self.id))
            .finish()
    }
}

impl<T: Clone + 'static> Block<T> {
    /// This block's id.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// The frame the block runs in.
    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.frame
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BlockState {
        self.inner.state.borrow().block_state(self.id)
    }

    /// Starts the drive loop. Calling it again has no effect.
    pub fn enter(&self) {
        self.entered.resolve(());
    }

    /// Aborts the block and returns its drain result.
    ///
    /// The result is `Ok` unless cleanup failed; a block that had already
    /// completed reports `Ok` here whatever its own outcome was.
    pub fn abort(&self) -> Future<()> {
        self.interrupt.resolve(());
        self.drained.clone()
    }

    /// Settles once the block is exhausted.
    #[must_use]
    pub fn exhausted(&self) -> Future<Exhausted> {
        self.exhausted.clone()
    }

    /// The operation's own result; the halted error if the block was aborted.
    #[must_use]
    pub fn output(&self) -> Future<T> {
        self.output.clone()
    }

    /// Subscribes to lifecycle events from now on.
    #[must_use]
    pub fn observe(&self) -> Observer<BlockEvent> {
        self.events.observe()
    }
}

struct Signals<T> {
    id: BlockId,
    entered: Future<()>,
    interrupt: Future<()>,
    events: Observable<BlockEvent>,
    output: Settle<T>,
    exhausted: Settle<Exhausted>,
    drained: Settle<()>,
}

/// Registers a block in `frame` and starts its (not yet entered) drive job.
pub(crate) fn launch<T: Clone + 'static>(
    frame: &Frame,
    factory: OperationFactory<T>,
) -> Result<Block<T>> {
    let (entered_future, entered) = Future::create();
    let (interrupt_future, interrupt) = Future::create();
    let (drained, settle_drained) = Future::create();
    let (exhausted, settle_exhausted) = Future::create();
    let (output, settle_output) = Future::create();
    let events = Observable::new();
    let inner = Rc::clone(frame.inner());
    let id = inner
        .state
        .borrow_mut()
        .register_block(frame.id(), interrupt.clone(), drained.clone())?;
    trace!(block = %id, frame = %frame.id(), "block registered");
    let signals = Signals {
        id,
        entered: entered_future,
        interrupt: interrupt_future,
        events: events.clone(),
        output: settle_output,
        exhausted: settle_exhausted,
        drained: settle_drained,
    };
    inner.spawn_job("block", drive(frame.clone(), signals, factory));
    Ok(Block {
        id,
        frame: frame.id(),
        inner,
        entered,
        interrupt,
        drained,
        exhausted,
        output,
        events,
    })
}

enum Yielded<T> {
    Done(Result<T>),
    Instruction(u64, Instruction),
}

enum Halt<T> {
    Returned(Result<T>),
    Dropped,
    Draining,
}

fn poll_operation<T>(
    slot: &SharedSlot,
    operation: &mut BoxOperation<T>,
    task: &mut std::task::Context<'_>,
) -> Poll<Yielded<T>> {
    slot.borrow_mut().set_polling(true);
    let polled = operation.as_mut().poll(task);
    let mut slot = slot.borrow_mut();
    slot.set_polling(false);
    match polled {
        Poll::Ready(result) => Poll::Ready(Yielded::Done(result)),
        Poll::Pending => match slot.take_submitted() {
            Some((ticket, instruction)) => Poll::Ready(Yielded::Instruction(ticket, instruction)),
            None => Poll::Pending,
        },
    }
}

async fn drive<T: Clone + 'static>(frame: Frame, signals: Signals<T>, factory: OperationFactory<T>) {
    let Signals {
        id,
        entered,
        interrupt,
        events,
        output,
        exhausted,
        drained,
    } = signals;

    let started = select(entered, interrupt.clone()).await.is_left();
    let outcome = if started {
        run(&frame, id, &interrupt, &events, &output, factory).await
    } else {
        output.reject(Error::halted());
        events.notify(BlockEvent::Exited(Exit::Terminated));
        Exhausted::terminated(Ok(()))
    };

    frame.inner().state.borrow_mut().retire_block(id);
    debug!(
        block = %id,
        frame = %frame.id(),
        terminated = outcome.exit.is_terminated(),
        drained_ok = outcome.result.is_ok(),
        "block exhausted"
    );
    events.notify(BlockEvent::Exhausted(outcome.clone()));
    drained.settle(outcome.result.clone());
    exhausted.resolve(outcome);
}

async fn run<T: Clone + 'static>(
    frame: &Frame,
    id: BlockId,
    interrupt: &Future<()>,
    events: &Observable<BlockEvent>,
    output: &Settle<T>,
    factory: OperationFactory<T>,
) -> Exhausted {
    let inner = frame.inner();
    inner.state.borrow_mut().set_block_state(id, BlockState::Running);
    events.notify(BlockEvent::Entered);
    trace!(block = %id, "block entered");

    let slot = InstructionSlot::shared();
    let mut operation = factory(Cx::new(frame.id(), id, Rc::clone(&slot)));

    let mut carried = None;
    let halt = loop {
        let step = match carried.take() {
            Some(yielded) => Some(yielded),
            None => {
                let mut interrupt_wait = interrupt.clone();
                poll_fn(|task| {
                    if interrupt.is_settled() {
                        return Poll::Ready(None);
                    }
                    match poll_operation(&slot, &mut operation, task) {
                        Poll::Ready(yielded) => Poll::Ready(Some(yielded)),
                        Poll::Pending => {
                            if Pin::new(&mut interrupt_wait).poll(task).is_ready() {
                                task.waker().wake_by_ref();
                            }
                            Poll::Pending
                        }
                    }
                })
                .await
            }
        };

        match step {
            None => break Halt::Dropped,
            Some(Yielded::Done(result)) => break Halt::Returned(result),
            Some(Yielded::Instruction(ticket, instruction)) => {
                let kind = instruction.kind();
                inner
                    .state
                    .borrow_mut()
                    .set_block_state(id, BlockState::Suspended(kind));
                events.notify(BlockEvent::Dispatched(kind));
                trace!(block = %id, kind = ?kind, "instruction dispatched");
                let handled = in_flight(
                    frame,
                    &slot,
                    &mut operation,
                    events,
                    Some(interrupt),
                    ticket,
                    instruction,
                )
                .await;
                match handled {
                    InFlight::Aborted => break Halt::Draining,
                    InFlight::Fed => {}
                    InFlight::Abandoned(next) => carried = next,
                }
                inner.state.borrow_mut().set_block_state(id, BlockState::Running);
            }
        }
    };

    match halt {
        Halt::Returned(result) => {
            let exit = Exit::Completed(result.as_ref().map(|_| ()).map_err(Clone::clone));
            output.settle(result);
            events.notify(BlockEvent::Exited(exit.clone()));
            Exhausted {
                exit,
                result: Ok(()),
            }
        }
        Halt::Dropped => {
            drop(operation);
            debug!(block = %id, "aborted while parked outside an instruction");
            output.reject(Error::halted());
            events.notify(BlockEvent::Exited(Exit::Terminated));
            Exhausted::terminated(Ok(()))
        }
        Halt::Draining => {
            output.reject(Error::halted());
            events.notify(BlockEvent::Exited(Exit::Terminated));
            inner.state.borrow_mut().set_block_state(id, BlockState::Draining);
            trace!(block = %id, "block draining");
            let result = drain(frame, &slot, &mut operation, events).await;
            Exhausted::terminated(result)
        }
    }
}

async fn drain<T>(
    frame: &Frame,
    slot: &SharedSlot,
    operation: &mut BoxOperation<T>,
    events: &Observable<BlockEvent>,
) -> Result<()> {
    let mut carried = None;
    loop {
        let step = match carried.take() {
            Some(yielded) => yielded,
            None => poll_fn(|task| poll_operation(slot, operation, task)).await,
        };
        match step {
            Yielded::Done(Ok(_)) => return Ok(()),
            Yielded::Done(Err(err)) if err.is_halted() => return Ok(()),
            Yielded::Done(Err(err)) => {
                debug!(frame = %frame.id(), error = %err, "cleanup failed");
                return Err(err);
            }
            Yielded::Instruction(ticket, instruction) => {
                events.notify(BlockEvent::Dispatched(instruction.kind()));
                let handled = in_flight(frame, slot, operation, events, None, ticket, instruction).await;
                if let InFlight::Abandoned(next) = handled {
                    carried = next;
                }
            }
        }
    }
}

/// How a dispatched instruction ended.
enum InFlight<T> {
    /// The handler's result was fed to the waiting instruction future.
    Fed,
    /// The block was aborted while the handler ran; the halted error was fed.
    Aborted,
    /// The operation dropped the instruction future. Carries whatever the
    /// operation did instead, if it already did something.
    Abandoned(Option<Yielded<T>>),
}

/// Runs the handler for `ticket` while still polling the operation.
///
/// Futures the operation races against the instruction keep making progress.
/// Once the operation drops the instruction future, the handler is
/// interrupted and its result discarded; a failure nobody can observe any
/// more crashes the frame. `interrupt` is `None` while draining.
async fn in_flight<T>(
    frame: &Frame,
    slot: &SharedSlot,
    operation: &mut BoxOperation<T>,
    events: &Observable<BlockEvent>,
    interrupt: Option<&Future<()>>,
    ticket: u64,
    instruction: Instruction,
) -> InFlight<T> {
    let (abandoned, abandon) = Future::<()>::create();
    let handler = dispatch(
        instruction,
        frame,
        events,
        Interrupt::new(interrupt.cloned(), abandoned),
    );
    let mut handler = pin!(handler);
    let mut next = None;
    let result = poll_fn(|task| {
        if let Poll::Ready(result) = handler.as_mut().poll(task) {
            return Poll::Ready(result);
        }
        let aborted = interrupt.is_some_and(|signal| signal.is_settled());
        if aborted || abandon.is_settled() {
            return Poll::Pending;
        }
        match poll_operation(slot, operation, task) {
            Poll::Ready(yielded) => next = Some(yielded),
            Poll::Pending if slot.borrow().is_abandoned(ticket) => {}
            Poll::Pending => return Poll::Pending,
        }
        abandon.resolve(());
        task.waker().wake_by_ref();
        Poll::Pending
    })
    .await;

    if abandon.is_settled() {
        match result {
            Err(err) if !err.is_halted() => {
                warn!(frame = %frame.id(), error = %err, "abandoned instruction failed");
                let _ = frame.crash(err);
            }
            _ => {
                trace!(frame = %frame.id(), "abandoned instruction settled");
            }
        }
        return InFlight::Abandoned(next);
    }
    if interrupt.is_some_and(|signal| signal.is_settled()) {
        let forced = match result {
            Err(err) if !err.is_halted() => Err(err),
            _ => Err(Error::halted()),
        };
        slot.borrow_mut().feed(ticket, forced);
        return InFlight::Aborted;
    }
    slot.borrow_mut().feed(ticket, result);
    InFlight::Fed
}
