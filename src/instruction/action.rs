//! `action`: run a body in a child frame until it settles.
//!
//! The body receives a [`Resolve`] and a [`Reject`]. Whichever happens first
//! decides the instruction's result: a settlement, the body's block
//! exhausting, or the calling block being aborted. The child frame is
//! destroyed before the result is delivered, and a failure of that teardown
//! replaces the result.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::{after_teardown, race, unsettled, Feed, Interrupt, NestedBody, Race, Settlement};
use crate::error::Error;
use crate::runtime::block::launch;
use crate::runtime::Frame;
use crate::sync::Observable;
use crate::tracing_compat::trace;
use crate::types::BlockEvent;

const NEVER_SETTLED: &str = "action body returned without calling resolve() or reject()";

/// Settles an action with a value.
pub struct Resolve<T> {
    settlement: Rc<Settlement>,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for Resolve<T> {
    fn clone(&self) -> Self {
        Self {
            settlement: Rc::clone(&self.settlement),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Resolve<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve")
            .field("settled", &self.settlement.is_closed())
            .finish()
    }
}

impl<T: 'static> Resolve<T> {
    pub(crate) fn new(settlement: Rc<Settlement>) -> Self {
        Self {
            settlement,
            _marker: PhantomData,
        }
    }

    /// Resolves the action. Ignored if it already settled.
    pub fn resolve(&self, value: T) {
        self.settlement.settle(Ok(Box::new(value)));
    }

    /// True once the action settled by any means.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settlement.is_closed()
    }
}

/// Settles an action with an error.
#[derive(Clone)]
pub struct Reject {
    settlement: Rc<Settlement>,
}

impl fmt::Debug for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject")
            .field("settled", &self.settlement.is_closed())
            .finish()
    }
}

impl Reject {
    pub(crate) fn new(settlement: Rc<Settlement>) -> Self {
        Self { settlement }
    }

    /// Rejects the action. Ignored if it already settled.
    pub fn reject(&self, error: Error) {
        self.settlement.settle(Err(error));
    }
}

pub(crate) async fn handle(
    frame: &Frame,
    body: NestedBody,
    events: &Observable<BlockEvent>,
    interrupt: Interrupt,
) -> Feed {
    let child = frame.create_child()?;
    events.notify(BlockEvent::YieldingTo(child.id()));
    let settlement = Settlement::new();
    let block = match launch::<()>(&child, body(Rc::clone(&settlement))) {
        Ok(block) => block,
        Err(err) => return after_teardown(child.destroy().await, Err(err)),
    };
    block.enter();
    let outcome = match race(&settlement, &block, interrupt).await {
        Race::Settled(result) => result,
        Race::Exhausted(exhausted) => unsettled(exhausted, NEVER_SETTLED),
        Race::Interrupted => Err(Error::halted()),
    };
    trace!(frame = %frame.id(), child = %child.id(), ok = outcome.is_ok(), "action settled");
    after_teardown(child.destroy().await, outcome)
}
