//! `resource`: provide a value while keeping the providing body alive.
//!
//! The body runs in a child frame and hands its value out through
//! [`Provide::provide`], which then parks the body until its frame is torn
//! down. The child frame stays attached to the calling block's frame, so the
//! body's cleanup runs when that frame tears down. A body that fails after
//! providing has no caller left to report to and crashes the calling frame.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::{after_teardown, race, unsettled, Feed, Interrupt, NestedBody, Race, Settlement};
use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::runtime::block::launch;
use crate::runtime::Frame;
use crate::sync::{Future, Observable};
use crate::tracing_compat::{debug, warn};
use crate::types::{BlockEvent, Exhausted, Exit};

const NEVER_PROVIDED: &str = "resource exited without ever providing anything";

/// Hands a resource's value to the operation that acquired it.
pub struct Provide<T> {
    settlement: Rc<Settlement>,
    cx: Cx,
    _marker: PhantomData<fn(T)>,
}

impl<T> fmt::Debug for Provide<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provide")
            .field("provided", &self.settlement.is_closed())
            .finish()
    }
}

impl<T: 'static> Provide<T> {
    pub(crate) fn new(settlement: Rc<Settlement>, cx: Cx) -> Self {
        Self {
            settlement,
            cx,
            _marker: PhantomData,
        }
    }

    /// Delivers `value`, then parks until the resource is torn down.
    ///
    /// Returns the halted error once teardown starts; code after the await
    /// is the resource's cleanup.
    pub async fn provide(&self, value: T) -> Result<()> {
        self.settlement.settle(Ok(Box::new(value)));
        self.cx.suspend().await
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
    match race(&settlement, &block, interrupt).await {
        Race::Settled(Ok(value)) => {
            debug!(frame = %frame.id(), child = %child.id(), "resource provided");
            watch(frame.clone(), child, block.exhausted());
            Ok(value)
        }
        Race::Settled(Err(err)) => after_teardown(child.destroy().await, Err(err)),
        Race::Exhausted(exhausted) => {
            after_teardown(child.destroy().await, unsettled(exhausted, NEVER_PROVIDED))
        }
        Race::Interrupted => after_teardown(child.destroy().await, Err(Error::halted())),
    }
}

/// Crashes `parent` if the provided resource later fails.
fn watch(parent: Frame, child: Frame, exhausted: Future<Exhausted>) {
    let runtime = Rc::clone(parent.inner());
    runtime.spawn_job("resource-watch", async move {
        let failure = match exhausted.await {
            Ok(Exhausted { result: Err(err), .. })
            | Ok(Exhausted {
                exit: Exit::Completed(Err(err)),
                ..
            })
            | Err(err) => Some(err),
            Ok(_) => child.terminal().await.err(),
        };
        if let Some(err) = failure {
            warn!(frame = %parent.id(), child = %child.id(), error = %err, "resource failed after providing");
            let _ = parent.crash(err);
        }
    });
}
