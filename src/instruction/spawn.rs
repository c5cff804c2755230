//! `spawn` and `go`: start a child operation beside the caller.
//!
//! Both create a child frame, start the operation in it, and hand back a
//! [`Task`](crate::runtime::Task) without waiting. A supervised spawn crashes
//! the calling frame when the child fails or its frame fails to tear down;
//! `go` never escalates.

use std::any::Any;

use super::{Feed, SpawnBody};
use crate::runtime::Frame;
use crate::sync::Future;
use crate::tracing_compat::{debug, warn};
use crate::types::{Exhausted, Exit};

/// What a spawn body produced: the typed task, erased, and the block's
/// exhaustion signal.
pub(crate) struct Spawned {
    pub(crate) task: Box<dyn Any>,
    pub(crate) exhausted: Future<Exhausted>,
}

pub(crate) fn handle(frame: &Frame, body: SpawnBody, supervised: bool) -> Feed {
    let child = frame.create_child()?;
    let Spawned { task, exhausted } = match body(&child) {
        Ok(spawned) => spawned,
        Err(err) => {
            let _ = child.destroy();
            return Err(err);
        }
    };
    debug!(frame = %frame.id(), child = %child.id(), supervised, "child spawned");
    let parent = frame.clone();
    let label = if supervised { "spawn-supervisor" } else { "go-reaper" };
    frame.inner().spawn_job(label, async move {
        let exhausted = exhausted.await;
        let destruction = child.destroy().await;
        if !supervised {
            return;
        }
        let failure = match (destruction, exhausted) {
            (Err(err), _)
            | (
                Ok(()),
                Ok(Exhausted {
                    exit: Exit::Completed(Err(err)),
                    ..
                }),
            ) => Some(err),
            _ => None,
        };
        if let Some(err) = failure {
            warn!(frame = %parent.id(), child = %child.id(), error = %err, "spawned child failed");
            let _ = parent.crash(err);
        }
    });
    Ok(task)
}
