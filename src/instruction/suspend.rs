//! `suspend`: park until the block is aborted.

use super::{Feed, Interrupt};
use crate::sync::Observable;
use crate::types::BlockEvent;

pub(crate) async fn handle(events: &Observable<BlockEvent>, interrupt: Interrupt) -> Feed {
    events.notify(BlockEvent::Suspended);
    interrupt.await;
    Ok(Box::new(()))
}
