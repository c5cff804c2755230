//! Block record.

use crate::sync::{Future, Settle};
use crate::types::{BlockId, FrameId, InstructionKind};

/// The state of a block in its lifecycle.
///
/// State machine:
/// ```text
/// Pending → Running ⇄ Suspended
///    │         │          │
///    │         └──────────┴─→ Draining → Exhausted
///    └───────────────────────────────────→ Exhausted (aborted before entry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Created, waiting to be entered.
    Pending,
    /// Polling its operation.
    Running,
    /// Waiting for an instruction handler to settle.
    Suspended(InstructionKind),
    /// Aborted; running the operation's cleanup without further interruption.
    Draining,
    /// Teardown finished.
    Exhausted,
}

/// Internal record for a block.
#[derive(Debug)]
pub struct BlockRecord {
    /// Identifier of this block.
    pub id: BlockId,
    /// The frame the block runs in.
    pub frame: FrameId,
    /// Current state.
    pub state: BlockState,
    /// Fired to abort the block.
    pub(crate) interrupt: Settle<()>,
    /// Settles with the drain result once the block is exhausted.
    pub(crate) drained: Future<()>,
}

impl BlockRecord {
    /// Creates a pending block record.
    pub(crate) fn new(
        id: BlockId,
        frame: FrameId,
        interrupt: Settle<()>,
        drained: Future<()>,
    ) -> Self {
        Self {
            id,
            frame,
            state: BlockState::Pending,
            interrupt,
            drained,
        }
    }
}
