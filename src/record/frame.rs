//! Frame record.
//!
//! A frame owns the blocks running in it and its child frames. Teardown
//! happens once: the first crash or destroy moves the record to
//! [`FrameState::TearingDown`], and the record is removed from the arena when
//! teardown finishes.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::sync::{Future, Settle};
use crate::types::{BlockId, FrameId};

/// The state of a frame in its lifecycle.
///
/// State machine:
/// ```text
/// Open → TearingDown → Destroyed
/// ```
///
/// `Destroyed` is never stored: a destroyed frame has no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Accepting blocks and child frames.
    Open,
    /// Aborting blocks and destroying children.
    TearingDown,
    /// Teardown finished; the terminal future is settled.
    Destroyed,
}

impl FrameState {
    /// Returns true if the frame accepts new blocks and children.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns true once teardown has started.
    #[must_use]
    pub const fn is_closing(self) -> bool {
        matches!(self, Self::TearingDown | Self::Destroyed)
    }
}

/// Internal record for a frame.
pub struct FrameRecord {
    /// Identifier of this frame.
    pub id: FrameId,
    /// Enclosing frame (None for a root).
    pub parent: Option<FrameId>,
    /// Current state.
    pub state: FrameState,
    /// Blocks registered in this frame, in registration order.
    pub running: SmallVec<[BlockId; 4]>,
    /// Child frames, in creation order.
    pub children: SmallVec<[FrameId; 4]>,
    /// Context values set directly on this frame.
    pub context: HashMap<&'static str, Rc<dyn Any>>,
    /// Settles when teardown finishes.
    pub terminal: Future<()>,
    pub(crate) settle_terminal: Settle<()>,
}

impl std::fmt::Debug for FrameRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRecord")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("running", &self.running)
            .field("children", &self.children)
            .field("context_keys", &self.context.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FrameRecord {
    /// Creates an open frame record.
    #[must_use]
    pub fn new(id: FrameId, parent: Option<FrameId>) -> Self {
        let (terminal, settle_terminal) = Future::create();
        Self {
            id,
            parent,
            state: FrameState::Open,
            running: SmallVec::new(),
            children: SmallVec::new(),
            context: HashMap::new(),
            terminal,
            settle_terminal,
        }
    }

    /// Moves the frame into teardown.
    ///
    /// Returns false if teardown had already started.
    pub fn begin_teardown(&mut self) -> bool {
        if self.state.is_open() {
            self.state = FrameState::TearingDown;
            true
        } else {
            false
        }
    }

    /// Registers a child frame.
    pub fn add_child(&mut self, child: FrameId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Forgets a child frame.
    pub fn remove_child(&mut self, child: FrameId) {
        self.children.retain(|id| *id != child);
    }

    /// Registers a running block.
    pub fn add_block(&mut self, block: BlockId) {
        self.running.push(block);
    }

    /// Forgets an exhausted block.
    pub fn remove_block(&mut self, block: BlockId) {
        self.running.retain(|id| *id != block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u32) -> FrameId {
        FrameId::new_for_test(n, 0)
    }

    #[test]
    fn teardown_starts_once() {
        let mut record = FrameRecord::new(frame(0), None);
        assert!(record.state.is_open());
        assert!(record.begin_teardown());
        assert!(!record.begin_teardown());
        assert!(record.state.is_closing());
        assert!(!record.terminal.is_settled());
    }

    #[test]
    fn children_keep_creation_order() {
        let mut record = FrameRecord::new(frame(0), None);
        record.add_child(frame(2));
        record.add_child(frame(1));
        record.add_child(frame(2));
        record.add_child(frame(3));
        record.remove_child(frame(1));
        assert_eq!(record.children.as_slice(), &[frame(2), frame(3)]);
    }

    #[test]
    fn blocks_keep_registration_order() {
        let mut record = FrameRecord::new(frame(0), None);
        let a = BlockId::new_for_test(0, 0);
        let b = BlockId::new_for_test(1, 0);
        record.add_block(a);
        record.add_block(b);
        record.remove_block(a);
        assert_eq!(record.running.as_slice(), &[b]);
    }
}
