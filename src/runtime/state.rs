//! Arena-backed bookkeeping for frames and blocks.
//!
//! All methods take short borrows and never call out to user code or settle
//! futures while the state is borrowed; callers collect what they need and
//! act after the borrow ends.

use std::any::Any;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::record::{BlockRecord, BlockState, FrameRecord, FrameState};
use crate::sync::{Future, Settle};
use crate::types::{BlockId, FrameId};
use crate::util::Arena;

/// Frame and block records.
#[derive(Debug, Default)]
pub struct RuntimeState {
    pub(crate) frames: Arena<FrameRecord>,
    pub(crate) blocks: Arena<BlockRecord>,
}

impl RuntimeState {
    /// Inserts a frame record, attaching it to `parent` if given.
    pub(crate) fn insert_frame(&mut self, parent: Option<FrameId>) -> Result<(FrameId, Future<()>)> {
        if let Some(parent) = parent {
            if !self.frames.contains(parent.arena_index()) {
                return Err(Error::frame_closed(parent));
            }
        }
        let index = self
            .frames
            .insert_with(|index| FrameRecord::new(FrameId::from_arena(index), parent));
        let id = FrameId::from_arena(index);
        if let Some(parent) = parent.and_then(|p| self.frames.get_mut(p.arena_index())) {
            parent.add_child(id);
        }
        let terminal = self
            .frames
            .get(index)
            .map(|record| record.terminal.clone())
            .ok_or_else(|| Error::internal("frame record vanished after insert"))?;
        Ok((id, terminal))
    }

    /// State of a frame; a missing record means destroyed.
    pub(crate) fn frame_state(&self, id: FrameId) -> FrameState {
        self.frames
            .get(id.arena_index())
            .map_or(FrameState::Destroyed, |record| record.state)
    }

    pub(crate) fn frame_parent(&self, id: FrameId) -> Option<FrameId> {
        self.frames.get(id.arena_index()).and_then(|record| record.parent)
    }

    /// Moves a frame into teardown. False if it already started or the frame is gone.
    pub(crate) fn begin_teardown(&mut self, id: FrameId) -> bool {
        self.frames
            .get_mut(id.arena_index())
            .is_some_and(FrameRecord::begin_teardown)
    }

    /// Registers a block in an open frame.
    pub(crate) fn register_block(
        &mut self,
        frame: FrameId,
        interrupt: Settle<()>,
        drained: Future<()>,
    ) -> Result<BlockId> {
        if !self.frame_state(frame).is_open() {
            return Err(Error::frame_closed(frame));
        }
        let index = self.blocks.insert_with(|index| {
            BlockRecord::new(BlockId::from_arena(index), frame, interrupt, drained)
        });
        let id = BlockId::from_arena(index);
        if let Some(record) = self.frames.get_mut(frame.arena_index()) {
            record.add_block(id);
        }
        Ok(id)
    }

    /// Removes an exhausted block from the arena and from its frame.
    pub(crate) fn retire_block(&mut self, id: BlockId) {
        if let Some(record) = self.blocks.remove(id.arena_index()) {
            if let Some(frame) = self.frames.get_mut(record.frame.arena_index()) {
                frame.remove_block(id);
            }
        }
    }

    pub(crate) fn block_state(&self, id: BlockId) -> BlockState {
        self.blocks
            .get(id.arena_index())
            .map_or(BlockState::Exhausted, |record| record.state)
    }

    pub(crate) fn set_block_state(&mut self, id: BlockId, state: BlockState) {
        if let Some(record) = self.blocks.get_mut(id.arena_index()) {
            record.state = state;
        }
    }

    /// Abort triggers and drain results of a frame's blocks, in registration order.
    pub(crate) fn abort_handles(&self, frame: FrameId) -> Vec<(Settle<()>, Future<()>)> {
        let Some(record) = self.frames.get(frame.arena_index()) else {
            return Vec::new();
        };
        record
            .running
            .iter()
            .filter_map(|id| self.blocks.get(id.arena_index()))
            .map(|block| (block.interrupt.clone(), block.drained.clone()))
            .collect()
    }

    /// Child frame ids with their terminal futures, in creation order.
    pub(crate) fn children(&self, frame: FrameId) -> Vec<(FrameId, Future<()>)> {
        let Some(record) = self.frames.get(frame.arena_index()) else {
            return Vec::new();
        };
        record
            .children
            .iter()
            .filter_map(|id| self.frames.get(id.arena_index()))
            .map(|child| (child.id, child.terminal.clone()))
            .collect()
    }

    pub(crate) fn running(&self, frame: FrameId) -> Vec<BlockId> {
        self.frames
            .get(frame.arena_index())
            .map(|record| record.running.to_vec())
            .unwrap_or_default()
    }

    /// Removes a torn-down frame and detaches it from its parent.
    ///
    /// Returns the write side of its terminal future.
    pub(crate) fn finish_frame(&mut self, id: FrameId) -> Option<Settle<()>> {
        let record = self.frames.remove(id.arena_index())?;
        if let Some(parent) = record
            .parent
            .and_then(|parent| self.frames.get_mut(parent.arena_index()))
        {
            parent.remove_child(id);
        }
        Some(record.settle_terminal)
    }

    pub(crate) fn set_context(&mut self, frame: FrameId, name: &'static str, value: Rc<dyn Any>) -> Result<()> {
        let record = self
            .frames
            .get_mut(frame.arena_index())
            .ok_or_else(|| Error::frame_closed(frame))?;
        record.context.insert(name, value);
        Ok(())
    }

    /// Resolves a context value from `frame`, then its ancestors.
    pub(crate) fn lookup_context(&self, frame: FrameId, name: &str) -> Option<Rc<dyn Any>> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let record = self.frames.get(id.arena_index())?;
            if let Some(value) = record.context.get(name) {
                return Some(Rc::clone(value));
            }
            current = record.parent;
        }
        None
    }
}
