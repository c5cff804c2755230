//! Internal records for frames and blocks.
//!
//! Records live in the runtime's arenas and are addressed by [`FrameId`] and
//! [`BlockId`](crate::types::BlockId). User-facing handles
//! ([`Frame`](crate::runtime::Frame), [`Block`](crate::runtime::Block)) look
//! records up on demand and treat a missing record as "destroyed".
//!
//! [`FrameId`]: crate::types::FrameId

pub mod block;
pub mod frame;

pub use block::{BlockRecord, BlockState};
pub use frame::{FrameRecord, FrameState};
