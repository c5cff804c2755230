//! Core value types: identifiers, clock values, and block outcomes.

pub mod id;
pub mod outcome;

pub use id::{BlockId, FrameId, JobId, Time};
pub use outcome::{BlockEvent, Exhausted, Exit, InstructionKind};
