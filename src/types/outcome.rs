//! How a block ends.
//!
//! A block ends in one of two ways ([`Exit`]): its operation ran to the end
//! on its own, or it was aborted from outside. Independently of that, the
//! block may fail while tearing down. [`Exhausted`] pairs both facts and is
//! the final word on a block.

use crate::error::Result;
use crate::types::FrameId;

/// The primary outcome of a block.
#[derive(Debug, Clone)]
pub enum Exit {
    /// The operation finished on its own, successfully or not.
    Completed(Result<()>),
    /// The block was aborted before its operation finished.
    Terminated,
}

impl Exit {
    /// True for [`Exit::Completed`].
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// True for [`Exit::Terminated`].
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// The operation's own failure, if it completed with one.
    #[must_use]
    pub fn failure(&self) -> Option<&crate::Error> {
        match self {
            Self::Completed(Err(err)) => Some(err),
            _ => None,
        }
    }
}

/// Final state of a block, published once its teardown has finished.
#[derive(Debug, Clone)]
pub struct Exhausted {
    /// How the operation ended.
    pub exit: Exit,
    /// Whether the drain after the operation ended cleanly.
    ///
    /// For a block that completed on its own this is always `Ok`.
    pub result: Result<()>,
}

impl Exhausted {
    /// A block that finished with `result` and needed no drain.
    #[must_use]
    pub fn completed(result: Result<()>) -> Self {
        Self {
            exit: Exit::Completed(result),
            result: Ok(()),
        }
    }

    /// A block aborted from outside whose drain produced `result`.
    #[must_use]
    pub fn terminated(result: Result<()>) -> Self {
        Self {
            exit: Exit::Terminated,
            result,
        }
    }
}

/// The instruction vocabulary an operation may yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    /// Park until interrupted.
    Suspend,
    /// Run a body that settles the instruction through resolve/reject.
    Action,
    /// Run a body that provides a value and then stays alive.
    Resource,
    /// Start a supervised child operation.
    Spawn,
    /// Start an unsupervised child operation.
    Go,
    /// Read the frame the block runs in.
    GetFrame,
}

/// Lifecycle notifications published by a block.
#[derive(Debug, Clone)]
pub enum BlockEvent {
    /// The block was entered.
    Entered,
    /// The operation yielded an instruction.
    Dispatched(InstructionKind),
    /// The block parked on a suspend instruction.
    Suspended,
    /// The block handed control to a nested frame.
    YieldingTo(FrameId),
    /// The operation ended.
    Exited(Exit),
    /// Teardown finished.
    Exhausted(Exhausted),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn exit_predicates() {
        let ok = Exit::Completed(Ok(()));
        let failed = Exit::Completed(Err(Error::user("boom")));
        assert!(ok.is_completed());
        assert!(ok.failure().is_none());
        assert_eq!(failed.failure().and_then(Error::message), Some("boom"));
        assert!(Exit::Terminated.is_terminated());
    }

    #[test]
    fn completed_blocks_drain_cleanly() {
        let exhausted = Exhausted::completed(Err(Error::user("boom")));
        assert!(exhausted.result.is_ok());
        let exhausted = Exhausted::terminated(Err(Error::user("cleanup")));
        assert!(exhausted.exit.is_terminated());
        assert!(exhausted.result.is_err());
    }
}
