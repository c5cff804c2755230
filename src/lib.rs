//! Corral: a structured-concurrency runtime built from frames and blocks.
//!
//! # Overview
//!
//! Every operation runs in a **frame**, one node of a tree of lifetimes, and
//! is stepped by a **block**, the driver that executes the operation one
//! instruction at a time. Work started from an operation lives in child
//! frames, so when a frame tears down everything beneath it is torn down
//! first: running blocks are aborted in registration order, then child
//! frames are destroyed newest first. Teardown failures always supersede the
//! outcome they follow.
//!
//! # Core Guarantees
//!
//! - **No orphans**: every spawned task, resource, and action body is owned by a frame
//! - **Cleanup runs**: an aborted operation resumes with the halted error and runs its cleanup code
//! - **Failures surface**: an unsupervised failure crashes the supervising frame; teardown errors win
//! - **First settlement wins**: futures, actions, and resources settle exactly once
//!
//! # Module Structure
//!
//! - [`types`]: Identifiers, time, and lifecycle outcomes
//! - [`record`]: Internal frame and block records
//! - [`runtime`]: The executor and the frame, block, and task handles
//! - [`instruction`]: The instruction vocabulary and its handlers
//! - [`cx`]: The operation-facing API (`Cx`, `Scope`, `Context`)
//! - [`sync`]: Settle-once futures and observables
//! - [`channel`]: Broadcast channels
//! - [`combinator`]: Biased select
//! - [`time`]: Clocks, timers, and `sleep`
//! - [`util`]: Generational arena
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```
//! use corral::{Error, RuntimeBuilder};
//!
//! let runtime = RuntimeBuilder::virtual_time().build().unwrap();
//! let task = runtime.run(|cx| async move {
//!     let doubled = cx
//!         .action(|_cx, resolve, _reject| async move {
//!             resolve.resolve(21 * 2);
//!             Ok(())
//!         })
//!         .await?;
//!     Ok::<_, Error>(doubled)
//! });
//! assert_eq!(runtime.block_on(&task).unwrap(), 42);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_inception)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod channel;
pub mod combinator;
pub mod cx;
pub mod error;
pub mod instruction;
pub mod record;
pub mod runtime;
pub mod sync;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use channel::{channel, Channel, Next, Port, Stream, Subscription};
pub use cx::{callback, Context, Cx, Once, Provide, Reject, Resolve, Scope};
pub use error::{Error, ErrorCategory, ErrorContext, ErrorKind, Result, ResultExt};
pub use instruction::Instruct;
pub use record::{BlockState, FrameState};
pub use runtime::{
    Block, ClockKind, ConfigError, Frame, Handle, Runtime, RuntimeBuilder, RuntimeConfig, Task,
};
pub use sync::{create_future, Future, NewFuture, Observable, Observer, Settle};
pub use types::{BlockEvent, BlockId, Exhausted, Exit, FrameId, InstructionKind, Time};
