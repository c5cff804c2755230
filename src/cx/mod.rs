//! The operation-facing API.
//!
//! Every operation receives a [`Cx`]: the handle through which it issues
//! instructions to the block driving it. A [`Scope`] wraps a frame for ad hoc
//! supervision of tasks, and a [`Context`] names a value inherited down the
//! frame tree. A [`Once`] lets plain callbacks wake waiting operations.

pub mod callback;
pub mod context;
pub mod cx;
pub mod scope;

pub use callback::{callback, Once};
pub use context::Context;
pub use cx::Cx;
pub use scope::Scope;

pub use crate::instruction::{Provide, Reject, Resolve};
