//! Future combinators used by instruction handlers.

pub mod select;

pub use select::{select, Either, Select};
