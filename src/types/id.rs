//! Identifiers for frames, blocks, and executor jobs, plus the runtime clock
//! value [`Time`].

use crate::util::ArenaIndex;
use core::fmt;
use std::ops::Add;
use std::time::Duration;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) ArenaIndex);

        impl $name {
            #[must_use]
            pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
                Self(index)
            }

            #[must_use]
            pub(crate) const fn arena_index(self) -> ArenaIndex {
                self.0
            }

            /// Builds an id from raw parts, for tests.
            #[doc(hidden)]
            #[must_use]
            pub const fn new_for_test(slot: u32, generation: u32) -> Self {
                Self(ArenaIndex::new(slot, generation))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "({}:{})"),
                    self.0.slot(),
                    self.0.generation()
                )
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0.slot())
            }
        }
    };
}

arena_id!(
    /// Identifies a frame: a node in the tree of lifetimes.
    FrameId,
    "F"
);

arena_id!(
    /// Identifies a block: one operation executing inside a frame.
    BlockId,
    "B"
);

arena_id!(
    /// Identifies an executor job.
    JobId,
    "J"
);

/// A point on the runtime clock, in nanoseconds since the runtime started.
///
/// Under the virtual clock the value only moves when the executor is idle
/// and a timer is due.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(u64);

impl Time {
    /// The clock origin.
    pub const ZERO: Self = Self(0);

    /// Creates a time from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Nanoseconds since the origin.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Whole milliseconds since the origin.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}
