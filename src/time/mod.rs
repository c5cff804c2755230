//! Clocks, timers, and the `sleep` action.
//!
//! Time comes from the runtime's [`TimerDriver`]: either the wall clock or a
//! virtual clock that the executor advances straight to the next deadline
//! whenever nothing else can run. Operations wait with [`sleep`], an action
//! whose timer is cancelled if the sleeper is torn down first.

pub mod driver;
mod sleep;

pub use driver::{Clock, TimeSource, TimerDriver, TimerHandle, VirtualClock, WallClock};
pub use sleep::{sleep, sleep_until};
