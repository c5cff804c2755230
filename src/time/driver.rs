//! Clock sources and the timer queue.
//!
//! The runtime owns one [`TimerDriver`]. Timers are callbacks keyed by a
//! deadline; the executor fires every expired timer between job polls. With a
//! [`VirtualClock`] time never moves on its own: the executor jumps it to the
//! next deadline only when no job is runnable.

use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::Instant;

use crate::types::Time;

/// Something that can tell the current [`Time`].
pub trait TimeSource {
    /// Returns the current time.
    fn now(&self) -> Time;
}

/// Wall clock; its origin is the moment it was created.
#[derive(Debug)]
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    /// Creates a wall clock starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Time {
        let nanos = u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        Time::from_nanos(nanos)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<u64>,
}

impl VirtualClock {
    /// Creates a virtual clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward to `time`. Moving backwards is ignored.
    pub fn advance_to(&self, time: Time) {
        if time.as_nanos() > self.now.get() {
            self.now.set(time.as_nanos());
        }
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Time {
        Time::from_nanos(self.now.get())
    }
}

/// The clock a runtime runs on.
#[derive(Debug)]
pub enum Clock {
    /// Real time.
    Wall(WallClock),
    /// Deterministic time advanced by the executor.
    Virtual(VirtualClock),
}

impl Clock {
    /// True for the virtual clock.
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }
}

impl TimeSource for Clock {
    fn now(&self) -> Time {
        match self {
            Self::Wall(clock) => clock.now(),
            Self::Virtual(clock) => clock.now(),
        }
    }
}

/// Handle for cancelling a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

type TimerCallback = Box<dyn FnOnce()>;

/// Deadline-ordered timer queue.
///
/// Timers with the same deadline fire in registration order.
pub struct TimerDriver {
    clock: Clock,
    deadlines: BinaryHeap<Reverse<(Time, u64)>>,
    callbacks: HashMap<u64, TimerCallback>,
    next_id: u64,
}

impl fmt::Debug for TimerDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerDriver")
            .field("clock", &self.clock)
            .field("pending", &self.callbacks.len())
            .finish()
    }
}

impl TimerDriver {
    /// Creates an empty driver on `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            deadlines: BinaryHeap::new(),
            callbacks: HashMap::new(),
            next_id: 0,
        }
    }

    /// The current time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// The clock this driver reads.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Registers `callback` to run once `deadline` is reached.
    pub fn register(&mut self, deadline: Time, callback: impl FnOnce() + 'static) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.deadlines.push(Reverse((deadline, id)));
        self.callbacks.insert(id, Box::new(callback));
        TimerHandle(id)
    }

    /// Cancels a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.callbacks.remove(&handle.0).is_some()
    }

    /// The earliest deadline of a live timer.
    pub fn next_deadline(&mut self) -> Option<Time> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if self.callbacks.contains_key(&id) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Removes and returns the callbacks of every timer due at `now`.
    ///
    /// The caller runs them; the driver must not be borrowed while they run.
    pub fn take_expired(&mut self, now: Time) -> Vec<TimerCallback> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if let Some(callback) = self.callbacks.remove(&id) {
                due.push(callback);
            }
        }
        due
    }

    /// Moves a virtual clock to `time`. No-op for the wall clock.
    pub fn advance_to(&self, time: Time) {
        if let Clock::Virtual(clock) = &self.clock {
            clock.advance_to(time);
        }
    }

    /// Number of live timers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Drops every timer without running it.
    pub fn clear(&mut self) -> Vec<TimerCallback> {
        self.deadlines.clear();
        self.callbacks.drain().map(|(_, callback)| callback).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn virtual_driver() -> TimerDriver {
        TimerDriver::new(Clock::Virtual(VirtualClock::new()))
    }

    #[test]
    fn virtual_clock_only_moves_forward() {
        let clock = VirtualClock::new();
        clock.advance_to(Time::from_millis(5));
        clock.advance_to(Time::from_millis(2));
        assert_eq!(clock.now(), Time::from_millis(5));
    }

    #[test]
    fn expired_timers_fire_in_deadline_then_registration_order() {
        let mut driver = virtual_driver();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        for (tag, ms) in [("late", 10), ("first", 1), ("second", 1)] {
            let order = Rc::clone(&order);
            driver.register(Time::from_millis(ms), move || order.borrow_mut().push(tag));
        }
        assert_eq!(driver.next_deadline(), Some(Time::from_millis(1)));
        for callback in driver.take_expired(Time::from_millis(1)) {
            callback();
        }
        assert_eq!(*order.borrow(), vec!["first", "second"]);
        assert_eq!(driver.pending_count(), 1);
    }

    #[test]
    fn cancelled_timer_is_skipped() {
        let mut driver = virtual_driver();
        let handle = driver.register(Time::from_millis(1), || {});
        driver.register(Time::from_millis(3), || {});
        assert!(driver.cancel(handle));
        assert!(!driver.cancel(handle));
        assert_eq!(driver.next_deadline(), Some(Time::from_millis(3)));
        assert!(driver.take_expired(Time::from_millis(2)).is_empty());
    }

    #[test]
    fn wall_clock_advances() {
        let clock = WallClock::new();
        let before = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(clock.now() > before);
    }
}
