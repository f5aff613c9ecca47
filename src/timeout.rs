//! Deadlines, and bounded waits
//!
//! The driver never blocks. Anything that needs to wait for the host, like
//! draining a transmit ring, polls a condition against a [`Deadline`]. Time
//! comes from a user-supplied [`Clock`] that counts milliseconds and is
//! allowed to wrap.

use crate::Error;
use core::ops::ControlFlow;

/// A free-running millisecond counter.
///
/// Any `Fn() -> u32` is a clock, so a closure over a SysTick counter works.
pub trait Clock {
    /// Returns the current time, in milliseconds.
    fn now(&self) -> u32;
}

impl<F: Fn() -> u32> Clock for F {
    fn now(&self) -> u32 {
        self()
    }
}

/// A point in time, in clock ticks.
///
/// Comparisons tolerate one clock wrap. A deadline can't be more than
/// `i32::MAX` ticks in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Deadline(u32);

impl Deadline {
    /// A deadline `ticks` after `now`.
    pub const fn after(now: u32, ticks: u32) -> Self {
        Deadline(now.wrapping_add(ticks))
    }

    /// Indicates if `now` is at or past the deadline.
    pub const fn has_expired(self, now: u32) -> bool {
        now.wrapping_sub(self.0) as i32 >= 0
    }
}

/// Poll `done` until it returns `true`, or until `deadline` passes.
///
/// `yield_now` runs between polls. It might call the driver's `poll()` when
/// USB interrupts are off, or sleep until the next interrupt. Returning
/// [`ControlFlow::Break`] abandons the wait with [`Error::Cancelled`].
///
/// `done` is checked once more after the deadline passes, so a condition
/// that became true on the last yield still succeeds.
pub fn poll_until(
    clock: &impl Clock,
    deadline: Deadline,
    mut done: impl FnMut() -> bool,
    mut yield_now: impl FnMut() -> ControlFlow<()>,
) -> Result<(), Error> {
    loop {
        if done() {
            return Ok(());
        }
        if deadline.has_expired(clock.now()) {
            return if done() { Ok(()) } else { Err(Error::Timeout) };
        }
        if yield_now().is_break() {
            return Err(Error::Cancelled);
        }
    }
}
