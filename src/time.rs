//! Simulated time.
//!
//! Time advances in discrete integer slots. `Accuracy` fixes how many slots
//! make up one simulated second; all physical-layer delays (computed in
//! seconds from channel lengths, attempt rates, coherence times, ...) are
//! converted to slot counts through it before being used to schedule an
//! [`crate::event::Event`].

use std::ops::{Add, AddAssign, Sub};

/// Slots per simulated second. The original simulator defaults to
/// microsecond resolution, which keeps every physical delay in this model
/// (fibre propagation, attempt cadence, decoherence) representable without
/// rounding to zero.
pub const DEFAULT_ACCURACY: u64 = 1_000_000;

/// A point in simulated time, expressed as an integer slot count since the
/// start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeSlot(pub u64);

impl TimeSlot {
    pub const ZERO: TimeSlot = TimeSlot(0);

    pub fn slots(self) -> u64 {
        self.0
    }

    /// Convert to seconds at the given accuracy, for logging and test
    /// assertions.
    pub fn as_secs_f64(self, accuracy: u64) -> f64 {
        self.0 as f64 / accuracy as f64
    }
}

impl Add<u64> for TimeSlot {
    type Output = TimeSlot;
    fn add(self, rhs: u64) -> TimeSlot {
        TimeSlot(self.0 + rhs)
    }
}

impl AddAssign<u64> for TimeSlot {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub for TimeSlot {
    type Output = u64;
    fn sub(self, rhs: TimeSlot) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}

/// Converts a duration in seconds (as carried by physical-layer formulas)
/// into a slot count at the given accuracy. Rounds down, matching the
/// original `Time(sec=...)` truncating conversion; a non-finite or negative
/// duration is a configuration bug and panics rather than silently
/// producing a bogus slot count.
pub fn secs_to_slots(accuracy: u64, secs: f64) -> u64 {
    assert!(secs.is_finite() && secs >= 0.0, "non-finite or negative delay: {secs}");
    (secs * accuracy as f64).floor() as u64
}
