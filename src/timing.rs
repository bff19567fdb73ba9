//! Timing modes.
//!
//! Grounded on `mqns/network/network/timing.py`: a `TimingPhase`
//! enum (`EXTERNAL`/`ROUTING`/`INTERNAL`), an always-on `TimingModeAsync`,
//! and a cyclic `TimingModeSync` that rotates a `deque` of phases and
//! broadcasts a `TimingPhaseEvent` directly to every node (bypassing the
//! scheduler's usual per-node classical-channel delay, since the original
//! treats this as an out-of-band control signal for performance reasons).

use std::collections::VecDeque;

use crate::time::TimeSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingPhase {
    External,
    Routing,
    Internal,
}

pub enum TimingMode {
    Async,
    Sync(SyncState),
}

pub struct SyncState {
    pub t_ext: u64,
    pub t_rtg: u64,
    pub t_int: u64,
    cycle: VecDeque<TimingPhase>,
    pub phase: TimingPhase,
    pub end_time: TimeSlot,
}

impl TimingMode {
    pub fn sync(t_ext: u64, t_rtg: u64, t_int: u64) -> Self {
        // `cycle` holds the rotation still to come after the initial
        // `External` phase armed below, so the first `advance()` call
        // lands on `Routing` (or `Internal`, if routing has no budget).
        let mut cycle = VecDeque::new();
        if t_rtg > 0 {
            cycle.push_back(TimingPhase::Routing);
        }
        cycle.push_back(TimingPhase::Internal);
        cycle.push_back(TimingPhase::External);
        TimingMode::Sync(SyncState { t_ext, t_rtg, t_int, cycle, phase: TimingPhase::External, end_time: TimeSlot(t_ext) })
    }

    pub fn is_async(&self) -> bool {
        matches!(self, TimingMode::Async)
    }

    fn is_phase(&self, phase: TimingPhase, t: TimeSlot) -> bool {
        match self {
            TimingMode::Async => true,
            TimingMode::Sync(s) => s.phase == phase && t < s.end_time,
        }
    }

    pub fn is_external(&self, t: TimeSlot) -> bool {
        self.is_phase(TimingPhase::External, t)
    }

    pub fn is_routing(&self, t: TimeSlot) -> bool {
        self.is_phase(TimingPhase::Routing, t)
    }

    pub fn is_internal(&self, t: TimeSlot) -> bool {
        self.is_phase(TimingPhase::Internal, t)
    }

    /// Rotate to the next phase in the cycle, returning its duration in
    /// slots and the new end time. Mirrors `TimingModeSync.signal_phase`'s
    /// deque rotation.
    pub fn advance(&mut self, now: TimeSlot) -> Option<(TimingPhase, TimeSlot)> {
        match self {
            TimingMode::Async => None,
            TimingMode::Sync(s) => {
                let next = s.cycle.pop_front()?;
                s.cycle.push_back(next);
                let duration = match next {
                    TimingPhase::External => s.t_ext,
                    TimingPhase::Routing => s.t_rtg,
                    TimingPhase::Internal => s.t_int,
                };
                s.phase = next;
                s.end_time = now + duration;
                Some((next, s.end_time))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_cycle_skips_routing_when_budget_is_zero() {
        let mut mode = TimingMode::sync(10, 0, 5);
        let (p1, _) = mode.advance(TimeSlot(0)).unwrap();
        let (p2, _) = mode.advance(TimeSlot(10)).unwrap();
        let (p3, _) = mode.advance(TimeSlot(15)).unwrap();
        assert_eq!(p1, TimingPhase::Internal);
        assert_eq!(p2, TimingPhase::External);
        assert_eq!(p3, TimingPhase::Internal);
    }

    #[test]
    fn async_mode_is_always_in_every_phase() {
        let mode = TimingMode::Async;
        assert!(mode.is_external(TimeSlot(999)));
        assert!(mode.is_routing(TimeSlot(999)));
        assert!(mode.is_internal(TimeSlot(999)));
    }
}
