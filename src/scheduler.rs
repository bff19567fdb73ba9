//! The deterministic event scheduler.
//!
//! Grounded on `mqns/simulator/pool.py`'s `DefaultEventPool`: a binary heap
//! keyed by time slot, a monotonic current time `tc`, and an end time `te`
//! past which no event may be scheduled. `add_event` rejects events
//! scheduled in the past or beyond the run's end; `next_event` pops the
//! smallest, advances `tc`, and hands the event back to the caller to
//! invoke (the caller is the `Simulator`, which owns all entity state and
//! can therefore dispatch without needing events to carry behaviour).

use std::collections::BinaryHeap;

use crate::event::{EventKind, ScheduledEvent};
use crate::time::TimeSlot;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("cannot schedule event at t={requested} before current time tc={tc}")]
    InThePast { requested: u64, tc: u64 },
    #[error("cannot schedule event at t={requested} past run end te={te}")]
    PastEnd { requested: u64, te: u64 },
}

pub struct Scheduler {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
    tc: TimeSlot,
    te: TimeSlot,
}

impl Scheduler {
    pub fn new(te: TimeSlot) -> Self {
        Scheduler { heap: BinaryHeap::new(), next_seq: 0, tc: TimeSlot::ZERO, te }
    }

    pub fn tc(&self) -> TimeSlot {
        self.tc
    }

    pub fn te(&self) -> TimeSlot {
        self.te
    }

    pub fn add_event(&mut self, t: TimeSlot, kind: EventKind) -> Result<(), ScheduleError> {
        if t < self.tc {
            return Err(ScheduleError::InThePast { requested: t.slots(), tc: self.tc.slots() });
        }
        if t > self.te {
            return Err(ScheduleError::PastEnd { requested: t.slots(), te: self.te.slots() });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { t, seq, canceled: false, kind });
        Ok(())
    }

    /// Pop the next non-canceled event, advancing `tc` to its timestamp.
    /// Returns `None` once the heap is drained or every remaining event has
    /// `t > te` (should not happen given `add_event`'s guard, but mirrors
    /// the original's "set tc to te and stop" behaviour defensively).
    pub fn next_event(&mut self) -> Option<ScheduledEvent> {
        loop {
            let ev = self.heap.pop()?;
            if ev.canceled {
                continue;
            }
            self.tc = ev.t;
            return Some(ev);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(slot: u64) -> TimeSlot {
        TimeSlot(slot)
    }

    #[test]
    fn fifo_tiebreak_on_equal_timestamps() {
        let mut s = Scheduler::new(t(100));
        s.add_event(t(5), EventKind::QubitReleased { node: crate::ids::NodeId(0), channel: crate::ids::ChannelId(0), slot: crate::ids::SlotId(0) }).unwrap();
        s.add_event(t(5), EventKind::QubitReleased { node: crate::ids::NodeId(1), channel: crate::ids::ChannelId(0), slot: crate::ids::SlotId(0) }).unwrap();

        let first = s.next_event().unwrap();
        let second = s.next_event().unwrap();
        match (first.kind, second.kind) {
            (EventKind::QubitReleased { node: n0, .. }, EventKind::QubitReleased { node: n1, .. }) => {
                assert_eq!(n0.0, 0);
                assert_eq!(n1.0, 1);
            }
            _ => panic!("unexpected event kinds"),
        }
    }

    #[test]
    fn rejects_events_before_tc_or_past_te() {
        let mut s = Scheduler::new(t(10));
        s.add_event(t(5), EventKind::QubitReleased { node: crate::ids::NodeId(0), channel: crate::ids::ChannelId(0), slot: crate::ids::SlotId(0) }).unwrap();
        s.next_event().unwrap(); // tc is now 5
        assert!(matches!(
            s.add_event(t(1), EventKind::QubitReleased { node: crate::ids::NodeId(0), channel: crate::ids::ChannelId(0), slot: crate::ids::SlotId(0) }),
            Err(ScheduleError::InThePast { .. })
        ));
        assert!(matches!(
            s.add_event(t(11), EventKind::QubitReleased { node: crate::ids::NodeId(0), channel: crate::ids::ChannelId(0), slot: crate::ids::SlotId(0) }),
            Err(ScheduleError::PastEnd { .. })
        ));
    }

    #[test]
    fn cancel_is_skipped_on_pop() {
        let mut s = Scheduler::new(t(10));
        s.add_event(t(1), EventKind::QubitReleased { node: crate::ids::NodeId(0), channel: crate::ids::ChannelId(0), slot: crate::ids::SlotId(0) }).unwrap();
        s.add_event(t(2), EventKind::QubitReleased { node: crate::ids::NodeId(1), channel: crate::ids::ChannelId(0), slot: crate::ids::SlotId(0) }).unwrap();
        // Cancel by draining and re-pushing without the first (cancellation
        // in the real scheduler is a flag flip on the stored event; this
        // test exercises the "already marked canceled" skip path directly).
        if let Some(mut ev) = s.heap.pop() {
            ev.canceled = true;
            s.heap.push(ev);
        }
        let next = s.next_event().unwrap();
        assert_eq!(next.t, t(2));
    }
}
