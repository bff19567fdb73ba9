//! Cut-off schemes: age-based eligibility filtering for swap candidates.
//!
//! Grounded on `mqns/network/proactive/cutoff.py`'s `CutoffScheme` ABC,
//! `CutoffSchemeWaitTime`, and the (empty, placeholder) `CutoffSchemeWernerAge`.

use crate::memory::MemorySlot;
use crate::time::TimeSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffKind {
    /// No aging: a qubit is always an eligible swap candidate.
    None,
    /// Arm a `(now, now + budget)` window on reaching `Eligible`; reject
    /// candidates whose deadline has passed.
    WaitTime { budget_slots: u64 },
    /// Placeholder carried over from `mqns/network/proactive/cutoff.py`,
    /// which ships `CutoffSchemeWernerAge` as an empty class body with no
    /// implemented filtering logic.
    WernerAge,
}

/// Called when a qubit reaches `Eligible`; returns the cutoff window to
/// arm on the slot, if any.
pub fn arm(kind: CutoffKind, now: TimeSlot) -> Option<(TimeSlot, TimeSlot)> {
    match kind {
        CutoffKind::WaitTime { budget_slots } => Some((now, now + budget_slots)),
        CutoffKind::None | CutoffKind::WernerAge => None,
    }
}

/// Is `slot` still a valid swap candidate at time `now`, per its armed
/// cutoff window?
pub fn qubit_is_eligible(slot: &MemorySlot, now: TimeSlot) -> bool {
    match slot.cutoff {
        Some((_, deadline)) => deadline >= now,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;

    fn slot_with_cutoff(cutoff: Option<(TimeSlot, TimeSlot)>) -> MemorySlot {
        let epr = crate::epr::WernerEntanglement::new(
            "e".into(),
            NodeId(0),
            NodeId(1),
            0.9,
            TimeSlot(0),
            Default::default(),
        );
        MemorySlot { state: crate::memory::QubitState::Eligible, path_id: None, epr: Some(epr), store_time: Some(TimeSlot(0)), cutoff }
    }

    #[test]
    fn wait_time_arms_a_window_from_now() {
        let window = arm(CutoffKind::WaitTime { budget_slots: 100 }, TimeSlot(10)).unwrap();
        assert_eq!(window, (TimeSlot(10), TimeSlot(110)));
    }

    #[test]
    fn expired_window_is_rejected() {
        let slot = slot_with_cutoff(Some((TimeSlot(0), TimeSlot(5))));
        assert!(!qubit_is_eligible(&slot, TimeSlot(6)));
    }

    #[test]
    fn no_cutoff_is_always_eligible() {
        let slot = slot_with_cutoff(None);
        assert!(qubit_is_eligible(&slot, TimeSlot(1_000_000)));
    }
}
