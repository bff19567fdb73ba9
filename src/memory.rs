//! Quantum memory: a node's fixed-capacity array of entanglement slots.
//!
//! Grounded on `qns/entity/memory/memory.py`'s `QuantumMemory` and
//! `qns/entity/memory/memory_qubit.py`'s `MemoryQubit`/`QubitState`. The
//! Python version stores `(MemoryQubit, Optional[QuantumModel])` tuples and
//! a parallel store-time list; here a slot is a single struct so the
//! invariant "a stored EPR always has a store time" is expressed in the
//! type rather than kept in sync across two lists by convention.

use crate::epr::WernerEntanglement;
use crate::ids::PathId;
use crate::mux::MuxKind;
use crate::time::TimeSlot;

/// Per-qubit state machine: `ENTANGLED -> PURIF -> ELIGIBLE -> {CONSUMED |
/// SWAPPED}`, with `RELEASE` reachable from any state on decoherence,
/// failed purification, or failed swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QubitState {
    Empty,
    Entangled,
    Purif,
    Eligible,
    Consumed,
    Swapped,
    Release,
}

#[derive(Debug, Clone)]
pub struct MemorySlot {
    pub state: QubitState,
    /// Path this slot is statically bound to, if any (`BufferSpace`
    /// allocation). `None` for slots shared across candidate paths under
    /// `DynamicEpr`/`Statistical` muxing.
    pub path_id: Option<PathId>,
    pub epr: Option<WernerEntanglement>,
    pub store_time: Option<TimeSlot>,
    /// `(armed_at, deadline)` window set by a `WaitTime` cutoff scheme on
    /// reaching `Eligible`.
    pub cutoff: Option<(TimeSlot, TimeSlot)>,
}

impl MemorySlot {
    fn empty() -> Self {
        MemorySlot { state: QubitState::Empty, path_id: None, epr: None, store_time: None, cutoff: None }
    }

    pub fn is_empty(&self) -> bool {
        self.epr.is_none()
    }
}

pub struct Memory {
    pub capacity: usize,
    pub t_coh_secs: f64,
    slots: Vec<MemorySlot>,
    /// `(path_id, swap_sequence_len)` of every path installed on this
    /// memory under `DynamicEpr`/`Statistical` muxing, none of them bound
    /// to a specific address. Mirrors the candidate bookkeeping
    /// `MuxScheme` subclasses keep per shared memory in `mux.py`.
    pub shared_candidates: Vec<(PathId, usize)>,
    pub mux_kind: Option<MuxKind>,
}

impl Memory {
    pub fn new(capacity: usize, t_coh_secs: f64) -> Self {
        Memory { capacity, t_coh_secs, slots: (0..capacity).map(|_| MemorySlot::empty()).collect(), shared_candidates: Vec::new(), mux_kind: None }
    }

    /// Register `path_id` as a candidate for this shared memory under
    /// `mux`. Returns `true` if this is the first candidate ever
    /// registered, so the caller knows to kick off negotiation on the
    /// memory's still-empty addresses.
    pub fn register_candidate(&mut self, path_id: PathId, swap_sequence_len: usize, mux: MuxKind) -> bool {
        self.mux_kind = Some(mux);
        let first = self.shared_candidates.is_empty();
        self.shared_candidates.push((path_id, swap_sequence_len));
        first
    }

    pub fn slot(&self, addr: usize) -> &MemorySlot {
        &self.slots[addr]
    }

    pub fn slot_mut(&mut self, addr: usize) -> &mut MemorySlot {
        &mut self.slots[addr]
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| !s.is_empty())
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    pub fn free(&self) -> usize {
        self.slots.iter().filter(|s| s.path_id.is_none() && s.is_empty()).count()
    }

    /// Reserve the first unbound slot for `path_id` (static buffer-space
    /// allocation at path install time). Mirrors `Memory.allocate`.
    pub fn allocate(&mut self, path_id: PathId) -> Option<usize> {
        for (addr, slot) in self.slots.iter_mut().enumerate() {
            if slot.path_id.is_none() {
                slot.path_id = Some(path_id);
                return Some(addr);
            }
        }
        None
    }

    pub fn deallocate(&mut self, addr: usize) {
        self.slots[addr].path_id = None;
    }

    /// Addresses free to negotiate on behalf of a shared-memory candidate
    /// pool: empty and not statically bound to a single path.
    pub fn unbound_empty_addrs(&self) -> Vec<usize> {
        self.slots.iter().enumerate().filter(|(_, s)| s.is_empty() && s.path_id.is_none()).map(|(i, _)| i).collect()
    }

    /// Store an EPR in the first empty slot matching `path_id`/`addr`, as
    /// `QuantumMemory.write` does. Returns the address written, or `None`
    /// if no matching empty slot exists.
    pub fn write(&mut self, epr: WernerEntanglement, now: TimeSlot, path_id: Option<PathId>, addr: Option<usize>) -> Option<usize> {
        let target = self.slots.iter().enumerate().find(|(i, s)| {
            s.is_empty()
                && addr.map_or(true, |a| a == *i)
                && path_id.map_or(true, |p| s.path_id.is_none() || s.path_id == Some(p))
        })?;
        let idx = target.0;
        let slot = &mut self.slots[idx];
        slot.epr = Some(epr);
        slot.store_time = Some(now);
        slot.state = QubitState::Entangled;
        Some(idx)
    }

    /// Destructively remove the EPR at `addr`, applying storage decay for
    /// the elapsed time. Mirrors `QuantumMemory.read`.
    pub fn read(&mut self, addr: usize, now: TimeSlot, accuracy: u64) -> Option<WernerEntanglement> {
        let slot = &mut self.slots[addr];
        let mut epr = slot.epr.take()?;
        let store_time = slot.store_time.take().expect("stored epr always has a store time");
        slot.state = QubitState::Empty;
        slot.cutoff = None;
        let dt = (now - store_time) as f64 / accuracy as f64;
        epr.decay(dt, self.t_coh_secs);
        Some(epr)
    }

    /// Address of the slot statically bound to `path_id` by `allocate`, if
    /// any.
    pub fn slot_bound_to(&self, path_id: PathId) -> Option<usize> {
        self.slots.iter().position(|s| s.path_id == Some(path_id))
    }

    /// Find the slot address currently holding the EPR named `name`.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.epr.as_ref().is_some_and(|e| e.name == name))
    }

    pub fn search_eligible(&self, path_id: PathId) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == QubitState::Eligible && s.epr.as_ref().is_some_and(|e| e.tmp_path_ids.contains(&path_id)))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn search_purif(&self, path_id: PathId) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == QubitState::Purif && s.epr.as_ref().is_some_and(|e| e.tmp_path_ids.contains(&path_id)))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn epr(name: &str) -> WernerEntanglement {
        WernerEntanglement::new(name.into(), crate::ids::NodeId(0), crate::ids::NodeId(1), 0.9, TimeSlot(0), BTreeSet::new())
    }

    #[test]
    fn write_then_read_round_trips_and_decays() {
        let mut m = Memory::new(2, 1.0);
        let addr = m.write(epr("e1"), TimeSlot(0), None, None).unwrap();
        assert_eq!(m.count(), 1);
        let read = m.read(addr, TimeSlot(1_000_000), 1_000_000).unwrap();
        assert!(read.fidelity < 0.9);
        assert_eq!(m.count(), 0);
    }

    #[test]
    fn full_memory_rejects_write() {
        let mut m = Memory::new(1, 1.0);
        m.write(epr("e1"), TimeSlot(0), None, None).unwrap();
        assert!(m.write(epr("e2"), TimeSlot(0), None, None).is_none());
        assert!(m.is_full());
    }

    #[test]
    fn allocate_binds_first_free_slot_to_path() {
        let mut m = Memory::new(2, 1.0);
        let p = PathId(7);
        let addr = m.allocate(p).unwrap();
        assert_eq!(m.slot(addr).path_id, Some(p));
        assert_eq!(m.free(), 1);
    }
}
