//! Multiplex schemes: how a shared memory slot decides which installed
//! path an EPR ends up serving.
//!
//! Grounded on `qns/network/proactive/mux.py` (the `MuxScheme` ABC) and
//! its three concrete implementations `mux_buffer_space.py`,
//! `mux_dynamic_epr.py`, `mux_statistical.py`. The richer hook set in
//! `mux.py` (`su_parallel_avoid_conflict`, `su_parallel_succeeded`) exists
//! in the original to let a scheme veto or react to a concurrently
//! resolving swap; we fold that into `resolve_path_id`'s return type
//! instead of separate hooks, since in this design a single synchronous
//! call site resolves the path for a swap pairing.

use std::collections::BTreeSet;

use crate::epr::WernerEntanglement;
use crate::ids::PathId;
use crate::rng::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxKind {
    /// Each slot is permanently bound to one path at install time; no
    /// dynamic selection ever happens.
    BufferSpace,
    /// A slot may serve any of several candidate paths; the first EPR to
    /// land picks one via `selector` and is bound from then on.
    DynamicEpr { selector: DynamicSelector },
    /// A slot keeps the full candidate set until two EPRs are paired for
    /// swapping, at which point the surviving set is their intersection.
    Statistical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicSelector {
    /// Uniform choice among candidates.
    Random,
    /// Weight `1 / (1 + len(swap_sequence))`: paths needing fewer swaps
    /// are favored, matching `select_weighted_by_swaps` in
    /// `mux_dynamic_epr.py`.
    WeightedBySwaps,
}

/// Resolve which path a freshly entangled EPR with candidate set
/// `candidates` should serve, given each candidate's swap-sequence length
/// (needed only by `WeightedBySwaps`).
pub fn bind_path_on_entanglement(
    kind: MuxKind,
    candidates: &[(PathId, usize)],
    rng: &mut Rng,
) -> Option<PathId> {
    match kind {
        MuxKind::BufferSpace => candidates.first().map(|(p, _)| *p),
        MuxKind::DynamicEpr { selector: DynamicSelector::Random } => {
            rng.choose_uniform(candidates).map(|(p, _)| *p)
        }
        MuxKind::DynamicEpr { selector: DynamicSelector::WeightedBySwaps } => {
            rng.choose_weighted(candidates, |(_, len)| 1.0 / (1.0 + *len as f64)).map(|(p, _)| *p)
        }
        MuxKind::Statistical => None, // narrowing happens only at swap time
    }
}

/// Narrow `left.tmp_path_ids` and `right.tmp_path_ids` to their
/// intersection, as `_intersect_tmp_path_ids` does in `mux_statistical.py`.
/// Returns `None` (a swap conflict, counted by the forwarder as
/// `n_swap_conflict`) if the intersection is empty.
pub fn intersect_tmp_path_ids(left: &WernerEntanglement, right: &WernerEntanglement) -> Option<BTreeSet<PathId>> {
    let intersection: BTreeSet<PathId> = left.tmp_path_ids.intersection(&right.tmp_path_ids).copied().collect();
    if intersection.is_empty() {
        None
    } else {
        Some(intersection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_space_always_picks_first_candidate() {
        let mut rng = Rng::seed(1);
        let candidates = [(PathId(3), 1), (PathId(4), 2)];
        assert_eq!(bind_path_on_entanglement(MuxKind::BufferSpace, &candidates, &mut rng), Some(PathId(3)));
    }

    #[test]
    fn statistical_never_binds_on_entanglement() {
        let mut rng = Rng::seed(1);
        let candidates = [(PathId(3), 1)];
        assert_eq!(bind_path_on_entanglement(MuxKind::Statistical, &candidates, &mut rng), None);
    }

    #[test]
    fn intersection_empty_is_a_conflict() {
        let mut left = WernerEntanglement::new("l".into(), crate::ids::NodeId(0), crate::ids::NodeId(1), 0.9, crate::time::TimeSlot(0), BTreeSet::new());
        let mut right = left.clone();
        left.tmp_path_ids = BTreeSet::from([PathId(1)]);
        right.tmp_path_ids = BTreeSet::from([PathId(2)]);
        assert!(intersect_tmp_path_ids(&left, &right).is_none());
    }

    #[test]
    fn intersection_keeps_shared_paths() {
        let mut left = WernerEntanglement::new("l".into(), crate::ids::NodeId(0), crate::ids::NodeId(1), 0.9, crate::time::TimeSlot(0), BTreeSet::new());
        let mut right = left.clone();
        left.tmp_path_ids = BTreeSet::from([PathId(1), PathId(2)]);
        right.tmp_path_ids = BTreeSet::from([PathId(2), PathId(3)]);
        assert_eq!(intersect_tmp_path_ids(&left, &right), Some(BTreeSet::from([PathId(2)])));
    }
}
