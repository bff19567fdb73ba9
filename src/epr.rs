//! The Werner-state entanglement model.
//!
//! Grounded on the fidelity formulas given in the specification and on
//! `this_epr.swapping(epr=other_epr, ...)` in
//! `qns/network/protocol/proactive_routing.py`. Every half-EPR stored in a
//! memory slot carries a copy of this struct; a swap or purification
//! round consumes two and produces one fresh one.

use std::collections::BTreeSet;

use crate::ids::{NodeId, PathId};
use crate::time::TimeSlot;

/// A single elementary or swapped entangled pair, modeled as a Werner
/// state parameterized by its fidelity.
#[derive(Debug, Clone)]
pub struct WernerEntanglement {
    pub name: String,
    pub src: NodeId,
    pub dst: NodeId,
    pub fidelity: f64,
    pub creation_time: TimeSlot,
    /// Candidate path ids this EPR may still end up serving. A
    /// `BufferSpace`-muxed EPR has exactly one; `DynamicEpr` narrows to one
    /// on first entanglement; `Statistical` keeps the full candidate set
    /// until swap time (see [`crate::mux::MuxScheme`]).
    pub tmp_path_ids: BTreeSet<PathId>,
}

impl WernerEntanglement {
    pub fn new(name: String, src: NodeId, dst: NodeId, fidelity: f64, created: TimeSlot, path_ids: BTreeSet<PathId>) -> Self {
        debug_assert!((0.25..=1.0).contains(&fidelity), "fidelity out of range: {fidelity}");
        WernerEntanglement { name, src, dst, fidelity, creation_time: created, tmp_path_ids: path_ids }
    }

    /// Apply storage decay for `dt_secs` seconds in a memory with
    /// coherence time `t_coh_secs`:
    /// `F(t+dt) = 0.25 + (F(t) - 0.25) * exp(-dt / T_coh)`.
    pub fn decay(&mut self, dt_secs: f64, t_coh_secs: f64) {
        self.fidelity = 0.25 + (self.fidelity - 0.25) * (-dt_secs / t_coh_secs).exp();
    }

    /// Fidelity of the node produced by swapping `self` (left segment)
    /// with `other` (right segment):
    /// `F' = F_L*F_R + (1-F_L)*(1-F_R)/3`.
    pub fn swap_fidelity(left: f64, right: f64) -> f64 {
        left * right + (1.0 - left) * (1.0 - right) / 3.0
    }

    /// DEJMPS purification success probability for two copies at fidelity
    /// `f`: `p = F^2 + 2F(1-F)/3 + 5((1-F)/3)^2`.
    pub fn purif_success_prob(f: f64) -> f64 {
        f.powi(2) + 2.0 * f * (1.0 - f) / 3.0 + 5.0 * ((1.0 - f) / 3.0).powi(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn storage_decay_approaches_maximally_mixed() {
        let mut e = WernerEntanglement::new("a".into(), NodeId(0), NodeId(1), 0.99, TimeSlot(0), BTreeSet::new());
        e.decay(1000.0, 1.0);
        assert_relative_eq!(e.fidelity, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn storage_decay_is_identity_at_zero_time() {
        let mut e = WernerEntanglement::new("a".into(), NodeId(0), NodeId(1), 0.87, TimeSlot(0), BTreeSet::new());
        e.decay(0.0, 1.0);
        assert_relative_eq!(e.fidelity, 0.87, epsilon = 1e-12);
    }

    #[test]
    fn swap_fidelity_of_two_perfect_pairs_is_perfect() {
        assert_relative_eq!(WernerEntanglement::swap_fidelity(1.0, 1.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn swap_fidelity_of_two_maximally_mixed_pairs_is_maximally_mixed() {
        // 0.25*0.25 + 0.75*0.75/3 = 0.0625 + 0.1875 = 0.25
        assert_relative_eq!(WernerEntanglement::swap_fidelity(0.25, 0.25), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn purif_success_prob_is_one_for_perfect_fidelity() {
        assert_relative_eq!(WernerEntanglement::purif_success_prob(1.0), 1.0, epsilon = 1e-12);
    }
}
