//! The routing controller: path computation and swap-sequence resolution.
//!
//! Grounded on `qns/network/protocol/proactive_routing_controller.py` for
//! the `INSTALL_PATH`/`UNINSTALL_PATH` message shape (its embedded HTTP
//! debug server and hardcoded "S"/"R"/"D" topology names are explicitly
//! out of scope and are not carried forward), and on
//! `mqns/network/proactive/vora_swap.py` for the VoRA wrapper shape. Path
//! computation itself (Dijkstra / k-shortest) is not present in the
//! filtered original sources; it is added here as the concrete algorithm
//! `SRSP`/`MRSP_DYNAMIC` in the specification names but does not specify
//! the implementation of.

use std::collections::{BinaryHeap, HashMap};

use crate::error::{Result, SimError};
use crate::ids::NodeId;

/// An undirected weighted topology graph used only for route computation;
/// weights are typically channel length in km.
#[derive(Default)]
pub struct Topology {
    edges: HashMap<NodeId, Vec<(NodeId, f64)>>,
}

impl Topology {
    pub fn add_edge(&mut self, a: NodeId, b: NodeId, weight: f64) {
        self.edges.entry(a).or_default().push((b, weight));
        self.edges.entry(b).or_default().push((a, weight));
    }

    /// Single shortest path via Dijkstra, used by `SRSP`.
    pub fn shortest_path(&self, src: NodeId, dst: NodeId) -> Result<Vec<NodeId>> {
        self.shortest_path_excluding(src, dst, &[])
    }

    fn shortest_path_excluding(&self, src: NodeId, dst: NodeId, excluded_edges: &[(NodeId, NodeId)]) -> Result<Vec<NodeId>> {
        #[derive(PartialEq)]
        struct HeapItem(f64, NodeId);
        impl Eq for HeapItem {}
        impl Ord for HeapItem {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                other.0.partial_cmp(&self.0).unwrap_or(std::cmp::Ordering::Equal)
            }
        }
        impl PartialOrd for HeapItem {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut dist: HashMap<NodeId, f64> = HashMap::new();
        let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(src, 0.0);
        heap.push(HeapItem(0.0, src));

        while let Some(HeapItem(d, u)) = heap.pop() {
            if d > *dist.get(&u).unwrap_or(&f64::INFINITY) {
                continue;
            }
            if u == dst {
                break;
            }
            for &(v, w) in self.edges.get(&u).into_iter().flatten() {
                if excluded_edges.contains(&(u, v)) || excluded_edges.contains(&(v, u)) {
                    continue;
                }
                let nd = d + w;
                if nd < *dist.get(&v).unwrap_or(&f64::INFINITY) {
                    dist.insert(v, nd);
                    prev.insert(v, u);
                    heap.push(HeapItem(nd, v));
                }
            }
        }

        if !dist.contains_key(&dst) {
            return Err(SimError::InvalidTopology(format!("no path from {src} to {dst}")));
        }
        let mut path = vec![dst];
        let mut cur = dst;
        while cur != src {
            cur = *prev.get(&cur).ok_or_else(|| SimError::InvalidTopology(format!("no path from {src} to {dst}")))?;
            path.push(cur);
        }
        path.reverse();
        Ok(path)
    }

    /// `k` shortest, edge-disjoint-preferring paths for `MRSP_DYNAMIC`,
    /// via a simplified Yen's algorithm: the first path is the true
    /// shortest, subsequent paths are the shortest path avoiding the edges
    /// already used by previously chosen paths.
    pub fn k_shortest_paths(&self, src: NodeId, dst: NodeId, k: usize) -> Result<Vec<Vec<NodeId>>> {
        let mut paths = Vec::new();
        let mut excluded: Vec<(NodeId, NodeId)> = Vec::new();
        for _ in 0..k {
            let path = match self.shortest_path_excluding(src, dst, &excluded) {
                Ok(p) => p,
                Err(_) if !paths.is_empty() => break,
                Err(e) => return Err(e),
            };
            excluded.extend(path.windows(2).map(|w| (w[0], w[1])));
            paths.push(path);
        }
        Ok(paths)
    }
}

/// How the swap sequence for a route is resolved. Grounded on the preset
/// vs. explicit-vector vs. VoRA distinction in §4.7 of the specification.
#[derive(Debug, Clone)]
pub enum SwapSequenceSpec {
    Preset(SwapPreset),
    Explicit(Vec<u32>),
    /// VoRA's internal machinery (`get_Bq`, `merge_close`, `voraswap`) is
    /// not part of the filtered original sources and is genuinely an
    /// external research algorithm; per the specification it is treated as
    /// a pure function over these opaque inputs, computed once offline and
    /// supplied here as a precomputed per-route-length rank vector rather
    /// than re-derived by the controller.
    VoraPrecomputed(Vec<u32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPreset {
    /// Every intermediate node swaps as soon as both its qubits are
    /// eligible; endpoints never swap.
    Swap1,
    /// Alias of `Swap1`: swap at the earliest opportunity.
    Asap,
    /// Strictly increasing ranks left to right.
    LeftToRight,
    /// Strictly increasing ranks right to left.
    RightToLeft,
    /// Balanced binary ordering (innermost nodes swap first).
    Balanced,
}

/// Resolve a swap-sequence spec into a concrete per-node rank vector of
/// length `route_len`. Endpoints always receive the maximum rank, matching
/// `compute_vora_swap_sequence`'s "source and dest get max rank+1" rule.
pub fn resolve_swap_sequence(spec: &SwapSequenceSpec, route_len: usize) -> Result<Vec<u32>> {
    match spec {
        SwapSequenceSpec::Explicit(v) | SwapSequenceSpec::VoraPrecomputed(v) => {
            if v.len() != route_len {
                return Err(SimError::VectorLengthMismatch { field: "swap_sequence", expected: route_len, actual: v.len() });
            }
            Ok(v.clone())
        }
        SwapSequenceSpec::Preset(preset) => Ok(preset_vector(*preset, route_len)),
    }
}

fn preset_vector(preset: SwapPreset, route_len: usize) -> Vec<u32> {
    if route_len < 2 {
        return vec![0; route_len];
    }
    let max_rank = route_len as u32; // endpoints get this
    let mut v = vec![0u32; route_len];
    v[0] = max_rank;
    v[route_len - 1] = max_rank;
    let inner = 1..route_len - 1;
    match preset {
        SwapPreset::Swap1 | SwapPreset::Asap => {
            for i in inner {
                v[i] = 0;
            }
        }
        SwapPreset::LeftToRight => {
            for (rank, i) in inner.enumerate() {
                v[i] = rank as u32;
            }
        }
        SwapPreset::RightToLeft => {
            let n = route_len - 2;
            for (rank, i) in inner.enumerate() {
                v[i] = (n - 1 - rank) as u32;
            }
        }
        SwapPreset::Balanced => {
            // Nodes closest to the midpoint swap first (rank 0), ranks grow
            // outward — a simple balanced binary merge ordering.
            let n = route_len - 2;
            let mid = (n - 1) as f64 / 2.0;
            for (offset, i) in (1..=n).enumerate() {
                let dist = ((offset as f64) - mid).abs();
                v[i] = dist.round() as u32;
            }
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_topology(n: usize) -> Topology {
        let mut t = Topology::default();
        for i in 0..n - 1 {
            t.add_edge(NodeId(i as u32), NodeId(i as u32 + 1), 1.0);
        }
        t
    }

    #[test]
    fn shortest_path_on_a_line_visits_every_node() {
        let t = line_topology(4);
        let path = t.shortest_path(NodeId(0), NodeId(3)).unwrap();
        assert_eq!(path, vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn swap1_preset_gives_intermediate_nodes_rank_zero() {
        let v = resolve_swap_sequence(&SwapSequenceSpec::Preset(SwapPreset::Swap1), 5).unwrap();
        assert_eq!(v, vec![5, 0, 0, 0, 5]);
    }

    #[test]
    fn explicit_vector_length_mismatch_is_an_error() {
        let err = resolve_swap_sequence(&SwapSequenceSpec::Explicit(vec![0, 1]), 3);
        assert!(matches!(err, Err(SimError::VectorLengthMismatch { .. })));
    }

    #[test]
    fn k_shortest_paths_on_a_rectangle_finds_two_disjoint_routes() {
        // 0-1-3 and 0-2-3 rectangle.
        let mut t = Topology::default();
        t.add_edge(NodeId(0), NodeId(1), 1.0);
        t.add_edge(NodeId(1), NodeId(3), 1.0);
        t.add_edge(NodeId(0), NodeId(2), 1.0);
        t.add_edge(NodeId(2), NodeId(3), 1.0);
        let paths = t.k_shortest_paths(NodeId(0), NodeId(3), 2).unwrap();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
    }
}
