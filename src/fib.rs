//! The Forwarding Information Base: per-node installed routing state.
//!
//! Grounded on `qns/network/protocol/fib.py`'s
//! `ForwardingInformationBase`, a dict keyed by `path_id` with
//! `add_entry`/`get_entry`/`update_entry`/`delete_entry`. Here the table is
//! typed rather than a `**kwargs` dict, and `update_entry`'s "raises
//! KeyError for invalid keys" becomes a compile-time guarantee: there is no
//! stringly-typed key to get wrong.

use std::collections::HashMap;

use crate::ids::{NodeId, PathId, ReqId};
use crate::mux::MuxKind;

#[derive(Debug, Clone)]
pub struct FibEntry {
    pub path_id: PathId,
    pub req_id: ReqId,
    pub route: Vec<NodeId>,
    pub own_idx: usize,
    pub swap_sequence: Vec<u32>,
    pub swap_cutoff: Vec<Option<u64>>,
    pub purif_rounds: Vec<u32>,
    pub mux: MuxKind,
    /// Number of swap cycles this node has completed for this path.
    pub swapped_self: u32,
    pub swap_disabled: bool,
}

impl FibEntry {
    pub fn own_rank(&self) -> u32 {
        self.swap_sequence[self.own_idx]
    }

    pub fn is_endpoint(&self) -> bool {
        self.own_idx == 0 || self.own_idx == self.route.len() - 1
    }

    pub fn prev(&self) -> Option<NodeId> {
        (self.own_idx > 0).then(|| self.route[self.own_idx - 1])
    }

    pub fn next(&self) -> Option<NodeId> {
        self.route.get(self.own_idx + 1).copied()
    }
}

#[derive(Default)]
pub struct ForwardingInformationBase {
    entries: HashMap<PathId, FibEntry>,
}

impl ForwardingInformationBase {
    pub fn add_entry(&mut self, entry: FibEntry) {
        let path_id = entry.path_id;
        let prior = self.entries.insert(path_id, entry);
        debug_assert!(prior.is_none(), "FIB entry for {path_id} installed twice");
    }

    pub fn get_entry(&self, path_id: PathId) -> Option<&FibEntry> {
        self.entries.get(&path_id)
    }

    pub fn get_entry_mut(&mut self, path_id: PathId) -> Option<&mut FibEntry> {
        self.entries.get_mut(&path_id)
    }

    pub fn delete_entry(&mut self, path_id: PathId) -> Option<FibEntry> {
        self.entries.remove(&path_id)
    }

    pub fn bump_swapped(&mut self, path_id: PathId) {
        if let Some(e) = self.entries.get_mut(&path_id) {
            e.swapped_self += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path_id: u32) -> FibEntry {
        FibEntry {
            path_id: PathId(path_id),
            req_id: ReqId(0),
            route: vec![NodeId(0), NodeId(1), NodeId(2)],
            own_idx: 1,
            swap_sequence: vec![2, 0, 2],
            swap_cutoff: vec![None, None, None],
            purif_rounds: vec![0, 0, 0],
            mux: MuxKind::BufferSpace,
            swapped_self: 0,
            swap_disabled: false,
        }
    }

    #[test]
    fn install_then_uninstall_round_trips() {
        let mut fib = ForwardingInformationBase::default();
        fib.add_entry(entry(1));
        assert!(fib.get_entry(PathId(1)).is_some());
        let removed = fib.delete_entry(PathId(1)).unwrap();
        assert_eq!(removed.path_id, PathId(1));
        assert!(fib.is_empty());
    }

    #[test]
    fn own_rank_and_endpoint_detection() {
        let e = entry(1);
        assert_eq!(e.own_rank(), 0);
        assert!(!e.is_endpoint());
        assert_eq!(e.prev(), Some(NodeId(0)));
        assert_eq!(e.next(), Some(NodeId(2)));
    }
}
