//! Classical message types.
//!
//! The original protocol layers pass opaque dictionaries
//! (`{"cmd": "SWAP_UPDATE", ...}`) between nodes. Per the specification's
//! design notes ("opaque message dictionaries ... give each classical
//! message a tagged-variant type"), every classical message the simulator
//! can produce is a variant of this enum.

use crate::epr::WernerEntanglement;
use crate::ids::{NodeId, PathId};

#[derive(Debug, Clone)]
pub struct PathInstructions {
    pub route: Vec<NodeId>,
    pub swap_sequence: Vec<u32>,
    pub swap_cutoff: Vec<Option<u64>>,
    pub purif_rounds: Vec<u32>,
    pub mux: crate::mux::MuxKind,
}

#[derive(Debug, Clone)]
pub enum ClassicalMessage {
    /// Controller -> every node on the route.
    InstallPath { path_id: PathId, instructions: PathInstructions },
    /// Controller -> every node on the route.
    UninstallPath { path_id: PathId },

    /// Link-layer handshake, neighbor -> neighbor.
    EprInit { path_id: PathId, key: String },
    EprOk { path_id: PathId, key: String },
    EprNok { path_id: PathId, key: String },

    /// Forwarder -> forwarder, relayed hop by hop toward `destination`.
    ///
    /// `epr_new` carries the actual post-swap entanglement, not just its
    /// name: the original passes the live Python object through the
    /// message dict (`"new_epr": new_epr`), which in a simulation of a
    /// protocol that is itself an abstraction over real quantum state is
    /// not a physical signal, just a bookkeeping convenience this crate
    /// keeps.
    SwapUpdate {
        path_id: PathId,
        swapping_node: NodeId,
        partner: NodeId,
        epr_old: String,
        epr_new: WernerEntanglement,
        results: Vec<bool>,
        cycle: u32,
        destination: NodeId,
    },
}
