//! Nodes.
//!
//! Grounded on `qns/entity/node/node.py` (`Node`), `qns/entity/node/qnode.py`
//! (`QNode`, adding qchannels/memories), and
//! `qns/entity/node/controller.py` (`Controller`, a bare `Node` subtype for
//! the routing controller). The original dispatches an incoming event to
//! each installed `Application` in turn until one reports "handled, stop
//! looking"; here a node's kind fixes statically which components it
//! owns, and the simulator dispatches by event variant instead of walking
//! an app list.

use crate::fib::ForwardingInformationBase;
use crate::ids::{CChannelId, ChannelId, NodeId};
use crate::memory::Memory;
use crate::metrics::{ForwarderMetrics, LinkLayerMetrics};

pub enum NodeKind {
    /// An end host or repeater: owns quantum channels, one memory per
    /// quantum channel, a link layer, and a forwarder.
    Repeater {
        qchannels: Vec<ChannelId>,
        /// One memory per quantum channel, indexed the same way.
        memories: Vec<Memory>,
        fib: ForwardingInformationBase,
        link_metrics: LinkLayerMetrics,
        fwd_metrics: ForwarderMetrics,
    },
    /// The routing controller: no quantum hardware, only the classical
    /// control plane.
    Controller { next_req_id: u32, next_path_id: u32 },
}

pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub cchannels: Vec<CChannelId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn repeater(id: NodeId, name: impl Into<String>) -> Self {
        Node {
            id,
            name: name.into(),
            cchannels: Vec::new(),
            kind: NodeKind::Repeater {
                qchannels: Vec::new(),
                memories: Vec::new(),
                fib: ForwardingInformationBase::default(),
                link_metrics: LinkLayerMetrics::default(),
                fwd_metrics: ForwarderMetrics::default(),
            },
        }
    }

    pub fn controller(id: NodeId, name: impl Into<String>) -> Self {
        Node { id, name: name.into(), cchannels: Vec::new(), kind: NodeKind::Controller { next_req_id: 0, next_path_id: 0 } }
    }

    pub fn is_controller(&self) -> bool {
        matches!(self.kind, NodeKind::Controller { .. })
    }

    /// Index of `channel` among this node's quantum channels, which is
    /// also the index of the `Memory` dedicated to it.
    pub fn qchannel_slot(&self, channel: ChannelId) -> Option<usize> {
        match &self.kind {
            NodeKind::Repeater { qchannels, .. } => qchannels.iter().position(|c| *c == channel),
            NodeKind::Controller { .. } => None,
        }
    }
}

/// Registers a quantum channel both in the shared channel arena's bookkeeping
/// and on the two endpoint nodes, giving each a dedicated `Memory`.
pub fn attach_qchannel(a: &mut Node, b: &mut Node, channel: ChannelId, capacity: usize, t_coh_secs: f64) {
    for node in [a, b] {
        if let NodeKind::Repeater { qchannels, memories, .. } = &mut node.kind {
            qchannels.push(channel);
            memories.push(Memory::new(capacity, t_coh_secs));
        }
    }
}
