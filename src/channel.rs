//! Quantum and classical channels.
//!
//! Grounded on `qns/entity/base_channel.py`'s `BaseChannel`: endpoints,
//! length, and a delay model. Bandwidth/buffer/drop-rate queueing from the
//! original base class is out of scope here (the specification models
//! classical messages as in-process events carrying only propagation
//! delay); what's kept is the propagation-delay computation and the
//! endpoint pairing the rest of the simulator relies on.

use crate::config::ChannelConfig;
use crate::ids::NodeId;

pub struct QChannel {
    pub node_a: NodeId,
    pub node_b: NodeId,
    pub config: ChannelConfig,
}

impl QChannel {
    pub fn other_end(&self, from: NodeId) -> NodeId {
        if from == self.node_a {
            self.node_b
        } else {
            self.node_a
        }
    }

    pub fn tau_secs(&self) -> f64 {
        self.config.tau_secs()
    }
}

pub struct CChannel {
    pub node_a: NodeId,
    pub node_b: NodeId,
    pub length_km: f64,
}

impl CChannel {
    pub fn other_end(&self, from: NodeId) -> NodeId {
        if from == self.node_a {
            self.node_b
        } else {
            self.node_a
        }
    }

    /// Propagation delay in seconds, `L / c_fiber`.
    pub fn delay_secs(&self) -> f64 {
        self.length_km / crate::config::C_FIBER_KM_PER_SEC
    }
}
