//! Typed, `serde`-deserializable configuration surface.
//!
//! The specification excludes topology JSON loading from scope, but not a
//! typed configuration layer: callers build scenarios in code or
//! deserialize these structs from any `serde` source of their choosing.
//! Defaults mirror the physical constants in the specification (§6) and
//! the `LinkLayer`/`QuantumMemory` constructor defaults in
//! `qns/network/protocol/link_layer.py` and
//! `qns/entity/memory/memory.py`.

/// Speed of light in fibre, in km/s. `c_fiber = 2e5 km/s`.
pub const C_FIBER_KM_PER_SEC: f64 = 2.0e5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Physical length in kilometres.
    pub length_km: f64,
    /// Fibre attenuation coefficient, dB/km.
    pub alpha_db_per_km: f64,
    /// Detector efficiency `eta_d`.
    pub eta_d: f64,
    /// Source efficiency `eta_s`.
    pub eta_s: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig { length_km: 10.0, alpha_db_per_km: 0.2, eta_d: 0.9, eta_s: 0.9 }
    }
}

impl ChannelConfig {
    /// Fibre propagation delay in seconds: `tau = L / c_fiber`.
    pub fn tau_secs(&self) -> f64 {
        self.length_km / C_FIBER_KM_PER_SEC
    }

    /// Elementary-entanglement success probability per attempt:
    /// `p = 0.5 * eta_s^2 * eta_d^2 * 10^(-alpha*L/10)`.
    pub fn loss_based_success_prob(&self) -> f64 {
        0.5 * self.eta_s.powi(2)
            * self.eta_d.powi(2)
            * 10f64.powf(-self.alpha_db_per_km * self.length_km / 10.0)
    }

    /// Is elementary entanglement even feasible given the memory's
    /// coherence time? Mirrors the `qchannel.length < 2*light_speed*t_mem`
    /// check in `LinkLayer.generate_entanglement`.
    pub fn feasible(&self, t_coh_secs: f64) -> bool {
        self.length_km < 2.0 * C_FIBER_KM_PER_SEC * t_coh_secs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub capacity: usize,
    /// Coherence time in seconds; `decoherence_rate = 1 / t_coh_secs`.
    pub t_coh_secs: f64,
    pub init_fidelity: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig { capacity: 4, t_coh_secs: 1.0, init_fidelity: 0.99 }
    }
}

impl MemoryConfig {
    pub fn decoherence_rate(&self) -> f64 {
        1.0 / self.t_coh_secs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkLayerConfig {
    /// Attempts per second, used both for negotiation staggering and as
    /// the floor on attempt cadence (`1/frequency`).
    pub attempt_rate: f64,
    pub frequency: f64,
}

impl Default for LinkLayerConfig {
    fn default() -> Self {
        LinkLayerConfig { attempt_rate: 1000.0, frequency: 1000.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// `k` in k-shortest-paths for `MRSP_DYNAMIC`.
    pub k_paths: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig { k_paths: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn loss_based_success_prob_matches_formula() {
        let c = ChannelConfig { length_km: 10.0, alpha_db_per_km: 0.2, eta_d: 0.9, eta_s: 0.9 };
        let expected = 0.5 * 0.9f64.powi(2) * 0.9f64.powi(2) * 10f64.powf(-0.2 * 10.0 / 10.0);
        assert_relative_eq!(c.loss_based_success_prob(), expected, epsilon = 1e-12);
    }

    #[test]
    fn feasibility_check_rejects_long_channels() {
        let c = ChannelConfig { length_km: 1.0e9, ..Default::default() };
        assert!(!c.feasible(1.0));
    }
}
