//! The per-node link layer: elementary entanglement generation.
//!
//! Grounded on `qns/network/protocol/link_layer.py`'s `LinkLayer`. The
//! original couples attempt scheduling to a running simulator instance
//! through `self._simulator`; here the same computations
//! (`skip_ahead_entanglement`, `loss_based_success_prob`) are exposed as
//! free functions over a channel's config and the shared `Rng`, and the
//! `Simulator`'s event loop is the only thing that actually schedules
//! their results.

use crate::config::{ChannelConfig, LinkLayerConfig};
use crate::rng::Rng;

/// Outcome of `skip_ahead_entanglement`: how many slots from now the
/// successful attempt lands, and how many attempts were "skipped over" by
/// sampling the geometric distribution directly (useful for the
/// `n_attempts` counter without simulating every failed attempt).
#[derive(Debug, Clone, Copy)]
pub struct SkipAheadResult {
    pub attempts: u64,
    pub delay_secs: f64,
}

/// `max(4.5*tau, 1/frequency)`: the minimum spacing between attempts.
pub fn attempt_duration_secs(channel: &ChannelConfig, link: &LinkLayerConfig) -> f64 {
    (4.5 * channel.tau_secs()).max(1.0 / link.frequency)
}

/// Sample the attempt at which elementary entanglement succeeds, and the
/// simulated delay (in seconds) until that success is observed locally:
/// `t_success = (k-1)*attempt_duration + 5*tau`, where `k` is drawn from
/// `Geometric(p)` with `p` the per-attempt loss-based success probability.
pub fn skip_ahead_entanglement(channel: &ChannelConfig, link: &LinkLayerConfig, rng: &mut Rng) -> SkipAheadResult {
    let p = channel.loss_based_success_prob();
    let k = rng.geometric(p);
    let duration = attempt_duration_secs(channel, link);
    let delay = (k - 1) as f64 * duration + 5.0 * channel.tau_secs();
    SkipAheadResult { attempts: k, delay_secs: delay }
}

/// Staggering offset for the `i`-th slot's negotiation start on
/// `handle_active_channel`, in seconds: `i / attempt_rate`.
pub fn negotiation_stagger_secs(link: &LinkLayerConfig, slot_index: usize) -> f64 {
    slot_index as f64 / link.attempt_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_duration_is_floored_by_frequency() {
        let channel = ChannelConfig { length_km: 0.001, ..Default::default() };
        let link = LinkLayerConfig { attempt_rate: 1000.0, frequency: 10.0 };
        assert_eq!(attempt_duration_secs(&channel, &link), 0.1);
    }

    #[test]
    fn skip_ahead_delay_grows_with_more_attempts() {
        let channel = ChannelConfig::default();
        let link = LinkLayerConfig::default();
        let mut rng = Rng::seed(7);
        let low = skip_ahead_entanglement(&channel, &link, &mut rng);
        assert!(low.delay_secs >= 5.0 * channel.tau_secs());
    }
}
