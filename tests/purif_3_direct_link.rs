extern crate qrepeater_sim;

#[cfg(test)]
mod tests {
    use qrepeater_sim::config::{ChannelConfig, MemoryConfig};
    use qrepeater_sim::mux::MuxKind;
    use qrepeater_sim::node::NodeKind;
    use qrepeater_sim::simulator::Simulator;

    /// A direct two-node link with one purification round configured at
    /// both endpoints: every successfully entangled pair should be merged
    /// with another before being handed to the endpoints as consumable
    /// end-to-end EPRs, so fidelity should trend above the unpurified
    /// per-attempt value.
    #[test]
    fn purification_round_runs_before_consumption() {
        let memory_cfg = MemoryConfig { capacity: 8, t_coh_secs: 1.0, init_fidelity: 0.9 };
        let mut sim = Simulator::new(1.0, 1_000_000, 11).with_memory_config(memory_cfg).with_swap_success_prob(1.0);

        let _controller = sim.add_controller("controller");
        let a = sim.add_repeater("a");
        let b = sim.add_repeater("b");

        let short = ChannelConfig { length_km: 5.0, ..Default::default() };
        sim.add_qchannel(a, b, short).unwrap();
        sim.add_cchannel(a, b, 5.0);

        let route = vec![a, b];
        let swap_sequence = vec![0, 0];
        sim.install_path(
            qrepeater_sim::ids::ReqId(0),
            vec![route],
            vec![swap_sequence],
            MuxKind::BufferSpace,
            vec![1, 1],
            vec![None, None],
        )
        .unwrap();

        sim.run();

        for node in [a, b] {
            let NodeKind::Repeater { fwd_metrics, .. } = &sim.node(node).kind else { panic!("expected repeater") };
            assert!(fwd_metrics.n_purif >= 1, "node {node:?} never entered purification");
            assert!(fwd_metrics.n_consumed >= 1, "node {node:?} never consumed a purified EPR");
        }
    }
}
