extern crate qrepeater_sim;

#[cfg(test)]
mod tests {
    use qrepeater_sim::config::{ChannelConfig, MemoryConfig};
    use qrepeater_sim::mux::MuxKind;
    use qrepeater_sim::node::NodeKind;
    use qrepeater_sim::simulator::Simulator;

    /// A-B-C chain with a short A-B link and a long B-C link, and a tight
    /// `WaitTime` cut-off budget on the middle node only. The half-EPR B
    /// holds towards A arrives long before the one towards C, so it should
    /// repeatedly age out of its cut-off window while waiting for a swap
    /// partner rather than sit eligible forever.
    #[test]
    fn short_leg_ages_out_while_long_leg_is_still_in_flight() {
        let memory_cfg = MemoryConfig { capacity: 4, t_coh_secs: 2.0, init_fidelity: 0.99 };
        let mut sim = Simulator::new(1.0, 2_000_000, 7).with_memory_config(memory_cfg).with_swap_success_prob(1.0);

        let _controller = sim.add_controller("controller");
        let a = sim.add_repeater("a");
        let b = sim.add_repeater("b");
        let c = sim.add_repeater("c");

        let short = ChannelConfig { length_km: 5.0, ..Default::default() };
        let long = ChannelConfig { length_km: 100_000.0, ..Default::default() };
        sim.add_qchannel(a, b, short).unwrap();
        sim.add_qchannel(b, c, long).unwrap();
        sim.add_cchannel(a, b, 5.0);
        sim.add_cchannel(b, c, 5.0);

        let route = vec![a, b, c];
        let swap_sequence = vec![2, 0, 2];
        // Only the middle node (route index 1) is given a tight cut-off
        // budget; the endpoints keep waiting indefinitely.
        let swap_cutoff = vec![None, Some(2_000), None];
        sim.install_path(
            qrepeater_sim::ids::ReqId(0),
            vec![route],
            vec![swap_sequence],
            MuxKind::BufferSpace,
            vec![0, 0, 0],
            swap_cutoff,
        )
        .unwrap();

        sim.run();

        let NodeKind::Repeater { fwd_metrics, .. } = &sim.node(b).kind else { panic!("expected repeater") };
        assert!(fwd_metrics.n_cutoff >= 1, "middle node never aged a qubit out of its cut-off window");
    }
}
