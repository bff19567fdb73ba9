extern crate qrepeater_sim;

#[cfg(test)]
mod tests {
    use qrepeater_sim::config::{ChannelConfig, MemoryConfig};
    use qrepeater_sim::mux::MuxKind;
    use qrepeater_sim::node::NodeKind;
    use qrepeater_sim::simulator::Simulator;

    /// A-B-C chain, `swap_1` ordering (the middle node swaps as soon as
    /// both its halves are eligible). Drives the whole link layer —
    /// negotiation, skip-ahead entanglement, swap, SWAP_UPDATE delivery —
    /// end to end. Topology and duration match the 3-node linear scenario
    /// (T_coh=0.1s, L=[32,18] km, capacity=3, f_init=0.99, 10 s), whose
    /// expected throughput is ~50 EPRs/s at each endpoint: a single EPR
    /// per memory slot for the whole run would land nowhere near that, so
    /// this is the regression check for sustained link-layer regeneration.
    type ChainNodes = (qrepeater_sim::ids::NodeId, qrepeater_sim::ids::NodeId, qrepeater_sim::ids::NodeId);

    const RUN_SECS: f64 = 10.0;
    const EXPECTED_EPS: f64 = 50.0;

    fn build_chain(seed: u64) -> (Simulator, ChainNodes) {
        let memory_cfg = MemoryConfig { capacity: 3, t_coh_secs: 0.1, init_fidelity: 0.99 };
        let mut sim = Simulator::new(RUN_SECS, 1_000_000, seed).with_memory_config(memory_cfg).with_swap_success_prob(1.0);

        let _controller = sim.add_controller("controller");
        let a = sim.add_repeater("a");
        let b = sim.add_repeater("b");
        let c = sim.add_repeater("c");

        sim.add_qchannel(a, b, ChannelConfig { length_km: 32.0, ..Default::default() }).unwrap();
        sim.add_qchannel(b, c, ChannelConfig { length_km: 18.0, ..Default::default() }).unwrap();
        sim.add_cchannel(a, b, 5.0);
        sim.add_cchannel(b, c, 5.0);

        let route = vec![a, b, c];
        let swap_sequence = vec![2, 0, 2];
        sim.install_path(
            qrepeater_sim::ids::ReqId(0),
            vec![route],
            vec![swap_sequence],
            MuxKind::BufferSpace,
            vec![0, 0, 0],
            vec![None, None, None],
        )
        .unwrap();

        (sim, (a, b, c))
    }

    #[test]
    fn end_to_end_epr_is_consumed_at_both_endpoints() {
        let (mut sim, (a, b, c)) = build_chain(100);
        sim.run();

        let expected = EXPECTED_EPS * RUN_SECS;
        let lo = expected * 0.9;
        let hi = expected * 1.1;

        for node in [a, c] {
            let NodeKind::Repeater { fwd_metrics, .. } = &sim.node(node).kind else { panic!("expected repeater") };
            let n = fwd_metrics.n_consumed as f64;
            assert!(
                n >= lo && n <= hi,
                "endpoint {node:?} consumed {n} EPRs, expected {lo}..={hi} (~{EXPECTED_EPS} eps over {RUN_SECS}s) — \
                 a single EPR per memory slot for the whole run would fall far short of this, so this also \
                 exercises link-layer regeneration after a slot is freed"
            );
            let avg = fwd_metrics.consumed_avg_fidelity();
            assert!(avg >= 0.90, "mean fidelity {avg} below the scenario's expected floor");
        }

        let NodeKind::Repeater { fwd_metrics, .. } = &sim.node(b).kind else { panic!("expected repeater") };
        assert!(fwd_metrics.n_swapped as f64 >= lo, "middle node only swapped {} times, expected at least {lo}", fwd_metrics.n_swapped);
    }

    #[test]
    fn different_seeds_still_sustain_throughput() {
        // A weaker per-seed bound than the ±10% scenario check above, but
        // still far above what one-shot-per-slot generation could ever
        // reach (3 memory slots, capacity=3 each): sustained regeneration
        // must be happening regardless of seed.
        let floor = EXPECTED_EPS * RUN_SECS * 0.5;
        for seed in [1, 2, 3, 7, 99] {
            let (mut sim, (a, _b, c)) = build_chain(seed);
            sim.run();
            for node in [a, c] {
                let NodeKind::Repeater { fwd_metrics, .. } = &sim.node(node).kind else { panic!("expected repeater") };
                let n = fwd_metrics.n_consumed as f64;
                assert!(n >= floor, "seed {seed}: endpoint {node:?} only consumed {n} EPRs, expected at least {floor}");
            }
        }
    }
}
