//! The simulator: the arena of entities plus the event loop tying every
//! layer together.
//!
//! Grounded on `qns/simulator/simulator.py` (not itself present in the
//! filtered sources, but described by every module that calls
//! `self._simulator.add_event`/`self._simulator.tc`) and on
//! `mqns/simulator/pool.py`'s run loop. Where the original lets each
//! `Application` reach back into a shared mutable `Simulator` object, this
//! implementation inverts that: the `Simulator` owns every node, channel
//! and the scheduler, and drives dispatch itself by matching on
//! [`EventKind`], calling into the free functions in
//! [`crate::link_layer`], [`crate::forwarder`], [`crate::mux`] and
//! [`crate::cutoff`] that hold the actual policy logic.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::channel::{CChannel, QChannel};
use crate::config::{ChannelConfig, LinkLayerConfig, MemoryConfig};
use crate::error::{Result, SimError};
use crate::event::EventKind;
use crate::fib::FibEntry;
use crate::ids::{CChannelId, ChannelId, NodeId, PathId, ReqId};
use crate::memory::QubitState;
use crate::message::{ClassicalMessage, PathInstructions};
use crate::mux::MuxKind;
use crate::node::{attach_qchannel, Node, NodeKind};
use crate::rng::Rng;
use crate::scheduler::Scheduler;
use crate::time::{secs_to_slots, TimeSlot};
use crate::timing::TimingMode;

pub struct Simulator {
    pub accuracy: u64,
    pub scheduler: Scheduler,
    pub rng: Rng,
    pub timing: TimingMode,
    nodes: Vec<Node>,
    qchannels: Vec<QChannel>,
    cchannels: Vec<CChannel>,
    memory_config: MemoryConfig,
    link_config: LinkLayerConfig,
    swap_success_prob: f64,
}

impl Simulator {
    pub fn new(run_secs: f64, accuracy: u64, seed: u64) -> Self {
        Simulator {
            accuracy,
            scheduler: Scheduler::new(TimeSlot(secs_to_slots(accuracy, run_secs))),
            rng: Rng::seed(seed),
            timing: TimingMode::Async,
            nodes: Vec::new(),
            qchannels: Vec::new(),
            cchannels: Vec::new(),
            memory_config: MemoryConfig::default(),
            link_config: LinkLayerConfig::default(),
            swap_success_prob: 1.0,
        }
    }

    pub fn with_memory_config(mut self, cfg: MemoryConfig) -> Self {
        self.memory_config = cfg;
        self
    }

    pub fn with_link_config(mut self, cfg: LinkLayerConfig) -> Self {
        self.link_config = cfg;
        self
    }

    pub fn with_swap_success_prob(mut self, p: f64) -> Self {
        self.swap_success_prob = p;
        self
    }

    pub fn with_timing(mut self, mode: TimingMode) -> Self {
        self.timing = mode;
        self
    }

    pub fn add_repeater(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::repeater(id, name));
        id
    }

    pub fn add_controller(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::controller(id, name));
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn add_qchannel(&mut self, a: NodeId, b: NodeId, config: ChannelConfig) -> Result<ChannelId> {
        if !config.feasible(self.memory_config.t_coh_secs) {
            return Err(SimError::InfeasibleChannel {
                node_a: self.nodes[a.index()].name.clone(),
                node_b: self.nodes[b.index()].name.clone(),
                length_km: config.length_km,
            });
        }
        let id = ChannelId(self.qchannels.len() as u32);
        self.qchannels.push(QChannel { node_a: a, node_b: b, config });
        let capacity = self.memory_config.capacity;
        let t_coh = self.memory_config.t_coh_secs;
        let (left, right) = index_pair_mut(&mut self.nodes, a.index(), b.index());
        attach_qchannel(left, right, id, capacity, t_coh);
        Ok(id)
    }

    pub fn add_cchannel(&mut self, a: NodeId, b: NodeId, length_km: f64) -> CChannelId {
        let id = CChannelId(self.cchannels.len() as u32);
        self.cchannels.push(CChannel { node_a: a, node_b: b, length_km });
        self.nodes[a.index()].cchannels.push(id);
        self.nodes[b.index()].cchannels.push(id);
        id
    }

    fn cchannel_between(&self, a: NodeId, b: NodeId) -> Option<CChannelId> {
        self.cchannels.iter().position(|c| (c.node_a == a && c.node_b == b) || (c.node_a == b && c.node_b == a)).map(|i| CChannelId(i as u32))
    }

    fn qchannel_between(&self, a: NodeId, b: NodeId) -> Option<ChannelId> {
        self.qchannels.iter().position(|c| (c.node_a == a && c.node_b == b) || (c.node_a == b && c.node_b == a)).map(|i| ChannelId(i as u32))
    }

    fn send_classical(&mut self, from: NodeId, to: NodeId, msg: ClassicalMessage) -> Result<()> {
        let via = self.cchannel_between(from, to).ok_or_else(|| SimError::InvalidTopology(format!("no classical channel between {from} and {to}")))?;
        let delay_secs = self.cchannels[via.index()].delay_secs();
        let t = self.scheduler.tc() + secs_to_slots(self.accuracy, delay_secs);
        self.scheduler.add_event(t, EventKind::ClassicalDelivery { from, to, via, msg })?;
        Ok(())
    }

    /// Install a single-path (`SRSP`) or multi-path (`MRSP_DYNAMIC`)
    /// request: assign path id(s), build per-node instructions and send
    /// `INSTALL_PATH` to every node on each route. Grounded on
    /// `ProactiveRoutingControllerApp`'s `install_path`/`_send_instructions`.
    pub fn install_path(&mut self, req_id: ReqId, routes: Vec<Vec<NodeId>>, swap_sequences: Vec<Vec<u32>>, mux: MuxKind, purif_rounds: Vec<u32>, swap_cutoff: Vec<Option<u64>>) -> Result<Vec<PathId>> {
        if routes.len() != swap_sequences.len() {
            return Err(SimError::VectorLengthMismatch { field: "swap_sequences", expected: routes.len(), actual: swap_sequences.len() });
        }
        let mut path_ids = Vec::new();
        for (route, swap_sequence) in routes.into_iter().zip(swap_sequences) {
            if swap_sequence.len() != route.len() {
                return Err(SimError::VectorLengthMismatch { field: "swap_sequence", expected: route.len(), actual: swap_sequence.len() });
            }
            let path_id = self.next_path_id()?;
            for (own_idx, &node) in route.iter().enumerate() {
                let instructions = PathInstructions {
                    route: route.clone(),
                    swap_sequence: swap_sequence.clone(),
                    swap_cutoff: swap_cutoff.clone(),
                    purif_rounds: purif_rounds.clone(),
                    mux,
                };
                self.apply_install(node, path_id, req_id, own_idx, instructions)?;
            }
            path_ids.push(path_id);
        }
        Ok(path_ids)
    }

    fn next_path_id(&mut self) -> Result<PathId> {
        for node in &mut self.nodes {
            if let NodeKind::Controller { next_path_id, .. } = &mut node.kind {
                let id = PathId(*next_path_id);
                *next_path_id += 1;
                return Ok(id);
            }
        }
        Err(SimError::InvalidTopology("no controller node installed".into()))
    }

    fn apply_install(&mut self, node: NodeId, path_id: PathId, req_id: ReqId, own_idx: usize, instr: PathInstructions) -> Result<()> {
        // The memories this node dedicates to the path: one per neighboring
        // hop on the route it is actually responsible for relaying through.
        let mut neighbor_mem_idxs = Vec::new();
        for neighbor in [(own_idx > 0).then(|| instr.route[own_idx - 1]), instr.route.get(own_idx + 1).copied()].into_iter().flatten() {
            if let Some(channel) = self.qchannel_between(node, neighbor) {
                if let Some(mem_idx) = self.nodes[node.index()].qchannel_slot(channel) {
                    neighbor_mem_idxs.push(mem_idx);
                }
            }
        }

        // For `DynamicEpr`/`Statistical` muxing, no address is bound to
        // this path; it just joins the memory's shared candidate pool.
        // Negotiation on that memory's still-empty addresses only needs
        // kicking off once, by whichever path registers the first
        // candidate.
        let mut first_shared_mem_idxs = Vec::new();

        let n = &mut self.nodes[node.index()];
        match &mut n.kind {
            NodeKind::Repeater { memories, fib, qchannels, .. } => {
                match instr.mux {
                    MuxKind::BufferSpace => {
                        for mem_idx in &neighbor_mem_idxs {
                            if let Some(mem) = memories.get_mut(*mem_idx) {
                                mem.allocate(path_id);
                            }
                        }
                    }
                    MuxKind::DynamicEpr { .. } | MuxKind::Statistical => {
                        for mem_idx in &neighbor_mem_idxs {
                            if let Some(mem) = memories.get_mut(*mem_idx) {
                                if mem.register_candidate(path_id, instr.swap_sequence.len(), instr.mux) {
                                    first_shared_mem_idxs.push(*mem_idx);
                                }
                            }
                        }
                    }
                }
                let _ = qchannels;
                fib.add_entry(FibEntry {
                    path_id,
                    req_id,
                    route: instr.route.clone(),
                    own_idx,
                    swap_sequence: instr.swap_sequence.clone(),
                    swap_cutoff: instr.swap_cutoff.clone(),
                    purif_rounds: instr.purif_rounds.clone(),
                    mux: instr.mux,
                    swapped_self: 0,
                    swap_disabled: false,
                });
                debug!(node = %n.name, %path_id, "installed path");
            }
            NodeKind::Controller { .. } => return Ok(()),
        }

        // This node drives entanglement generation on a channel exactly
        // when it is the lower-id endpoint, so each link is activated from
        // one side only. Mirrors `handle_active_channel`'s per-slot
        // negotiation staggering in `link_layer.py`; the explicit
        // EPR_INIT/EPR_OK handshake collapses here since both ends already
        // agree on the slot address deterministically from `INSTALL_PATH`.
        for neighbor in [(own_idx > 0).then(|| instr.route[own_idx - 1]), instr.route.get(own_idx + 1).copied()].into_iter().flatten() {
            if neighbor.index() <= node.index() {
                continue;
            }
            let Some(channel) = self.qchannel_between(node, neighbor) else { continue };
            let Some(mem_idx) = self.nodes[node.index()].qchannel_slot(channel) else { continue };
            let addrs: Vec<usize> = match instr.mux {
                MuxKind::BufferSpace => {
                    let NodeKind::Repeater { memories, .. } = &self.nodes[node.index()].kind else { continue };
                    let Some(mem) = memories.get(mem_idx) else { continue };
                    mem.slot_bound_to(path_id).into_iter().collect()
                }
                MuxKind::DynamicEpr { .. } | MuxKind::Statistical => {
                    if !first_shared_mem_idxs.contains(&mem_idx) {
                        continue;
                    }
                    let NodeKind::Repeater { memories, .. } = &self.nodes[node.index()].kind else { continue };
                    let Some(mem) = memories.get(mem_idx) else { continue };
                    mem.unbound_empty_addrs()
                }
            };
            for addr in addrs {
                let stagger = crate::link_layer::negotiation_stagger_secs(&self.link_config, addr);
                let t = self.scheduler.tc() + secs_to_slots(self.accuracy, stagger);
                let slot = crate::ids::SlotId(addr as u32);
                let _ = self.scheduler.add_event(t, EventKind::StartNegotiation { node, channel, slot });
            }
        }
        Ok(())
    }

    fn on_start_negotiation(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId) {
        let qc = &self.qchannels[channel.index()];
        let skip = crate::link_layer::skip_ahead_entanglement(&qc.config, &self.link_config, &mut self.rng);
        let Some(mem_idx) = self.nodes[node.index()].qchannel_slot(channel) else { return };
        let path_id = {
            let NodeKind::Repeater { memories, link_metrics, .. } = &mut self.nodes[node.index()].kind else { return };
            link_metrics.n_attempts += skip.attempts;
            let Some(mem) = memories.get(mem_idx) else { return };
            // A statically-bound (`BufferSpace`) slot carries its own
            // path_id; a shared `DynamicEpr`/`Statistical` slot carries
            // none, so any one of its registered candidates anchors the
            // event chain (the EPR's `tmp_path_ids` is what actually
            // tracks membership from here on).
            mem.slot(slot.index()).path_id.or_else(|| mem.shared_candidates.iter().map(|(p, _)| *p).min())
        };
        let Some(path_id) = path_id else { return };
        let t = now + secs_to_slots(self.accuracy, skip.delay_secs);
        let _ = self.scheduler.add_event(t, EventKind::SuccessfulAttempt { node, channel, slot, path_id });
    }

    pub fn uninstall_path(&mut self, node: NodeId, path_id: PathId) {
        if let NodeKind::Repeater { fib, .. } = &mut self.nodes[node.index()].kind {
            fib.delete_entry(path_id);
        }
    }

    /// Run the simulator to completion, invoking every scheduled event in
    /// order. Mirrors `DefaultEventPool`'s drain loop.
    pub fn run(&mut self) {
        while let Some(ev) = self.scheduler.next_event() {
            self.dispatch(ev.t, ev.kind);
        }
    }

    fn dispatch(&mut self, now: TimeSlot, kind: EventKind) {
        match kind {
            EventKind::SuccessfulAttempt { node, channel, slot, path_id } => self.on_successful_attempt(now, node, channel, slot, path_id),
            EventKind::QubitEntangled { node, channel, slot, path_id } => self.on_qubit_entangled(now, node, channel, slot, path_id),
            EventKind::QubitDecohered { node, channel, slot, epr_name } => self.on_qubit_decohered(now, node, channel, slot, epr_name),
            EventKind::QubitReleased { node, channel, slot } => self.on_qubit_released(now, node, channel, slot),
            EventKind::StartNegotiation { node, channel, slot } => self.on_start_negotiation(now, node, channel, slot),
            EventKind::CutoffExpired { node, channel, slot, path_id } => self.on_cutoff_expired(now, node, channel, slot, path_id),
            EventKind::ClassicalDelivery { from, to, msg, .. } => self.on_classical_delivery(now, from, to, msg),
            EventKind::TimingPhase { phase, ends_at } => {
                debug!(?phase, ends_at = ends_at.slots(), "timing phase change");
            }
        }
    }

    /// Build the elementary EPR, write one half into this node's memory and
    /// the other into the remote endpoint's (both ends of a quantum
    /// channel learn of the pair at the same simulated instant, per
    /// `LinkLayer.generate_entanglement`'s pairwise write), then notify
    /// both forwarders after one propagation delay.
    fn on_successful_attempt(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId, path_id: PathId) {
        let qc = &self.qchannels[channel.index()];
        let fidelity = self.memory_config.init_fidelity;
        let name = uuid::Uuid::new_v4().to_string();
        let other = qc.other_end(node);
        let tau_secs = qc.tau_secs();

        let Some(mem_idx) = self.nodes[node.index()].qchannel_slot(channel) else { return };

        // A slot shared by several `DynamicEpr`/`Statistical` candidates
        // carries the full candidate set on the freshly entangled EPR;
        // `DynamicEpr` narrows it to one right away (`bind_path_on_entanglement`),
        // `Statistical` keeps the whole set until two halves are paired for
        // a swap (`mux::intersect_tmp_path_ids`). A `BufferSpace` slot (or
        // one with no registered candidates) just gets its single path_id.
        let tmp_path_ids = {
            let NodeKind::Repeater { memories, .. } = &self.nodes[node.index()].kind else { return };
            let Some(mem) = memories.get(mem_idx) else { return };
            if mem.shared_candidates.is_empty() {
                BTreeSet::from([path_id])
            } else if let Some(kind @ MuxKind::DynamicEpr { .. }) = mem.mux_kind {
                crate::mux::bind_path_on_entanglement(kind, &mem.shared_candidates, &mut self.rng)
                    .map(|p| BTreeSet::from([p]))
                    .unwrap_or_else(|| BTreeSet::from([path_id]))
            } else {
                mem.shared_candidates.iter().map(|(p, _)| *p).collect()
            }
        };
        let epr = crate::epr::WernerEntanglement::new(name, node, other, fidelity, now, tmp_path_ids);

        let epr_name = epr.name.clone();
        if let NodeKind::Repeater { memories, link_metrics, .. } = &mut self.nodes[node.index()].kind {
            link_metrics.etg_count += 1;
            if let Some(mem) = memories.get_mut(mem_idx) {
                mem.write(epr.clone(), now, Some(path_id), Some(slot.index()));
            }
        }
        self.schedule_decoherence(now, node, channel, slot, epr_name.clone());
        let t = now + secs_to_slots(self.accuracy, tau_secs);
        let _ = self.scheduler.add_event(t, EventKind::QubitEntangled { node, channel, slot, path_id });

        // Mirror onto the remote endpoint, which shares the same
        // statically-allocated slot address for this path (see
        // `apply_install`'s symmetric `allocate` call on both ends).
        if let Some(other_channel) = self.qchannel_between(other, node) {
            if let Some(other_mem_idx) = self.nodes[other.index()].qchannel_slot(other_channel) {
                if let NodeKind::Repeater { memories, .. } = &mut self.nodes[other.index()].kind {
                    if let Some(mem) = memories.get_mut(other_mem_idx) {
                        mem.write(epr, now, Some(path_id), Some(slot.index()));
                    }
                }
                self.schedule_decoherence(now, other, other_channel, slot, epr_name);
                let _ = self.scheduler.add_event(t, EventKind::QubitEntangled { node: other, channel: other_channel, slot, path_id });
            }
        }
    }

    fn on_qubit_entangled(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId, path_id: PathId) {
        let name = self.nodes[node.index()].name.clone();
        let swap_prob = self.swap_success_prob;
        let accuracy = self.accuracy;
        let Some(mem_idx) = self.nodes[node.index()].qchannel_slot(channel) else { return };

        let (is_endpoint, armed) = {
            let NodeKind::Repeater { memories, fib, fwd_metrics, .. } = &mut self.nodes[node.index()].kind else { return };
            fwd_metrics.n_entg += 1;
            let Some(entry) = fib.get_entry(path_id) else {
                warn!(node = %name, %path_id, "qubit entangled for unknown path, dropping");
                return;
            };

            let mut armed = None;
            if entry.purif_rounds.get(entry.own_idx).copied().unwrap_or(0) == 0 {
                let budget = entry.swap_cutoff.get(entry.own_idx).copied().flatten();
                if let Some(mem) = memories.get_mut(mem_idx) {
                    mem.slot_mut(slot.index()).state = QubitState::Eligible;
                    fwd_metrics.n_eligible += 1;
                    armed = cutoff_window(budget, now);
                    mem.slot_mut(slot.index()).cutoff = armed;
                }
            } else if let Some(mem) = memories.get_mut(mem_idx) {
                mem.slot_mut(slot.index()).state = QubitState::Purif;
                fwd_metrics.n_purif += 1;
            }
            (entry.is_endpoint(), armed)
        };
        if let Some((_, deadline)) = armed {
            let _ = self.scheduler.add_event(deadline, EventKind::CutoffExpired { node, channel, slot, path_id });
        }

        let needs_purif = {
            let NodeKind::Repeater { memories, .. } = &self.nodes[node.index()].kind else { return };
            memories.get(mem_idx).is_some_and(|m| m.slot(slot.index()).state == QubitState::Purif)
        };

        if needs_purif {
            self.try_purify(now, node, mem_idx, path_id, accuracy);
        } else if is_endpoint {
            self.consume_if_eligible(now, node, mem_idx, slot, path_id, accuracy);
        } else {
            self.try_swap(now, node, path_id, swap_prob, accuracy);
        }
    }

    /// Pair up two qubits awaiting purification on the same memory and run
    /// one DEJMPS round. Mirrors `purif()` in `proactive_routing.py`, which
    /// itself performs a single pass and then defers straight to
    /// `eligible()` rather than cascading further rounds.
    fn try_purify(&mut self, now: TimeSlot, node: NodeId, mem_idx: usize, path_id: PathId, accuracy: u64) {
        let name = self.nodes[node.index()].name.clone();
        let swap_prob = self.swap_success_prob;

        let (addr_survivor, addr_other, combined, succeeded, is_endpoint, budget) = {
            let NodeKind::Repeater { memories, fib, fwd_metrics, .. } = &mut self.nodes[node.index()].kind else { return };
            let Some(mem) = memories.get_mut(mem_idx) else { return };
            let candidates: Vec<usize> = mem.search_purif(path_id);
            if candidates.len() < 2 {
                return;
            }
            let (a, b) = (candidates[0], candidates[1]);
            let left = mem.read(a, now, accuracy).expect("candidate has an EPR");
            let right = mem.read(b, now, accuracy).expect("candidate has an EPR");
            let outcome = crate::forwarder::purif_round(&mut self.rng, left.fidelity.min(right.fidelity));

            let Some(entry) = fib.get_entry(path_id) else { return };
            let is_endpoint = entry.is_endpoint();
            let budget = entry.swap_cutoff.get(entry.own_idx).copied().flatten();
            if !outcome.succeeded {
                fwd_metrics.n_purif_failed += 1;
                (a, b, None, false, is_endpoint, budget)
            } else {
                let path_ids = left.tmp_path_ids.intersection(&right.tmp_path_ids).copied().collect();
                let merged = crate::epr::WernerEntanglement::new(left.name.clone(), left.src, left.dst, outcome.fidelity, now, path_ids);
                (a, b, Some(merged), true, is_endpoint, budget)
            }
        };

        // `addr_other` is read out and discarded by the round either way
        // (only `addr_survivor` can end up holding the merged pair), so it
        // restarts negotiation immediately regardless of outcome.
        let channel = self.channel_for_mem(node, mem_idx);
        if let Some(channel) = channel {
            self.emit_released(now, node, channel, crate::ids::SlotId(addr_other as u32));
        }

        let mut survivor_name = None;
        let mut armed = None;
        if let NodeKind::Repeater { memories, .. } = &mut self.nodes[node.index()].kind {
            if let Some(mem) = memories.get_mut(mem_idx) {
                if let Some(epr) = combined {
                    survivor_name = Some(epr.name.clone());
                    mem.write(epr, now, Some(path_id), Some(addr_survivor));
                    mem.slot_mut(addr_survivor).state = QubitState::Eligible;
                    armed = cutoff_window(budget, now);
                    mem.slot_mut(addr_survivor).cutoff = armed;
                } else {
                    mem.slot_mut(addr_survivor).state = QubitState::Release;
                }
            }
        }
        if let Some(epr_name) = survivor_name {
            let slot_id = crate::ids::SlotId(addr_survivor as u32);
            if let Some(channel) = channel {
                self.schedule_decoherence(now, node, channel, slot_id, epr_name);
                if let Some((_, deadline)) = armed {
                    let _ = self.scheduler.add_event(deadline, EventKind::CutoffExpired { node, channel, slot: slot_id, path_id });
                }
            }
        } else if let Some(channel) = channel {
            self.emit_released(now, node, channel, crate::ids::SlotId(addr_survivor as u32));
        }
        debug!(node = %name, %path_id, succeeded, "purification round");

        if !succeeded {
            return;
        }
        let slot_id = crate::ids::SlotId(addr_survivor as u32);
        if is_endpoint {
            self.consume_if_eligible(now, node, mem_idx, slot_id, path_id, accuracy);
        } else {
            self.try_swap(now, node, path_id, swap_prob, accuracy);
        }
    }

    fn consume_if_eligible(&mut self, now: TimeSlot, node: NodeId, mem_idx: usize, slot: crate::ids::SlotId, _path_id: PathId, accuracy: u64) {
        let name = self.nodes[node.index()].name.clone();
        let consumed = {
            let NodeKind::Repeater { memories, fwd_metrics, .. } = &mut self.nodes[node.index()].kind else { return };
            let Some(mem) = memories.get_mut(mem_idx) else { return };
            if mem.slot(slot.index()).state != QubitState::Eligible {
                return;
            }
            let Some(epr) = mem.read(slot.index(), now, accuracy) else { return };
            fwd_metrics.record_consumed(epr.fidelity);
            debug!(node = %name, fidelity = epr.fidelity, "consumed end-to-end EPR");
            true
        };
        if consumed {
            if let Some(channel) = self.channel_for_mem(node, mem_idx) {
                self.emit_released(now, node, channel, slot);
            }
        }
    }

    /// Look for another eligible qubit on a different memory sharing
    /// `path_id` and, if found, perform the swap and forward the
    /// resulting `SWAP_UPDATE` toward both new remote endpoints. Mirrors
    /// `eligible()`'s intermediate-node branch and `send_swap_update()` in
    /// `proactive_routing.py`.
    fn try_swap(&mut self, now: TimeSlot, node: NodeId, path_id: PathId, swap_prob: f64, accuracy: u64) {
        let name = self.nodes[node.index()].name.clone();

        let (left, right, route, own_idx, mem_l, addr_l, mem_r, addr_r, mux) = {
            let NodeKind::Repeater { memories, fib, .. } = &mut self.nodes[node.index()].kind else { return };
            let Some(entry) = fib.get_entry(path_id) else { return };
            let route = entry.route.clone();
            let own_idx = entry.own_idx;
            let own_rank = entry.own_rank();
            let mux = entry.mux;

            // One eligible qubit per distinct memory (quantum channel): a
            // valid swap pairing needs two different neighbors, so only the
            // first eligible candidate on each memory is considered, not
            // just the first two entries found overall (a memory with
            // several eligible qubits must not crowd out a valid partner on
            // another channel). Skip any whose cut-off deadline has already
            // passed (it will be released by its own `CutoffExpired` event).
            let mut one_per_memory: Vec<(usize, usize)> = Vec::new();
            for (mem_idx, mem) in memories.iter().enumerate() {
                let candidate = mem.search_eligible(path_id).into_iter().find(|&addr| crate::cutoff::qubit_is_eligible(mem.slot(addr), now));
                if let Some(addr) = candidate {
                    one_per_memory.push((mem_idx, addr));
                }
            }
            if one_per_memory.len() < 2 {
                return;
            }
            let (mem_l, addr_l) = one_per_memory[0];
            let (mem_r, addr_r) = one_per_memory[1];

            // A node may only swap once both candidate partners (the remote
            // ends of the two held half-EPRs) are at least as far along the
            // swap schedule as itself.
            let remote_rank = |epr: &crate::epr::WernerEntanglement| -> Option<u32> {
                let remote = if epr.src == node { epr.dst } else { epr.src };
                route.iter().position(|&n| n == remote).map(|idx| entry.swap_sequence[idx])
            };
            let rank_l = memories[mem_l].slot(addr_l).epr.as_ref().and_then(remote_rank);
            let rank_r = memories[mem_r].slot(addr_r).epr.as_ref().and_then(remote_rank);
            let ready = match (rank_l, rank_r) {
                (Some(rl), Some(rr)) => crate::forwarder::eval_swapping_conditions(own_rank, rl) && crate::forwarder::eval_swapping_conditions(own_rank, rr),
                _ => false,
            };
            if !ready {
                return;
            }

            let left = memories[mem_l].read(addr_l, now, accuracy);
            let right = memories[mem_r].read(addr_r, now, accuracy);
            (left, right, route, own_idx, mem_l, addr_l, mem_r, addr_r, mux)
        };
        let (Some(left), Some(right)) = (left, right) else { return };

        // Both half-EPRs are consumed by the swap attempt regardless of
        // outcome; only the remote ends learn of the new pairing (or lack
        // of one) via `SWAP_UPDATE`, so the freed local addresses restart
        // negotiation immediately.
        if let Some(channel) = self.channel_for_mem(node, mem_l) {
            self.emit_released(now, node, channel, crate::ids::SlotId(addr_l as u32));
        }
        if let Some(channel) = self.channel_for_mem(node, mem_r) {
            self.emit_released(now, node, channel, crate::ids::SlotId(addr_r as u32));
        }

        let new_name = uuid::Uuid::new_v4().to_string();
        let outcome = crate::forwarder::perform_swap(&mut self.rng, &left, &right, swap_prob, new_name.clone(), now);

        let NodeKind::Repeater { fib, fwd_metrics, .. } = &mut self.nodes[node.index()].kind else { return };
        if !outcome.succeeded {
            fwd_metrics.n_swap_failed += 1;
            warn!(node = %name, %path_id, "swap failed");
            return;
        }
        fwd_metrics.n_swapped += 1;
        let mut new_epr = outcome.new_epr.expect("swap succeeded implies a new EPR");
        if let MuxKind::Statistical = mux {
            match crate::mux::intersect_tmp_path_ids(&left, &right) {
                Some(ids) => new_epr.tmp_path_ids = ids,
                None => {
                    fwd_metrics.n_swap_conflict += 1;
                    warn!(node = %name, %path_id, "swap conflict: no surviving candidate path");
                    return;
                }
            }
        }
        fib.bump_swapped(path_id);
        let cycle = fib.get_entry(path_id).map(|e| e.swapped_self).unwrap_or(1);
        debug!(node = %name, %path_id, new_epr = %new_name, "swap succeeded");

        for (dest, old_epr_name) in [(new_epr.src, &left.name), (new_epr.dst, &right.name)] {
            if dest == node {
                continue;
            }
            let Some(next_hop) = next_hop_towards(&route, own_idx, dest) else { continue };
            let msg = ClassicalMessage::SwapUpdate {
                path_id,
                swapping_node: node,
                partner: next_hop,
                epr_old: old_epr_name.clone(),
                epr_new: new_epr.clone(),
                results: Vec::new(),
                cycle,
                destination: dest,
            };
            if let Err(e) = self.send_classical(node, next_hop, msg) {
                warn!(node = %name, error = %e, "failed to forward swap update");
            }
        }
    }

    /// If the slot still holds the same EPR this timer was armed for,
    /// release it; otherwise it was already consumed, swapped, or
    /// overwritten and the timer is a no-op. Mirrors the original
    /// `QuantumMemory.write`'s scheduled decoherence callback.
    fn on_qubit_decohered(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId, epr_name: String) {
        let name = self.nodes[node.index()].name.clone();
        let Some(mem_idx) = self.nodes[node.index()].qchannel_slot(channel) else { return };
        let released = {
            let NodeKind::Repeater { memories, link_metrics, .. } = &mut self.nodes[node.index()].kind else { return };
            let Some(mem) = memories.get_mut(mem_idx) else { return };
            let still_current = mem.slot(slot.index()).epr.as_ref().is_some_and(|e| e.name == epr_name);
            if still_current {
                link_metrics.decoh_count += 1;
                mem.slot_mut(slot.index()).state = QubitState::Release;
                mem.slot_mut(slot.index()).epr = None;
                mem.slot_mut(slot.index()).store_time = None;
            }
            still_current
        };
        if released {
            self.restart_negotiation(now, node, channel, slot);
        }
        debug!(node = %name, slot = slot.0, epr = %epr_name, "qubit decohered");
    }

    /// Arm the coherence timer for a half-EPR just written into `slot`:
    /// schedule a `QubitDecohered` check one coherence time from now.
    fn schedule_decoherence(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId, epr_name: String) {
        let t = now + secs_to_slots(self.accuracy, self.memory_config.t_coh_secs);
        let _ = self.scheduler.add_event(t, EventKind::QubitDecohered { node, channel, slot, epr_name });
    }

    /// A memory address was explicitly freed (consumed, swapped, or
    /// dropped by a failed purification round) and may restart
    /// negotiation. Emitted at the instant of release rather than handled
    /// inline so the restart always happens, whichever call site freed
    /// the slot.
    fn on_qubit_released(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId) {
        debug!(%node, %channel, slot = slot.0, "qubit released");
        self.restart_negotiation(now, node, channel, slot);
    }

    /// Restart entanglement-generation negotiation for an address just
    /// freed by a `QubitReleased` or `QubitDecohered` event. Spec §4.3
    /// step 6: only the lower-`NodeId` endpoint of the channel drives
    /// negotiation (mirrors the initial activation in `apply_install`), so
    /// this is a no-op from the other end.
    fn restart_negotiation(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId) {
        let qc = &self.qchannels[channel.index()];
        let other = qc.other_end(node);
        if other.index() <= node.index() {
            return;
        }
        let stagger = crate::link_layer::negotiation_stagger_secs(&self.link_config, slot.index());
        let t = now + secs_to_slots(self.accuracy, stagger);
        let _ = self.scheduler.add_event(t, EventKind::StartNegotiation { node, channel, slot });
    }

    /// Schedule a `QubitReleased` event for `slot` at the current instant,
    /// so negotiation restart runs through one place regardless of which
    /// call site freed the address.
    fn emit_released(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId) {
        let _ = self.scheduler.add_event(now, EventKind::QubitReleased { node, channel, slot });
    }

    /// Resolve the `ChannelId` this node has mapped to memory `mem_idx`.
    fn channel_for_mem(&self, node: NodeId, mem_idx: usize) -> Option<ChannelId> {
        match &self.nodes[node.index()].kind {
            NodeKind::Repeater { qchannels, .. } => qchannels.get(mem_idx).copied(),
            NodeKind::Controller { .. } => None,
        }
    }

    /// A `WaitTime` cut-off window armed on reaching `Eligible` has
    /// elapsed. If the slot is still `Eligible` waiting for a swap
    /// partner on this same `path_id`, release it and count it; if it was
    /// already consumed, swapped, or released in the meantime, ignore.
    fn on_cutoff_expired(&mut self, now: TimeSlot, node: NodeId, channel: ChannelId, slot: crate::ids::SlotId, path_id: PathId) {
        let name = self.nodes[node.index()].name.clone();
        let Some(mem_idx) = self.nodes[node.index()].qchannel_slot(channel) else { return };
        let released = {
            let NodeKind::Repeater { memories, fwd_metrics, .. } = &mut self.nodes[node.index()].kind else { return };
            let Some(mem) = memories.get_mut(mem_idx) else { return };
            let still_waiting = mem.slot(slot.index()).state == QubitState::Eligible
                && mem.slot(slot.index()).epr.as_ref().is_some_and(|e| e.tmp_path_ids.contains(&path_id));
            if still_waiting {
                fwd_metrics.n_cutoff += 1;
                mem.slot_mut(slot.index()).state = QubitState::Release;
                mem.slot_mut(slot.index()).epr = None;
                mem.slot_mut(slot.index()).store_time = None;
                mem.slot_mut(slot.index()).cutoff = None;
            }
            still_waiting
        };
        if released {
            self.emit_released(now, node, channel, slot);
        }
        debug!(node = %name, %path_id, slot = slot.0, "cut-off window elapsed");
    }

    /// Apply an inbound `SWAP_UPDATE`. Mirrors `handle_signaling`'s
    /// destination branch in `proactive_routing.py`: if the message is for
    /// this node and for the next unseen cycle, the stale half-EPR is
    /// replaced by the new one and eligibility is re-evaluated (which may
    /// cascade into another swap); a message for an already-seen or future
    /// cycle is dropped as a desynchronized/stale update.
    fn on_classical_delivery(&mut self, now: TimeSlot, from: NodeId, to: NodeId, msg: ClassicalMessage) {
        let ClassicalMessage::SwapUpdate { path_id, swapping_node, partner, epr_old, epr_new, results, cycle, destination } = msg else { return };
        if destination != to {
            self.relay_swap_update(to, path_id, swapping_node, partner, epr_old, epr_new, results, cycle, destination);
            return;
        }

        let replaced_slot = {
            let NodeKind::Repeater { memories, fib, .. } = &mut self.nodes[to.index()].kind else { return };
            let Some(entry) = fib.get_entry(path_id) else { return };
            if cycle != entry.swapped_self + 1 {
                debug!(to = %to, %path_id, cycle, swapped_self = entry.swapped_self, "dropping stale or desynchronized swap update");
                return;
            }
            memories.iter().position(|m| m.find_by_name(&epr_old).is_some()).map(|mem_idx| {
                let addr = memories[mem_idx].find_by_name(&epr_old).expect("just located");
                (mem_idx, addr)
            })
        };
        let Some((mem_idx, addr)) = replaced_slot else {
            debug!(to = %to, %path_id, epr = %epr_old, "swap update for an EPR already released, dropping");
            return;
        };

        let name = self.nodes[to.index()].name.clone();
        let new_name = epr_new.name.clone();
        let (is_endpoint, armed) = {
            let NodeKind::Repeater { memories, fib, .. } = &mut self.nodes[to.index()].kind else { return };
            let budget = fib.get_entry(path_id).and_then(|e| e.swap_cutoff.get(e.own_idx).copied().flatten());
            let armed = cutoff_window(budget, now);
            let slot = memories[mem_idx].slot_mut(addr);
            slot.epr = Some(epr_new.clone());
            slot.store_time = Some(now);
            slot.state = QubitState::Eligible;
            slot.cutoff = armed;
            fib.bump_swapped(path_id);
            (fib.get_entry(path_id).map(|e| e.is_endpoint()).unwrap_or(false), armed)
        };
        debug!(from = %from, to = %to, %path_id, epr = %epr_new.name, "swap update applied");

        let slot_id = crate::ids::SlotId(addr as u32);
        if let Some(channel) = self.channel_for_mem(to, mem_idx) {
            self.schedule_decoherence(now, to, channel, slot_id, new_name);
            if let Some((_, deadline)) = armed {
                let _ = self.scheduler.add_event(deadline, EventKind::CutoffExpired { node: to, channel, slot: slot_id, path_id });
            }
        }
        if is_endpoint {
            self.consume_if_eligible(now, to, mem_idx, slot_id, path_id, self.accuracy);
        } else {
            self.try_swap(now, to, path_id, self.swap_success_prob, self.accuracy);
        }
    }

    /// A `SWAP_UPDATE` not addressed to this node passes through: append
    /// whether this node has already completed its own swap for the cycle
    /// and forward one hop closer to `destination`. Mirrors
    /// `handle_signaling`'s non-destination branch in
    /// `proactive_routing.py`.
    #[allow(clippy::too_many_arguments)]
    fn relay_swap_update(&mut self, to: NodeId, path_id: PathId, swapping_node: NodeId, partner: NodeId, epr_old: String, epr_new: crate::epr::WernerEntanglement, mut results: Vec<bool>, cycle: u32, destination: NodeId) {
        let name = self.nodes[to.index()].name.clone();
        let (route, own_idx, already_swapped) = {
            let NodeKind::Repeater { fib, .. } = &self.nodes[to.index()].kind else { return };
            let Some(entry) = fib.get_entry(path_id) else {
                debug!(node = %name, %path_id, "dropping swap update for unknown path at relay");
                return;
            };
            (entry.route.clone(), entry.own_idx, entry.swapped_self >= cycle)
        };
        results.push(already_swapped);

        let Some(next_hop) = next_hop_towards(&route, own_idx, destination) else {
            warn!(node = %name, %path_id, "cannot find a next hop to relay swap update towards destination");
            return;
        };
        let msg = ClassicalMessage::SwapUpdate { path_id, swapping_node, partner, epr_old, epr_new, results, cycle, destination };
        if let Err(e) = self.send_classical(to, next_hop, msg) {
            warn!(node = %name, error = %e, "failed to relay swap update");
        }
    }
}

/// The neighbor of `route[own_idx]` on the route to step towards `dest`,
/// which must itself appear somewhere on `route`.
fn next_hop_towards(route: &[NodeId], own_idx: usize, dest: NodeId) -> Option<NodeId> {
    let dest_idx = route.iter().position(|&n| n == dest)?;
    if dest_idx < own_idx {
        route.get(own_idx - 1).copied()
    } else if dest_idx > own_idx {
        route.get(own_idx + 1).copied()
    } else {
        None
    }
}

/// Arm a `WaitTime` cut-off window if `budget` (slots) is configured for
/// this hop; `CutoffKind::None`/`WernerAge` never arm a window.
fn cutoff_window(budget: Option<u64>, now: TimeSlot) -> Option<(TimeSlot, TimeSlot)> {
    let budget_slots = budget?;
    crate::cutoff::arm(crate::cutoff::CutoffKind::WaitTime { budget_slots }, now)
}

fn index_pair_mut<T>(v: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "cannot borrow the same node twice");
    if a < b {
        let (left, right) = v.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = v.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infeasible_channel_is_rejected_at_install() {
        let mut sim = Simulator::new(1.0, 1_000_000, 1).with_memory_config(MemoryConfig { capacity: 2, t_coh_secs: 0.001, init_fidelity: 0.9 });
        let a = sim.add_repeater("a");
        let b = sim.add_repeater("b");
        let err = sim.add_qchannel(a, b, ChannelConfig { length_km: 1.0e12, ..Default::default() });
        assert!(matches!(err, Err(SimError::InfeasibleChannel { .. })));
    }

    #[test]
    fn feasible_channel_attaches_a_memory_to_both_endpoints() {
        let mut sim = Simulator::new(1.0, 1_000_000, 1).with_memory_config(MemoryConfig { capacity: 2, t_coh_secs: 1.0, init_fidelity: 0.9 });
        let a = sim.add_repeater("a");
        let b = sim.add_repeater("b");
        sim.add_qchannel(a, b, ChannelConfig::default()).unwrap();
        if let NodeKind::Repeater { memories, .. } = &sim.node(a).kind {
            assert_eq!(memories.len(), 1);
        } else {
            panic!("expected repeater");
        }
    }
}
