//! Per-node protocol state machine.
//!
//! One [`NodeState`] per node id, created on the first event that references
//! the id. The tracker owns all states for the duration of one trace and
//! hands them over, finalized, to the metrics stage.

use std::collections::BTreeMap;

use log::{debug, warn};

use super::ledger::{ReceiveOutcome, SendOutcome, SequenceLedger};
use super::types::*;

/// Energest period assumed until the trace reports one, s
pub const DEFAULT_ENERGEST_PERIOD_SECONDS: u64 = 60;

/// Accumulated Energest ticks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnergestTicks {
    pub cpu_on: u64,
    pub cpu_sleep: u64,
    pub cpu_deep_sleep: u64,
    pub radio_tx: u64,
    pub radio_rx: u64,
    /// Radio Rx ticks of periods that started while joined
    pub radio_rx_joined: u64,
    pub total: u64,
    /// Total ticks of periods that started while joined
    pub total_joined: u64,
}

#[derive(Debug, Clone)]
pub struct NodeState {
    pub id: NodeId,
    pub joined: bool,
    /// First TSCH association
    pub tsch_join_time_ms: Option<TimestampMs>,
    /// Start of the currently open joined interval
    pub rpl_join_time_ms: Option<TimestampMs>,
    /// Sum of closed joined intervals
    pub rpl_time_joined_ms: i64,
    pub parent_switch_count: u64,
    pub current_parent: Option<String>,
    pub current_parent_lladdr: Option<String>,
    pub ledger: SequenceLedger,
    pub link_tx: u64,
    pub link_ack: u64,
    pub link_queue_dropped: u64,
    pub energest: EnergestTicks,
    /// Joined status sampled at the last Radio Rx report
    pub energest_joined: bool,
    pub energest_period_seconds: u64,
    pub energest_ticks_per_second: f64,
}

impl NodeState {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            joined: false,
            tsch_join_time_ms: None,
            rpl_join_time_ms: None,
            rpl_time_joined_ms: 0,
            parent_switch_count: 0,
            current_parent: None,
            current_parent_lladdr: None,
            ledger: SequenceLedger::new(),
            link_tx: 0,
            link_ack: 0,
            link_queue_dropped: 0,
            energest: EnergestTicks::default(),
            energest_joined: false,
            energest_period_seconds: DEFAULT_ENERGEST_PERIOD_SECONDS,
            energest_ticks_per_second: 1.0,
        }
    }

    fn join(&mut self, ts: TimestampMs) {
        self.joined = true;
        if self.rpl_join_time_ms.is_none() {
            self.rpl_join_time_ms = Some(ts);
        }
    }

    fn leave(&mut self, ts: TimestampMs) {
        self.joined = false;
        self.energest_joined = false;
        self.close_interval(ts);
    }

    /// Flush the open joined interval, if any, ending at `ts`
    fn close_interval(&mut self, ts: TimestampMs) {
        if let Some(start) = self.rpl_join_time_ms.take() {
            self.rpl_time_joined_ms = self
                .rpl_time_joined_ms
                .saturating_add(ts.saturating_sub(start).max(0));
        }
    }

    /// Whether the node spent any time joined to the DAG
    pub fn has_joined_dag(&self) -> bool {
        self.rpl_time_joined_ms > 0
    }

    fn apply_energest(&mut self, kind: &EventKind) {
        match *kind {
            EventKind::EnergestPeriod { seconds } => {
                if seconds == 0 {
                    warn!("Node {}: ignoring zero-length Energest period", self.id);
                } else {
                    self.energest_period_seconds = seconds;
                }
            }
            EventKind::EnergestTotal { ticks } => {
                self.energest.total = self.energest.total.saturating_add(ticks);
                self.energest_ticks_per_second =
                    ticks as f64 / self.energest_period_seconds as f64;
                if self.energest_joined {
                    self.energest.total_joined = self.energest.total_joined.saturating_add(ticks);
                }
            }
            EventKind::EnergestComponent { component, ticks } => {
                let e = &mut self.energest;
                let bucket = match component {
                    EnergestComponent::CpuOn => &mut e.cpu_on,
                    EnergestComponent::CpuSleep => &mut e.cpu_sleep,
                    EnergestComponent::CpuDeepSleep => &mut e.cpu_deep_sleep,
                    EnergestComponent::RadioTx => &mut e.radio_tx,
                    EnergestComponent::RadioRx => &mut e.radio_rx,
                };
                *bucket = bucket.saturating_add(ticks);
                if component == EnergestComponent::RadioRx {
                    if self.energest_joined {
                        e.radio_rx_joined = e.radio_rx_joined.saturating_add(ticks);
                    }
                    // Sampled once per report, the next period is attributed by this
                    self.energest_joined = self.joined;
                }
            }
            _ => {}
        }
    }
}

/// Node states of a fully consumed trace
#[derive(Debug, Clone)]
pub struct TrackedTrace {
    /// All nodes seen, keyed (and therefore ordered) by id
    pub nodes: BTreeMap<NodeId, NodeState>,
    /// Simulation end used to close open intervals
    pub sim_time_ms: TimestampMs,
    pub diagnostics: TraceDiagnostics,
}

/// Consumes events in trace order and maintains every node's state
#[derive(Debug, Default)]
pub struct NodeTracker {
    nodes: BTreeMap<NodeId, NodeState>,
    sim_time_ms: Option<TimestampMs>,
    diagnostics: TraceDiagnostics,
}

impl NodeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeState {
        self.nodes.entry(id).or_insert_with(|| NodeState::new(id))
    }

    /// Register a node seen on a line that carries no event
    pub fn observe(&mut self, id: NodeId) {
        self.node_mut(id);
    }

    /// Apply one event
    pub fn apply(&mut self, event: &Event) {
        self.diagnostics.events += 1;
        let ts = event.timestamp_ms;

        match &event.kind {
            EventKind::SimEnded { sim_time_ms } => {
                self.sim_time_ms = Some(*sim_time_ms);
            }
            EventKind::PacketReceived { seqnum, from_node } => {
                self.node_mut(event.node_id);
                let sender = self.node_mut(*from_node);
                match sender.ledger.record_received(*seqnum, ts) {
                    ReceiveOutcome::Delivered { .. } => {}
                    ReceiveOutcome::Duplicate => {
                        warn!(
                            "Application message with seqnum = {} from node {} already received. Must be duplicate",
                            seqnum, from_node
                        );
                        self.diagnostics.duplicate_received += 1;
                    }
                    ReceiveOutcome::Unmatched => {
                        warn!(
                            "Received seqnum = {} from node {} not in sent index",
                            seqnum, from_node
                        );
                        self.diagnostics.unmatched_received += 1;
                    }
                }
            }
            EventKind::PacketSent { seqnum } => {
                let node = self.node_mut(event.node_id);
                if node.ledger.record_sent(*seqnum, ts) == SendOutcome::Duplicate {
                    warn!(
                        "Application message with seqnum = {} from node {} already sent. Might be duplicate",
                        seqnum, event.node_id
                    );
                    self.diagnostics.duplicate_sent += 1;
                }
            }
            kind => {
                let node = self.node_mut(event.node_id);
                match kind {
                    EventKind::Associated => {
                        if node.tsch_join_time_ms.is_none() {
                            node.tsch_join_time_ms = Some(ts);
                        }
                        node.join(ts);
                    }
                    EventKind::Left => node.leave(ts),
                    EventKind::LeftNetwork => {
                        debug!("Node {} has left the network at {} seconds", node.id, ts as f64 / 1000.0);
                        node.leave(ts);
                    }
                    EventKind::ParentChanged { new, .. } => {
                        node.parent_switch_count += 1;
                        let previous = std::mem::replace(&mut node.current_parent, new.clone());
                        let previous = previous.as_deref().unwrap_or("NULL");
                        match new {
                            Some(parent) => {
                                debug!(
                                    "Node {} switched parent {} -> {} at {} seconds",
                                    node.id, previous, parent, ts as f64 / 1000.0
                                );
                                node.join(ts);
                            }
                            None => {
                                debug!(
                                    "Node {} switched parent {} -> NULL at {} seconds",
                                    node.id, previous, ts as f64 / 1000.0
                                );
                                node.leave(ts);
                            }
                        }
                    }
                    EventKind::TimeSourceUpdated { lladdr }
                    | EventKind::ParentLladdrUpdated { lladdr } => {
                        node.current_parent_lladdr = lladdr.clone();
                    }
                    EventKind::LinkStats {
                        tx,
                        ack,
                        queue_drops,
                        to_addr,
                        ..
                    } => {
                        // Only account for the current parent
                        if node.current_parent_lladdr.as_deref() == Some(to_addr.as_str()) {
                            node.link_tx = node.link_tx.saturating_add(*tx);
                            node.link_ack = node.link_ack.saturating_add(*ack);
                            node.link_queue_dropped = node.link_queue_dropped.saturating_add(*queue_drops);
                        }
                    }
                    EventKind::EnergestPeriod { .. }
                    | EventKind::EnergestTotal { .. }
                    | EventKind::EnergestComponent { .. } => node.apply_energest(kind),
                    EventKind::SimEnded { .. }
                    | EventKind::PacketSent { .. }
                    | EventKind::PacketReceived { .. } => {}
                }
            }
        }
    }

    /// Close every open joined interval and hand the states over.
    ///
    /// The end of the simulation is the reported test end, or the last framed
    /// timestamp when the trace has no end marker.
    pub fn finish(mut self, last_timestamp_ms: Option<TimestampMs>) -> TrackedTrace {
        let sim_time_ms = match self.sim_time_ms {
            Some(t) => t,
            None => {
                warn!("Could not parse the total simulation time. Using last timestamp recorded instead.");
                self.diagnostics.missing_end_marker = true;
                last_timestamp_ms.unwrap_or(0)
            }
        };

        for node in self.nodes.values_mut() {
            node.close_interval(sim_time_ms);
        }

        TrackedTrace {
            nodes: self.nodes,
            sim_time_ms,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(ts: TimestampMs, node_id: NodeId, kind: EventKind) -> Event {
        Event {
            timestamp_ms: ts,
            node_id,
            kind,
            raw: String::new(),
        }
    }

    fn parent(addr: &str) -> EventKind {
        EventKind::ParentChanged {
            old: None,
            new: Some(addr.to_string()),
        }
    }

    fn no_parent() -> EventKind {
        EventKind::ParentChanged { old: None, new: None }
    }

    #[test]
    fn test_join_leave_accumulates_time() {
        let mut tracker = NodeTracker::new();
        tracker.apply(&ev(1000, 2, parent("fe80::1")));
        // A second parent does not restart the interval
        tracker.apply(&ev(1500, 2, parent("fe80::3")));
        tracker.apply(&ev(3000, 2, no_parent()));
        tracker.apply(&ev(4000, 2, parent("fe80::1")));
        tracker.apply(&ev(4500, 2, EventKind::LeftNetwork));
        tracker.apply(&ev(6000, 0, EventKind::SimEnded { sim_time_ms: 6000 }));

        let node = tracker.node(2).unwrap();
        assert_eq!(node.parent_switch_count, 4);
        assert!(!node.joined);

        let trace = tracker.finish(Some(5000));
        let node = &trace.nodes[&2];
        assert_eq!(node.rpl_time_joined_ms, 2000 + 500);
        assert_eq!(node.rpl_join_time_ms, None);
        assert!(!trace.diagnostics.missing_end_marker);
    }

    #[test]
    fn test_open_interval_closed_at_sim_end() {
        let mut tracker = NodeTracker::new();
        tracker.apply(&ev(1000, 3, parent("fe80::1")));
        tracker.apply(&ev(500, 1, EventKind::Associated));
        tracker.apply(&ev(10_000, 0, EventKind::SimEnded { sim_time_ms: 10_000 }));
        let trace = tracker.finish(Some(9000));
        assert_eq!(trace.sim_time_ms, 10_000);
        assert_eq!(trace.nodes[&3].rpl_time_joined_ms, 9000);
        // The coordinator's interval is closed too
        assert_eq!(trace.nodes[&1].rpl_time_joined_ms, 9500);
        assert_eq!(trace.nodes[&1].tsch_join_time_ms, Some(500));
    }

    #[test]
    fn test_missing_end_marker_uses_last_timestamp() {
        let mut tracker = NodeTracker::new();
        tracker.apply(&ev(1000, 3, parent("fe80::1")));
        let trace = tracker.finish(Some(4000));
        assert!(trace.diagnostics.missing_end_marker);
        assert_eq!(trace.sim_time_ms, 4000);
        assert_eq!(trace.nodes[&3].rpl_time_joined_ms, 3000);
    }

    #[test]
    fn test_leave_without_join_is_harmless() {
        let mut tracker = NodeTracker::new();
        tracker.apply(&ev(1000, 5, no_parent()));
        tracker.apply(&ev(2000, 5, EventKind::Left));
        let trace = tracker.finish(Some(3000));
        assert_eq!(trace.nodes[&5].rpl_time_joined_ms, 0);
        assert_eq!(trace.nodes[&5].parent_switch_count, 1);
    }

    #[test]
    fn test_link_stats_gated_on_parent_lladdr() {
        let stats = |to: &str| EventKind::LinkStats {
            tx: 10,
            ack: 8,
            rx: 3,
            queue_drops: 1,
            to_addr: to.to_string(),
        };
        let mut tracker = NodeTracker::new();
        // No parent known yet
        tracker.apply(&ev(100, 4, stats("0001.0001.0001.0001")));
        tracker.apply(&ev(200, 4, EventKind::TimeSourceUpdated {
            lladdr: Some("0001.0001.0001.0001".to_string()),
        }));
        tracker.apply(&ev(300, 4, stats("0001.0001.0001.0001")));
        tracker.apply(&ev(300, 4, stats("0002.0002.0002.0002")));
        tracker.apply(&ev(400, 4, EventKind::ParentLladdrUpdated {
            lladdr: Some("0002.0002.0002.0002".to_string()),
        }));
        tracker.apply(&ev(500, 4, stats("0002.0002.0002.0002")));

        let node = tracker.node(4).unwrap();
        assert_eq!(node.link_tx, 20);
        assert_eq!(node.link_ack, 16);
        assert_eq!(node.link_queue_dropped, 2);
    }

    #[test]
    fn test_packets_tracked_on_sender() {
        let mut tracker = NodeTracker::new();
        tracker.apply(&ev(100, 4, EventKind::PacketSent { seqnum: 1 }));
        tracker.apply(&ev(100, 4, EventKind::PacketSent { seqnum: 1 }));
        tracker.apply(&ev(150, 1, EventKind::PacketReceived { seqnum: 1, from_node: 4 }));
        tracker.apply(&ev(160, 1, EventKind::PacketReceived { seqnum: 1, from_node: 4 }));
        tracker.apply(&ev(170, 1, EventKind::PacketReceived { seqnum: 9, from_node: 4 }));
        // Receive for a node never seen creates its state
        tracker.apply(&ev(180, 1, EventKind::PacketReceived { seqnum: 2, from_node: 6 }));

        let trace = tracker.finish(Some(200));
        let node = &trace.nodes[&4];
        assert_eq!(node.ledger.sent_count(), 1);
        assert_eq!(node.ledger.received_count(), 1);
        assert_eq!(node.ledger.delays(), &[50]);
        assert!(trace.nodes.contains_key(&6));
        // The receiving root exists although it never logged anything else
        assert!(trace.nodes.contains_key(&1));
        assert_eq!(trace.nodes.len(), 3);
        assert_eq!(trace.diagnostics.duplicate_sent, 1);
        assert_eq!(trace.diagnostics.duplicate_received, 1);
        assert_eq!(trace.diagnostics.unmatched_received, 2);
    }

    #[test]
    fn test_observe_creates_state() {
        let mut tracker = NodeTracker::new();
        tracker.observe(9);
        tracker.observe(9);
        let trace = tracker.finish(None);
        assert_eq!(trace.nodes.len(), 1);
        assert_eq!(trace.nodes[&9].rpl_time_joined_ms, 0);
        assert_eq!(trace.diagnostics.events, 0);
    }

    #[test]
    fn test_counters_saturate() {
        let stats = |tx| EventKind::LinkStats {
            tx,
            ack: tx,
            rx: 0,
            queue_drops: tx,
            to_addr: "0001.0001.0001.0001".to_string(),
        };
        let mut tracker = NodeTracker::new();
        tracker.apply(&ev(100, 4, EventKind::TimeSourceUpdated {
            lladdr: Some("0001.0001.0001.0001".to_string()),
        }));
        tracker.apply(&ev(200, 4, stats(u64::MAX)));
        tracker.apply(&ev(300, 4, stats(1)));
        tracker.apply(&ev(400, 4, EventKind::EnergestTotal { ticks: u64::MAX }));
        tracker.apply(&ev(400, 4, EventKind::EnergestTotal { ticks: 1 }));
        for _ in 0..2 {
            tracker.apply(&ev(400, 4, EventKind::EnergestComponent {
                component: EnergestComponent::RadioTx,
                ticks: u64::MAX,
            }));
        }

        let node = tracker.node(4).unwrap();
        assert_eq!(node.link_tx, u64::MAX);
        assert_eq!(node.link_ack, u64::MAX);
        assert_eq!(node.link_queue_dropped, u64::MAX);
        assert_eq!(node.energest.total, u64::MAX);
        assert_eq!(node.energest.radio_tx, u64::MAX);
    }

    #[test]
    fn test_parent_switch_keeps_current_parent() {
        let mut tracker = NodeTracker::new();
        tracker.apply(&ev(1000, 2, parent("fe80::1")));
        tracker.apply(&ev(2000, 2, parent("fe80::3")));
        assert_eq!(tracker.node(2).unwrap().current_parent.as_deref(), Some("fe80::3"));
        tracker.apply(&ev(3000, 2, no_parent()));
        assert_eq!(tracker.node(2).unwrap().current_parent, None);
    }

    #[test]
    fn test_energest_joined_gating() {
        let rx = |ticks| EventKind::EnergestComponent {
            component: EnergestComponent::RadioRx,
            ticks,
        };
        let mut tracker = NodeTracker::new();
        tracker.apply(&ev(0, 7, EventKind::EnergestPeriod { seconds: 60 }));
        // Not joined: nothing goes to the joined buckets, flag sampled false
        tracker.apply(&ev(60_000, 7, EventKind::EnergestTotal { ticks: 6_000_000 }));
        tracker.apply(&ev(60_000, 7, rx(100)));
        tracker.apply(&ev(70_000, 7, parent("fe80::1")));
        // Flag still false until the next Rx sample
        tracker.apply(&ev(120_000, 7, EventKind::EnergestTotal { ticks: 6_000_000 }));
        tracker.apply(&ev(120_000, 7, rx(200)));
        tracker.apply(&ev(180_000, 7, EventKind::EnergestTotal { ticks: 6_000_000 }));
        tracker.apply(&ev(180_000, 7, rx(300)));

        let node = tracker.node(7).unwrap();
        assert_eq!(node.energest.total, 18_000_000);
        assert_eq!(node.energest.total_joined, 6_000_000);
        assert_eq!(node.energest.radio_rx, 600);
        assert_eq!(node.energest.radio_rx_joined, 300);
        assert_eq!(node.energest_ticks_per_second, 100_000.0);

        // Leaving clears the flag immediately
        tracker.apply(&ev(200_000, 7, EventKind::Left));
        assert!(!tracker.node(7).unwrap().energest_joined);
    }
}
