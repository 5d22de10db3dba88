//! Core data types for trace analysis.

use serde::{Deserialize, Serialize};

use crate::config::SpreadKind;

/// Node identifier as printed by the firmware (or the testbed device id)
pub type NodeId = u32;

/// Application-level sequence number
pub type Seqnum = u32;

/// Milliseconds since the start of the trace
pub type TimestampMs = i64;

/// Column framing of a trace file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// `timestamp node_id [INFO: Layer] message...`
    Simulator,
    /// `unix_timestamp;node_tag;[INFO: Layer] message...`
    Testbed,
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Framing::Simulator => write!(f, "simulator"),
            Framing::Testbed => write!(f, "testbed"),
        }
    }
}

/// Hardware component reported in an Energest block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergestComponent {
    CpuOn,
    CpuSleep,
    CpuDeepSleep,
    RadioTx,
    RadioRx,
}

/// What happened on a trace line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// TSCH association completed
    Associated,
    /// TSCH is leaving the network
    Left,
    /// TSCH time source changed; `None` when the new source is NULL
    TimeSourceUpdated { lladdr: Option<String> },
    /// RPL preferred parent changed; `None` stands for "no parent"
    ParentChanged {
        old: Option<String>,
        new: Option<String>,
    },
    /// Link-layer address of the new preferred parent
    ParentLladdrUpdated { lladdr: Option<String> },
    /// RPL reports the node has left the network
    LeftNetwork,
    /// Application packet generated
    PacketSent { seqnum: Seqnum },
    /// Application packet received at this node, originated by `from_node`
    PacketReceived { seqnum: Seqnum, from_node: NodeId },
    /// Periodic per-neighbor link counters
    LinkStats {
        tx: u64,
        ack: u64,
        rx: u64,
        queue_drops: u64,
        to_addr: String,
    },
    /// Length of the Energest reporting period
    EnergestPeriod { seconds: u64 },
    /// Total ticks elapsed during the last period
    EnergestTotal { ticks: u64 },
    /// Ticks spent in one component during the last period
    EnergestComponent {
        component: EnergestComponent,
        ticks: u64,
    },
    /// The simulator reported the end of the test
    SimEnded { sim_time_ms: TimestampMs },
}

/// A classified trace line.
///
/// `SimEnded` is a trace-level marker: its `node_id` is 0 and its
/// `timestamp_ms` equals the reported simulation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp_ms: TimestampMs,
    pub node_id: NodeId,
    pub kind: EventKind,
    /// Unparsed message text, kept for diagnostics
    pub raw: String,
}

/// Finalized per-node metrics record consumed by plotting and reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeMetrics {
    pub id: NodeId,
    pub is_valid: bool,
    /// End-to-end packet delivery ratio, %
    pub pdr: f64,
    /// Link-layer acknowledgement ratio towards the parent, %
    pub par: f64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub rpl_switches: u64,
    /// Radio duty cycle, %
    pub duty_cycle: f64,
    /// Radio duty cycle while joined, %
    pub duty_cycle_joined: f64,
    /// Estimated charge consumption, mC
    pub charge: f64,
    /// Total time joined to the DAG, s
    pub time_joined: f64,
    /// ms, NaN without samples
    pub avg_e2e_delay: f64,
    /// ms, NaN with fewer than two samples
    pub jitter: f64,
    pub link_tx: u64,
    pub link_ack: u64,
    pub link_queue_dropped: u64,
    /// Delay samples in reception order, ms
    #[serde(skip)]
    pub e2e_delays: Vec<i64>,
}

/// Mean and spread (standard deviation or margin of error) of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanSpread {
    pub mean: f64,
    pub spread: f64,
}

impl MeanSpread {
    pub fn new(mean: f64, spread: f64) -> Self {
        Self { mean, spread }
    }
}

/// Jain's fairness indices of one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FairnessIndices {
    pub pdr: f64,
    pub parent_switches: f64,
    pub delay: f64,
    pub jitter: f64,
}

/// Counters for the warnings raised while analyzing a trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceDiagnostics {
    pub lines_read: u64,
    pub events: u64,
    pub malformed_lines: u64,
    pub duplicate_sent: u64,
    pub duplicate_received: u64,
    pub unmatched_received: u64,
    /// Non-coordinator nodes without any Energest total
    pub zero_energest_nodes: u64,
    /// Non-coordinator nodes whose last Energest total was zero ticks
    pub zero_tick_rate_nodes: u64,
    pub missing_end_marker: bool,
}

/// Run-level scalars carried by the fixed-format text report.
///
/// This is exactly what survives a write/parse round trip of the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryScalars {
    pub link_par: f64,
    pub link_queue_dropped: u64,
    /// Per-node PDR across the run's records
    pub pdr: MeanSpread,
    pub total_sent: u64,
    pub total_received: u64,
    pub parent_switches: MeanSpread,
    /// s
    pub avg_time_joined: f64,
    /// ms
    pub delay: MeanSpread,
    /// ms
    pub jitter: MeanSpread,
    pub fairness: FairnessIndices,
}

impl SummaryScalars {
    /// Network-wide PDR from the packet totals, %
    pub fn end_to_end_pdr(&self) -> f64 {
        percentage(self.total_received, self.total_sent)
    }
}

/// Complete result of analyzing one trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Per-node records sorted by node id; the coordinator is never listed
    pub nodes: Vec<NodeMetrics>,
    /// Distinct node ids seen in the trace, coordinator included
    pub node_count: usize,
    pub sim_time_ms: TimestampMs,
    pub link_tx: u64,
    pub link_ack: u64,
    pub link_queue_dropped: u64,
    pub link_par: f64,
    pub total_sent: u64,
    pub total_received: u64,
    pub end_to_end_pdr: f64,
    pub total_parent_switches: u64,
    /// s
    pub avg_time_joined: f64,
    pub fairness: FairnessIndices,
    /// Listed nodes left out of the fairness indices because nothing they
    /// sent reached the root
    pub fairness_excluded: usize,
    pub pdr: MeanSpread,
    pub parent_switches: MeanSpread,
    pub delay: MeanSpread,
    pub jitter: MeanSpread,
    /// EWMA jitter over every delivered packet of the run, ms
    pub packet_jitter: f64,
    pub diagnostics: TraceDiagnostics,
}

impl RunSummary {
    /// The scalars printed in the text report
    pub fn scalars(&self) -> SummaryScalars {
        SummaryScalars {
            link_par: self.link_par,
            link_queue_dropped: self.link_queue_dropped,
            pdr: self.pdr,
            total_sent: self.total_sent,
            total_received: self.total_received,
            parent_switches: self.parent_switches,
            avg_time_joined: self.avg_time_joined,
            delay: self.delay,
            jitter: self.jitter,
            fairness: self.fairness,
        }
    }
}

/// Aggregate of several runs of the same scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiRunSummary {
    /// Number of runs that contributed
    pub runs: usize,
    pub spread_kind: SpreadKind,
    pub confidence_level: f64,
    pub link_par: MeanSpread,
    pub link_queue_dropped: MeanSpread,
    /// Mean per-node PDR of each run
    pub pdr: MeanSpread,
    /// PDR from packet totals of each run
    pub end_to_end_pdr: MeanSpread,
    pub total_sent: MeanSpread,
    pub total_received: MeanSpread,
    pub parent_switches: MeanSpread,
    pub avg_time_joined: MeanSpread,
    pub delay: MeanSpread,
    pub jitter: MeanSpread,
    pub fairness_pdr: MeanSpread,
    pub fairness_parent_switches: MeanSpread,
    pub fairness_delay: MeanSpread,
    pub fairness_jitter: MeanSpread,
}

/// Metadata about an analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analysis_timestamp: String,
    pub trace_path: String,
    pub framing: Framing,
}

/// JSON report of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: AnalysisMetadata,
    pub summary: RunSummary,
}

/// JSON report of a multi-run aggregation
#[derive(Debug, Clone, Serialize)]
pub struct MultiRunReport {
    pub analysis_timestamp: String,
    pub runs_directory: String,
    /// Run labels (sub-directory names) in aggregation order
    pub run_labels: Vec<String>,
    pub summary: MultiRunSummary,
}

/// `100 * part / whole`, or 0 when `whole` is 0
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}
