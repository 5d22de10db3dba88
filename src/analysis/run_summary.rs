//! Run-level aggregation of per-node metrics.

use log::{debug, info};

use super::metrics::{self, ewma_jitter};
use super::node_state::TrackedTrace;
use super::types::*;
use crate::config::AnalysisConfig;
use crate::utils::stats::{nan_mean, nan_std};

/// Jain's fairness index `(Σm)² / (N·Σm²)`, 0 when undefined
pub fn jain_index(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    if values.is_empty() || sum_sq == 0.0 {
        return 0.0;
    }
    sum * sum / (n * sum_sq)
}

/// Jain's index of one metric over the nodes that delivered anything
fn fairness_of(eligible: &[&NodeMetrics], metric: impl Fn(&NodeMetrics) -> f64) -> f64 {
    let values: Vec<f64> = eligible
        .iter()
        .map(|m| metric(m))
        .filter(|v| v.is_finite())
        .collect();
    jain_index(&values)
}

fn mean_spread(values: &[f64]) -> MeanSpread {
    MeanSpread::new(nan_mean(values), nan_std(values))
}

/// Compute the per-node records and run totals of a finalized trace
pub fn summarize(trace: TrackedTrace, config: &AnalysisConfig) -> RunSummary {
    let node_count = trace.nodes.len();
    let mut diagnostics = trace.diagnostics;

    let mut nodes = Vec::with_capacity(node_count);
    for node in trace.nodes.values() {
        if node.id == config.coordinator_id {
            continue;
        }
        let record = metrics::calculate(node, config, &mut diagnostics);
        if !record.is_valid && !config.include_invalid_nodes {
            debug!("Skipping invalid node {}", node.id);
            continue;
        }
        nodes.push(record);
    }

    let mut link_tx = 0;
    let mut link_ack = 0;
    let mut link_queue_dropped = 0;
    let mut total_sent = 0;
    let mut total_received = 0;
    for record in nodes.iter().filter(|m| m.is_valid) {
        link_tx = record.link_tx.saturating_add(link_tx);
        link_ack = record.link_ack.saturating_add(link_ack);
        link_queue_dropped = record.link_queue_dropped.saturating_add(link_queue_dropped);
        total_sent = record.packets_sent.saturating_add(total_sent);
        total_received = record.packets_received.saturating_add(total_received);
    }

    let total_parent_switches = nodes
        .iter()
        .fold(0u64, |total, m| total.saturating_add(m.rpl_switches));
    let total_time_joined: f64 = nodes.iter().map(|m| m.time_joined).sum();
    let avg_time_joined = if node_count > 1 {
        total_time_joined / (node_count - 1) as f64
    } else {
        0.0
    };

    let eligible: Vec<&NodeMetrics> = nodes.iter().filter(|m| m.packets_received > 0).collect();
    let fairness_excluded = nodes.len() - eligible.len();
    let fairness = FairnessIndices {
        pdr: fairness_of(&eligible, |m| m.pdr),
        parent_switches: fairness_of(&eligible, |m| m.rpl_switches as f64),
        delay: fairness_of(&eligible, |m| m.avg_e2e_delay),
        jitter: fairness_of(&eligible, |m| m.jitter),
    };
    if fairness_excluded > 0 {
        info!(
            "{} node(s) with no packet delivered left out of the fairness indices",
            fairness_excluded
        );
    }

    let column = |f: fn(&NodeMetrics) -> f64| nodes.iter().map(f).collect::<Vec<f64>>();
    let pdr = mean_spread(&column(|m| m.pdr));
    let parent_switches = mean_spread(&column(|m| m.rpl_switches as f64));
    let delay = mean_spread(&column(|m| m.avg_e2e_delay));
    let jitter = mean_spread(&column(|m| m.jitter));

    let all_delays: Vec<i64> = nodes.iter().flat_map(|m| m.e2e_delays.iter().copied()).collect();

    RunSummary {
        node_count,
        sim_time_ms: trace.sim_time_ms,
        link_tx,
        link_ack,
        link_queue_dropped,
        link_par: percentage(link_ack, link_tx),
        total_sent,
        total_received,
        end_to_end_pdr: percentage(total_received, total_sent),
        total_parent_switches,
        avg_time_joined,
        fairness,
        fairness_excluded,
        pdr,
        parent_switches,
        delay,
        jitter,
        packet_jitter: ewma_jitter(&all_delays),
        diagnostics,
        nodes,
    }
}
