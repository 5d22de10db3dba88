//! Finalized per-node metrics.
//!
//! Pure functions of a finalized [`NodeState`]; nothing here mutates state.

use log::{debug, warn};

use super::node_state::{EnergestTicks, NodeState};
use super::types::*;
use crate::config::{AnalysisConfig, CurrentProfile};

/// Weight of the running jitter estimate on every update
const JITTER_HISTORY_WEIGHT: f64 = 15.0 / 16.0;

/// Whether a node's traffic metrics are meaningful
pub fn is_valid(node: &NodeState, config: &AnalysisConfig) -> bool {
    if config.require_dag_join && !node.has_joined_dag() {
        debug!("node {} never joined RPL DAG", node.id);
        return false;
    }
    if node.ledger.sent_count() == 0 {
        debug!("node {} never sent any data packets", node.id);
        return false;
    }
    true
}

/// Radio duty cycle over all reported periods, %
pub fn radio_duty_cycle(ticks: &EnergestTicks) -> Option<f64> {
    if ticks.total == 0 {
        return None;
    }
    Some(100.0 * (ticks.radio_tx + ticks.radio_rx) as f64 / ticks.total as f64)
}

/// Radio duty cycle over the periods spent joined, %
pub fn radio_duty_cycle_joined(ticks: &EnergestTicks) -> f64 {
    if ticks.total_joined == 0 {
        return 0.0;
    }
    100.0 * (ticks.radio_tx + ticks.radio_rx_joined) as f64 / ticks.total_joined as f64
}

/// Estimated charge in mC: each state's current (mA) times its time (s).
///
/// 0 without a positive tick rate.
pub fn charge_mc(ticks: &EnergestTicks, ticks_per_second: f64, currents: &CurrentProfile) -> f64 {
    if ticks_per_second <= 0.0 {
        return 0.0;
    }
    let seconds = |t: u64| t as f64 / ticks_per_second;
    currents.radio_tx * seconds(ticks.radio_tx)
        + currents.radio_rx * seconds(ticks.radio_rx)
        + currents.cpu_on * seconds(ticks.cpu_on)
        + currents.cpu_sleep * seconds(ticks.cpu_sleep)
        + currents.cpu_deep_sleep * seconds(ticks.cpu_deep_sleep)
}

/// Mean end-to-end delay, NaN without samples
pub fn mean_delay(delays: &[i64]) -> f64 {
    if delays.is_empty() {
        return f64::NAN;
    }
    delays.iter().map(|&d| d as f64).sum::<f64>() / delays.len() as f64
}

/// EWMA of consecutive delay differences, seeded by the first difference.
///
/// NaN with fewer than two samples.
pub fn ewma_jitter(delays: &[i64]) -> f64 {
    let mut diffs = delays.windows(2).map(|w| (w[1] as f64 - w[0] as f64).abs());
    let Some(first) = diffs.next() else {
        return f64::NAN;
    };
    diffs.fold(first, |jitter, diff| {
        jitter * JITTER_HISTORY_WEIGHT + diff * (1.0 - JITTER_HISTORY_WEIGHT)
    })
}

/// Compute the metrics record of one node.
///
/// Missing or degenerate Energest data is warned about and counted in
/// `diagnostics`.
pub fn calculate(
    node: &NodeState,
    config: &AnalysisConfig,
    diagnostics: &mut TraceDiagnostics,
) -> NodeMetrics {
    let (duty_cycle, charge) = match radio_duty_cycle(&node.energest) {
        Some(rdc) => {
            if node.energest_ticks_per_second <= 0.0 {
                warn!(
                    "zero energest tick rate for {} (last total time was 0), charge set to 0",
                    node.id
                );
                diagnostics.zero_tick_rate_nodes += 1;
            }
            (
                rdc,
                charge_mc(&node.energest, node.energest_ticks_per_second, &config.currents),
            )
        }
        None => {
            warn!("no energest results for {}", node.id);
            diagnostics.zero_energest_nodes += 1;
            (0.0, 0.0)
        }
    };

    let mut metrics = NodeMetrics {
        id: node.id,
        is_valid: false,
        pdr: 0.0,
        par: 0.0,
        packets_sent: node.ledger.sent_count() as u64,
        packets_received: node.ledger.received_count() as u64,
        rpl_switches: node.parent_switch_count,
        duty_cycle,
        duty_cycle_joined: radio_duty_cycle_joined(&node.energest),
        charge,
        time_joined: node.rpl_time_joined_ms as f64 / 1000.0,
        avg_e2e_delay: f64::NAN,
        jitter: f64::NAN,
        link_tx: node.link_tx,
        link_ack: node.link_ack,
        link_queue_dropped: node.link_queue_dropped,
        e2e_delays: Vec::new(),
    };

    if !is_valid(node, config) {
        return metrics;
    }

    let delays = node.ledger.delays();
    metrics.is_valid = true;
    metrics.par = percentage(node.link_ack, node.link_tx);
    metrics.pdr = percentage(metrics.packets_received, metrics.packets_sent);
    metrics.avg_e2e_delay = mean_delay(delays);
    metrics.jitter = ewma_jitter(delays);
    metrics.e2e_delays = delays.to_vec();
    metrics
}
