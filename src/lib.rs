//! # rplsim - Trace analysis for RPL/TSCH mesh network simulations
//!
//! This library reconstructs per-node protocol behaviour from the event
//! traces of low-power wireless mesh simulations (RPL routing over a TSCH or
//! CSMA link layer) and derives network-wide performance metrics.
//!
//! ## Overview
//!
//! Every node of a simulated network logs timestamped lines from its protocol
//! layers: TSCH association, RPL parent selection, application traffic, link
//! statistics and Energest energy accounting. The analyzer replays a trace
//! line by line, keeps a state machine per node, and reports:
//!
//! - **Delivery**: end-to-end packet delivery ratio (PDR) and link-layer
//!   acknowledgement ratio (PAR)
//! - **Latency**: end-to-end delay and EWMA jitter
//! - **Energy**: radio duty cycle and estimated charge consumption
//! - **Stability**: parent switches and time joined to the DAG
//! - **Fairness**: Jain's index of PDR, parent switches, delay and jitter
//!
//! Repeated runs of a scenario are aggregated with Student-t confidence
//! intervals.
//!
//! ## Architecture
//!
//! - `analysis::log_parser`: line classification for simulator and testbed traces
//! - `analysis::ledger`: per-node sequence number bookkeeping
//! - `analysis::node_state`: per-node join/leave state machine
//! - `analysis::metrics`: per-node metric records
//! - `analysis::run_summary`: run totals and fairness indices
//! - `analysis::multi_run`: aggregation across runs
//! - `analysis::pipeline`: file-level and parallel multi-trace analysis
//! - `analysis::report`: JSON and fixed-format text reports
//! - `config`, `config_loader`: YAML analysis configuration
//! - `utils`: descriptive statistics and the Student-t quantile
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use rplsim::{analysis, config_loader};
//!
//! let config = config_loader::load_or_default(None)?;
//! let (summary, _framing) = analysis::analyze_trace_file(Path::new("COOJA.testlog"), &config)?;
//!
//! println!("{}", analysis::report::format_text_report(&summary.scalars()));
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! All fields are optional:
//!
//! ```yaml
//! coordinator_id: 1
//! include_invalid_nodes: true
//! framing: auto              # auto | simulator | testbed
//! lpm_mapping: lpm_is_deep_sleep
//! multi_run:
//!   spread: confidence       # confidence | std_dev
//!   confidence_level: 0.95
//! ```
//!
//! ## Error Handling
//!
//! Per-line problems (malformed lines, duplicate or unmatched sequence
//! numbers, missing end marker) never abort an analysis; they are logged and
//! counted in [`analysis::TraceDiagnostics`]. File-level failures are reported
//! through `color_eyre` with context.

pub mod config;
pub mod config_loader;
pub mod analysis;
pub mod utils;
