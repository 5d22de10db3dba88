//! Trace analysis for RPL/TSCH mesh simulations.
//!
//! Data flows one way: raw lines are classified into events, events drive the
//! per-node state machines, finalized states yield per-node metrics, and those
//! are aggregated per run and across runs.

pub mod types;
pub mod log_parser;
pub mod ledger;
pub mod node_state;
pub mod metrics;
pub mod run_summary;
pub mod multi_run;
pub mod pipeline;
pub mod report;

pub use types::*;
pub use log_parser::{detect_framing, LineClassifier};
pub use node_state::NodeTracker;
pub use run_summary::summarize;
pub use multi_run::{aggregate, aggregate_summaries};
pub use pipeline::{analyze_lines, analyze_runs, analyze_trace_file};
pub use report::{generate_json_report, generate_text_report, load_text_report, parse_text_report};
