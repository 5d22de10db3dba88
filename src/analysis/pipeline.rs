//! End-to-end analysis of trace files.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use log::{debug, info, warn};
use rayon::prelude::*;

use super::log_parser::{detect_framing, LineClassifier};
use super::node_state::NodeTracker;
use super::run_summary::summarize;
use super::types::*;
use crate::config::{AnalysisConfig, FramingMode};

/// Analyze the lines of one trace in file order
pub fn analyze_lines<'a, I>(lines: I, framing: Framing, config: &AnalysisConfig) -> RunSummary
where
    I: IntoIterator<Item = &'a str>,
{
    let mut classifier = LineClassifier::new(framing, config.lpm_mapping);
    let mut tracker = NodeTracker::new();
    let mut lines_read = 0;
    let mut malformed_lines = 0;

    for line in lines {
        lines_read += 1;
        match classifier.classify(line) {
            Ok(Some(event)) => tracker.apply(&event),
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping line {}: {}", lines_read, e);
                malformed_lines += 1;
            }
        }
        // Every framed line makes its node known, events or not
        if let Some(node_id) = classifier.framed_node_id() {
            tracker.observe(node_id);
        }
    }

    let mut trace = tracker.finish(classifier.last_timestamp_ms());
    trace.diagnostics.lines_read = lines_read;
    trace.diagnostics.malformed_lines = malformed_lines;
    summarize(trace, config)
}

/// Framing to use for a trace's content
pub fn resolve_framing(content: &str, mode: FramingMode) -> Framing {
    match mode {
        FramingMode::Auto => detect_framing(content),
        FramingMode::Simulator => Framing::Simulator,
        FramingMode::Testbed => Framing::Testbed,
    }
}

/// Analyze one trace file
pub fn analyze_trace_file(path: &Path, config: &AnalysisConfig) -> Result<(RunSummary, Framing)> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace file: {}", path.display()))?;

    let framing = resolve_framing(&content, config.framing);
    debug!("Analyzing {} with {} framing", path.display(), framing);

    let summary = analyze_lines(content.lines(), framing, config);
    info!(
        "Analyzed {}: {} lines, {} nodes, {} packets sent, {} received",
        path.display(),
        summary.diagnostics.lines_read,
        summary.node_count,
        summary.total_sent,
        summary.total_received
    );
    Ok((summary, framing))
}

/// Analyze several traces in parallel.
///
/// Runs whose trace cannot be read are logged and skipped; the result keeps
/// the input order of the remaining runs.
pub fn analyze_runs(traces: &[(String, PathBuf)], config: &AnalysisConfig) -> Vec<(String, RunSummary)> {
    info!("Analyzing {} traces in parallel...", traces.len());

    let results: Vec<(String, RunSummary)> = traces
        .par_iter()
        .filter_map(|(label, path)| match analyze_trace_file(path, config) {
            Ok((summary, _)) => Some((label.clone(), summary)),
            Err(e) => {
                warn!("Skipping run {}: {:#}", label, e);
                None
            }
        })
        .collect();

    info!("Analyzed {} of {} runs", results.len(), traces.len());
    results
}
