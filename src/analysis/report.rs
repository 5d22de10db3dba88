//! Report generation and parsing.
//!
//! Every run produces a JSON document and a fixed five-line text report. The
//! text report is also the input format of the multi-run aggregation, so
//! [`format_text_report`] and [`parse_text_report`] must stay in lockstep.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use color_eyre::eyre::{Context, Result};
use regex::{Captures, Regex};
use serde::Serialize;

use super::types::*;
use crate::config::SpreadKind;

/// Text report of one run
pub const RUN_REPORT_TXT: &str = "analysis_results.txt";
/// JSON report of one run
pub const RUN_REPORT_JSON: &str = "analysis_results.json";
/// Text report of a multi-run aggregation
pub const MULTI_RUN_REPORT_TXT: &str = "multisim-analysis_results.txt";
/// JSON report of a multi-run aggregation
pub const MULTI_RUN_REPORT_JSON: &str = "multisim-analysis_results.json";

/// Number of lines of the text report
pub const REPORT_LINES: usize = 5;

/// Errors raised while reading a text report back
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportParseError {
    #[error("report has {found} non-empty lines, expected at least 5")]
    TooShort { found: usize },

    #[error("report line {line} does not match the expected shape: {content}")]
    LineMismatch { line: usize, content: String },

    #[error("invalid {field} value: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Compiled regex patterns for the text report lines
struct ReportPatterns {
    /// Match: "Link-layer PAR = 95.000 (total of 3 packets dropped in queue) End-to-end PDR = [ mean= 80.000 std= 5.000 ]"
    par_pdr: Regex,
    /// Match: "Total packets sent = 120 Total packets received = 96"
    totals: Regex,
    /// Match: "No. of parent switches = [ mean= 1.500 std= 0.500 ] Avg. time joined = 3580.320 s"
    switches: Regex,
    /// Match: "End-to-end total delay = [ mean= 81.040 std= 8.050 ] ms End-to-end total jitter = [ mean= 28.440 std= 3.300 ] ms"
    delay_jitter: Regex,
    /// Match: "Jain's Justice Index: PDR = 0.990 Parent Switches = 0.810 Delay = 0.925 Jitter = 0.700"
    fairness: Regex,
    /// Match: "Jain's Justice Index = 0.925"
    legacy_fairness: Regex,
}

impl ReportPatterns {
    fn new() -> Self {
        Self {
            par_pdr: Regex::new(
                r"^Link-layer PAR = (\S+) \(total of (\d+) packets dropped in queue\) End-to-end PDR = \[ mean= (\S+) (?:std|moe)= (\S+) \]$"
            ).expect("Invalid par_pdr regex"),
            totals: Regex::new(
                r"^Total packets sent = (\d+) Total packets received = (\d+)$"
            ).expect("Invalid totals regex"),
            switches: Regex::new(
                r"^No\. of parent switches = \[ mean= (\S+) (?:std|moe)= (\S+) \] Avg\. time joined = (\S+) s$"
            ).expect("Invalid switches regex"),
            delay_jitter: Regex::new(
                r"^End-to-end total delay = \[ mean= (\S+) (?:std|moe)= (\S+) \] ms End-to-end total jitter = \[ mean= (\S+) (?:std|moe)= (\S+) \] ms$"
            ).expect("Invalid delay_jitter regex"),
            fairness: Regex::new(
                r"^Jain's Justice Index: PDR = (\S+) Parent Switches = (\S+) Delay = (\S+) Jitter = (\S+)$"
            ).expect("Invalid fairness regex"),
            legacy_fairness: Regex::new(
                r"^Jain's Justice Index = (\S+)$"
            ).expect("Invalid legacy_fairness regex"),
        }
    }
}

static PATTERNS: LazyLock<ReportPatterns> = LazyLock::new(ReportPatterns::new);

/// Render the five-line text report of one run
pub fn format_text_report(s: &SummaryScalars) -> String {
    [
        format!(
            "Link-layer PAR = {:.3} (total of {} packets dropped in queue) End-to-end PDR = [ mean= {:.3} std= {:.3} ]",
            s.link_par, s.link_queue_dropped, s.pdr.mean, s.pdr.spread
        ),
        format!(
            "Total packets sent = {} Total packets received = {}",
            s.total_sent, s.total_received
        ),
        format!(
            "No. of parent switches = [ mean= {:.3} std= {:.3} ] Avg. time joined = {:.3} s",
            s.parent_switches.mean, s.parent_switches.spread, s.avg_time_joined
        ),
        format!(
            "End-to-end total delay = [ mean= {:.3} std= {:.3} ] ms End-to-end total jitter = [ mean= {:.3} std= {:.3} ] ms",
            s.delay.mean, s.delay.spread, s.jitter.mean, s.jitter.spread
        ),
        format!(
            "Jain's Justice Index: PDR = {:.3} Parent Switches = {:.3} Delay = {:.3} Jitter = {:.3}",
            s.fairness.pdr, s.fairness.parent_switches, s.fairness.delay, s.fairness.jitter
        ),
    ]
    .join("\n")
}

fn float(caps: &Captures, idx: usize, field: &'static str) -> Result<f64, ReportParseError> {
    let value = &caps[idx];
    value.parse().map_err(|_| ReportParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn integer(caps: &Captures, idx: usize, field: &'static str) -> Result<u64, ReportParseError> {
    let value = &caps[idx];
    value.parse().map_err(|_| ReportParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Parse the scalars back from a text report.
///
/// Only the last five non-empty lines are read, so the report may follow
/// arbitrary output.
pub fn parse_text_report(content: &str) -> Result<SummaryScalars, ReportParseError> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < REPORT_LINES {
        return Err(ReportParseError::TooShort { found: lines.len() });
    }
    let lines = &lines[lines.len() - REPORT_LINES..];

    let capture = |idx: usize, regex: &Regex| {
        regex
            .captures(lines[idx])
            .ok_or_else(|| ReportParseError::LineMismatch {
                line: idx + 1,
                content: lines[idx].to_string(),
            })
    };

    let caps = capture(0, &PATTERNS.par_pdr)?;
    let link_par = float(&caps, 1, "link PAR")?;
    let link_queue_dropped = integer(&caps, 2, "queue drops")?;
    let pdr = MeanSpread::new(float(&caps, 3, "PDR mean")?, float(&caps, 4, "PDR spread")?);

    let caps = capture(1, &PATTERNS.totals)?;
    let total_sent = integer(&caps, 1, "packets sent")?;
    let total_received = integer(&caps, 2, "packets received")?;

    let caps = capture(2, &PATTERNS.switches)?;
    let parent_switches = MeanSpread::new(
        float(&caps, 1, "parent switches mean")?,
        float(&caps, 2, "parent switches spread")?,
    );
    let avg_time_joined = float(&caps, 3, "time joined")?;

    let caps = capture(3, &PATTERNS.delay_jitter)?;
    let delay = MeanSpread::new(float(&caps, 1, "delay mean")?, float(&caps, 2, "delay spread")?);
    let jitter = MeanSpread::new(float(&caps, 3, "jitter mean")?, float(&caps, 4, "jitter spread")?);

    let fairness = if let Some(caps) = PATTERNS.legacy_fairness.captures(lines[4]) {
        // Older reports carry the delay index only
        FairnessIndices {
            pdr: f64::NAN,
            parent_switches: f64::NAN,
            delay: float(&caps, 1, "justice index")?,
            jitter: f64::NAN,
        }
    } else {
        let caps = capture(4, &PATTERNS.fairness)?;
        FairnessIndices {
            pdr: float(&caps, 1, "PDR index")?,
            parent_switches: float(&caps, 2, "parent switches index")?,
            delay: float(&caps, 3, "delay index")?,
            jitter: float(&caps, 4, "jitter index")?,
        }
    };

    Ok(SummaryScalars {
        link_par,
        link_queue_dropped,
        pdr,
        total_sent,
        total_received,
        parent_switches,
        avg_time_joined,
        delay,
        jitter,
        fairness,
    })
}

/// Read and parse a text report from disk
pub fn load_text_report(path: &Path) -> Result<SummaryScalars> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let scalars = parse_text_report(&content)
        .with_context(|| format!("Failed to parse report: {}", path.display()))?;
    Ok(scalars)
}

/// Generate JSON report
pub fn generate_json_report<T: Serialize>(report: &T, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Generate the fixed-format text report of one run
pub fn generate_text_report(scalars: &SummaryScalars, output_path: &Path) -> Result<()> {
    let mut content = format_text_report(scalars);
    content.push('\n');
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Render the multi-run text report
pub fn format_multi_run_report(s: &MultiRunSummary) -> String {
    let label = match s.spread_kind {
        SpreadKind::Confidence => "moe",
        SpreadKind::StdDev => "std",
    };
    let pair = |m: &MeanSpread, unit: &str| {
        format!("[mean = {:.2}{unit}/{label} = {:.2}{unit}]", m.mean, m.spread)
    };
    let index = |m: &MeanSpread| format!("[mean = {:.3}/{label} = {:.3}]", m.mean, m.spread);

    [
        format!(
            "Link-layer PAR: {} (total packets dropped in queue: {}) End-to-end PDR: {}",
            pair(&s.link_par, ""),
            pair(&s.link_queue_dropped, ""),
            pair(&s.pdr, "")
        ),
        format!(
            "Total packets sent: {} Total packets received: {}",
            pair(&s.total_sent, ""),
            pair(&s.total_received, "")
        ),
        format!(
            "Avg. no. of parent switches: {} Avg. time joined: {}",
            pair(&s.parent_switches, ""),
            pair(&s.avg_time_joined, " s")
        ),
        format!(
            "Avg. end-to-end total delay: {} Avg. end-to-end total jitter: {}",
            pair(&s.delay, " ms"),
            pair(&s.jitter, " ms")
        ),
        format!(
            "Avg. Justice Index: PDR = {} Parent Switches = {} Delay = {} Jitter = {}",
            index(&s.fairness_pdr),
            index(&s.fairness_parent_switches),
            index(&s.fairness_delay),
            index(&s.fairness_jitter)
        ),
    ]
    .join("\n")
}

/// Generate the multi-run text report
pub fn generate_multi_run_report(summary: &MultiRunSummary, output_path: &Path) -> Result<()> {
    let mut content = format_multi_run_report(summary);
    content.push('\n');
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write multi-run report to {}", output_path.display()))?;

    log::info!("Multi-run report written to {}", output_path.display());
    Ok(())
}

/// Print the per-node table and the run report to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("\n=== RPL TRACE ANALYSIS SUMMARY ===\n");
    println!(
        "{:>5} {:>8} {:>8} {:>6} {:>6} {:>8} {:>10} {:>10} {:>10} {:>10}",
        "Node", "PDR", "PAR", "Sent", "Sw.", "RDC", "Charge", "Joined", "Delay", "Jitter"
    );
    for m in &summary.nodes {
        println!(
            "{:>5} {:>8.2} {:>8.2} {:>6} {:>6} {:>8.2} {:>10.2} {:>10.1} {:>10.2} {:>10.2}{}",
            m.id,
            m.pdr,
            m.par,
            m.packets_sent,
            m.rpl_switches,
            m.duty_cycle,
            m.charge,
            m.time_joined,
            m.avg_e2e_delay,
            m.jitter,
            if m.is_valid { "" } else { "  (invalid)" }
        );
    }

    println!();
    println!("Nodes seen: {}", summary.node_count);
    println!("Simulation time: {:.3} s", summary.sim_time_ms as f64 / 1000.0);
    println!("Network PDR: {:.3}", summary.end_to_end_pdr);
    if summary.fairness_excluded > 0 {
        println!("Left out of fairness: {} node(s)", summary.fairness_excluded);
    }
    let d = &summary.diagnostics;
    if d.malformed_lines + d.duplicate_sent + d.duplicate_received + d.unmatched_received > 0 {
        println!(
            "Warnings: {} malformed, {} duplicate sent, {} duplicate received, {} unmatched",
            d.malformed_lines, d.duplicate_sent, d.duplicate_received, d.unmatched_received
        );
    }
    if d.zero_energest_nodes + d.zero_tick_rate_nodes > 0 {
        println!(
            "Energest: {} node(s) without results, {} with a zero tick rate",
            d.zero_energest_nodes, d.zero_tick_rate_nodes
        );
    }
    println!();
    println!("{}", format_text_report(&summary.scalars()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MultiRunConfig;
    use tempfile::TempDir;

    fn sample() -> SummaryScalars {
        SummaryScalars {
            link_par: 95.123_4,
            link_queue_dropped: 3,
            pdr: MeanSpread::new(80.0, 5.25),
            total_sent: 120,
            total_received: 96,
            parent_switches: MeanSpread::new(1.5, 0.5),
            avg_time_joined: 3580.321,
            delay: MeanSpread::new(81.04, 8.05),
            jitter: MeanSpread::new(f64::NAN, f64::NAN),
            fairness: FairnessIndices {
                pdr: 0.99,
                parent_switches: 0.81,
                delay: 0.925,
                jitter: 0.0,
            },
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!(
            (a.is_nan() && b.is_nan()) || (a - b).abs() <= 5e-4,
            "{} != {}",
            a,
            b
        );
    }

    #[test]
    fn test_text_report_round_trip() {
        let original = sample();
        let text = format_text_report(&original);
        assert_eq!(text.lines().count(), REPORT_LINES);
        assert!(text.starts_with("Link-layer PAR = 95.123 (total of 3 packets dropped in queue)"));

        let parsed = parse_text_report(&text).unwrap();
        assert_close(parsed.link_par, original.link_par);
        assert_eq!(parsed.link_queue_dropped, 3);
        assert_close(parsed.pdr.mean, 80.0);
        assert_close(parsed.pdr.spread, 5.25);
        assert_eq!(parsed.total_sent, 120);
        assert_eq!(parsed.total_received, 96);
        assert_close(parsed.parent_switches.mean, 1.5);
        assert_close(parsed.avg_time_joined, 3580.321);
        assert_close(parsed.delay.mean, 81.04);
        assert!(parsed.jitter.mean.is_nan());
        assert_close(parsed.fairness.delay, 0.925);
        assert_eq!(parsed.end_to_end_pdr(), 80.0);
    }

    #[test]
    fn test_parse_reads_last_lines() {
        let text = format!("Some earlier output\n\n{}\n\n", format_text_report(&sample()));
        let parsed = parse_text_report(&text).unwrap();
        assert_eq!(parsed.total_sent, 120);
    }

    #[test]
    fn test_parse_moe_and_legacy_index() {
        let text = "\
Link-layer PAR = 34.01 (total of 0 packets dropped in queue) End-to-end PDR = [ mean= 64.84 moe= 15.76 ]
Total packets sent = 22112 Total packets received = 6833
No. of parent switches = [ mean= 1.58 moe= 0.30 ] Avg. time joined = 3580.32 s
End-to-end total delay = [ mean= 81.04 moe= 8.05 ] ms End-to-end total jitter = [ mean= 28.44 moe= 3.30 ] ms
Jain's Justice Index = 0.925
";
        let parsed = parse_text_report(text).unwrap();
        assert_eq!(parsed.link_par, 34.01);
        assert_eq!(parsed.pdr, MeanSpread::new(64.84, 15.76));
        assert_eq!(parsed.total_received, 6833);
        assert_eq!(parsed.jitter, MeanSpread::new(28.44, 3.30));
        assert_eq!(parsed.fairness.delay, 0.925);
        assert!(parsed.fairness.pdr.is_nan());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_text_report("one\ntwo\n"),
            Err(ReportParseError::TooShort { found: 2 })
        );
        let broken = format_text_report(&sample()).replace("Total packets sent", "Packets sent");
        assert!(matches!(
            parse_text_report(&broken),
            Err(ReportParseError::LineMismatch { line: 2, .. })
        ));
        let bad_number = format_text_report(&sample()).replace("mean= 80.000", "mean= eighty");
        assert!(matches!(
            parse_text_report(&bad_number),
            Err(ReportParseError::InvalidNumber { field: "PDR mean", .. })
        ));
    }

    #[test]
    fn test_report_files() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join(RUN_REPORT_TXT);
        generate_text_report(&sample(), &txt).unwrap();
        let loaded = load_text_report(&txt).unwrap();
        assert_eq!(loaded.total_sent, 120);

        let json = dir.path().join(RUN_REPORT_JSON);
        generate_json_report(&sample(), &json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(value["total_sent"], 120);
        assert!(value["jitter"]["mean"].is_null());

        assert!(load_text_report(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_multi_run_report_shape() {
        let runs = vec![sample(), sample()];
        let summary = crate::analysis::multi_run::aggregate(&runs, &MultiRunConfig::default());
        let text = format_multi_run_report(&summary);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), REPORT_LINES);
        assert!(lines[0].starts_with("Link-layer PAR: [mean = 95.12/moe = 0.00]"));
        assert_eq!(
            lines[1],
            "Total packets sent: [mean = 120.00/moe = 0.00] Total packets received: [mean = 96.00/moe = 0.00]"
        );
        assert!(lines[2].ends_with("Avg. time joined: [mean = 3580.32 s/moe = 0.00 s]"));
        assert!(lines[3].contains("jitter: [mean = NaN ms/moe = NaN ms]"));
        assert!(lines[4].starts_with("Avg. Justice Index: PDR = [mean = 0.990/moe = 0.000]"));
    }
}
