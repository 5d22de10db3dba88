//! Multi-run analysis CLI for RPL/TSCH simulation campaigns.
//!
//! Every sub-directory of the runs directory holds one run of the same
//! scenario. Runs are either analyzed from their traces (in parallel) or read
//! back from the text reports a previous analysis left behind.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Context, Result};

use rplsim::analysis::{self, multi_run, report, MultiRunReport, SummaryScalars};
use rplsim::config::SpreadKind;
use rplsim::config_loader;

#[derive(Parser)]
#[command(name = "msa-analyzer")]
#[command(about = "Multi-run aggregation for RPL/TSCH simulation traces")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the analysis configuration YAML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for the aggregated reports (defaults to the runs directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// Report the population standard deviation instead of the confidence margin
    #[arg(long)]
    std_dev: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the trace of every run
    Traces {
        /// Directory holding one sub-directory per run
        runs_dir: PathBuf,

        /// Trace file name inside each run directory
        #[arg(long, default_value = "COOJA.testlog")]
        trace_name: String,

        /// Also write each run's text report into its directory
        #[arg(long)]
        save_runs: bool,
    },

    /// Aggregate the text reports of previously analyzed runs
    Reports {
        /// Directory holding one sub-directory per run
        runs_dir: PathBuf,

        /// Report file name inside each run directory
        #[arg(long, default_value = report::RUN_REPORT_TXT)]
        report_name: String,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    // Set thread pool size
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let mut config = config_loader::load_or_default(cli.config.as_deref())?;
    if cli.std_dev {
        config.multi_run.spread = SpreadKind::StdDev;
    }

    let (runs_dir, runs) = match &cli.command {
        Commands::Traces {
            runs_dir,
            trace_name,
            save_runs,
        } => {
            let traces: Vec<(String, PathBuf)> = run_directories(runs_dir)?
                .into_iter()
                .map(|(label, dir)| (label, dir.join(trace_name)))
                .collect();

            let results = analysis::analyze_runs(&traces, &config);
            if *save_runs {
                for (label, summary) in &results {
                    let path = runs_dir.join(label).join(report::RUN_REPORT_TXT);
                    report::generate_text_report(&summary.scalars(), &path)?;
                }
            }
            let runs: Vec<(String, SummaryScalars)> = results
                .into_iter()
                .map(|(label, summary)| (label, summary.scalars()))
                .collect();
            (runs_dir, runs)
        }
        Commands::Reports {
            runs_dir,
            report_name,
        } => (runs_dir, load_reports(runs_dir, report_name)?),
    };

    if runs.is_empty() {
        bail!("No run could be analyzed in {}", runs_dir.display());
    }

    let (run_labels, scalars): (Vec<String>, Vec<SummaryScalars>) = runs.into_iter().unzip();
    let summary = multi_run::aggregate(&scalars, &config.multi_run);

    let output = cli.output.clone().unwrap_or_else(|| runs_dir.clone());
    fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    report::generate_multi_run_report(&summary, &output.join(report::MULTI_RUN_REPORT_TXT))?;

    let multi_report = MultiRunReport {
        analysis_timestamp: chrono::Utc::now().to_rfc3339(),
        runs_directory: runs_dir.display().to_string(),
        run_labels,
        summary,
    };
    report::generate_json_report(&multi_report, &output.join(report::MULTI_RUN_REPORT_JSON))?;

    println!("{}", report::format_multi_run_report(&multi_report.summary));
    Ok(())
}

/// Sub-directories of `runs_dir`, numeric names in numeric order first
fn run_directories(runs_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs: Vec<(String, PathBuf)> = fs::read_dir(runs_dir)
        .with_context(|| format!("Failed to read runs directory: {}", runs_dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
        .collect();

    dirs.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });

    log::info!("Found {} run directories in {}", dirs.len(), runs_dir.display());
    Ok(dirs)
}

/// Parse the text report of every run, skipping runs without a usable one
fn load_reports(runs_dir: &Path, report_name: &str) -> Result<Vec<(String, SummaryScalars)>> {
    let runs = run_directories(runs_dir)?
        .into_iter()
        .filter_map(|(label, dir)| {
            let path = dir.join(report_name);
            match report::load_text_report(&path) {
                Ok(scalars) => Some((label, scalars)),
                Err(e) => {
                    log::warn!("Skipping run {}: {:#}", label, e);
                    None
                }
            }
        })
        .collect();
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["msa-analyzer", "-j", "4", "traces", "runs"]);
        assert_eq!(cli.threads, 4);
        match cli.command {
            Commands::Traces {
                runs_dir,
                trace_name,
                save_runs,
            } => {
                assert_eq!(runs_dir, PathBuf::from("runs"));
                assert_eq!(trace_name, "COOJA.testlog");
                assert!(!save_runs);
            }
            Commands::Reports { .. } => panic!("expected traces"),
        }

        let cli = Cli::parse_from(["msa-analyzer", "--std-dev", "reports", "runs"]);
        assert!(cli.std_dev);
        assert!(matches!(
            cli.command,
            Commands::Reports { ref report_name, .. } if report_name == "analysis_results.txt"
        ));
    }

    #[test]
    fn test_run_directories_numeric_order() {
        let dir = TempDir::new().unwrap();
        for name in ["10", "2", "1", "extra"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "not a run").unwrap();

        let labels: Vec<String> = run_directories(dir.path())
            .unwrap()
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["1", "2", "10", "extra"]);
    }

    #[test]
    fn test_load_reports_skips_missing() {
        let dir = TempDir::new().unwrap();
        let report_text = "\
Link-layer PAR = 90.000 (total of 0 packets dropped in queue) End-to-end PDR = [ mean= 50.000 std= 1.000 ]
Total packets sent = 10 Total packets received = 5
No. of parent switches = [ mean= 1.000 std= 0.000 ] Avg. time joined = 100.000 s
End-to-end total delay = [ mean= 20.000 std= 2.000 ] ms End-to-end total jitter = [ mean= 3.000 std= 1.000 ] ms
Jain's Justice Index: PDR = 1.000 Parent Switches = 1.000 Delay = 0.900 Jitter = 0.800
";
        for name in ["1", "2"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("1").join(report::RUN_REPORT_TXT), report_text).unwrap();

        let runs = load_reports(dir.path(), report::RUN_REPORT_TXT).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, "1");
        assert_eq!(runs[0].1.total_sent, 10);
    }
}
