use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::fs;
use std::path::PathBuf;

use rplsim::analysis::{self, report, AnalysisMetadata, RunReport};
use rplsim::config_loader;

/// Analyze one RPL/TSCH simulation trace
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the trace file
    #[arg(short, long, default_value = "COOJA.testlog")]
    trace: PathBuf,

    /// Output directory for the reports
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Path to the analysis configuration YAML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Do not print the per-node table
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    info!("Trace file: {:?}", args.trace);
    info!("Output directory: {:?}", args.output);

    let config = config_loader::load_or_default(args.config.as_deref())?;

    let (summary, framing) = analysis::analyze_trace_file(&args.trace, &config)?;

    fs::create_dir_all(&args.output)
        .wrap_err_with(|| format!("Failed to create output directory '{}'", args.output.display()))?;

    report::generate_text_report(&summary.scalars(), &args.output.join(report::RUN_REPORT_TXT))?;

    let run_report = RunReport {
        metadata: AnalysisMetadata {
            analysis_timestamp: chrono::Utc::now().to_rfc3339(),
            trace_path: args.trace.display().to_string(),
            framing,
        },
        summary,
    };
    report::generate_json_report(&run_report, &args.output.join(report::RUN_REPORT_JSON))?;

    if args.quiet {
        println!("{}", report::format_text_report(&run_report.summary.scalars()));
    } else {
        report::print_summary(&run_report.summary);
    }

    info!("Analysis completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["rplsim", "--trace", "run/COOJA.testlog"]);

        assert_eq!(args.trace, PathBuf::from("run/COOJA.testlog"));
        assert_eq!(args.output, PathBuf::from("."));
        assert_eq!(args.config, None);
        assert_eq!(args.log_level, "info");
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_defaults_and_overrides() {
        let args = Args::parse_from([
            "rplsim",
            "--config", "analysis.yaml",
            "--output", "results",
            "--log-level", "debug",
            "-q",
        ]);

        assert_eq!(args.trace, PathBuf::from("COOJA.testlog"));
        assert_eq!(args.config, Some(PathBuf::from("analysis.yaml")));
        assert_eq!(args.output, PathBuf::from("results"));
        assert_eq!(args.log_level, "debug");
        assert!(args.quiet);
    }
}
