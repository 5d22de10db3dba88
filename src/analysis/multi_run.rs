//! Aggregation of repeated runs of the same scenario.

use log::warn;

use super::types::*;
use crate::config::{MultiRunConfig, SpreadKind};
use crate::utils::stats::{finite, margin_of_error, nan_mean, nan_std};

/// Mean and configured spread of one metric across runs.
///
/// Non-finite samples are discarded. A confidence margin over fewer than two
/// samples is NaN.
pub fn spread_of(values: &[f64], config: &MultiRunConfig) -> MeanSpread {
    let spread = match config.spread {
        SpreadKind::StdDev => nan_std(values),
        SpreadKind::Confidence => margin_of_error(values, config.confidence_level),
    };
    MeanSpread::new(nan_mean(values), spread)
}

/// Aggregate the text-report scalars of several runs
pub fn aggregate(runs: &[SummaryScalars], config: &MultiRunConfig) -> MultiRunSummary {
    if runs.len() <= 1 && config.spread == SpreadKind::Confidence {
        warn!(
            "Only {} run(s) to aggregate, the margin of error is undefined",
            runs.len()
        );
    }

    let metric = |f: fn(&SummaryScalars) -> f64| {
        let values: Vec<f64> = runs.iter().map(f).collect();
        if finite(&values).len() < values.len() {
            warn!("Discarding undefined samples across runs");
        }
        spread_of(&values, config)
    };

    MultiRunSummary {
        runs: runs.len(),
        spread_kind: config.spread,
        confidence_level: config.confidence_level,
        link_par: metric(|s| s.link_par),
        link_queue_dropped: metric(|s| s.link_queue_dropped as f64),
        pdr: metric(|s| s.pdr.mean),
        end_to_end_pdr: metric(|s| s.end_to_end_pdr()),
        total_sent: metric(|s| s.total_sent as f64),
        total_received: metric(|s| s.total_received as f64),
        parent_switches: metric(|s| s.parent_switches.mean),
        avg_time_joined: metric(|s| s.avg_time_joined),
        delay: metric(|s| s.delay.mean),
        jitter: metric(|s| s.jitter.mean),
        fairness_pdr: metric(|s| s.fairness.pdr),
        fairness_parent_switches: metric(|s| s.fairness.parent_switches),
        fairness_delay: metric(|s| s.fairness.delay),
        fairness_jitter: metric(|s| s.fairness.jitter),
    }
}

/// Aggregate fully analyzed runs
pub fn aggregate_summaries(runs: &[RunSummary], config: &MultiRunConfig) -> MultiRunSummary {
    let scalars: Vec<SummaryScalars> = runs.iter().map(RunSummary::scalars).collect();
    aggregate(&scalars, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalars(pdr: f64, sent: u64, received: u64) -> SummaryScalars {
        SummaryScalars {
            link_par: 90.0,
            link_queue_dropped: 2,
            pdr: MeanSpread::new(pdr, 1.0),
            total_sent: sent,
            total_received: received,
            parent_switches: MeanSpread::new(1.5, 0.5),
            avg_time_joined: 120.0,
            delay: MeanSpread::new(f64::NAN, f64::NAN),
            jitter: MeanSpread::new(4.0, 1.0),
            fairness: FairnessIndices {
                pdr: 0.9,
                parent_switches: 0.8,
                delay: f64::NAN,
                jitter: 0.7,
            },
        }
    }

    #[test]
    fn test_five_runs_confidence_margin() {
        let runs: Vec<_> = [50.0, 60.0, 55.0, 45.0, 60.0]
            .iter()
            .map(|&p| scalars(p, 100, 50))
            .collect();
        let summary = aggregate(&runs, &MultiRunConfig::default());

        assert_eq!(summary.runs, 5);
        assert_eq!(summary.pdr.mean, 54.0);
        // t(0.975, 4) * s / sqrt(5), s² = 170 / 4
        let expected = 2.776_445_105 * (42.5_f64).sqrt() / 5.0_f64.sqrt();
        assert!((summary.pdr.spread - expected).abs() < 1e-6);
        assert_eq!(summary.end_to_end_pdr.mean, 50.0);
        assert_eq!(summary.end_to_end_pdr.spread, 0.0);
    }

    #[test]
    fn test_undefined_samples_are_skipped() {
        let runs = vec![scalars(50.0, 10, 5), scalars(70.0, 10, 7)];
        let summary = aggregate(&runs, &MultiRunConfig::default());
        assert!(summary.delay.mean.is_nan());
        assert!(summary.delay.spread.is_nan());
        assert!(summary.fairness_delay.mean.is_nan());
        assert_eq!(summary.pdr.mean, 60.0);
        assert!(summary.pdr.spread.is_finite());
    }

    #[test]
    fn test_single_run_margin_undefined() {
        let summary = aggregate(&[scalars(50.0, 10, 5)], &MultiRunConfig::default());
        assert_eq!(summary.pdr.mean, 50.0);
        assert!(summary.pdr.spread.is_nan());

        let empty = aggregate(&[], &MultiRunConfig::default());
        assert_eq!(empty.runs, 0);
        assert!(empty.pdr.mean.is_nan());
    }

    #[test]
    fn test_std_dev_spread() {
        let config = MultiRunConfig {
            spread: SpreadKind::StdDev,
            ..MultiRunConfig::default()
        };
        let spread = spread_of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], &config);
        assert_eq!(spread, MeanSpread::new(5.0, 2.0));
        // Population spread of a single run is zero
        assert_eq!(spread_of(&[3.0], &config).spread, 0.0);
    }
}
