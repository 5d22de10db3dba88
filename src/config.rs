use serde::{Deserialize, Serialize};

/// Analysis configuration, mirrors the optional YAML configuration file.
///
/// Every field has a default so an empty document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Node id of the DAG root; it never contributes a per-node record
    pub coordinator_id: u32,
    /// Emit records for nodes that never sent an application packet
    pub include_invalid_nodes: bool,
    /// Additionally require a node to have joined the DAG to be valid
    pub require_dag_join: bool,
    /// Trace framing (auto-detected from the simulator banner by default)
    pub framing: FramingMode,
    /// How the Energest "LPM" / "Deep LPM" labels map onto CPU power states
    pub lpm_mapping: LpmMapping,
    /// Hardware current profile used for charge estimation
    pub currents: CurrentProfile,
    /// Settings for aggregating several runs
    pub multi_run: MultiRunConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            coordinator_id: 1,
            include_invalid_nodes: true,
            require_dag_join: false,
            framing: FramingMode::Auto,
            lpm_mapping: LpmMapping::LpmIsDeepSleep,
            currents: CurrentProfile::default(),
            multi_run: MultiRunConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let currents = [
            ("radio_tx", self.currents.radio_tx),
            ("radio_rx", self.currents.radio_rx),
            ("cpu_on", self.currents.cpu_on),
            ("cpu_sleep", self.currents.cpu_sleep),
            ("cpu_deep_sleep", self.currents.cpu_deep_sleep),
        ];
        for (name, value) in currents {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidCurrent(format!(
                    "{} must be a finite, non-negative value in mA (got {})",
                    name, value
                )));
            }
        }

        let level = self.multi_run.confidence_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(ValidationError::InvalidMultiRun(format!(
                "confidence_level must be strictly between 0 and 1 (got {})",
                level
            )));
        }

        Ok(())
    }
}

/// Trace framing selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Simulator framing if the trace carries the simulator banner, testbed otherwise
    Auto,
    /// `timestamp node_id message...`
    Simulator,
    /// `unix_timestamp;node_tag;message...`
    Testbed,
}

/// Mapping of the two Energest low-power-mode labels.
///
/// Firmware variants disagree on which label is the deeper state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LpmMapping {
    /// "LPM" counts as deep sleep, "Deep LPM" as sleep
    LpmIsDeepSleep,
    /// "LPM" counts as sleep, "Deep LPM" as deep sleep
    LpmIsSleep,
}

/// Current draw per hardware state, in mA.
///
/// Defaults are CC2650 characterization values (datasheet for radio and
/// CPU-on at 48 MHz, empirical for the sleep states).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentProfile {
    pub radio_tx: f64,
    pub radio_rx: f64,
    pub cpu_on: f64,
    pub cpu_sleep: f64,
    pub cpu_deep_sleep: f64,
}

/// CPU clock of the reference platform in MHz
pub const CC2650_MHZ: f64 = 48.0;

impl Default for CurrentProfile {
    fn default() -> Self {
        Self {
            radio_tx: 9.100,
            radio_rx: 5.900,
            cpu_on: 0.061 * CC2650_MHZ,
            cpu_sleep: 1.335,
            cpu_deep_sleep: 0.010,
        }
    }
}

/// How the spread of a metric across runs is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadKind {
    /// Student-t margin of error at `confidence_level`
    Confidence,
    /// Population standard deviation
    StdDev,
}

/// Multi-run aggregation settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiRunConfig {
    pub spread: SpreadKind,
    pub confidence_level: f64,
}

impl Default for MultiRunConfig {
    fn default() -> Self {
        Self {
            spread: SpreadKind::Confidence,
            confidence_level: 0.95,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid current profile: {0}")]
    InvalidCurrent(String),
    #[error("Invalid multi-run configuration: {0}")]
    InvalidMultiRun(String),
}
