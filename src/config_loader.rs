use crate::config::AnalysisConfig;
use color_eyre::eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

/// Load and validate the analysis configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<AnalysisConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read configuration file: {}", config_path.display()))?;

    let config: AnalysisConfig = if content.trim().is_empty() {
        AnalysisConfig::default()
    } else {
        serde_yaml::from_str(&content).with_context(|| {
            format!("Failed to parse configuration file: {}", config_path.display())
        })?
    };

    config.validate()?;

    Ok(config)
}

/// Load the configuration if a path was given, otherwise fall back to defaults
pub fn load_or_default(config_path: Option<&Path>) -> Result<AnalysisConfig> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(AnalysisConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FramingMode, SpreadKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "coordinator_id: 2\nframing: simulator\nmulti_run:\n  spread: std_dev").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.coordinator_id, 2);
        assert_eq!(config.framing, FramingMode::Simulator);
        assert_eq!(config.multi_run.spread, SpreadKind::StdDev);
    }

    #[test]
    fn test_load_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_load_invalid_config_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "multi_run:\n  confidence_level: 1.5").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(load_config(Path::new("/nonexistent/rplsim.yaml")).is_err());
        assert!(load_or_default(None).is_ok());
    }
}
