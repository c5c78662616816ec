//! Runtime configuration.
//!
//! Loaded from an optional JSON file, then overridden from the environment.
//! Every field has a default, so an absent file yields a usable config.

use crate::errors::PipewatchError;
use crate::monitor::DEFAULT_SAMPLE_SIZE;
use crate::observability::LogFormat;
use crate::pipeline::ETL_PIPELINE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `pipeline_name`.
pub const ENV_PIPELINE: &str = "PIPEWATCH_PIPELINE";
/// Overrides `data_dir`.
pub const ENV_DATA_DIR: &str = "PIPEWATCH_DATA_DIR";
/// Overrides `sample_size`.
pub const ENV_SAMPLE_SIZE: &str = "PIPEWATCH_SAMPLE_SIZE";
/// Overrides `log_format`.
pub const ENV_LOG_FORMAT: &str = "PIPEWATCH_LOG_FORMAT";

const ENV_KEYS: [&str; 4] = [ENV_PIPELINE, ENV_DATA_DIR, ENV_SAMPLE_SIZE, ENV_LOG_FORMAT];

/// Configuration shared by the CLI commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipewatchConfig {
    /// Pipeline whose runs are monitored.
    pub pipeline_name: String,
    /// Directory holding the run history and materialization log.
    pub data_dir: PathBuf,
    /// Run history file, relative to `data_dir` unless absolute.
    pub history_file: PathBuf,
    /// Materialization log file, relative to `data_dir` unless absolute.
    pub materialization_file: PathBuf,
    /// Alert rule configuration file.
    pub alert_rules_file: PathBuf,
    /// Alert log file.
    pub alert_log_file: PathBuf,
    /// Directory monitoring reports are written to.
    pub report_dir: PathBuf,
    /// Recent runs sampled per cycle.
    pub sample_size: usize,
    /// Seconds between scheduled cycles.
    pub monitor_interval_secs: u64,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for PipewatchConfig {
    fn default() -> Self {
        Self {
            pipeline_name: ETL_PIPELINE.to_string(),
            data_dir: PathBuf::from("data"),
            history_file: PathBuf::from("runs.jsonl"),
            materialization_file: PathBuf::from("materializations.jsonl"),
            alert_rules_file: PathBuf::from("pipeline_alerts.json"),
            alert_log_file: PathBuf::from("logs/alerts.log"),
            report_dir: PathBuf::from("results"),
            sample_size: DEFAULT_SAMPLE_SIZE,
            monitor_interval_secs: 3600,
            log_format: LogFormat::Plain,
        }
    }
}

impl PipewatchConfig {
    /// Loads the config file (if given and present), applies environment
    /// overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`PipewatchError::Config`] for an unparsable file, an invalid
    /// override or an invalid value, and [`PipewatchError::Io`] if the file
    /// exists but cannot be read.
    pub fn load(path: Option<&Path>) -> Result<Self, PipewatchError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let mut envs = HashMap::new();
        for key in ENV_KEYS {
            if let Ok(value) = std::env::var(key) {
                envs.insert(key.to_string(), value);
            }
        }
        config.apply_env(&envs)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, PipewatchError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&contents)
            .map_err(|e| PipewatchError::Config(format!("{}: {e}", path.display())))
    }

    /// Parses a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`PipewatchError::Config`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, PipewatchError> {
        serde_json::from_str(json).map_err(|e| PipewatchError::Config(e.to_string()))
    }

    fn apply_env(&mut self, envs: &HashMap<String, String>) -> Result<(), PipewatchError> {
        let get = |key: &str| {
            envs.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        if let Some(pipeline) = get(ENV_PIPELINE) {
            self.pipeline_name = pipeline.to_string();
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(ENV_SAMPLE_SIZE) {
            self.sample_size = raw.parse().map_err(|_| {
                PipewatchError::Config(format!(
                    "invalid {ENV_SAMPLE_SIZE}='{raw}'; expected a positive integer"
                ))
            })?;
        }
        if let Some(raw) = get(ENV_LOG_FORMAT) {
            self.log_format = raw.parse()?;
        }
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipewatchError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), PipewatchError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(PipewatchError::Config("pipeline_name must not be empty".into()));
        }
        if self.sample_size == 0 {
            return Err(PipewatchError::Config("sample_size must be > 0".into()));
        }
        if self.monitor_interval_secs == 0 {
            return Err(PipewatchError::Config(
                "monitor_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolved run history path.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file)
    }

    /// Resolved materialization log path.
    #[must_use]
    pub fn materialization_path(&self) -> PathBuf {
        self.data_dir.join(&self.materialization_file)
    }

    /// Interval between scheduled cycles.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn envs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = PipewatchConfig::default();
        assert_eq!(config.pipeline_name, "etl_pipeline");
        assert_eq!(config.sample_size, 50);
        assert_eq!(config.monitor_interval(), Duration::from_secs(3600));
        assert_eq!(config.history_path(), PathBuf::from("data/runs.jsonl"));
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipewatchConfig::from_json(
            r#"{"pipeline_name": "acquire_and_load_pipeline", "log_format": "json"}"#,
        )
        .unwrap();

        assert_eq!(config.pipeline_name, "acquire_and_load_pipeline");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.report_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipewatchConfig::default();
        config
            .apply_env(&envs(&[
                (ENV_PIPELINE, "transform_pipeline"),
                (ENV_DATA_DIR, "/var/lib/pipewatch"),
                (ENV_SAMPLE_SIZE, " 20 "),
                (ENV_LOG_FORMAT, ""),
            ]))
            .unwrap();

        assert_eq!(config.pipeline_name, "transform_pipeline");
        assert_eq!(config.sample_size, 20);
        assert_eq!(config.log_format, LogFormat::Plain);
        assert_eq!(
            config.materialization_path(),
            PathBuf::from("/var/lib/pipewatch/materializations.jsonl")
        );
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = PipewatchConfig::default();
        assert_err!(config.apply_env(&envs(&[(ENV_SAMPLE_SIZE, "many")])));
        assert_err!(config.apply_env(&envs(&[(ENV_LOG_FORMAT, "xml")])));
    }

    #[test]
    fn test_validation() {
        let config = PipewatchConfig {
            sample_size: 0,
            ..PipewatchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_file_loading() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.json");
        assert_eq!(
            PipewatchConfig::from_file(&missing).unwrap(),
            PipewatchConfig::default()
        );

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        let err = PipewatchConfig::from_file(&bad).unwrap_err();
        assert!(err.to_string().contains("bad.json"));

        let good = dir.path().join("pipewatch.json");
        std::fs::write(&good, r#"{"monitor_interval_secs": 60}"#).unwrap();
        assert_eq!(
            PipewatchConfig::from_file(&good).unwrap().monitor_interval_secs,
            60
        );
    }
}
