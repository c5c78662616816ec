//! Alert rules and their file-backed configuration.

use super::template::MessageTemplate;
use crate::errors::{AlertConfigError, TemplateError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How an observed value is compared against a rule's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Comparator {
    /// Fires when observed > threshold.
    GreaterThan,
    /// Fires when observed < threshold.
    LessThan,
    /// Fires when observed == threshold (exact).
    Equal,
}

impl Comparator {
    /// Applies the comparison.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn apply(self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => observed > threshold,
            Self::LessThan => observed < threshold,
            Self::Equal => observed == threshold,
        }
    }

    /// Returns the short configuration spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThan => "gt",
            Self::LessThan => "lt",
            Self::Equal => "eq",
        }
    }
}

impl TryFrom<String> for Comparator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gt" | "greater_than" => Ok(Self::GreaterThan),
            "lt" | "less_than" => Ok(Self::LessThan),
            "eq" | "equal" => Ok(Self::Equal),
            other => Err(format!("unknown comparator '{other}'")),
        }
    }
}

impl From<Comparator> for String {
    fn from(c: Comparator) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Something is broken.
    Error,
    /// Something is broken and urgent.
    Critical,
}

impl Severity {
    /// Returns true if an alert of this severity makes the system unhealthy.
    #[must_use]
    pub fn is_unhealthy(self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }

    /// Returns the lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl From<Severity> for String {
    fn from(s: Severity) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The alert types the engine knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertKind {
    /// The latest run failed or timed out.
    PipelineFailure,
    /// The longest run in the sample exceeded a duration.
    LongExecutionTime,
    /// Too few records in the store.
    LowDataVolume,
    /// Failed runs over sampled runs.
    HighFailureRate,
    /// Hours since the last run started.
    StaleData,
}

impl AlertKind {
    /// Every known kind.
    pub const ALL: [Self; 5] = [
        Self::PipelineFailure,
        Self::LongExecutionTime,
        Self::LowDataVolume,
        Self::HighFailureRate,
        Self::StaleData,
    ];

    /// Returns the configuration key.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::PipelineFailure => "pipeline_failure",
            Self::LongExecutionTime => "long_execution_time",
            Self::LowDataVolume => "low_data_volume",
            Self::HighFailureRate => "high_failure_rate",
            Self::StaleData => "stale_data",
        }
    }

    /// Looks up a kind by configuration key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    /// Returns the names available to this kind's message template.
    #[must_use]
    pub fn placeholders(self) -> &'static [&'static str] {
        match self {
            Self::PipelineFailure => &["status", "threshold"],
            Self::LongExecutionTime => &["execution_time", "threshold"],
            Self::LowDataVolume => &["records_processed", "threshold"],
            Self::HighFailureRate => &["failure_rate", "threshold", "failed_runs", "total_runs"],
            Self::StaleData => &["hours_since_last_run", "threshold"],
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A configured threshold condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Alert type key (e.g., `"stale_data"`).
    pub alert_type: String,
    /// Threshold the observed value is compared against.
    pub threshold: f64,
    /// Comparison operator.
    #[serde(alias = "comparator")]
    pub comparison: Comparator,
    /// Severity of the resulting event.
    pub severity: Severity,
    /// Message template rendered with the alert context.
    pub message_template: MessageTemplate,
}

impl AlertRule {
    /// Creates a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse.
    pub fn new(
        alert_type: impl Into<String>,
        threshold: f64,
        comparison: Comparator,
        severity: Severity,
        message_template: &str,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            alert_type: alert_type.into(),
            threshold,
            comparison,
            severity,
            message_template: MessageTemplate::parse(message_template)?,
        })
    }

    /// Returns the rule's kind, if known.
    #[must_use]
    pub fn kind(&self) -> Option<AlertKind> {
        AlertKind::from_key(&self.alert_type)
    }

    /// Validates the threshold and, for known kinds, the template placeholders.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-finite threshold or a template that
    /// references a name the kind never supplies.
    pub fn validate(&self) -> Result<(), AlertConfigError> {
        if !self.threshold.is_finite() {
            return Err(AlertConfigError::InvalidThreshold {
                alert_type: self.alert_type.clone(),
            });
        }
        if let Some(kind) = self.kind() {
            self.message_template
                .validate_against(kind.placeholders())
                .map_err(|source| AlertConfigError::Template {
                    alert_type: self.alert_type.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

fn default_rule(
    kind: AlertKind,
    threshold: f64,
    comparison: Comparator,
    severity: Severity,
    template: &str,
) -> AlertRule {
    AlertRule {
        alert_type: kind.key().to_string(),
        threshold,
        comparison,
        severity,
        message_template: MessageTemplate::parse(template)
            .unwrap_or_else(|e| unreachable!("built-in template '{template}' is invalid: {e}")),
    }
}

/// A validated set of alert rules, optionally bound to a file.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRuleSet {
    rules: Vec<AlertRule>,
    source: Option<PathBuf>,
}

impl AlertRuleSet {
    /// The default rules synthesized when no configuration exists.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            rules: vec![
                default_rule(
                    AlertKind::PipelineFailure,
                    0.0,
                    Comparator::GreaterThan,
                    Severity::Critical,
                    "Pipeline failed with status: {status}",
                ),
                default_rule(
                    AlertKind::LongExecutionTime,
                    3600.0,
                    Comparator::GreaterThan,
                    Severity::Warning,
                    "Pipeline took {execution_time:.1f} seconds (threshold: {threshold}s)",
                ),
                default_rule(
                    AlertKind::LowDataVolume,
                    100.0,
                    Comparator::LessThan,
                    Severity::Warning,
                    "Low data volume: {records_processed} records (threshold: {threshold})",
                ),
                default_rule(
                    AlertKind::HighFailureRate,
                    0.1,
                    Comparator::GreaterThan,
                    Severity::Error,
                    "High failure rate: {failure_rate:.1%} (threshold: {threshold:.1%})",
                ),
                default_rule(
                    AlertKind::StaleData,
                    48.0,
                    Comparator::GreaterThan,
                    Severity::Warning,
                    "Data is stale: {hours_since_last_run:.1f} hours old (threshold: {threshold}h)",
                ),
            ],
            source: None,
        }
    }

    /// Validates and wraps `rules`.
    ///
    /// # Errors
    ///
    /// Returns the first rule validation error.
    pub fn from_rules(rules: Vec<AlertRule>) -> Result<Self, AlertConfigError> {
        for rule in &rules {
            rule.validate()?;
        }
        for rule in rules.iter().filter(|r| r.kind().is_none()) {
            warn!(alert_type = %rule.alert_type, "Unknown alert type in configuration; it will be skipped");
        }
        Ok(Self {
            rules,
            source: None,
        })
    }

    /// Parses and validates a JSON rules document.
    ///
    /// # Errors
    ///
    /// Returns [`AlertConfigError::Malformed`] if the document does not parse,
    /// or a validation error.
    pub fn from_json(json: &str) -> Result<Self, AlertConfigError> {
        let rules: Vec<AlertRule> =
            serde_json::from_str(json).map_err(|e| AlertConfigError::Malformed(e.to_string()))?;
        Self::from_rules(rules)
    }

    /// Loads rules from `path`, writing the defaults there if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, or its
    /// contents are invalid.
    pub async fn load_or_init(path: impl AsRef<Path>) -> Result<Self, AlertConfigError> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let mut set = Self::from_json(&contents)?;
                info!(path = %path.display(), rules = set.len(), "Loaded alert rules");
                set.source = Some(path.to_path_buf());
                Ok(set)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut set = Self::defaults();
                set.write_to(path).await?;
                info!(path = %path.display(), "Alert rules not found; wrote default rules");
                set.source = Some(path.to_path_buf());
                Ok(set)
            }
            Err(source) => Err(AlertConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Re-reads the rules from the file they were loaded from.
    ///
    /// On error the current rules are left unchanged. A set with no backing
    /// file is not modified.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub async fn reload(&mut self) -> Result<(), AlertConfigError> {
        let Some(path) = self.source.clone() else {
            return Ok(());
        };
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| AlertConfigError::Read {
                path: path.clone(),
                source,
            })?;
        let fresh = Self::from_json(&contents)?;
        self.rules = fresh.rules;
        info!(path = %path.display(), rules = self.rules.len(), "Reloaded alert rules");
        Ok(())
    }

    /// Writes the default rules to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_defaults(path: impl AsRef<Path>) -> Result<Self, AlertConfigError> {
        let path = path.as_ref();
        let mut set = Self::defaults();
        set.write_to(path).await?;
        set.source = Some(path.to_path_buf());
        Ok(set)
    }

    async fn write_to(&self, path: &Path) -> Result<(), AlertConfigError> {
        let write_err = |source| AlertConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(&self.rules)
            .map_err(|e| AlertConfigError::Malformed(e.to_string()))?;
        tokio::fs::write(path, json).await.map_err(write_err)
    }

    /// Returns the rules.
    #[must_use]
    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for AlertRuleSet {
    fn default() -> Self {
        Self::defaults()
    }
}
