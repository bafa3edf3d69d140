//! Scheduler configuration.
//!
//! # Responsibility
//! - Hold the tunables of the critical path pass.
//! - Load them from JSON documents supplied by the host.
//!
//! # Invariants
//! - `Default` reproduces the historical behavior: a 0.5 day critical
//!   tolerance and sinks anchored to their own earliest finish.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default slack tolerance, in days, under which a milestone is critical.
pub const DEFAULT_CRITICAL_SLACK_THRESHOLD_DAYS: f64 = 0.5;

/// Where the backward pass anchors milestones that nothing depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkAnchor {
    /// `latest_finish = earliest_finish` of the sink itself.
    #[default]
    OwnFinish,
    /// `latest_finish` = the latest earliest finish across the project.
    ProjectFinish,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub critical_slack_threshold_days: f64,
    pub sink_anchor: SinkAnchor,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            critical_slack_threshold_days: DEFAULT_CRITICAL_SLACK_THRESHOLD_DAYS,
            sink_anchor: SinkAnchor::OwnFinish,
        }
    }
}

impl SchedulerConfig {
    /// Parses a JSON document. Missing keys fall back to defaults.
    ///
    /// # Errors
    /// - Malformed JSON or mistyped values.
    /// - A negative or non-finite critical threshold.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.critical_slack_threshold_days;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(())
    }

    /// Whether `slack_days` falls within the critical tolerance.
    pub fn is_critical_slack(&self, slack_days: i64) -> bool {
        (slack_days as f64) <= self.critical_slack_threshold_days
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    InvalidThreshold(f64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid scheduler config: {err}"),
            Self::InvalidThreshold(value) => write!(
                f,
                "critical slack threshold must be a finite non-negative number, got {value}"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidThreshold(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SchedulerConfig, SinkAnchor};

    #[test]
    fn empty_document_yields_defaults() {
        let config = SchedulerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert!(config.is_critical_slack(0));
        assert!(!config.is_critical_slack(1));
    }

    #[test]
    fn parses_overrides() {
        let config = SchedulerConfig::from_json_str(
            r#"{"critical_slack_threshold_days": 2.0, "sink_anchor": "project_finish"}"#,
        )
        .unwrap();
        assert_eq!(config.sink_anchor, SinkAnchor::ProjectFinish);
        assert!(config.is_critical_slack(2));
        assert!(!config.is_critical_slack(3));
    }

    #[test]
    fn rejects_negative_threshold() {
        let err = SchedulerConfig::from_json_str(r#"{"critical_slack_threshold_days": -1}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = SchedulerConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
