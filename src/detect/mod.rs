//! Anomaly detection over log entries and metric snapshots.

pub mod baseline;
pub mod engine;
pub mod threshold;

pub use self::baseline::RollingBaseline;
pub use self::engine::AnomalyDetector;
pub use self::threshold::{SensitivityMode, Threshold, ThresholdRegistry};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One metric observation per name, in the order the producer supplied them.
pub type MetricSnapshot = IndexMap<String, f64>;

#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error("invalid threshold for {metric}: min {min} exceeds max {max}")]
    InvalidThreshold { metric: String, min: f64, max: f64 },
    #[error("insufficient baseline data: need {needed} samples, have {have}")]
    InsufficientBaseline { needed: usize, have: usize },
    #[error("degenerate baseline: mean {mean}, std_dev {std_dev}")]
    DegenerateBaseline { mean: f64, std_dev: f64 },
}

/// Severity levels for detected anomalies, ordered LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Ordinal rank used by rule matching (1..=4).
    pub fn rank(self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// What kind of signal produced an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    LogError,
    LogCritical,
    DeploymentError,
    MetricThreshold,
    MetricStatistical,
}

impl AnomalyKind {
    pub fn is_metric(self) -> bool {
        matches!(self, AnomalyKind::MetricThreshold | AnomalyKind::MetricStatistical)
    }

    pub fn is_log(self) -> bool {
        matches!(self, AnomalyKind::LogError | AnomalyKind::LogCritical)
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::LogError => write!(f, "LOG_ERROR"),
            AnomalyKind::LogCritical => write!(f, "LOG_CRITICAL"),
            AnomalyKind::DeploymentError => write!(f, "DEPLOYMENT_ERROR"),
            AnomalyKind::MetricThreshold => write!(f, "METRIC_THRESHOLD"),
            AnomalyKind::MetricStatistical => write!(f, "METRIC_STATISTICAL"),
        }
    }
}

/// A single detected deviation.
///
/// Serializes to the flat record `{id, type, severity, value, metric, timestamp, description}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// `<metric>_<YYYYmmdd_HHMMSS>`. Two anomalies on the same metric within
    /// the same second share an id.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub value: f64,
    #[serde(rename = "metric")]
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl Anomaly {
    pub fn new(
        kind: AnomalyKind,
        severity: Severity,
        value: f64,
        metric_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        let metric_name = metric_name.into();
        let id = format!("{}_{}", metric_name, timestamp.format("%Y%m%d_%H%M%S"));
        Self {
            id,
            kind,
            severity,
            value,
            metric_name,
            timestamp,
            description: description.into(),
        }
    }
}

/// A raw log record handed over by the ingestion layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    /// Detection time is used when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_anomaly_id_is_second_granular() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 9, 10, 0, 5).unwrap();
        let a = Anomaly::new(AnomalyKind::MetricThreshold, Severity::High, 95.0, "cpu_usage", ts, "x");
        assert_eq!(a.id, "cpu_usage_20260209_100005");

        let later = ts + chrono::Duration::milliseconds(400);
        let b = Anomaly::new(AnomalyKind::MetricStatistical, Severity::Medium, 96.0, "cpu_usage", later, "y");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_anomaly_serializes_flat_record() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 9, 10, 0, 0).unwrap();
        let a = Anomaly::new(AnomalyKind::LogCritical, Severity::Critical, 1.0, "critical_logs", ts, "boom");
        let json = serde_json::to_value(&a).unwrap();

        assert_eq!(json["type"], "LOG_CRITICAL");
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["metric"], "critical_logs");
        assert_eq!(json["value"], 1.0);
        assert_eq!(json["timestamp"], "2026-02-09T10:00:00Z");
        assert_eq!(json["id"], "critical_logs_20260209_100000");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Critical.rank(), 4);
        assert_eq!(Severity::Low.rank(), 1);
    }

    #[test]
    fn test_log_entry_defaults() {
        let entry: LogEntry = serde_json::from_str("{}").unwrap();
        assert!(entry.level.is_empty());
        assert!(entry.message.is_empty());
        assert!(entry.timestamp.is_none());
    }
}
