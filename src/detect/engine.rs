use crate::detect::baseline::{RollingBaseline, MIN_SAMPLES};
use crate::detect::threshold::{SensitivityMode, Threshold, ThresholdRegistry};
use crate::detect::{Anomaly, AnomalyKind, DetectError, LogEntry, Severity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Message fragments (lower-case) that mark a log line as a deployment failure.
pub const DEPLOYMENT_KEYWORDS: [&str; 6] = [
    "deployment failed",
    "deploy error",
    "rollback",
    "connection refused",
    "timeout",
    "out of memory",
];

const DESCRIPTION_CHARS: usize = 100;

/// Converts raw logs and metric snapshots into [`Anomaly`] records.
///
/// Owns the threshold registry, one rolling baseline per metric and the
/// anomaly history. Not internally synchronized: callers sharing a detector
/// across threads wrap it in a mutex.
#[derive(Debug, Default)]
pub struct AnomalyDetector {
    thresholds: ThresholdRegistry,
    baselines: HashMap<String, RollingBaseline>,
    history: Vec<Anomaly>,
    sensitivity_mode: SensitivityMode,
    history_limit: Option<usize>,
}

impl AnomalyDetector {
    pub fn new(thresholds: ThresholdRegistry) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    /// Build a detector from `(metric, threshold)` pairs, failing on the first
    /// malformed threshold.
    pub fn with_thresholds<I, K>(thresholds: I) -> Result<Self, DetectError>
    where
        I: IntoIterator<Item = (K, Threshold)>,
        K: Into<String>,
    {
        Ok(Self::new(ThresholdRegistry::from_entries(thresholds)?))
    }

    pub fn with_sensitivity_mode(mut self, mode: SensitivityMode) -> Self {
        self.sensitivity_mode = mode;
        self
    }

    /// Cap the anomaly history, dropping the oldest entries beyond `limit`.
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self.enforce_history_limit();
        self
    }

    pub fn thresholds(&self) -> &ThresholdRegistry {
        &self.thresholds
    }

    pub fn baseline(&self, metric: &str) -> Option<&RollingBaseline> {
        self.baselines.get(metric)
    }

    /// Flag ERROR / CRITICAL entries and deployment-failure messages.
    ///
    /// The level and keyword checks are independent, so one entry can yield
    /// two anomalies.
    pub fn detect_log_anomalies(&mut self, logs: &[LogEntry]) -> Vec<Anomaly> {
        if logs.is_empty() {
            return Vec::new();
        }

        let mut anomalies = Vec::new();
        for log in logs {
            let timestamp = log.timestamp.unwrap_or_else(Utc::now);
            let excerpt = truncate(&log.message, DESCRIPTION_CHARS);

            match log.level.to_uppercase().as_str() {
                "ERROR" => anomalies.push(Anomaly::new(
                    AnomalyKind::LogError,
                    Severity::High,
                    1.0,
                    "error_logs",
                    timestamp,
                    format!("Error in logs: {}", excerpt),
                )),
                "CRITICAL" => anomalies.push(Anomaly::new(
                    AnomalyKind::LogCritical,
                    Severity::Critical,
                    1.0,
                    "critical_logs",
                    timestamp,
                    format!("Critical error: {}", excerpt),
                )),
                _ => {}
            }

            if mentions_deployment_failure(&log.message) {
                anomalies.push(Anomaly::new(
                    AnomalyKind::DeploymentError,
                    Severity::Critical,
                    1.0,
                    "deployment_errors",
                    timestamp,
                    format!("Deployment issue detected: {}", excerpt),
                ));
            }
        }

        for a in &anomalies {
            debug!(kind = %a.kind, severity = %a.severity, id = %a.id, "log anomaly");
        }
        self.record(&anomalies);
        anomalies
    }

    /// Run threshold and rolling-baseline checks over one metric snapshot.
    ///
    /// Metrics are evaluated in the order the iterator yields them. Every
    /// value enters its metric's baseline, whether or not it breached a
    /// threshold.
    pub fn detect_metric_anomalies<I, K>(&mut self, metrics: I) -> Vec<Anomaly>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        self.detect_metric_anomalies_at(metrics, Utc::now())
    }

    /// Same as [`detect_metric_anomalies`](Self::detect_metric_anomalies) with
    /// an explicit observation time.
    pub fn detect_metric_anomalies_at<I, K>(&mut self, metrics: I, timestamp: DateTime<Utc>) -> Vec<Anomaly>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut anomalies = Vec::new();

        for (name, value) in metrics {
            let name = name.as_ref();

            if self.is_anomaly(value, name) {
                anomalies.push(Anomaly::new(
                    AnomalyKind::MetricThreshold,
                    self.calculate_severity(value, name),
                    value,
                    name,
                    timestamp,
                    format!("{} = {:.2} exceeds threshold", name, value),
                ));
            }

            let baseline = self.baselines.entry(name.to_string()).or_default();
            baseline.push(value);
            if baseline.len() < MIN_SAMPLES {
                continue;
            }

            let sensitivity = self.thresholds.sensitivity_for(name, self.sensitivity_mode);
            match baseline.is_outlier(value, sensitivity) {
                Ok(true) => anomalies.push(Anomaly::new(
                    AnomalyKind::MetricStatistical,
                    Severity::Medium,
                    value,
                    name,
                    timestamp,
                    format!("{} = {:.2} is statistically anomalous", name, value),
                )),
                Ok(false) => {}
                Err(e) => warn!(metric = %name, error = %e, "statistical check skipped"),
            }
        }

        for a in &anomalies {
            debug!(kind = %a.kind, severity = %a.severity, metric = %a.metric_name, value = a.value, "metric anomaly");
        }
        self.record(&anomalies);
        anomalies
    }

    /// True iff a threshold is registered for `metric` and `value` breaches it.
    pub fn is_anomaly(&self, value: f64, metric: &str) -> bool {
        self.thresholds
            .get(metric)
            .map_or(false, |t| t.violated_by(value))
    }

    /// Insert or replace the threshold for `metric`.
    pub fn set_threshold(&mut self, metric: impl Into<String>, threshold: Threshold) -> Result<(), DetectError> {
        self.thresholds.set(metric, threshold)
    }

    /// Severity of a threshold breach, tiered by the ratio to `max`.
    ///
    /// Unregistered metrics rate MEDIUM. Registered metrics without a
    /// (non-zero) `max` rate LOW.
    pub fn calculate_severity(&self, value: f64, metric: &str) -> Severity {
        let Some(threshold) = self.thresholds.get(metric) else {
            return Severity::Medium;
        };

        match threshold.max {
            Some(max) if max != 0.0 => {
                if value > max * 2.0 {
                    Severity::Critical
                } else if value > max * 1.5 {
                    Severity::High
                } else if value > max * 1.2 {
                    Severity::Medium
                } else {
                    Severity::Low
                }
            }
            _ => Severity::Low,
        }
    }

    /// The most recent `limit` anomalies, oldest first.
    pub fn get_anomaly_history(&self, limit: usize) -> &[Anomaly] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn record(&mut self, anomalies: &[Anomaly]) {
        self.history.extend_from_slice(anomalies);
        self.enforce_history_limit();
    }

    fn enforce_history_limit(&mut self) {
        if let Some(limit) = self.history_limit {
            if self.history.len() > limit {
                let excess = self.history.len() - limit;
                self.history.drain(..excess);
            }
        }
    }
}

fn mentions_deployment_failure(message: &str) -> bool {
    let lowered = message.to_lowercase();
    DEPLOYMENT_KEYWORDS.iter().any(|k| lowered.contains(k))
}

fn truncate(message: &str, max_chars: usize) -> &str {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}
