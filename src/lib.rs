//! opstriage -- automated triage for operational signals.
//!
//! This crate flags abnormal log entries and metric observations as typed
//! anomalies, and infers the most likely root cause of correlated anomaly
//! groups together with a causal chain and remediation steps.

pub mod analysis;
pub mod config;
pub mod detect;

use anyhow::Result;
use serde::Serialize;

use crate::analysis::{CorrelatedEvent, RcaResult};
use crate::config::TriageConfig;
use crate::detect::{Anomaly, LogEntry, MetricSnapshot};

/// Anomalies found in one triage run and the verdict over them.
#[derive(Debug, Serialize)]
pub struct TriageReport {
    pub anomalies: Vec<Anomaly>,
    pub analysis: RcaResult,
}

/// Detect anomalies in `logs` and each metric snapshot (in order), then
/// analyze everything found as a single correlated group over `components`.
pub fn run_triage(
    config: &TriageConfig,
    logs: &[LogEntry],
    snapshots: &[MetricSnapshot],
    components: &[String],
) -> Result<TriageReport> {
    let mut detector = config.build_detector()?;
    let mut engine = config.build_engine()?;

    let mut anomalies = detector.detect_log_anomalies(logs);
    for snapshot in snapshots {
        anomalies.extend(detector.detect_metric_anomalies(snapshot.iter().map(|(k, v)| (k, *v))));
    }
    tracing::info!(count = anomalies.len(), "detection complete");

    let events = if anomalies.is_empty() {
        Vec::new()
    } else {
        vec![CorrelatedEvent::new(anomalies.clone(), components.iter().cloned()).with_score(1.0)]
    };
    let analysis = engine.analyze_root_cause(&events);

    Ok(TriageReport { anomalies, analysis })
}
