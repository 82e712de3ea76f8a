//! Root cause inference over correlated anomaly groups.

pub mod engine;
pub mod playbook;
pub mod rules;

pub use self::engine::{calculate_confidence, infer_root_cause, rank_causes, RcaEngine};
pub use self::rules::{apply_rule, default_rules, Rule, RulePattern};

use crate::detect::{Anomaly, AnomalyKind, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("invalid rule {id:?}: {reason}")]
    InvalidRule { id: String, reason: String },
}

/// Named root causes. Causes outside the built-in set travel as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RootCause {
    DeploymentConfigurationError,
    ResourceExhaustion,
    NetworkConnectivity,
    DatabaseFailure,
    ApplicationBug,
    ExternalDependencyFailure,
    /// Heuristic fallback found nothing.
    UnknownRootCause,
    /// Nothing was analyzed.
    Unknown,
    Other(String),
}

impl RootCause {
    pub fn as_str(&self) -> &str {
        match self {
            RootCause::DeploymentConfigurationError => "DEPLOYMENT_CONFIGURATION_ERROR",
            RootCause::ResourceExhaustion => "RESOURCE_EXHAUSTION",
            RootCause::NetworkConnectivity => "NETWORK_CONNECTIVITY",
            RootCause::DatabaseFailure => "DATABASE_FAILURE",
            RootCause::ApplicationBug => "APPLICATION_BUG",
            RootCause::ExternalDependencyFailure => "EXTERNAL_DEPENDENCY_FAILURE",
            RootCause::UnknownRootCause => "UNKNOWN_ROOT_CAUSE",
            RootCause::Unknown => "UNKNOWN",
            RootCause::Other(name) => name,
        }
    }
}

impl std::fmt::Display for RootCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<&str> for RootCause {
    fn from(name: &str) -> Self {
        match name {
            "DEPLOYMENT_CONFIGURATION_ERROR" => RootCause::DeploymentConfigurationError,
            "RESOURCE_EXHAUSTION" => RootCause::ResourceExhaustion,
            "NETWORK_CONNECTIVITY" => RootCause::NetworkConnectivity,
            "DATABASE_FAILURE" => RootCause::DatabaseFailure,
            "APPLICATION_BUG" => RootCause::ApplicationBug,
            "EXTERNAL_DEPENDENCY_FAILURE" => RootCause::ExternalDependencyFailure,
            "UNKNOWN_ROOT_CAUSE" => RootCause::UnknownRootCause,
            "UNKNOWN" => RootCause::Unknown,
            other => RootCause::Other(other.to_string()),
        }
    }
}

impl From<String> for RootCause {
    fn from(name: String) -> Self {
        RootCause::from(name.as_str())
    }
}

impl From<RootCause> for String {
    fn from(cause: RootCause) -> Self {
        match cause {
            RootCause::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// Related anomalies grouped upstream by the correlation stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedEvent {
    pub anomalies: Vec<Anomaly>,
    #[serde(default)]
    pub correlation_score: f64,
    #[serde(default)]
    pub time_window: String,
    #[serde(default)]
    pub affected_components: BTreeSet<String>,
}

impl CorrelatedEvent {
    pub fn new<I, S>(anomalies: Vec<Anomaly>, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            anomalies,
            correlation_score: 0.0,
            time_window: String::new(),
            affected_components: components.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.correlation_score = score;
        self
    }

    pub fn with_window(mut self, window: impl Into<String>) -> Self {
        self.time_window = window.into();
        self
    }
}

/// Flat evidence record copied from one anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub metric: String,
    pub value: f64,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl From<&Anomaly> for EvidenceItem {
    fn from(a: &Anomaly) -> Self {
        Self {
            kind: a.kind,
            metric: a.metric_name.clone(),
            value: a.value,
            severity: a.severity,
            timestamp: a.timestamp,
        }
    }
}

/// Outcome of one `analyze_root_cause` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaResult {
    pub id: Uuid,
    pub root_cause: RootCause,
    /// Always within `[0, 0.95]`.
    pub confidence: f64,
    /// Id of the winning rule; absent for heuristic and empty-input results.
    pub matched_rule: Option<String>,
    pub affected_components: BTreeSet<String>,
    pub causal_chain: Vec<String>,
    pub evidence: Vec<EvidenceItem>,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
