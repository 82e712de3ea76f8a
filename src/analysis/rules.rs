use crate::analysis::{AnalysisError, CorrelatedEvent, RootCause};
use crate::detect::{Anomaly, AnomalyKind, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Conjunction of optional conditions over a group of events. Absent
/// conditions always hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePattern {
    /// Every listed kind must appear among the anomalies.
    pub required_types: Option<BTreeSet<AnomalyKind>>,
    /// At least one anomaly at or above this severity.
    pub min_severity: Option<Severity>,
    /// Minimum total anomaly count.
    pub min_events: Option<usize>,
    /// Every listed component must be affected by some event.
    pub components: Option<BTreeSet<String>>,
}

/// Maps a pattern to a named root cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub pattern: RulePattern,
    pub root_cause: RootCause,
    /// Descriptive only; confidence is scored from anomaly severities.
    #[serde(default)]
    pub confidence_prior: f64,
    #[serde(default)]
    pub description: String,
}

impl Rule {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.id.trim().is_empty() {
            return Err(AnalysisError::InvalidRule {
                id: self.id.clone(),
                reason: "rule id is empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence_prior) {
            return Err(AnalysisError::InvalidRule {
                id: self.id.clone(),
                reason: format!("confidence_prior {} is outside [0, 1]", self.confidence_prior),
            });
        }
        Ok(())
    }
}

/// Built-in rule set used when none is configured.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "R001".to_string(),
            pattern: RulePattern {
                required_types: Some(BTreeSet::from([AnomalyKind::DeploymentError])),
                min_severity: Some(Severity::Critical),
                ..RulePattern::default()
            },
            root_cause: RootCause::DeploymentConfigurationError,
            confidence_prior: 0.85,
            description: "Deployment configuration issues".to_string(),
        },
        Rule {
            id: "R002".to_string(),
            pattern: RulePattern {
                required_types: Some(BTreeSet::from([AnomalyKind::MetricThreshold])),
                min_severity: Some(Severity::High),
                min_events: Some(2),
                ..RulePattern::default()
            },
            root_cause: RootCause::ResourceExhaustion,
            confidence_prior: 0.75,
            description: "Resource exhaustion patterns".to_string(),
        },
        Rule {
            id: "R003".to_string(),
            pattern: RulePattern {
                required_types: Some(BTreeSet::from([AnomalyKind::LogError, AnomalyKind::LogCritical])),
                min_events: Some(3),
                ..RulePattern::default()
            },
            root_cause: RootCause::ApplicationBug,
            confidence_prior: 0.70,
            description: "Application error patterns".to_string(),
        },
    ]
}

pub(crate) fn flatten(events: &[CorrelatedEvent]) -> Vec<&Anomaly> {
    events.iter().flat_map(|e| e.anomalies.iter()).collect()
}

pub(crate) fn component_union(events: &[CorrelatedEvent]) -> BTreeSet<String> {
    events
        .iter()
        .flat_map(|e| e.affected_components.iter().cloned())
        .collect()
}

/// Whether every condition present in `rule.pattern` holds for `events`.
pub fn apply_rule(rule: &Rule, events: &[CorrelatedEvent]) -> bool {
    let pattern = &rule.pattern;
    let anomalies = flatten(events);

    if let Some(required) = &pattern.required_types {
        let present: BTreeSet<AnomalyKind> = anomalies.iter().map(|a| a.kind).collect();
        if !required.is_subset(&present) {
            return false;
        }
    }

    if let Some(min) = pattern.min_severity {
        if !anomalies.iter().any(|a| a.severity.rank() >= min.rank()) {
            return false;
        }
    }

    if let Some(min_events) = pattern.min_events {
        if anomalies.len() < min_events {
            return false;
        }
    }

    if let Some(required) = &pattern.components {
        if !required.is_subset(&component_union(events)) {
            return false;
        }
    }

    true
}
