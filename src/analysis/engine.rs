use crate::analysis::playbook;
use crate::analysis::rules::{apply_rule, component_union, default_rules, flatten, Rule};
use crate::analysis::{AnalysisError, CorrelatedEvent, EvidenceItem, RcaResult, RootCause};
use crate::detect::{Anomaly, AnomalyKind, Severity};
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

const BASE_CONFIDENCE: f64 = 0.6;
const MAX_CONFIDENCE: f64 = 0.95;
const FALLBACK_CONFIDENCE: f64 = 0.5;
const MAX_EVIDENCE: usize = 10;

/// Fixed tie-break order for [`rank_causes`].
pub const CAUSE_PRIORITY: [RootCause; 6] = [
    RootCause::DeploymentConfigurationError,
    RootCause::ResourceExhaustion,
    RootCause::NetworkConnectivity,
    RootCause::DatabaseFailure,
    RootCause::ApplicationBug,
    RootCause::ExternalDependencyFailure,
];

/// Matches correlated anomaly groups against a rule set and explains the
/// most likely root cause.
///
/// Owns the rule set and the analysis history. Not internally synchronized.
#[derive(Debug)]
pub struct RcaEngine {
    rules: Vec<Rule>,
    history: Vec<RcaResult>,
    history_limit: Option<usize>,
}

impl Default for RcaEngine {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            history: Vec::new(),
            history_limit: None,
        }
    }
}

impl RcaEngine {
    /// Build an engine over `rules`, or over the built-in set when `rules` is
    /// empty. Rules keep their order; it decides ties.
    pub fn new(rules: Vec<Rule>) -> Result<Self, AnalysisError> {
        if rules.is_empty() {
            return Ok(Self::default());
        }
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self {
            rules,
            ..Self::default()
        })
    }

    /// Cap the analysis history, dropping the oldest results beyond `limit`.
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self.enforce_history_limit();
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn analyze_root_cause(&mut self, events: &[CorrelatedEvent]) -> RcaResult {
        if events.is_empty() {
            let result = RcaResult {
                id: Uuid::new_v4(),
                root_cause: RootCause::Unknown,
                confidence: 0.0,
                matched_rule: None,
                affected_components: BTreeSet::new(),
                causal_chain: Vec::new(),
                evidence: Vec::new(),
                recommendations: vec!["No events to analyze".to_string()],
                timestamp: Utc::now(),
            };
            debug!("no events to analyze");
            self.record(result.clone());
            return result;
        }

        let anomalies = flatten(events);

        // Scores depend only on the anomalies, so every matching rule ties and
        // the first in rule order wins.
        let mut best: Option<(&Rule, f64)> = None;
        for rule in &self.rules {
            if !apply_rule(rule, events) {
                continue;
            }
            let confidence = calculate_confidence(anomalies.iter().copied());
            debug!(rule = %rule.id, cause = %rule.root_cause, confidence, "rule matched");
            if best.map_or(true, |(_, c)| confidence > c) {
                best = Some((rule, confidence));
            }
        }

        let (root_cause, confidence, matched_rule) = match best {
            Some((rule, confidence)) => (rule.root_cause.clone(), confidence, Some(rule.id.clone())),
            None => (
                infer_root_cause(anomalies.iter().copied()),
                FALLBACK_CONFIDENCE,
                None,
            ),
        };

        let result = RcaResult {
            id: Uuid::new_v4(),
            causal_chain: self.generate_causal_chain(&root_cause),
            recommendations: playbook::recommendations(&root_cause),
            affected_components: component_union(events),
            evidence: anomalies
                .iter()
                .take(MAX_EVIDENCE)
                .map(|a| EvidenceItem::from(*a))
                .collect(),
            root_cause,
            confidence,
            matched_rule,
            timestamp: Utc::now(),
        };

        info!(
            id = %result.id,
            cause = %result.root_cause,
            confidence = result.confidence,
            rule = ?result.matched_rule,
            anomalies = anomalies.len(),
            "root cause verdict"
        );
        self.record(result.clone());
        result
    }

    /// Cause-to-symptom narrative for `root_cause`.
    pub fn generate_causal_chain(&self, root_cause: &RootCause) -> Vec<String> {
        playbook::causal_chain(root_cause)
    }

    /// The most recent `limit` results, oldest first.
    pub fn get_analysis_history(&self, limit: usize) -> &[RcaResult] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn record(&mut self, result: RcaResult) {
        self.history.push(result);
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

/// 0.6, plus 0.1 per CRITICAL and 0.05 per HIGH anomaly, capped at 0.95.
pub fn calculate_confidence<'a, I>(anomalies: I) -> f64
where
    I: IntoIterator<Item = &'a Anomaly>,
{
    let (critical, high) = anomalies.into_iter().fold((0u32, 0u32), |(c, h), a| match a.severity {
        Severity::Critical => (c + 1, h),
        Severity::High => (c, h + 1),
        _ => (c, h),
    });
    let confidence = BASE_CONFIDENCE + f64::from(critical) * 0.1 + f64::from(high) * 0.05;
    confidence.min(MAX_CONFIDENCE)
}

/// Heuristic cause when no rule matches. First satisfied check wins.
pub fn infer_root_cause<'a, I>(anomalies: I) -> RootCause
where
    I: IntoIterator<Item = &'a Anomaly>,
{
    let mut deployment = 0usize;
    let mut resource = 0usize;
    let mut log_errors = 0usize;

    for a in anomalies {
        if a.kind == AnomalyKind::DeploymentError {
            deployment += 1;
        }
        if a.kind.is_metric() {
            let metric = a.metric_name.to_lowercase();
            if metric.contains("cpu") || metric.contains("memory") {
                resource += 1;
            }
        }
        if a.kind.is_log() {
            log_errors += 1;
        }
    }

    if deployment > 0 {
        RootCause::DeploymentConfigurationError
    } else if resource >= 2 {
        RootCause::ResourceExhaustion
    } else if log_errors >= 3 {
        RootCause::ApplicationBug
    } else {
        RootCause::UnknownRootCause
    }
}

/// Order `causes` by [`CAUSE_PRIORITY`], then the rest in input order.
/// Duplicates collapse to their first position.
pub fn rank_causes(causes: &[RootCause]) -> Vec<RootCause> {
    let mut ranked: Vec<RootCause> = CAUSE_PRIORITY
        .iter()
        .filter(|p| causes.contains(*p))
        .cloned()
        .collect();
    for cause in causes {
        if !ranked.contains(cause) {
            ranked.push(cause.clone());
        }
    }
    ranked
}
