//! Causal narratives and remediation steps per root cause.

use crate::analysis::RootCause;

struct Entry {
    cause: RootCause,
    chain: [&'static str; 5],
    actions: [&'static str; 5],
}

fn table() -> [Entry; 5] {
    [
        Entry {
            cause: RootCause::DeploymentConfigurationError,
            chain: [
                "1. Deployment initiated with incorrect configuration",
                "2. Application fails to start or load settings",
                "3. Connection errors and timeouts occur",
                "4. System logs show critical errors",
                "5. Service becomes unavailable",
            ],
            actions: [
                "Review deployment configuration files",
                "Validate environment variables",
                "Check application logs for configuration errors",
                "Rollback to previous stable deployment",
                "Verify dependency versions",
            ],
        },
        Entry {
            cause: RootCause::ResourceExhaustion,
            chain: [
                "1. Resource usage gradually increases",
                "2. Threshold limits are exceeded (CPU/Memory)",
                "3. System performance degrades",
                "4. Timeouts and failures occur",
                "5. Service becomes unresponsive",
            ],
            actions: [
                "Scale up resources (CPU/Memory)",
                "Identify and optimize resource-intensive processes",
                "Implement resource limits and throttling",
                "Check for memory leaks",
                "Review and optimize queries",
            ],
        },
        Entry {
            cause: RootCause::DatabaseFailure,
            chain: [
                "1. Database connection pool exhausted",
                "2. Database queries timeout",
                "3. Application layer errors increase",
                "4. Data operations fail",
                "5. User-facing features break",
            ],
            actions: [
                "Check database connection pool settings",
                "Verify database server health",
                "Review slow query logs",
                "Optimize database indexes",
                "Check disk space on database server",
            ],
        },
        Entry {
            cause: RootCause::NetworkConnectivity,
            chain: [
                "1. Network interruption occurs",
                "2. Services lose connectivity",
                "3. API calls timeout",
                "4. Cascading failures in dependent services",
                "5. System-wide degradation",
            ],
            actions: [
                "Verify network connectivity between services",
                "Check firewall and security group rules",
                "Review DNS configuration",
                "Validate service endpoints",
                "Check for network timeouts in logs",
            ],
        },
        Entry {
            cause: RootCause::ApplicationBug,
            chain: [
                "1. Code defect triggers unexpected behavior",
                "2. Error handling fails or is inadequate",
                "3. System state becomes inconsistent",
                "4. Errors propagate through application",
                "5. Features malfunction or crash",
            ],
            actions: [
                "Review recent code changes",
                "Check error stack traces in logs",
                "Reproduce issue in test environment",
                "Run diagnostic tests",
                "Consider rolling back recent deployment",
            ],
        },
    ]
}

const GENERIC_ACTIONS: [&str; 5] = [
    "Review system logs for error messages",
    "Check recent changes or deployments",
    "Verify external dependencies are functioning",
    "Monitor system metrics for unusual patterns",
    "Consult with development team",
];

/// Cause-to-symptom narrative for `cause`.
pub fn causal_chain(cause: &RootCause) -> Vec<String> {
    match table().into_iter().find(|e| e.cause == *cause) {
        Some(entry) => entry.chain.iter().map(|s| s.to_string()).collect(),
        None => vec![
            format!("1. {} occurred", cause),
            "2. System anomalies detected".to_string(),
            "3. Service degradation observed".to_string(),
            "4. Failures propagated through system".to_string(),
        ],
    }
}

/// Ordered remediation steps for `cause`.
pub fn recommendations(cause: &RootCause) -> Vec<String> {
    let actions = table()
        .into_iter()
        .find(|e| e.cause == *cause)
        .map_or(GENERIC_ACTIONS, |e| e.actions);
    actions.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_cause_has_five_step_chain() {
        let chain = causal_chain(&RootCause::ResourceExhaustion);
        assert_eq!(chain.len(), 5);
        assert_eq!(chain[1], "2. Threshold limits are exceeded (CPU/Memory)");
    }

    #[test]
    fn test_unknown_cause_gets_generic_chain() {
        let chain = causal_chain(&RootCause::Other("CERT_EXPIRED".into()));
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0], "1. CERT_EXPIRED occurred");

        let chain = causal_chain(&RootCause::ExternalDependencyFailure);
        assert_eq!(chain[0], "1. EXTERNAL_DEPENDENCY_FAILURE occurred");
    }

    #[test]
    fn test_recommendations_fallback() {
        assert_eq!(recommendations(&RootCause::DatabaseFailure)[0], "Check database connection pool settings");
        let generic = recommendations(&RootCause::UnknownRootCause);
        assert_eq!(generic.len(), 5);
        assert_eq!(generic[4], "Consult with development team");
    }
}
