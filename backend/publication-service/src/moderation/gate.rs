use super::{ModerationOracle, OracleError, Recommendation, Verdict};
use crate::metrics;
use crate::models::{Severity, ViolationReport};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Combined outcome of every configured oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub report: ViolationReport,
    /// At least one oracle asked for human review
    pub recommend_review: bool,
    /// At least one oracle failed and was replaced by the `unknown` fallback
    pub degraded: bool,
}

impl Assessment {
    /// Critical content is never persisted
    pub fn is_blocking(&self) -> bool {
        self.report.severity == Severity::Critical
    }

    /// Content that must wait for a moderator regardless of what the caller
    /// asked for
    pub fn requires_review(&self) -> bool {
        self.report.severity != Severity::None
            || self.report.has_violations
            || self.recommend_review
    }

    /// Severe enough to alert the moderation staff
    pub fn is_alert(&self) -> bool {
        self.report.severity >= Severity::High
    }
}

/// Fan a (title, content) pair out to every oracle and fold the verdicts:
/// worst severity wins, tags are unioned, any review recommendation forces
/// review, and a failed or timed-out oracle counts as `unknown`.
pub struct ModerationGate {
    oracles: Vec<Arc<dyn ModerationOracle>>,
    timeout: Duration,
}

impl ModerationGate {
    pub fn new(oracles: Vec<Arc<dyn ModerationOracle>>, timeout: Duration) -> Self {
        Self { oracles, timeout }
    }

    pub fn oracle_count(&self) -> usize {
        self.oracles.len()
    }

    pub async fn assess(&self, title: &str, content: &str) -> Assessment {
        let calls = self.oracles.iter().map(|oracle| async move {
            let outcome = match timeout(self.timeout, oracle.classify(title, content)).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(self.timeout)),
            };
            (oracle.name().to_string(), outcome)
        });

        let outcomes = join_all(calls).await;
        let assessment = combine(outcomes);

        metrics::record_verdict(assessment.report.severity.as_str());
        info!(
            severity = %assessment.report.severity,
            violations = assessment.report.violations.len(),
            degraded = assessment.degraded,
            "moderation assessment complete"
        );

        assessment
    }
}

/// Fold per-oracle outcomes into one assessment
pub fn combine(outcomes: Vec<(String, Result<Verdict, OracleError>)>) -> Assessment {
    let mut severity = Severity::None;
    let mut has_violations = false;
    let mut violations: Vec<String> = Vec::new();
    let mut recommend_review = false;
    let mut degraded = false;

    for (oracle, outcome) in outcomes {
        match outcome {
            Ok(verdict) => {
                severity = severity.max(verdict.severity);
                has_violations |= verdict.has_violations;
                recommend_review |= verdict.recommendation != Recommendation::Approve;
                for tag in verdict.violations {
                    if !violations.contains(&tag) {
                        violations.push(tag);
                    }
                }
            }
            Err(e) => {
                warn!(oracle = %oracle, error = %e, "oracle failed, routing content to review");
                metrics::record_oracle_fallback(e.reason());
                severity = severity.max(Severity::Unknown);
                degraded = true;
            }
        }
    }

    Assessment {
        report: ViolationReport {
            has_violations: has_violations || !violations.is_empty(),
            severity,
            violations,
            analyzed_at: Some(Utc::now()),
        },
        recommend_review,
        degraded,
    }
}
