/// Moderation decision boundary
///
/// Oracles classify a post's title and content into a severity and a list of
/// violation tags. The lifecycle never looks at content itself; it only
/// consumes the combined `Assessment` produced by the `ModerationGate`.
pub mod gate;
pub mod rules;
pub mod scorer;

pub use gate::{Assessment, ModerationGate};
pub use rules::RuleBasedOracle;
pub use scorer::HttpScoringOracle;

use crate::models::Severity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// What an oracle suggests doing with the content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    #[default]
    Approve,
    Review,
    Reject,
}

/// One oracle's classification of a piece of content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Verdict {
    pub has_violations: bool,
    pub severity: Severity,
    pub violations: Vec<String>,
    #[serde(default)]
    pub recommendation: Recommendation,
}

impl Verdict {
    pub fn clean() -> Self {
        Self::default()
    }

    /// Build a verdict from collected tags, deriving the recommendation
    /// from the severity.
    pub fn flagged(severity: Severity, violations: Vec<String>) -> Self {
        let recommendation = match severity {
            Severity::Critical => Recommendation::Reject,
            Severity::None if violations.is_empty() => Recommendation::Approve,
            _ => Recommendation::Review,
        };

        Self {
            has_violations: !violations.is_empty(),
            severity,
            violations,
            recommendation,
        }
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("oracle misconfigured: {0}")]
    Config(String),
}

impl OracleError {
    /// Metric label for the fallback this error caused
    pub fn reason(&self) -> &'static str {
        match self {
            OracleError::Timeout(_) => "timeout",
            OracleError::Unavailable(_) => "unavailable",
            OracleError::InvalidResponse(_) => "invalid_response",
            OracleError::Config(_) => "config",
        }
    }
}

/// An opaque content classifier
#[async_trait]
pub trait ModerationOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, title: &str, content: &str) -> Result<Verdict, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flagged_recommendation_follows_severity() {
        assert_eq!(
            Verdict::flagged(Severity::Critical, vec!["threat".into()]).recommendation,
            Recommendation::Reject
        );
        assert_eq!(
            Verdict::flagged(Severity::Low, vec!["caps".into()]).recommendation,
            Recommendation::Review
        );
        let clean = Verdict::flagged(Severity::None, vec![]);
        assert_eq!(clean, Verdict::clean());
    }

    #[test]
    fn test_verdict_deserializes_without_recommendation() {
        let verdict: Verdict = serde_json::from_str(
            r#"{"has_violations": true, "severity": "high", "violations": ["hate_speech"]}"#,
        )
        .unwrap();
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.recommendation, Recommendation::Approve);
    }
}
