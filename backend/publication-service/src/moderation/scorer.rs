use super::{ModerationOracle, OracleError, Recommendation, Verdict};
use crate::models::Severity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    title: &'a str,
    content: &'a str,
}

/// Response shape of the external scorer. Only `severity` is required.
#[derive(Debug, Deserialize)]
struct ScoreResponse {
    severity: String,
    #[serde(default)]
    has_violations: Option<bool>,
    #[serde(default)]
    violations: Vec<String>,
    #[serde(default)]
    recommendation: Option<Recommendation>,
}

impl ScoreResponse {
    fn into_verdict(self) -> Result<Verdict, OracleError> {
        let severity: Severity = self.severity.parse().map_err(OracleError::InvalidResponse)?;
        if severity == Severity::Unknown {
            return Err(OracleError::InvalidResponse(
                "scorer reported an unknown severity".to_string(),
            ));
        }

        let mut verdict = Verdict::flagged(severity, self.violations);
        if let Some(has_violations) = self.has_violations {
            verdict.has_violations = has_violations || verdict.has_violations;
        }
        if let Some(recommendation) = self.recommendation {
            verdict.recommendation = recommendation;
        }
        Ok(verdict)
    }
}

/// Generative scoring service reached over HTTP (`POST {endpoint}` with
/// `{"title", "content"}`).
pub struct HttpScoringOracle {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpScoringOracle {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

#[async_trait]
impl ModerationOracle for HttpScoringOracle {
    fn name(&self) -> &str {
        "scorer"
    }

    async fn classify(&self, title: &str, content: &str) -> Result<Verdict, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ScoreRequest { title, content })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout)
                } else {
                    OracleError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Unavailable(format!(
                "scorer responded with {}",
                status
            )));
        }

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        body.into_verdict()
    }
}
