use crate::config::ScorerConfig;
use crate::engine::DomainScorer;
use crate::error::{Error, ScoreError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Serialize)]
struct ScoreRequest<'a> {
    domain: &'a str,
}

#[derive(Deserialize)]
struct ScoreResponse {
    score: f32,
}

/// Local inference service: `POST {"domain": d}` → `{"score": p}`.
pub struct HttpScorer {
    client: Client,
    endpoint: String,
}

impl HttpScorer {
    pub fn new(config: &ScorerConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Builds the scorer and scores `warmup_domain` once. A model that cannot
    /// answer at startup is fatal for the dispatcher.
    pub async fn connect(config: &ScorerConfig) -> Result<Self, Error> {
        let scorer = Self::new(config)
            .map_err(|e| Error::StartupDependency(format!("scorer client: {e}")))?;
        let warmup = scorer.score(&config.warmup_domain).await.map_err(|e| {
            Error::StartupDependency(format!("scorer at {}: {e}", config.endpoint))
        })?;
        info!(
            "Scorer ready at {} (warmup {} = {:.3})",
            config.endpoint, config.warmup_domain, warmup
        );
        Ok(scorer)
    }
}

#[async_trait::async_trait]
impl DomainScorer for HttpScorer {
    async fn score(&self, domain: &str) -> Result<f32, ScoreError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&ScoreRequest { domain })
            .send()
            .await
            .map_err(|e| ScoreError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScoreError::Status(status.as_u16()));
        }

        let body: ScoreResponse = resp
            .json()
            .await
            .map_err(|e| ScoreError::Request(e.to_string()))?;
        if !(0.0..=1.0).contains(&body.score) {
            return Err(ScoreError::OutOfRange(body.score));
        }
        Ok(body.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ScorerConfig {
        ScorerConfig {
            endpoint: format!("{}/score", server.uri()),
            ..ScorerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_score_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .and(body_json(serde_json::json!({ "domain": "casino.example" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "score": 0.97 })))
            .mount(&server)
            .await;

        let scorer = HttpScorer::new(&config(&server)).unwrap();
        let score = scorer.score("casino.example").await.unwrap();
        assert!((score - 0.97).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_out_of_range_and_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({ "domain": "weird.example" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "score": 1.5 })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({ "domain": "down.example" })))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let scorer = HttpScorer::new(&config(&server)).unwrap();
        assert!(matches!(
            scorer.score("weird.example").await,
            Err(ScoreError::OutOfRange(_))
        ));
        assert!(matches!(
            scorer.score("down.example").await,
            Err(ScoreError::Status(503))
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_when_warmup_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = HttpScorer::connect(&config(&server)).await.err().unwrap();
        assert!(matches!(err, Error::StartupDependency(_)));
    }
}
