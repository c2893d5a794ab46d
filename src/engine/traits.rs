use crate::error::{JudgeError, ScoreError};

/// The fast local model.
#[async_trait::async_trait]
pub trait DomainScorer: Send + Sync {
    /// Probability in `[0, 1]` that `domain` belongs to the unsafe class.
    async fn score(&self, domain: &str) -> Result<f32, ScoreError>;
}

/// The slow external arbiter. Returns free text; the caller extracts the
/// verdict token.
#[async_trait::async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, domain: &str, evidence: &str) -> Result<String, JudgeError>;
}

/// Gathers a short description of what a domain serves.
///
/// Infallible by contract: failures are reported as sentinel strings.
#[async_trait::async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn gather(&self, domain: &str) -> String;
}
