use super::traits::{EvidenceSource, Judge};
use super::verdict::{Disposition, RetainReason, Verdict};
use crate::config::ArbiterConfig;
use crate::domain::Domain;
use crate::error::{JudgeError, Result};
use crate::logger::{VerdictAction, VerdictEntry, VerdictLogger};
use crate::store::{self, RunGuard, StoreSet};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ArbiterSettings {
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    /// Pause between domains, for the judgment service's rate limits.
    pub polite_delay: Duration,
}

impl From<&ArbiterConfig> for ArbiterSettings {
    fn from(config: &ArbiterConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            rate_limit_backoff: Duration::from_secs(config.rate_limit_backoff_secs),
            polite_delay: Duration::from_millis(config.polite_delay_ms),
        }
    }
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self::from(&ArbiterConfig::default())
    }
}

/// Accounting for one pass. Every domain of the Suspect snapshot lands in
/// exactly one of `whitelisted`, `blacklisted` or `retained`.
#[derive(Debug, Default)]
pub struct PassReport {
    pub whitelisted: Vec<Domain>,
    pub blacklisted: Vec<Domain>,
    pub retained: Vec<(Domain, RetainReason)>,
    /// Resolved without a judgment call because a list already held them.
    pub settled: usize,
}

impl PassReport {
    pub fn total(&self) -> usize {
        self.whitelisted.len() + self.blacklisted.len() + self.retained.len()
    }

    fn record(&mut self, domain: Domain, disposition: Disposition) {
        match disposition {
            Disposition::Resolved(Verdict::Safe) => self.whitelisted.push(domain),
            Disposition::Resolved(Verdict::Unsafe) => self.blacklisted.push(domain),
            Disposition::Retained(reason) => self.retained.push((domain, reason)),
        }
    }

    fn resolved(&self) -> FxHashSet<Domain> {
        self.whitelisted
            .iter()
            .chain(&self.blacklisted)
            .cloned()
            .collect()
    }
}

/// Drains the Suspect store into Whitelist/Blacklist using gathered
/// evidence and an external judgment.
pub struct Arbiter {
    stores: StoreSet,
    evidence: Arc<dyn EvidenceSource>,
    judge: Arc<dyn Judge>,
    settings: ArbiterSettings,
    verdicts: Option<Arc<VerdictLogger>>,
}

impl Arbiter {
    pub fn new(
        stores: StoreSet,
        evidence: Arc<dyn EvidenceSource>,
        judge: Arc<dyn Judge>,
        settings: ArbiterSettings,
    ) -> Self {
        Self {
            stores,
            evidence,
            judge,
            settings,
            verdicts: None,
        }
    }

    pub fn with_verdict_logger(mut self, logger: Arc<VerdictLogger>) -> Self {
        self.verdicts = Some(logger);
        self
    }

    /// One pass over the current Suspect snapshot.
    ///
    /// At the end, Suspect loses exactly the snapshot domains resolved in
    /// this pass. Retained domains stay, and so do entries appended by the
    /// dispatcher while the pass was running. Cancellation is checked
    /// between domains; whatever was not reached is retained.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let _guard = RunGuard::try_acquire(self.stores.data_dir(), "arbiter")?;

        let stores = self.stores.clone();
        let (snapshot, whitelist, blacklist) = store::blocking(move || {
            Ok((
                stores.suspect.load_sorted()?,
                stores.whitelist.load()?,
                stores.blacklist.load()?,
            ))
        })
        .await?;

        let mut report = PassReport::default();
        if snapshot.is_empty() {
            info!("No suspects to arbitrate.");
            return Ok(report);
        }

        let total = snapshot.len();
        info!("Arbiter starting on {} suspects", total);

        for (idx, domain) in snapshot.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.record(domain, Disposition::Retained(RetainReason::Cancelled));
                continue;
            }

            let listed = if whitelist.contains(&domain) {
                Some(Verdict::Safe)
            } else if blacklist.contains(&domain) {
                Some(Verdict::Unsafe)
            } else {
                None
            };
            if let Some(verdict) = listed {
                info!("[{}/{}] {} already listed [{}]", idx + 1, total, domain, verdict);
                report.settled += 1;
                report.record(domain, Disposition::Resolved(verdict));
                continue;
            }

            let disposition = self.arbitrate(&domain).await;
            info!("[{}/{}] {} [{:?}]", idx + 1, total, domain, disposition);
            report.record(domain, disposition);

            if idx + 1 < total && !self.settings.polite_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.polite_delay) => {}
                }
            }
        }

        let resolved = report.resolved();
        let suspect = self.stores.suspect.clone();
        store::blocking(move || suspect.retain(|d| !resolved.contains(d))).await?;

        info!(
            "DONE. Banned: {}, Safe: {}, Retrying next time: {}",
            report.blacklisted.len(),
            report.whitelisted.len(),
            report.retained.len()
        );
        Ok(report)
    }

    async fn arbitrate(&self, domain: &Domain) -> Disposition {
        let start = Instant::now();
        let evidence = self.evidence.gather(domain.as_str()).await;
        let (outcome, attempts) = self.judge_with_retry(domain.as_str(), &evidence).await;

        let disposition = match outcome {
            Ok(verdict) => {
                let list = match verdict {
                    Verdict::Safe => self.stores.whitelist.clone(),
                    Verdict::Unsafe => self.stores.blacklist.clone(),
                };
                let listed = domain.clone();
                match store::blocking(move || list.append(&listed)).await {
                    Ok(_) => Disposition::Resolved(verdict),
                    Err(e) => {
                        error!("Failed to record verdict for {}: {}", domain, e);
                        Disposition::Retained(RetainReason::PersistFailed)
                    }
                }
            }
            Err(reason) => Disposition::Retained(reason),
        };

        if let Some(logger) = &self.verdicts {
            logger
                .log(VerdictEntry {
                    domain: domain.to_string(),
                    action: VerdictAction::from(disposition),
                    evidence,
                    attempts,
                    latency_ms: start.elapsed().as_millis() as u64,
                })
                .await;
        }

        disposition
    }

    /// Up to `max_attempts` calls. A rate limit waits out the backoff and
    /// tries again within the same bound; any other failure or an
    /// indeterminate answer ends the domain's turn immediately.
    async fn judge_with_retry(
        &self,
        domain: &str,
        evidence: &str,
    ) -> (std::result::Result<Verdict, RetainReason>, u32) {
        let max = self.settings.max_attempts;
        for attempt in 1..=max {
            match self.judge.judge(domain, evidence).await {
                Ok(answer) => {
                    return match Verdict::from_answer(&answer) {
                        Some(verdict) => (Ok(verdict), attempt),
                        None => {
                            warn!("Indeterminate judgment for {}: {:?}", domain, answer);
                            (Err(RetainReason::Ambiguous), attempt)
                        }
                    };
                }
                Err(JudgeError::RateLimited) => {
                    warn!("Rate limited judging {} (attempt {}/{})", domain, attempt, max);
                    if attempt < max {
                        tokio::time::sleep(self.settings.rate_limit_backoff).await;
                    }
                }
                Err(JudgeError::Failed(msg)) => {
                    warn!("Judgment failed for {}: {}", domain, msg);
                    return (Err(RetainReason::JudgeFailed), attempt);
                }
            }
        }
        (Err(RetainReason::RateLimited), max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FixedEvidence;

    #[async_trait::async_trait]
    impl EvidenceSource for FixedEvidence {
        async fn gather(&self, _domain: &str) -> String {
            "Title: t | Description: d".to_string()
        }
    }

    /// Replays scripted answers in order.
    struct Scripted {
        answers: Mutex<VecDeque<std::result::Result<String, JudgeError>>>,
    }

    impl Scripted {
        fn new(answers: Vec<std::result::Result<String, JudgeError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Judge for Scripted {
        async fn judge(&self, _domain: &str, _evidence: &str) -> std::result::Result<String, JudgeError> {
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(JudgeError::Failed("script exhausted".into())))
        }
    }

    fn arbiter(judge: Scripted) -> (tempfile::TempDir, Arbiter) {
        let dir = tempfile::tempdir().unwrap();
        let settings = ArbiterSettings {
            max_attempts: 3,
            rate_limit_backoff: Duration::ZERO,
            polite_delay: Duration::ZERO,
        };
        let arbiter = Arbiter::new(
            StoreSet::in_dir(dir.path()),
            Arc::new(FixedEvidence),
            Arc::new(judge),
            settings,
        );
        (dir, arbiter)
    }

    #[tokio::test]
    async fn test_rate_limit_consumes_attempts() {
        let (_dir, arbiter) = arbiter(Scripted::new(vec![
            Err(JudgeError::RateLimited),
            Err(JudgeError::RateLimited),
            Err(JudgeError::RateLimited),
            Ok("SAFE".into()),
        ]));
        let (outcome, attempts) = arbiter.judge_with_retry("x.com", "e").await;
        assert_eq!(outcome, Err(RetainReason::RateLimited));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_ambiguous_answer_is_not_retried() {
        let (_dir, arbiter) = arbiter(Scripted::new(vec![
            Ok("maybe?".into()),
            Ok("SAFE".into()),
        ]));
        let (outcome, attempts) = arbiter.judge_with_retry("x.com", "e").await;
        assert_eq!(outcome, Err(RetainReason::Ambiguous));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_hard_failure_is_not_retried() {
        let (_dir, arbiter) = arbiter(Scripted::new(vec![
            Err(JudgeError::Failed("500".into())),
            Ok("UNSAFE".into()),
        ]));
        let (outcome, attempts) = arbiter.judge_with_retry("x.com", "e").await;
        assert_eq!(outcome, Err(RetainReason::JudgeFailed));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_empty_suspect_pass() {
        let (_dir, arbiter) = arbiter(Scripted::new(vec![]));
        let report = arbiter.run_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.total(), 0);
    }
}
