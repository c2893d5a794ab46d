use super::cache::IgnoreCache;
use super::traits::DomainScorer;
use crate::config::DispatcherConfig;
use crate::domain::Domain;
use crate::error::Result;
use crate::queue::{Dequeued, DomainQueue};
use crate::stats::DispatchStats;
use crate::store::{self, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    /// Scores strictly above this are flagged.
    pub threshold: f32,
    pub pop_timeout: Duration,
}

impl From<&DispatcherConfig> for DispatcherSettings {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            threshold: config.threshold,
            pop_timeout: Duration::from_millis(config.pop_timeout_ms),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from(&DispatcherConfig::default())
    }
}

/// What happened to a single queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Empty or malformed token.
    Dropped,
    /// Already decided somewhere; the model was not consulted.
    Ignored,
    /// Scored at or below the threshold.
    Clean,
    /// Scored above the threshold and appended to Suspect.
    Flagged,
    /// The model failed; treated as not unsafe.
    ScoreFailed,
    /// Flagged, but the Suspect append failed. Left out of the cache so a
    /// later delivery retries it.
    PersistFailed,
}

/// Consumes domain events, filters known domains through the ignore cache
/// and sends the rest through the local model.
///
/// Model failures fail open: the domain passes unclassified this round and
/// is scored again if it shows up later. A missed block only means the
/// domain keeps resolving until a later delivery flags it.
pub struct ClassifierDispatcher<Q> {
    queue: Q,
    scorer: Arc<dyn DomainScorer>,
    cache: IgnoreCache,
    suspect: Store,
    settings: DispatcherSettings,
    stats: Arc<DispatchStats>,
}

impl<Q: DomainQueue> ClassifierDispatcher<Q> {
    pub fn new(
        queue: Q,
        scorer: Arc<dyn DomainScorer>,
        cache: IgnoreCache,
        suspect: Store,
        settings: DispatcherSettings,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            queue,
            scorer,
            cache,
            suspect,
            settings,
            stats,
        }
    }

    pub fn cache(&self) -> &IgnoreCache {
        &self.cache
    }

    /// Runs until the queue closes or `cancel` fires.
    ///
    /// The bounded-wait dequeue is the only suspension point, which is what
    /// lets the loop notice a due cache refresh while traffic is idle.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!("Classifier dispatcher started. Waiting for traffic...");

        loop {
            if self.cache.is_refresh_due() {
                match self.cache.refresh().await {
                    Ok(_) => self.stats.inc_refreshes(),
                    Err(e) => error!("Ignore cache refresh failed, keeping previous set: {}", e),
                }
            }

            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Dispatcher shutting down.");
                    break;
                }
                next = self.queue.pop(self.settings.pop_timeout) => next?,
            };

            match next {
                Dequeued::Job(raw) => {
                    self.handle(&raw).await;
                }
                Dequeued::Idle => {}
                Dequeued::Closed => {
                    info!("Domain queue closed. Dispatcher exiting.");
                    break;
                }
            }
        }

        info!(
            "Ignore cache at shutdown: {} domains (generation {})",
            self.cache.len(),
            self.cache.generation()
        );
        self.stats.dump_stats();
        Ok(())
    }

    /// Processes one event.
    pub async fn handle(&mut self, raw: &str) -> Outcome {
        self.stats.inc_events();

        let Some(domain) = Domain::parse(raw) else {
            self.stats.inc_dropped();
            debug!("Dropping malformed token {:?}", raw);
            return Outcome::Dropped;
        };

        if self.cache.contains(domain.as_str()) {
            self.stats.inc_ignored();
            return Outcome::Ignored;
        }

        self.stats.inc_scored();
        let confidence = match self.scorer.score(domain.as_str()).await {
            Ok(confidence) => confidence,
            Err(e) => {
                self.stats.inc_model_errors();
                error!("Scoring failed for {}: {}", domain, e);
                return Outcome::ScoreFailed;
            }
        };

        if confidence > self.settings.threshold {
            self.flag(domain, confidence).await
        } else {
            debug!("{} scored {:.3}", domain, confidence);
            Outcome::Clean
        }
    }

    async fn flag(&mut self, domain: Domain, confidence: f32) -> Outcome {
        let suspect = self.suspect.clone();
        let flagged = domain.clone();
        match store::blocking(move || suspect.append(&flagged)).await {
            Ok(_) => {
                warn!(domain = %domain, confidence, "Suspect detected");
                self.stats.inc_flagged();
                self.cache.observe(domain);
                Outcome::Flagged
            }
            Err(e) => {
                error!("Failed to record suspect {}: {}", domain, e);
                Outcome::PersistFailed
            }
        }
    }
}
