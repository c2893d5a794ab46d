use crate::config::StatsConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::info;

/// Lock-free counters for the classifier dispatcher.
#[derive(Debug, Default)]
pub struct DispatchStats {
    events: AtomicU64,
    dropped: AtomicU64,
    ignored: AtomicU64,
    scored: AtomicU64,
    flagged: AtomicU64,
    model_errors: AtomicU64,
    refreshes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub events: u64,
    pub dropped: u64,
    pub ignored: u64,
    pub scored: u64,
    pub flagged: u64,
    pub model_errors: u64,
    pub refreshes: u64,
}

impl DispatchStats {
    /// Creates the collector and, when enabled, spawns the periodic dumper.
    /// Must be called inside a tokio runtime if enabled.
    pub fn new(config: &StatsConfig) -> Arc<Self> {
        let stats = Arc::new(Self::default());

        if config.enable && config.log_interval_seconds > 0 {
            let stats_clone = stats.clone();
            let interval = Duration::from_secs(config.log_interval_seconds);
            tokio::spawn(async move {
                stats_clone.run_logger(interval).await;
            });
        }

        stats
    }

    pub fn inc_events(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scored(&self) {
        self.scored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_flagged(&self) {
        self.flagged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_model_errors(&self) {
        self.model_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_refreshes(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            scored: self.scored.load(Ordering::Relaxed),
            flagged: self.flagged.load(Ordering::Relaxed),
            model_errors: self.model_errors.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }

    async fn run_logger(&self, period: Duration) {
        let mut interval = time::interval(period);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.dump_stats();
        }
    }

    pub fn dump_stats(&self) {
        let s = self.get_snapshot();
        let pct = |n: u64| {
            if s.events > 0 {
                (n as f64 / s.events as f64) * 100.0
            } else {
                0.0
            }
        };

        info!(
            "STATS DUMP: Events: {}, Ignored: {} ({:.1}%), Dropped: {}, Scored: {}, Flagged: {}, ModelErrors: {}, CacheRefreshes: {}",
            s.events,
            s.ignored,
            pct(s.ignored),
            s.dropped,
            s.scored,
            s.flagged,
            s.model_errors,
            s.refreshes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = DispatchStats::default();
        stats.inc_events();
        stats.inc_events();
        stats.inc_ignored();
        stats.inc_flagged();

        let snap = stats.get_snapshot();
        assert_eq!(snap.events, 2);
        assert_eq!(snap.ignored, 1);
        assert_eq!(snap.flagged, 1);
        assert_eq!(snap.scored, 0);
    }
}
