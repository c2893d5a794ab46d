use crate::domain::Domain;
use crate::error::Result;
use crate::store::StoreSet;
use rustc_hash::FxHashSet;
use std::time::{Duration, Instant};
use tracing::info;

/// In-memory union of every store, used to skip domains that already
/// have a decision.
///
/// Refreshing re-reads all stores in full, so it runs on a fixed interval
/// rather than per event. Between refreshes, [`IgnoreCache::observe`]
/// covers domains classified locally.
#[derive(Debug)]
pub struct IgnoreCache {
    stores: StoreSet,
    domains: FxHashSet<Domain>,
    generation: u64,
    refreshed_at: Option<Instant>,
    interval: Duration,
}

impl IgnoreCache {
    pub fn new(stores: StoreSet, interval: Duration) -> Self {
        Self {
            stores,
            domains: FxHashSet::default(),
            generation: 0,
            refreshed_at: None,
            interval,
        }
    }

    /// Rebuilds the set from disk and returns the new generation.
    ///
    /// On failure the previous set stays in place and the next attempt is
    /// still a full interval away.
    pub async fn refresh(&mut self) -> Result<u64> {
        let stores = self.stores.clone();
        self.refreshed_at = Some(Instant::now());
        let domains = tokio::task::spawn_blocking(move || stores.load_union()).await??;

        self.domains = domains;
        self.generation += 1;
        info!(
            "Ignore cache updated (generation {}): {} known domains",
            self.generation,
            self.domains.len()
        );
        Ok(self.generation)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    /// Records a decision made before it reaches disk.
    pub fn observe(&mut self, domain: Domain) {
        self.domains.insert(domain);
    }

    pub fn is_refresh_due(&self) -> bool {
        match self.refreshed_at {
            Some(at) => at.elapsed() >= self.interval,
            None => true,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn len(&self) -> usize {
        self.domains.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Domain {
        Domain::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_bumps_generation_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let stores = StoreSet::in_dir(dir.path());
        stores.whitelist.append(&d("good.com")).unwrap();

        let mut cache = IgnoreCache::new(stores.clone(), Duration::from_secs(300));
        assert!(cache.is_refresh_due());
        assert_eq!(cache.refresh().await.unwrap(), 1);
        assert!(cache.contains("good.com"));
        assert!(!cache.is_refresh_due());

        stores.blacklist.append(&d("bad.com")).unwrap();
        assert!(!cache.contains("bad.com"));
        assert_eq!(cache.refresh().await.unwrap(), 2);
        assert!(cache.contains("bad.com"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_observe_is_memory_only_until_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let stores = StoreSet::in_dir(dir.path());
        let mut cache = IgnoreCache::new(stores, Duration::from_secs(300));
        cache.refresh().await.unwrap();

        cache.observe(d("new.com"));
        assert!(cache.contains("new.com"));

        // Not persisted anywhere, so a full refresh forgets it.
        cache.refresh().await.unwrap();
        assert!(!cache.contains("new.com"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let stores = StoreSet::in_dir(dir.path());
        stores.whitelist.append(&d("good.com")).unwrap();

        let mut cache = IgnoreCache::new(stores, Duration::ZERO);
        cache.refresh().await.unwrap();

        // Replacing the data dir with a file makes every store unreadable.
        let data_dir = dir.path().to_path_buf();
        drop(dir);
        std::fs::write(&data_dir, "not a directory").unwrap();

        assert!(cache.refresh().await.is_err());
        assert!(cache.contains("good.com"));
        assert_eq!(cache.generation(), 1);
        std::fs::remove_file(&data_dir).unwrap();
    }
}
