use dns_warden::engine::{ClassifierDispatcher, DispatcherSettings, DomainScorer, IgnoreCache, Outcome};
use dns_warden::error::ScoreError;
use dns_warden::queue;
use dns_warden::stats::DispatchStats;
use dns_warden::store::StoreSet;
use dns_warden::Domain;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed scores per domain; unknown domains fail like an unreachable model.
struct CountingScorer {
    scores: HashMap<&'static str, f32>,
    calls: Mutex<Vec<String>>,
}

impl CountingScorer {
    fn new(scores: &[(&'static str, f32)]) -> Arc<Self> {
        Arc::new(Self {
            scores: scores.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_for(&self, domain: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|d| *d == domain).count()
    }
}

#[async_trait::async_trait]
impl DomainScorer for CountingScorer {
    async fn score(&self, domain: &str) -> Result<f32, ScoreError> {
        self.calls.lock().unwrap().push(domain.to_string());
        self.scores
            .get(domain)
            .copied()
            .ok_or_else(|| ScoreError::Request("connection refused".into()))
    }
}

fn domain(s: &str) -> Domain {
    Domain::parse(s).unwrap()
}

fn settings() -> DispatcherSettings {
    DispatcherSettings {
        threshold: 0.90,
        pop_timeout: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_dispatch_run_over_queue() {
    let dir = tempfile::tempdir().unwrap();
    let stores = StoreSet::in_dir(dir.path());
    stores.whitelist.append(&domain("known.com")).unwrap();

    let scorer = CountingScorer::new(&[("bad.com", 0.95), ("edge.com", 0.90), ("ok.com", 0.10)]);
    let stats = Arc::new(DispatchStats::default());
    let (tx, rx) = queue::channel(32);

    let mut dispatcher = ClassifierDispatcher::new(
        rx,
        scorer.clone(),
        IgnoreCache::new(stores.clone(), Duration::from_secs(3600)),
        stores.suspect.clone(),
        settings(),
        stats.clone(),
    );

    for event in [
        "known.com",
        "BAD.com.",
        "bad.com",
        "edge.com",
        "ok.com",
        "",
        "not a domain!",
        "down.com",
        "down.com",
    ] {
        tx.send(event.to_string()).await.unwrap();
    }
    drop(tx);

    dispatcher.run(CancellationToken::new()).await.unwrap();

    // Duplicate deliveries and domains already decided never reach the model
    assert_eq!(scorer.calls_for("known.com"), 0);
    assert_eq!(scorer.calls_for("bad.com"), 1);
    // Model failures fail open and are retried on the next delivery
    assert_eq!(scorer.calls_for("down.com"), 2);

    // Threshold is strict: exactly 0.90 is not flagged
    let suspect = stores.suspect.load_sorted().unwrap();
    assert_eq!(suspect, vec![domain("bad.com")]);

    let snap = stats.get_snapshot();
    assert_eq!(snap.events, 9);
    assert_eq!(snap.dropped, 2);
    assert_eq!(snap.ignored, 2);
    assert_eq!(snap.flagged, 1);
    assert_eq!(snap.model_errors, 2);
    assert_eq!(snap.refreshes, 1);
}

#[tokio::test]
async fn test_handle_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let stores = StoreSet::in_dir(dir.path());
    stores.blacklist.append(&domain("listed.com")).unwrap();

    let scorer = CountingScorer::new(&[("casino.example", 0.99), ("news.example", 0.2)]);
    let mut cache = IgnoreCache::new(stores.clone(), Duration::from_secs(3600));
    cache.refresh().await.unwrap();

    let (_tx, rx) = queue::channel(1);
    let mut dispatcher = ClassifierDispatcher::new(
        rx,
        scorer.clone(),
        cache,
        stores.suspect.clone(),
        settings(),
        Arc::new(DispatchStats::default()),
    );

    assert_eq!(dispatcher.handle("listed.com").await, Outcome::Ignored);
    assert_eq!(dispatcher.handle("   ").await, Outcome::Dropped);
    assert_eq!(dispatcher.handle("news.example").await, Outcome::Clean);
    assert_eq!(dispatcher.handle("casino.example").await, Outcome::Flagged);
    assert_eq!(dispatcher.handle("casino.example").await, Outcome::Ignored);
    assert_eq!(dispatcher.handle("unknown.example").await, Outcome::ScoreFailed);

    assert!(dispatcher.cache().contains("casino.example"));
    assert!(!dispatcher.cache().contains("news.example"));
    assert!(stores.suspect.contains(&domain("casino.example")).unwrap());
}

#[tokio::test]
async fn test_dispatch_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let stores = StoreSet::in_dir(dir.path());
    let (_tx, rx) = queue::channel(1);

    let mut dispatcher = ClassifierDispatcher::new(
        rx,
        CountingScorer::new(&[]),
        IgnoreCache::new(stores.clone(), Duration::from_secs(3600)),
        stores.suspect.clone(),
        settings(),
        Arc::new(DispatchStats::default()),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), dispatcher.run(cancel))
        .await
        .expect("dispatcher did not stop")
        .unwrap();
}
