use dns_warden::config::LoggingConfig;
use dns_warden::db::DbClient;
use dns_warden::engine::RetainReason;
use dns_warden::logger::{VerdictAction, VerdictEntry, VerdictLogger};

#[tokio::test]
async fn test_sqlite_sink_logging() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("verdicts.db").to_string_lossy().into_owned();

    let config = LoggingConfig {
        verdict_sinks: vec!["sqlite".to_string()],
        sqlite_path: db_path.clone(),
        sqlite_retention_hours: 24,
        ..LoggingConfig::default()
    };

    let db = DbClient::new(db_path).expect("Failed to open test DB");
    db.initialize().unwrap();
    let logger = VerdictLogger::new(&config, Some(&db), Vec::new());

    logger
        .log(VerdictEntry {
            domain: "casino.example".to_string(),
            action: VerdictAction::Blacklisted,
            evidence: "Title: Casino | Description: No Description".to_string(),
            attempts: 1,
            latency_ms: 812,
        })
        .await;
    logger
        .log(VerdictEntry {
            domain: "quiet.example".to_string(),
            action: VerdictAction::Retained(RetainReason::RateLimited),
            evidence: "Offline/Blocked".to_string(),
            attempts: 3,
            latency_ms: 20_004,
        })
        .await;

    // Returns only once the writer thread has stored everything queued
    logger.shutdown().await;

    let history = db.history("casino.example", 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, "Blacklisted");
    assert_eq!(history[0].latency_ms, 812);

    let counts = db.counts().unwrap();
    assert_eq!(counts.blacklisted, 1);
    assert_eq!(counts.retained, 1);
    assert_eq!(counts.whitelisted, 0);
}

#[tokio::test]
async fn test_sqlite_sink_without_db_is_skipped() {
    let config = LoggingConfig {
        verdict_sinks: vec!["sqlite".to_string(), "console".to_string()],
        ..LoggingConfig::default()
    };
    let logger = VerdictLogger::new(&config, None, Vec::new());
    logger
        .log(VerdictEntry {
            domain: "news.example".to_string(),
            action: VerdictAction::Whitelisted,
            evidence: "No Data".to_string(),
            attempts: 1,
            latency_ms: 5,
        })
        .await;
    logger.shutdown().await;
}
