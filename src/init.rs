//! Initialization helpers for process startup.

use crate::config::Config;
use crate::db::DbClient;
use crate::logger::VerdictLogger;
use std::sync::Arc;
use tracing::{error, info};

const QUIET_TARGETS: [&str; 4] = ["hyper", "hyper_util", "reqwest", "rustls"];

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = config.logging.level.clone();

        // HTTP client internals stay quiet unless explicitly enabled
        for target in QUIET_TARGETS {
            if !filter.contains(target) {
                filter.push_str(&format!(",{target}=off"));
            }
        }

        tracing_subscriber::EnvFilter::new(filter)
    });

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Opens the verdict database when the `sqlite` sink is configured.
///
/// A database that cannot be opened or initialized disables the sink; it is
/// never fatal.
pub fn init_verdict_db(config: &Config) -> Option<Arc<DbClient>> {
    if !config.logging.verdict_sinks.iter().any(|s| s == "sqlite") {
        return None;
    }

    let client = match DbClient::new(config.logging.sqlite_path.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to open SQLite database {}: {}", config.logging.sqlite_path, e);
            return None;
        }
    };
    if let Err(e) = client.initialize() {
        error!("Failed to initialize SQLite database: {}", e);
        return None;
    }
    info!("SQLite verdict sink enabled.");
    Some(Arc::new(client))
}

/// Builds the verdict logger, returning the shared database client as well so
/// callers can read verdict history.
pub fn init_verdict_logger(config: &Config) -> (Arc<VerdictLogger>, Option<Arc<DbClient>>) {
    let db_client = init_verdict_db(config);
    let logger = VerdictLogger::new(&config.logging, db_client.as_deref(), Vec::new());
    (logger, db_client)
}
