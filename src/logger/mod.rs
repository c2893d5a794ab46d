pub mod console_sink;
pub mod sqlite_sink;
pub mod types;

pub use self::console_sink::ConsoleLogSink;
pub use self::sqlite_sink::SqliteLogSink;
pub use self::types::{VerdictAction, VerdictEntry, VerdictSink};

use crate::config::LoggingConfig;
use crate::db::DbClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

const SINK_BUFFER: usize = 1000;

/// Fans arbiter verdicts out to the configured sinks, one task per sink.
pub struct VerdictLogger {
    sinks: Vec<mpsc::Sender<VerdictEntry>>,
    tasks: Vec<JoinHandle<()>>,
}

impl VerdictLogger {
    /// Must be called inside a tokio runtime.
    ///
    /// The `sqlite` sink is skipped (with an error) when no database client
    /// is supplied or its writer connection cannot be opened.
    pub fn new(
        config: &LoggingConfig,
        db_client: Option<&DbClient>,
        extra_sinks: Vec<Box<dyn VerdictSink>>,
    ) -> Arc<Self> {
        let mut boxed: Vec<Box<dyn VerdictSink>> = Vec::new();

        for sink_type in &config.verdict_sinks {
            match sink_type.as_str() {
                "console" => boxed.push(Box::new(ConsoleLogSink::new(config))),
                "sqlite" => match db_client.map(DbClient::create_log_writer) {
                    Some(Ok(writer)) => boxed.push(Box::new(SqliteLogSink::new(
                        writer,
                        config.sqlite_retention_hours,
                    ))),
                    Some(Err(e)) => error!("Failed to open SQLite verdict writer: {}", e),
                    None => error!("SQLite verdict sink requested without a database"),
                },
                other => warn!("Unknown verdict sink type: {}", other),
            }
        }
        boxed.extend(extra_sinks);

        let (sinks, tasks) = boxed
            .into_iter()
            .map(|sink| {
                let (tx, mut rx) = mpsc::channel(SINK_BUFFER);
                let task = tokio::spawn(async move {
                    while let Some(entry) = rx.recv().await {
                        sink.log(&entry);
                    }
                    let _ = tokio::task::spawn_blocking(move || sink.shutdown()).await;
                });
                (tx, task)
            })
            .unzip();

        Arc::new(Self { sinks, tasks })
    }

    /// Flushes every sink and waits for it to finish. Other handles to the
    /// logger must be dropped first; otherwise entries still in flight may be
    /// lost and this only logs a warning.
    pub async fn shutdown(self: Arc<Self>) {
        let logger = match Arc::try_unwrap(self) {
            Ok(logger) => logger,
            Err(_) => {
                warn!("Verdict logger still shared at shutdown; not waiting for sinks");
                return;
            }
        };

        let VerdictLogger { sinks, tasks } = logger;
        drop(sinks);
        for task in tasks {
            if let Err(e) = task.await {
                error!("Verdict sink task failed: {}", e);
            }
        }
    }

    pub async fn log(&self, entry: VerdictEntry) {
        let Some((last, rest)) = self.sinks.split_last() else {
            return;
        };
        // Fire and forget, don't block the arbiter if a buffer is full
        for sink in rest {
            let _ = sink.try_send(entry.clone());
        }
        let _ = last.try_send(entry);
    }
}
