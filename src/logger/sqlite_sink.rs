use crate::db::LogWriter;
use crate::logger::types::{VerdictEntry, VerdictSink};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

const PRUNE_EVERY: Duration = Duration::from_secs(3600);

/// Hands entries to a dedicated writer thread so the arbiter never blocks
/// on SQLite.
pub struct SqliteLogSink {
    tx: Sender<VerdictEntry>,
    writer: JoinHandle<()>,
}

impl SqliteLogSink {
    pub fn new(writer: LogWriter, retention_hours: u64) -> Self {
        let (tx, rx) = mpsc::channel::<VerdictEntry>();

        let writer = thread::spawn(move || run_sqlite_writer(writer, retention_hours, rx));

        Self { tx, writer }
    }
}

impl VerdictSink for SqliteLogSink {
    fn log(&self, entry: &VerdictEntry) {
        if let Err(e) = self.tx.send(entry.clone()) {
            error!("Failed to send verdict to SQLite writer: {}", e);
        }
    }

    /// Closes the channel and waits for the writer to drain it.
    fn shutdown(self: Box<Self>) {
        let Self { tx, writer } = *self;
        drop(tx);
        if writer.join().is_err() {
            error!("SQLite verdict writer panicked");
        }
    }
}

fn run_sqlite_writer(mut writer: LogWriter, retention_hours: u64, rx: Receiver<VerdictEntry>) {
    if let Err(e) = writer.prune_logs(retention_hours) {
        error!("Failed to prune old verdicts: {}", e);
    }
    let mut last_cleanup = Instant::now();

    while let Ok(entry) = rx.recv() {
        if let Err(e) = writer.insert_verdict(&entry) {
            error!("Failed to insert verdict for {}: {}", entry.domain, e);
        }

        if last_cleanup.elapsed() > PRUNE_EVERY {
            if let Err(e) = writer.prune_logs(retention_hours) {
                error!("Failed to prune old verdicts: {}", e);
            }
            last_cleanup = Instant::now();
        }
    }

    info!("SQLite verdict writer stopping.");
}
