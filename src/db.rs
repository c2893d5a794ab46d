use crate::logger::types::{VerdictAction, VerdictEntry};
use rusqlite::{params, Connection, Result};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// A stored verdict row.
#[derive(Debug, Clone, Serialize)]
pub struct VerdictRecord {
    pub timestamp: i64,
    pub domain: String,
    pub action: String,
    pub evidence: String,
    pub attempts: u32,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerdictCounts {
    pub whitelisted: u64,
    pub blacklisted: u64,
    pub retained: u64,
}

/// Read side of the verdict log, shared by the CLI.
pub struct DbClient {
    db_path: String,
    conn: Mutex<Connection>,
}

/// Write side, owned by the SQLite sink's writer thread.
pub struct LogWriter {
    conn: Connection,
}

fn open(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

impl DbClient {
    pub fn new(db_path: impl Into<String>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open(&db_path)?;
        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    pub fn create_log_writer(&self) -> Result<LogWriter> {
        LogWriter::new(&self.db_path)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS verdict_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                domain TEXT NOT NULL,
                action TEXT NOT NULL,
                evidence TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                latency_ms INTEGER
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_verdicts_timestamp ON verdict_logs(timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_verdicts_domain ON verdict_logs(domain)",
            [],
        )?;

        info!("SQLite database initialized at {}", self.db_path);
        Ok(())
    }

    /// Most recent verdicts for `domain`, newest first.
    pub fn history(&self, domain: &str, limit: usize) -> Result<Vec<VerdictRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp, domain, action, evidence, attempts, latency_ms
             FROM verdict_logs WHERE domain = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![domain, limit as i64], |row| {
            Ok(VerdictRecord {
                timestamp: row.get(0)?,
                domain: row.get(1)?,
                action: row.get(2)?,
                evidence: row.get(3)?,
                attempts: row.get::<_, i64>(4)? as u32,
                latency_ms: row.get::<_, Option<i64>>(5)?.unwrap_or(0) as u64,
            })
        })?;
        rows.collect()
    }

    pub fn counts(&self) -> Result<VerdictCounts> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("SELECT action, COUNT(*) FROM verdict_logs GROUP BY action")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = VerdictCounts::default();
        for row in rows {
            let (action, n) = row?;
            match VerdictAction::parse(&action) {
                Some(VerdictAction::Whitelisted) => counts.whitelisted += n,
                Some(VerdictAction::Blacklisted) => counts.blacklisted += n,
                Some(VerdictAction::Retained(_)) | None => counts.retained += n,
            }
        }
        Ok(counts)
    }
}

impl LogWriter {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open(db_path)?,
        })
    }

    pub fn insert_verdict(&mut self, entry: &VerdictEntry) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO verdict_logs (timestamp, domain, action, evidence, attempts, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        stmt.execute(params![
            chrono::Utc::now().timestamp(),
            entry.domain,
            entry.action.as_str(),
            entry.evidence,
            entry.attempts as i64,
            entry.latency_ms as i64
        ])?;
        Ok(())
    }

    pub fn prune_logs(&mut self, retention_hours: u64) -> Result<usize> {
        let cutoff = chrono::Utc::now().timestamp() - (retention_hours * 3600) as i64;
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM verdict_logs WHERE timestamp < ?1")?;
        stmt.execute(params![cutoff])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RetainReason;

    fn entry(domain: &str, action: VerdictAction) -> VerdictEntry {
        VerdictEntry {
            domain: domain.into(),
            action,
            evidence: "No Data".into(),
            attempts: 2,
            latency_ms: 40,
        }
    }

    #[test]
    fn test_history_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verdicts.db");
        let client = DbClient::new(path.to_string_lossy()).unwrap();
        client.initialize().unwrap();

        let mut writer = client.create_log_writer().unwrap();
        writer
            .insert_verdict(&entry("a.com", VerdictAction::Retained(RetainReason::RateLimited)))
            .unwrap();
        writer.insert_verdict(&entry("a.com", VerdictAction::Blacklisted)).unwrap();
        writer.insert_verdict(&entry("b.com", VerdictAction::Whitelisted)).unwrap();

        let history = client.history("a.com", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, "Blacklisted");
        assert_eq!(history[1].action, "RateLimited");
        assert_eq!(history[0].attempts, 2);

        let counts = client.counts().unwrap();
        assert_eq!(
            counts,
            VerdictCounts {
                whitelisted: 1,
                blacklisted: 1,
                retained: 1
            }
        );
    }

    #[test]
    fn test_prune_keeps_recent_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verdicts.db");
        let client = DbClient::new(path.to_string_lossy()).unwrap();
        client.initialize().unwrap();

        let mut writer = client.create_log_writer().unwrap();
        writer.insert_verdict(&entry("a.com", VerdictAction::Whitelisted)).unwrap();
        assert_eq!(writer.prune_logs(1).unwrap(), 0);
        assert_eq!(client.history("a.com", 5).unwrap().len(), 1);
    }
}
