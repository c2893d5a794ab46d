use crate::config::LoggingConfig;
use crate::logger::types::{VerdictAction, VerdictEntry, VerdictSink};
use tracing::{info, warn};

pub struct ConsoleLogSink {
    json: bool,
}

impl ConsoleLogSink {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            json: config.format == "json",
        }
    }
}

impl VerdictSink for ConsoleLogSink {
    fn log(&self, entry: &VerdictEntry) {
        if self.json {
            info!(
                target: "verdict",
                domain = %entry.domain,
                action = entry.action.as_str(),
                attempts = entry.attempts,
                evidence = %entry.evidence,
                lat = entry.latency_ms
            );
            return;
        }

        match entry.action {
            VerdictAction::Whitelisted | VerdictAction::Blacklisted => info!(
                "{} -> {} after {} attempt(s) [{}ms] ({})",
                entry.domain,
                entry.action.as_str(),
                entry.attempts,
                entry.latency_ms,
                entry.evidence
            ),
            VerdictAction::Retained(_) => warn!(
                "{} kept for retry: {} after {} attempt(s) [{}ms]",
                entry.domain,
                entry.action.as_str(),
                entry.attempts,
                entry.latency_ms
            ),
        }
    }
}
