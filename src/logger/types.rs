use crate::engine::{Disposition, RetainReason, Verdict};

/// One arbiter decision, as recorded by the verdict sinks.
#[derive(Debug, Clone)]
pub struct VerdictEntry {
    pub domain: String,
    pub action: VerdictAction,
    pub evidence: String,
    /// Judgment calls spent on the domain this pass.
    pub attempts: u32,
    pub latency_ms: u64,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum VerdictAction {
    Whitelisted,
    Blacklisted,
    Retained(RetainReason),
}

impl VerdictAction {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictAction::Whitelisted => "Whitelisted",
            VerdictAction::Blacklisted => "Blacklisted",
            VerdictAction::Retained(RetainReason::RateLimited) => "RateLimited",
            VerdictAction::Retained(RetainReason::JudgeFailed) => "JudgeFailed",
            VerdictAction::Retained(RetainReason::Ambiguous) => "Ambiguous",
            VerdictAction::Retained(RetainReason::PersistFailed) => "PersistFailed",
            VerdictAction::Retained(RetainReason::Cancelled) => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Whitelisted" => VerdictAction::Whitelisted,
            "Blacklisted" => VerdictAction::Blacklisted,
            "RateLimited" => VerdictAction::Retained(RetainReason::RateLimited),
            "JudgeFailed" => VerdictAction::Retained(RetainReason::JudgeFailed),
            "Ambiguous" => VerdictAction::Retained(RetainReason::Ambiguous),
            "PersistFailed" => VerdictAction::Retained(RetainReason::PersistFailed),
            "Cancelled" => VerdictAction::Retained(RetainReason::Cancelled),
            _ => return None,
        })
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, VerdictAction::Retained(_))
    }
}

impl From<Disposition> for VerdictAction {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Resolved(Verdict::Safe) => VerdictAction::Whitelisted,
            Disposition::Resolved(Verdict::Unsafe) => VerdictAction::Blacklisted,
            Disposition::Retained(reason) => VerdictAction::Retained(reason),
        }
    }
}

pub trait VerdictSink: Send + Sync {
    fn log(&self, entry: &VerdictEntry);

    /// Called once after the last entry. May block until buffered entries
    /// are written.
    fn shutdown(self: Box<Self>) {}
}
