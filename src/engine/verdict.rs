use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verdict {
    Safe,
    Unsafe,
}

impl Verdict {
    /// Extracts the verdict token from a free-text answer.
    ///
    /// Case-insensitive substring match. `UNSAFE` is checked first since it
    /// contains `SAFE`. `None` means the answer was indeterminate.
    pub fn from_answer(answer: &str) -> Option<Self> {
        let answer = answer.to_uppercase();
        if answer.contains("UNSAFE") {
            Some(Verdict::Unsafe)
        } else if answer.contains("SAFE") {
            Some(Verdict::Safe)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Safe => "SAFE",
            Verdict::Unsafe => "UNSAFE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a suspect stays in the Suspect store after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetainReason {
    RateLimited,
    JudgeFailed,
    Ambiguous,
    PersistFailed,
    Cancelled,
}

/// Where a suspect ends up at the end of a pass: moved out with a verdict,
/// or kept for the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Resolved(Verdict),
    Retained(RetainReason),
}
