use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop a pipeline run.
///
/// Per-domain and per-source failures never surface here; they are
/// absorbed by the component that hit them and show up only in logs and
/// in the Suspect store.
#[derive(Error, Debug)]
pub enum Error {
    /// A store file could not be read, locked or written
    #[error("store '{name}' ({path}): {source}")]
    Store {
        name: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process holds the single-flight guard for this role
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// The run was cancelled before it reached its write step
    #[error("run cancelled")]
    Cancelled,

    /// A collaborator needed at startup is unreachable or misconfigured
    #[error("startup dependency unavailable: {0}")]
    StartupDependency(String),

    /// The domain event queue failed
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A blocking worker panicked or was aborted
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Local model inference failure. Callers fail open on this.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("inference request failed: {0}")]
    Request(String),

    #[error("inference service returned status {0}")]
    Status(u16),

    #[error("score {0} is outside [0, 1]")]
    OutOfRange(f32),
}

/// External judgment failure.
#[derive(Error, Debug)]
pub enum JudgeError {
    /// The service asked us to slow down (HTTP 429)
    #[error("rate limited by judgment service")]
    RateLimited,

    #[error("judgment request failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Transient network failure while pulling a remote source.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
}
