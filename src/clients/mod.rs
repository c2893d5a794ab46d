//! HTTP-backed implementations of the classifier seams.

pub mod judge;
pub mod scorer;

pub use judge::ChatJudge;
pub use scorer::HttpScorer;
