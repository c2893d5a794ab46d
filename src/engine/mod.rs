mod arbiter;
mod cache;
mod dispatcher;
pub mod evidence;
mod traits;
mod verdict;

pub use arbiter::{Arbiter, ArbiterSettings, PassReport};
pub use cache::IgnoreCache;
pub use dispatcher::{ClassifierDispatcher, DispatcherSettings, Outcome};
pub use evidence::HttpEvidence;
pub use traits::{DomainScorer, EvidenceSource, Judge};
pub use verdict::{Disposition, RetainReason, Verdict};
