pub mod classify; // Document type from text signals
pub mod coverage; // Cross-document receipt / FSA / insurance join
pub mod dates;
pub mod diagnostic; // Session dump (only when a dump dir is configured)
pub mod extraction; // Provider seam + heuristic provider
pub mod fingerprint; // Canonical identity + truncated SHA-256
pub mod issues;
pub mod normalize; // Raw rows -> NormalizedLineItem
pub mod savings;
pub mod session; // Ingest orchestrator and session state
pub mod store; // Snapshot persistence seam

pub use classify::{classify, classify_many, ClassificationResult};
pub use coverage::{build_coverage, CoverageConfig};
pub use extraction::{ExtractionError, ExtractionProvider, HeuristicExtractor, ProviderOutput};
pub use fingerprint::{canonicalize, fingerprint, fingerprint_facts, Fingerprint};
pub use normalize::{normalize, RawLineItem};
pub use savings::aggregate_savings;
pub use session::{IngestOutcome, SavingsBreakdown, Session, SessionReport};
pub use store::{DocumentSnapshot, MemorySnapshotStore, SnapshotStore, StoreError};

/// Threads a batch runs at once.
pub(crate) fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
