//! The archive ledger contract.
//!
//! The ledger is the single source of truth for chain state. chainlog only
//! consumes it; concrete stores live with the deployment (in-memory and
//! JSON-lines implementations ship in `chainlog-archive`).

use crate::{digest::DigestEntry, error::LedgerResult, record::LogRecord};

/// Durable store of per-record and per-archive archival status.
///
/// Implementations must be thread-safe and idempotent: re-marking a record
/// or re-recording an archive with the same file name is not an error.
pub trait ArchiveLedger: Send + Sync {
    /// Record that `record` has been accepted by the writer.
    ///
    /// Called once per record as soon as it is accepted, before the record
    /// is sealed into any archive.
    fn mark_record_archived(&self, record: &LogRecord) -> LedgerResult<()>;

    /// Persist a sealed archive's position in the chain.
    ///
    /// Callers invoke this strictly after the archive file is durably
    /// visible under `entry.archive_filename()`. Idempotent by file name.
    fn mark_archive_created(&self, entry: &DigestEntry) -> LedgerResult<()>;

    /// The most recently recorded digest entry, or `None` for a fresh chain.
    fn last_digest_entry(&self) -> LedgerResult<Option<DigestEntry>>;

    /// Whether an archive with this file name has been recorded.
    ///
    /// Used by startup reconciliation to find published-but-unrecorded
    /// archives.
    fn is_archive_recorded(&self, archive_filename: &str) -> LedgerResult<bool>;
}
