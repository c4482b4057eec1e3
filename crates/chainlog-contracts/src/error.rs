//! Error types for the chainlog archival pipeline.
//!
//! Every fallible operation on the writer side returns `ArchiveResult<T>`.
//! Ledger implementations report through `LedgerError`, which the writer
//! wraps depending on where in the publication sequence the failure hit.

use thiserror::Error;

/// Failures reported by an [`ArchiveLedger`](crate::ledger::ArchiveLedger).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backing store could not be reached or written.
    #[error("ledger unavailable: {reason}")]
    Unavailable { reason: String },

    /// Stored ledger data could not be decoded.
    #[error("ledger data corrupt: {reason}")]
    Corrupt { reason: String },
}

/// Convenience alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// The unified error type for archive writing, reconciliation, and verification.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The caller handed over a record the writer cannot accept.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The writer has been closed and accepts no further records.
    #[error("archive writer is closed")]
    Closed,

    /// A filesystem operation failed. Rotation state is left untouched so
    /// the batch can be retried.
    #[error("i/o failure while {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    /// Records or linking metadata could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// No unused archive name could be generated within the attempt limit.
    ///
    /// Fatal: this points at a misconfigured or hostile output directory.
    #[error("could not generate a unique archive name in '{directory}' after {attempts} attempts")]
    NameSpaceExhausted { directory: String, attempts: u32 },

    /// The ledger failed before anything was published.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The archive is on disk under its final name but the ledger did not
    /// record it. The entry is retried before the next rotation and
    /// reconciled at startup.
    #[error("archive '{archive}' was published but the ledger update failed: {source}")]
    LedgerAfterPublish {
        archive: String,
        #[source]
        source: LedgerError,
    },

    /// The archive was renamed into place but the directory entry could not
    /// be made durable. The ledger update is held back until it is.
    #[error("archive '{archive}' was published but its directory entry is not durable: {reason}")]
    PublishNotDurable { archive: String, reason: String },

    /// In-memory chain state no longer matches what was published.
    #[error("chain state desynchronized: {reason}")]
    ChainDesync { reason: String },

    /// The configured digest algorithm identifier is not known.
    #[error("unsupported hash algorithm '{name}'")]
    UnsupportedAlgorithm { name: String },

    /// The ledger head was produced by a different digest algorithm.
    #[error(
        "ledger head digest is {found_len} bytes but '{algorithm}' produces {expected_len}; \
         set acknowledge_chain_restart to start a new chain"
    )]
    AlgorithmMismatch {
        algorithm: String,
        expected_len: usize,
        found_len: usize,
    },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// An archive file is not a well-formed container.
    #[error("invalid container '{archive}': {reason}")]
    InvalidContainer { archive: String, reason: String },

    /// A container's contents do not match its recorded digests.
    #[error("integrity violation in '{archive}': {reason}")]
    IntegrityViolation { archive: String, reason: String },
}

impl ArchiveError {
    /// Wrap an `io::Error` with a short description of what was attempted.
    pub fn io(action: impl Into<String>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            action: action.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the chainlog crates.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
