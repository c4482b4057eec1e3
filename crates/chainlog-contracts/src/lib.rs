//! # chainlog-contracts
//!
//! Shared types, the archive ledger contract, errors, and configuration for
//! chainlog.
//!
//! All crates in the workspace import from here. No archival logic lives in
//! this crate, only data definitions, the ledger trait and error types.

pub mod config;
pub mod digest;
pub mod error;
pub mod ledger;
pub mod record;

pub use config::{ArchiverConfig, RotationPolicy};
pub use digest::DigestEntry;
pub use error::{ArchiveError, ArchiveResult, LedgerError, LedgerResult};
pub use ledger::ArchiveLedger;
pub use record::{LogRecord, MessageRecord, RecordId, TimestampRecord};
