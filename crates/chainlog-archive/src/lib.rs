//! # chainlog-archive
//!
//! Rotating, hash-chained, atomically published audit archives.
//!
//! ## Overview
//!
//! [`ArchiveWriter`] accepts log records, marks each one in the
//! [`ArchiveLedger`](chainlog_contracts::ArchiveLedger), buffers message
//! records in an [`ArchiveCache`], and seals the batch into a tar container
//! when the rotation policy is met. Containers are written to a hidden temp
//! file, renamed into place without replacing anything, and only then
//! recorded in the ledger. Readers of the output directory therefore see an
//! archive either complete or not at all.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chainlog_archive::{ArchiveWriter, ledger::FileLedger};
//! use chainlog_contracts::ArchiverConfig;
//!
//! let config = ArchiverConfig::from_file(Path::new("chainlog.toml"))?;
//! let ledger = Arc::new(FileLedger::open("/var/lib/chainlog/ledger.jsonl")?);
//! let writer = ArchiveWriter::open(config, ledger)?;
//! writer.write(record)?;
//! writer.close()?;
//! ```

pub mod cache;
pub mod container;
pub mod ledger;
pub mod naming;
pub mod reconcile;
pub mod writer;

pub use cache::ArchiveCache;
pub use container::{read_container, ContainerContents, TempContainer};
pub use naming::{NameAllocation, NameSource, RandomAlphanumeric};
pub use reconcile::{list_archives, ReconcileReport};
pub use writer::{ArchiveWriter, WriterPhase};

// ── Tests ─────────────────────────────────────────────────────────────────────
