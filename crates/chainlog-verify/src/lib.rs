//! # chainlog-verify
//!
//! Offline verification of archive directories.
//!
//! This crate provides [`engine::ChainVerifier`], which checks archives
//! without trusting the writer that produced them:
//!
//! 1. **Per archive**: every record entry is re-hashed and the embedded
//!    link chain is recomputed against `linkinginfo.json`.
//! 2. **Across archives**: each archive's previous digest must equal its
//!    predecessor's digest, and the first must equal the anchor (genesis
//!    unless told otherwise).
//! 3. **Against a ledger** (optional): every archive is recorded and the
//!    ledger head is the last archive.
//!
//! All failures are collected so operators see the full set in one pass.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use chainlog_verify::engine::ChainVerifier;
//!
//! let report = ChainVerifier::new().verify_directory(Path::new("/srv/archives"))?;
//! assert!(report.passed);
//! ```

pub mod engine;

pub use engine::{ArchiveSummary, ChainAnchor, ChainFailure, ChainReport, ChainVerifier};
