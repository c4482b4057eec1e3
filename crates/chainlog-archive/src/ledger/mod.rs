//! Bundled [`ArchiveLedger`](chainlog_contracts::ArchiveLedger) implementations.
//!
//! Production deployments usually back the ledger with their own database;
//! these two cover tests, tooling and single-node setups.

pub mod file;
pub mod memory;

pub use file::FileLedger;
pub use memory::InMemoryLedger;
