//! The linking chain builder: chain state across archive boundaries.
//!
//! The builder holds exactly one piece of mutable state, the digest of the
//! most recently *recorded* archive. Preparing a batch computes the next
//! digest without touching that state; only [`after_archive_saved`] advances
//! it, and only for the batch that was prepared.
//!
//! [`after_archive_saved`]: LinkingChainBuilder::after_archive_saved

use tracing::{debug, info, warn};

use chainlog_contracts::{
    digest::DigestEntry,
    error::{ArchiveError, ArchiveResult},
    ledger::ArchiveLedger,
};

use crate::{hash::HashAlgorithm, linking::LinkingInfo};

pub struct LinkingChainBuilder {
    algorithm: HashAlgorithm,
    last_digest: Vec<u8>,
    prepared: Option<LinkingInfo>,
}

impl LinkingChainBuilder {
    /// Resume the chain from the ledger's most recent digest entry.
    ///
    /// Starts from genesis when the ledger is empty. If the ledger head has
    /// a digest length that `algorithm` cannot have produced, the configured
    /// algorithm differs from the one the chain was built with; this is an
    /// `AlgorithmMismatch` unless `acknowledge_restart` is set, in which case
    /// a new chain is started from genesis.
    pub fn new(
        algorithm: HashAlgorithm,
        ledger: &dyn ArchiveLedger,
        acknowledge_restart: bool,
    ) -> ArchiveResult<Self> {
        let last_digest = match ledger.last_digest_entry()? {
            None => {
                info!(algorithm = %algorithm, "no archives recorded, starting chain from genesis");
                algorithm.genesis()
            }
            Some(entry) if entry.digest().len() == algorithm.output_len() => {
                info!(
                    algorithm = %algorithm,
                    archive = %entry.archive_filename(),
                    digest = %entry.digest_hex(),
                    "resuming chain from ledger head"
                );
                entry.digest().to_vec()
            }
            Some(entry) if acknowledge_restart => {
                warn!(
                    algorithm = %algorithm,
                    archive = %entry.archive_filename(),
                    head_len = entry.digest().len(),
                    "hash algorithm changed; restarting chain from genesis as acknowledged"
                );
                algorithm.genesis()
            }
            Some(entry) => {
                return Err(ArchiveError::AlgorithmMismatch {
                    algorithm: algorithm.id().to_string(),
                    expected_len: algorithm.output_len(),
                    found_len: entry.digest().len(),
                })
            }
        };

        Ok(Self::from_digest(algorithm, last_digest))
    }

    /// Start a builder from a known chain value, bypassing the ledger.
    pub fn from_digest(algorithm: HashAlgorithm, last_digest: Vec<u8>) -> Self {
        Self {
            algorithm,
            last_digest,
            prepared: None,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Digest of the last archive the ledger confirmed.
    pub fn last_digest(&self) -> &[u8] {
        &self.last_digest
    }

    /// Compute linking info for an ordered batch of container entries.
    ///
    /// Replaces any earlier prepared batch that was never confirmed; an
    /// unconfirmed batch was never published, so nothing depends on it.
    pub fn prepare<'a, I>(&mut self, entries: I) -> &LinkingInfo
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let info = LinkingInfo::build(self.algorithm, &self.last_digest, entries);
        debug!(
            entries = info.entries.len(),
            digest = %hex::encode(&info.digest),
            "prepared archive linking info"
        );
        self.prepared.insert(info)
    }

    /// The digest that will represent the archive currently being sealed.
    pub fn created_archive_last_digest(&self) -> Option<&[u8]> {
        self.prepared.as_ref().map(|info| info.digest.as_slice())
    }

    /// Advance chain state to the prepared digest.
    ///
    /// Call only after the archive is published and `entry` is recorded in
    /// the ledger. Fails with `ChainDesync` when nothing is prepared or when
    /// `entry` carries a different digest than the prepared batch.
    pub fn after_archive_saved(&mut self, entry: &DigestEntry) -> ArchiveResult<()> {
        let Some(prepared) = self.prepared.as_ref() else {
            return Err(ArchiveError::ChainDesync {
                reason: format!(
                    "archive '{}' confirmed but no batch was prepared",
                    entry.archive_filename()
                ),
            });
        };
        if prepared.digest != entry.digest() {
            return Err(ArchiveError::ChainDesync {
                reason: format!(
                    "archive '{}' confirmed with digest {} but the prepared batch has {}",
                    entry.archive_filename(),
                    entry.digest_hex(),
                    hex::encode(&prepared.digest)
                ),
            });
        }

        self.last_digest = entry.digest().to_vec();
        self.prepared = None;
        Ok(())
    }

    /// Drop a prepared batch that will not be published.
    pub fn discard_prepared(&mut self) {
        self.prepared = None;
    }
}
