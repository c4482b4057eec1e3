//! The archive writer: the public entry point of the archival pipeline.
//!
//! Per batch the writer moves through
//!
//! ```text
//!   Empty → Accumulating → Sealing → Publishing → Empty
//! ```
//!
//! with `Closed` reachable from anywhere via [`ArchiveWriter::close`].
//! A rotation is a strict sequence: allocate name, materialize temp
//! container, atomic rename, ledger update, advance chain, drain batch.
//! Every step before the rename leaves the batch buffered on failure. Once
//! the rename succeeds the batch belongs to the visible archive: a failed
//! directory sync or ledger update parks the publication, it is retried
//! before anything else is sealed, and startup reconciliation covers the
//! case where the process dies first.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info, trace, warn};

use chainlog_chain::{HashAlgorithm, LinkingChainBuilder};
use chainlog_contracts::{
    config::ArchiverConfig,
    digest::DigestEntry,
    error::{ArchiveError, ArchiveResult},
    ledger::ArchiveLedger,
    record::LogRecord,
};

use crate::{
    cache::ArchiveCache,
    container::sync_dir,
    naming::{allocate_archive_path, NameAllocation, NameSource, RandomAlphanumeric},
    reconcile::{reconcile, sweep_temp_files, ReconcileReport},
};

/// Where the writer is in its batch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterPhase {
    /// No records buffered.
    Empty,
    /// Records buffered, rotation limit not reached.
    Accumulating,
    /// Name allocated, temp container being written.
    Sealing,
    /// Container renamed into place; ledger update outstanding.
    Publishing,
    Closed,
}

/// An archive that is visible on disk but not yet confirmed by the ledger.
struct Publication {
    entry: DigestEntry,
    record_count: usize,
    /// Whether the rename has been made durable with a directory sync.
    durable: bool,
}

type DirSync = fn(&Path) -> ArchiveResult<()>;

struct WriterState {
    phase: WriterPhase,
    cache: ArchiveCache,
    builder: LinkingChainBuilder,
    names: Box<dyn NameSource>,
    unrecorded: Option<Publication>,
    sync_dir: DirSync,
}

impl WriterState {
    fn settle_phase(&mut self) {
        self.phase = if self.unrecorded.is_some() {
            WriterPhase::Publishing
        } else if self.cache.is_empty() {
            WriterPhase::Empty
        } else {
            WriterPhase::Accumulating
        };
    }
}

/// Writes log records into rotated, hash-chained archive files.
///
/// # Thread safety
///
/// All operations take an internal `Mutex` that spans the whole rotation,
/// so concurrent `write()` calls never interleave name allocation, digest
/// computation or publication.
pub struct ArchiveWriter {
    config: ArchiverConfig,
    ledger: Arc<dyn ArchiveLedger>,
    state: Mutex<WriterState>,
    reconcile_report: ReconcileReport,
}

impl ArchiveWriter {
    /// Open a writer on `config.output_dir` with random archive names.
    ///
    /// Creates the output directory if needed, reconciles it against the
    /// ledger, and resumes the chain from the ledger head.
    pub fn open(config: ArchiverConfig, ledger: Arc<dyn ArchiveLedger>) -> ArchiveResult<Self> {
        let names = Box::new(RandomAlphanumeric::new(config.disambiguator_length));
        Self::with_name_source(config, ledger, names)
    }

    /// Like [`open`](Self::open) with an explicit source for the random part
    /// of archive names.
    pub fn with_name_source(
        config: ArchiverConfig,
        ledger: Arc<dyn ArchiveLedger>,
        names: Box<dyn NameSource>,
    ) -> ArchiveResult<Self> {
        config.validate()?;
        let algorithm: HashAlgorithm = config.hash_algorithm.parse()?;

        std::fs::create_dir_all(&config.output_dir).map_err(|e| {
            ArchiveError::io(
                format!("creating output directory '{}'", config.output_dir.display()),
                e,
            )
        })?;

        let reconcile_report = reconcile(&config.output_dir, algorithm, ledger.as_ref())?;
        if !reconcile_report.is_clean() {
            warn!(
                adopted = reconcile_report.adopted.len(),
                quarantined = reconcile_report.quarantined.len(),
                temp_removed = reconcile_report.removed_temp_files.len(),
                "output directory reconciled against ledger"
            );
        }

        let builder = LinkingChainBuilder::new(
            algorithm,
            ledger.as_ref(),
            config.acknowledge_chain_restart,
        )?;
        let cache = ArchiveCache::new(&config.output_dir, config.rotation.clone());

        info!(
            output_dir = %config.output_dir.display(),
            algorithm = %algorithm,
            "archive writer opened"
        );

        Ok(Self {
            config,
            ledger,
            state: Mutex::new(WriterState {
                phase: WriterPhase::Empty,
                cache,
                builder,
                names,
                unrecorded: None,
                sync_dir,
            }),
            reconcile_report,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// What startup reconciliation found.
    pub fn reconcile_report(&self) -> &ReconcileReport {
        &self.reconcile_report
    }

    pub fn phase(&self) -> ArchiveResult<WriterPhase> {
        Ok(self.lock()?.phase)
    }

    /// Message records buffered for the next archive.
    pub fn buffered_records(&self) -> ArchiveResult<usize> {
        Ok(self.lock()?.cache.len())
    }

    /// Digest of the last archive the ledger confirmed.
    pub fn last_digest(&self) -> ArchiveResult<Vec<u8>> {
        Ok(self.lock()?.builder.last_digest().to_vec())
    }

    /// Accept one record.
    ///
    /// The record is marked archived in the ledger, buffered if it is a
    /// message record, and the batch is sealed when the rotation policy says
    /// so. Returns `true` if an archive was created by this call.
    ///
    /// Errors fall in two groups. `InvalidArgument`, `Closed`, `Ledger` and
    /// a failed retry of a parked publication mean the record was refused:
    /// nothing was marked or buffered and the caller may retry it. Errors
    /// from the rotation that follows (`Io`, `NameSpaceExhausted`,
    /// `LedgerAfterPublish`, `PublishNotDurable`) mean the record *was*
    /// accepted and stays buffered; retrying it would archive it twice.
    pub fn write(&self, record: LogRecord) -> ArchiveResult<bool> {
        record.validate()?;

        let mut state = self.lock()?;
        if state.phase == WriterPhase::Closed {
            return Err(ArchiveError::Closed);
        }

        trace!(record_id = record.id(), "write");

        // A parked publication is recorded before any new record is accepted.
        self.retry_unrecorded(&mut state)?;

        // Mark before buffering: a failed mark leaves nothing buffered.
        self.ledger.mark_record_archived(&record)?;
        if let LogRecord::Message(message) = record {
            state.cache.add(message);
        }

        if state.cache.is_rotating() {
            return self.rotate_locked(&mut state);
        }
        state.settle_phase();
        Ok(false)
    }

    /// Seal the current batch now, regardless of the rotation policy.
    ///
    /// Returns `false` when there was nothing to seal.
    pub fn rotate(&self) -> ArchiveResult<bool> {
        let mut state = self.lock()?;
        if state.phase == WriterPhase::Closed {
            return Err(ArchiveError::Closed);
        }
        self.rotate_locked(&mut state)
    }

    /// Flush the batch into a final archive and release resources.
    ///
    /// Idempotent once it has succeeded. If the final rotation fails the
    /// writer stays open with its batch and any parked publication intact,
    /// and the error is returned; call `close` again once the cause is gone.
    pub fn close(&self) -> ArchiveResult<()> {
        let mut state = self.lock()?;
        if state.phase == WriterPhase::Closed {
            return Ok(());
        }
        trace!("closing archive writer");

        if let Err(e) = self.rotate_locked(&mut state) {
            error!(
                error = %e,
                unsealed = state.cache.len(),
                parked = state.unrecorded.is_some(),
                "final rotation failed; archive writer stays open"
            );
            return Err(e);
        }
        state.cache.close();
        state.phase = WriterPhase::Closed;
        sweep_temp_files(&self.config.output_dir).map(|_| ())
    }

    fn lock(&self) -> ArchiveResult<MutexGuard<'_, WriterState>> {
        self.state.lock().map_err(|e| ArchiveError::ChainDesync {
            reason: format!("writer state lock poisoned: {}", e),
        })
    }

    fn rotate_locked(&self, state: &mut WriterState) -> ArchiveResult<bool> {
        self.retry_unrecorded(state)?;

        let (Some(start), Some(end)) = (state.cache.start_time(), state.cache.end_time()) else {
            state.settle_phase();
            return Ok(false);
        };

        state.phase = WriterPhase::Sealing;
        let target = match allocate_archive_path(
            &self.config.output_dir,
            start,
            end,
            state.names.as_mut(),
            self.config.max_name_attempts,
        ) {
            Ok(NameAllocation::Allocated(path)) => path,
            Ok(NameAllocation::Exhausted { attempts }) => {
                state.settle_phase();
                error!(
                    dir = %self.config.output_dir.display(),
                    attempts,
                    "could not allocate a unique archive name"
                );
                return Err(ArchiveError::NameSpaceExhausted {
                    directory: self.config.output_dir.display().to_string(),
                    attempts,
                });
            }
            Err(e) => {
                state.settle_phase();
                return Err(e);
            }
        };

        let temp = match state.cache.materialize(&mut state.builder) {
            Ok(temp) => temp,
            Err(e) => {
                state.settle_phase();
                warn!(error = %e, "materializing archive failed; batch kept for retry");
                return Err(e);
            }
        };

        state.phase = WriterPhase::Publishing;
        let record_count = temp.record_count();
        let digest = temp.digest().to_vec();
        if let Err(e) = temp.publish(&target) {
            state.builder.discard_prepared();
            state.settle_phase();
            warn!(error = %e, "publishing archive failed; batch kept for retry");
            return Err(e);
        }

        // From here on the archive is visible: the batch belongs to it.
        let filename = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.finish_publication(
            state,
            Publication {
                entry: DigestEntry::new(digest, filename),
                record_count,
                durable: false,
            },
        )?;

        info!(archive = %target.display(), records = record_count, "created archive file");
        Ok(true)
    }

    fn retry_unrecorded(&self, state: &mut WriterState) -> ArchiveResult<()> {
        match state.unrecorded.take() {
            Some(parked) => {
                info!(archive = %parked.entry.archive_filename(), "retrying parked publication");
                self.finish_publication(state, parked)
            }
            None => Ok(()),
        }
    }

    /// Directory sync, ledger update, chain advance and batch drain for a
    /// published archive. Parks the publication if any step fails.
    fn finish_publication(
        &self,
        state: &mut WriterState,
        mut publication: Publication,
    ) -> ArchiveResult<()> {
        if !publication.durable {
            if let Err(e) = (state.sync_dir)(&self.config.output_dir) {
                let archive = publication.entry.archive_filename().to_string();
                error!(
                    archive = %archive,
                    error = %e,
                    "archive published but its directory entry is not durable"
                );
                state.unrecorded = Some(publication);
                state.settle_phase();
                return Err(ArchiveError::PublishNotDurable {
                    archive,
                    reason: e.to_string(),
                });
            }
            publication.durable = true;
        }

        if let Err(source) = self.ledger.mark_archive_created(&publication.entry) {
            let archive = publication.entry.archive_filename().to_string();
            error!(
                archive = %archive,
                error = %source,
                "archive published but not recorded in ledger"
            );
            state.unrecorded = Some(publication);
            state.settle_phase();
            return Err(ArchiveError::LedgerAfterPublish { archive, source });
        }

        state.builder.after_archive_saved(&publication.entry)?;
        state.cache.confirm_published(publication.record_count);
        state.settle_phase();
        Ok(())
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            let buffered = self.buffered_records().unwrap_or(0);
            error!(
                error = %e,
                buffered,
                "archive writer dropped without a clean close"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{Duration, TimeZone, Utc};

    use chainlog_contracts::{config::RotationPolicy, record::MessageRecord};

    use super::*;
    use crate::{container::read_container, ledger::InMemoryLedger, reconcile::list_archives};

    static FAIL_DIR_SYNC: AtomicBool = AtomicBool::new(true);

    fn failing_dir_sync(dir: &Path) -> ArchiveResult<()> {
        if FAIL_DIR_SYNC.load(Ordering::SeqCst) {
            return Err(ArchiveError::io(
                format!("syncing directory '{}'", dir.display()),
                std::io::Error::other("injected fsync failure"),
            ));
        }
        sync_dir(dir)
    }

    fn message(id: u64) -> LogRecord {
        MessageRecord {
            id,
            time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(id as i64),
            query_id: format!("q-{id}"),
            message: format!("<envelope id=\"{id}\"/>"),
            signature: format!("sig-{id}"),
            response: false,
        }
        .into()
    }

    // ── Directory sync after publish ──────────────────────────────────────────

    /// The rename went through, so the batch must not be sealed a second time.
    #[test]
    fn test_failed_dir_sync_parks_publication_instead_of_resealing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let config = ArchiverConfig::new(dir.path()).with_rotation(RotationPolicy::by_count(3));
        let writer = ArchiveWriter::open(config, ledger.clone()).unwrap();
        writer.state.lock().unwrap().sync_dir = failing_dir_sync;

        writer.write(message(1)).unwrap();
        writer.write(message(2)).unwrap();
        let err = writer.write(message(3)).unwrap_err();
        assert!(matches!(err, ArchiveError::PublishNotDurable { .. }));
        assert_eq!(list_archives(dir.path()).unwrap().len(), 1);
        assert!(ledger.archives().is_empty());
        assert_eq!(writer.phase().unwrap(), WriterPhase::Publishing);

        // Still failing: nothing new is sealed or accepted.
        assert!(writer.rotate().is_err());
        assert!(writer.write(message(4)).is_err());
        assert_eq!(list_archives(dir.path()).unwrap().len(), 1);

        FAIL_DIR_SYNC.store(false, Ordering::SeqCst);
        assert!(!writer.write(message(4)).unwrap());
        assert_eq!(ledger.archives().len(), 1);
        assert_eq!(writer.buffered_records().unwrap(), 1);

        writer.close().unwrap();
        let recorded = ledger.archives();
        assert_eq!(recorded.len(), 2);
        let first = read_container(&dir.path().join(recorded[0].archive_filename())).unwrap();
        let second = read_container(&dir.path().join(recorded[1].archive_filename())).unwrap();
        let first_ids: Vec<u64> = first.records().unwrap().iter().map(|r| r.id).collect();
        let second_ids: Vec<u64> = second.records().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(first_ids, vec![1, 2, 3]);
        assert_eq!(second_ids, vec![4]);
        assert_eq!(second.linking.previous_digest, recorded[0].digest());
    }
}
