//! In-memory ledger.
//!
//! Keeps everything in a `Mutex`. Besides the contract it exposes how often
//! each record was marked, which is what the writer tests assert on.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use chainlog_contracts::{
    digest::DigestEntry,
    error::{LedgerError, LedgerResult},
    ledger::ArchiveLedger,
    record::{LogRecord, RecordId},
};

#[derive(Default)]
struct MemoryState {
    record_marks: HashMap<RecordId, usize>,
    archives: Vec<DigestEntry>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<MemoryState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded archives, oldest first.
    pub fn archives(&self) -> Vec<DigestEntry> {
        self.lock().map(|s| s.archives.clone()).unwrap_or_default()
    }

    /// How many times `id` was passed to `mark_record_archived`.
    pub fn record_mark_count(&self, id: RecordId) -> usize {
        self.lock()
            .map(|s| s.record_marks.get(&id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn archived_record_ids(&self) -> BTreeSet<RecordId> {
        self.lock()
            .map(|s| s.record_marks.keys().copied().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> LedgerResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|e| LedgerError::Unavailable {
            reason: format!("ledger lock poisoned: {}", e),
        })
    }
}

impl ArchiveLedger for InMemoryLedger {
    fn mark_record_archived(&self, record: &LogRecord) -> LedgerResult<()> {
        *self.lock()?.record_marks.entry(record.id()).or_insert(0) += 1;
        Ok(())
    }

    fn mark_archive_created(&self, entry: &DigestEntry) -> LedgerResult<()> {
        let mut state = self.lock()?;
        if !state
            .archives
            .iter()
            .any(|e| e.archive_filename() == entry.archive_filename())
        {
            state.archives.push(entry.clone());
        }
        Ok(())
    }

    fn last_digest_entry(&self) -> LedgerResult<Option<DigestEntry>> {
        Ok(self.lock()?.archives.last().cloned())
    }

    fn is_archive_recorded(&self, archive_filename: &str) -> LedgerResult<bool> {
        Ok(self
            .lock()?
            .archives
            .iter()
            .any(|e| e.archive_filename() == archive_filename))
    }
}
