//! Append-only JSON-lines ledger.
//!
//! One event per line:
//!
//! ```text
//! {"event":"record_archived","id":17}
//! {"event":"archive_created","digest":"9f86d0…","archive_filename":"archive-…tar"}
//! ```
//!
//! Every append is followed by `sync_data`, so an acknowledged call
//! survives a crash. A torn final line (crash mid-append) is truncated away
//! on open; any other undecodable line is `LedgerError::Corrupt`.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chainlog_contracts::{
    digest::DigestEntry,
    error::{LedgerError, LedgerResult},
    ledger::ArchiveLedger,
    record::{LogRecord, RecordId},
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LedgerLine {
    RecordArchived { id: RecordId },
    ArchiveCreated(DigestEntry),
}

struct FileState {
    file: File,
    records: HashSet<RecordId>,
    archive_names: HashSet<String>,
    last: Option<DigestEntry>,
}

pub struct FileLedger {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileLedger {
    /// Open (or create) the ledger file at `path` and load its contents.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| unavailable(&path, "opening", e))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| unavailable(&path, "reading", e))?;

        if !contents.is_empty() && !contents.ends_with('\n') {
            let keep = contents.rfind('\n').map_or(0, |i| i + 1);
            warn!(
                ledger = %path.display(),
                dropped_bytes = contents.len() - keep,
                "truncating torn final ledger line"
            );
            file.set_len(keep as u64)
                .map_err(|e| unavailable(&path, "truncating", e))?;
            contents.truncate(keep);
        }

        let mut state = FileState {
            file,
            records: HashSet::new(),
            archive_names: HashSet::new(),
            last: None,
        };
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: LedgerLine =
                serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                    reason: format!("{}:{}: {}", path.display(), lineno + 1, e),
                })?;
            state.apply(event);
        }

        debug!(
            ledger = %path.display(),
            records = state.records.len(),
            archives = state.archive_names.len(),
            "opened file ledger"
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, FileState>> {
        self.state.lock().map_err(|e| LedgerError::Unavailable {
            reason: format!("ledger lock poisoned: {}", e),
        })
    }

    fn append(&self, state: &mut FileState, event: &LedgerLine) -> LedgerResult<()> {
        let mut line = serde_json::to_string(event).map_err(|e| LedgerError::Corrupt {
            reason: format!("encoding ledger event: {}", e),
        })?;
        line.push('\n');
        state
            .file
            .write_all(line.as_bytes())
            .and_then(|()| state.file.sync_data())
            .map_err(|e| unavailable(&self.path, "appending to", e))
    }
}

impl FileState {
    fn apply(&mut self, event: LedgerLine) {
        match event {
            LedgerLine::RecordArchived { id } => {
                self.records.insert(id);
            }
            LedgerLine::ArchiveCreated(entry) => {
                if self.archive_names.insert(entry.archive_filename().to_string()) {
                    self.last = Some(entry);
                }
            }
        }
    }
}

fn unavailable(path: &Path, action: &str, e: std::io::Error) -> LedgerError {
    LedgerError::Unavailable {
        reason: format!("{} '{}': {}", action, path.display(), e),
    }
}

impl ArchiveLedger for FileLedger {
    fn mark_record_archived(&self, record: &LogRecord) -> LedgerResult<()> {
        let mut state = self.lock()?;
        if state.records.contains(&record.id()) {
            return Ok(());
        }
        let event = LedgerLine::RecordArchived { id: record.id() };
        self.append(&mut state, &event)?;
        state.apply(event);
        Ok(())
    }

    fn mark_archive_created(&self, entry: &DigestEntry) -> LedgerResult<()> {
        let mut state = self.lock()?;
        if state.archive_names.contains(entry.archive_filename()) {
            return Ok(());
        }
        let event = LedgerLine::ArchiveCreated(entry.clone());
        self.append(&mut state, &event)?;
        state.apply(event);
        Ok(())
    }

    fn last_digest_entry(&self) -> LedgerResult<Option<DigestEntry>> {
        Ok(self.lock()?.last.clone())
    }

    fn is_archive_recorded(&self, archive_filename: &str) -> LedgerResult<bool> {
        Ok(self.lock()?.archive_names.contains(archive_filename))
    }
}
