//! Startup reconciliation of the output directory against the ledger.
//!
//! A crash between "archive renamed into place" and "ledger updated" leaves
//! an archive on disk that the chain does not know about. At startup every
//! unrecorded archive is examined:
//!
//! - intact archives that use the configured algorithm are adopted by
//!   following the links from the current ledger head (or genesis): the
//!   archive whose previous digest is the head is recorded and becomes the
//!   new head, and so on. File names only break ties between archives
//!   claiming the same predecessor;
//! - everything else is quarantined by renaming it to `<name>.orphan`,
//!   which takes it out of every `archive-*.tar` listing.
//!
//! Leftover temp containers are deleted first; they were never visible and
//! their records are still buffered by whoever wrote them.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use chainlog_chain::HashAlgorithm;
use chainlog_contracts::{
    digest::DigestEntry,
    error::{ArchiveError, ArchiveResult},
    ledger::ArchiveLedger,
};

use crate::{
    container::read_container,
    naming::{is_archive_filename, is_temp_filename},
};

pub const QUARANTINE_SUFFIX: &str = ".orphan";

/// What reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed_temp_files: Vec<String>,
    /// Archives whose ledger entry was replayed, in chain order.
    pub adopted: Vec<DigestEntry>,
    /// Archives renamed out of the way.
    pub quarantined: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.removed_temp_files.is_empty() && self.adopted.is_empty() && self.quarantined.is_empty()
    }
}

/// Published archive names in `dir`, sorted by name.
///
/// Name order is not chain order: names carry second-resolution batch
/// bounds and a random suffix, so batches sealed within the same second
/// sort arbitrarily. Follow `previous_digest` links to order a chain.
pub fn list_archives(dir: &Path) -> ArchiveResult<Vec<String>> {
    let mut names = list_names(dir)?
        .into_iter()
        .filter(|n| is_archive_filename(n))
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Delete temp containers left in `dir`. Returns the removed names.
pub fn sweep_temp_files(dir: &Path) -> ArchiveResult<Vec<String>> {
    let mut removed = Vec::new();
    for name in list_names(dir)?.into_iter().filter(|n| is_temp_filename(n)) {
        let path = dir.join(&name);
        match fs::remove_file(&path) {
            Ok(()) => removed.push(name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ArchiveError::io(
                    format!("removing stale temp container '{}'", path.display()),
                    e,
                ))
            }
        }
    }
    if !removed.is_empty() {
        info!(count = removed.len(), dir = %dir.display(), "removed stale temp containers");
    }
    Ok(removed)
}

fn list_names(dir: &Path) -> ArchiveResult<Vec<String>> {
    let read = fs::read_dir(dir)
        .map_err(|e| ArchiveError::io(format!("listing '{}'", dir.display()), e))?;
    let mut names = Vec::new();
    for entry in read {
        let entry =
            entry.map_err(|e| ArchiveError::io(format!("listing '{}'", dir.display()), e))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Bring the ledger and `dir` back in agreement.
pub fn reconcile(
    dir: &Path,
    algorithm: HashAlgorithm,
    ledger: &dyn ArchiveLedger,
) -> ArchiveResult<ReconcileReport> {
    let mut report = ReconcileReport {
        removed_temp_files: sweep_temp_files(dir)?,
        ..ReconcileReport::default()
    };

    let mut head = ledger
        .last_digest_entry()?
        .map(|e| e.digest().to_vec())
        .unwrap_or_else(|| algorithm.genesis());

    let mut candidates = Vec::new();
    for name in list_archives(dir)? {
        if ledger.is_archive_recorded(&name)? {
            continue;
        }
        match inspect(dir, &name, algorithm) {
            Ok(candidate) => candidates.push(candidate),
            Err(reason) => {
                warn!(archive = %name, %reason, "quarantining unrecorded archive");
                quarantine(dir, &name)?;
                report.quarantined.push(name);
            }
        }
    }

    // Candidates are in name order, so the first match wins a tie.
    while let Some(pos) = candidates.iter().position(|c| c.previous_digest == head) {
        let candidate = candidates.remove(pos);
        let entry = DigestEntry::new(candidate.digest, candidate.name);
        ledger.mark_archive_created(&entry)?;
        info!(
            archive = %entry.archive_filename(),
            digest = %entry.digest_hex(),
            "adopted unrecorded archive"
        );
        head = entry.digest().to_vec();
        report.adopted.push(entry);
    }

    for candidate in candidates {
        warn!(
            archive = %candidate.name,
            "quarantining unrecorded archive that does not link to the ledger head"
        );
        quarantine(dir, &candidate.name)?;
        report.quarantined.push(candidate.name);
    }

    Ok(report)
}

/// An intact unrecorded archive and its place in the chain.
struct Candidate {
    name: String,
    previous_digest: Vec<u8>,
    digest: Vec<u8>,
}

fn inspect(dir: &Path, name: &str, algorithm: HashAlgorithm) -> Result<Candidate, String> {
    let contents = read_container(&dir.join(name)).map_err(|e| e.to_string())?;
    if contents.linking.algorithm != algorithm {
        return Err(format!(
            "sealed with {} but the chain uses {}",
            contents.linking.algorithm, algorithm
        ));
    }
    contents.verify().map_err(|fault| fault.to_string())?;
    Ok(Candidate {
        name: name.to_string(),
        previous_digest: contents.linking.previous_digest,
        digest: contents.linking.digest,
    })
}

fn quarantine(dir: &Path, name: &str) -> ArchiveResult<()> {
    let from = dir.join(name);
    let to = dir.join(format!("{name}{QUARANTINE_SUFFIX}"));
    fs::rename(&from, &to)
        .map_err(|e| ArchiveError::io(format!("quarantining '{}'", from.display()), e))
}
