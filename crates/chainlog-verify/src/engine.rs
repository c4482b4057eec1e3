//! Archive chain verifier.
//!
//! `ChainVerifier` checks every archive in an output directory on its own,
//! then orders the intact ones by following `previous_digest` links from
//! the anchor. File names are not chain order (batches sealed within the
//! same second sort by their random suffix), so they are only used to break
//! ties and to order what is left over. An archive whose predecessor cannot
//! be found is reported, unless some archive in the directory is broken and
//! could be that predecessor.

use std::path::Path;

use tracing::{debug, warn};

use chainlog_archive::{container::read_container, reconcile::list_archives};
use chainlog_chain::HashAlgorithm;
use chainlog_contracts::{
    error::{ArchiveError, ArchiveResult},
    ledger::ArchiveLedger,
};

/// Where the first verified archive is expected to link to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChainAnchor {
    /// The all-zero genesis value of the archive's algorithm.
    #[default]
    Genesis,
    /// A known digest, e.g. the last archive of an already verified prefix.
    Digest(Vec<u8>),
}

/// What a single archive claims about itself, after it has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub archive: String,
    pub algorithm: HashAlgorithm,
    pub previous_digest: Vec<u8>,
    pub digest: Vec<u8>,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFailure {
    pub archive: String,
    pub reason: String,
}

/// Result of verifying a directory.
#[derive(Debug, Clone, Default)]
pub struct ChainReport {
    /// Archives that passed their own checks, in chain order.
    pub archives: Vec<ArchiveSummary>,
    pub failures: Vec<ChainFailure>,
    pub passed: bool,
}

impl ChainReport {
    /// Digest of the last intact archive.
    pub fn head(&self) -> Option<&[u8]> {
        self.archives.last().map(|a| a.digest.as_slice())
    }

    fn fail(&mut self, archive: impl Into<String>, reason: impl Into<String>) {
        let failure = ChainFailure {
            archive: archive.into(),
            reason: reason.into(),
        };
        warn!(archive = %failure.archive, reason = %failure.reason, "chain verification failure");
        self.failures.push(failure);
        self.passed = false;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainVerifier {
    algorithm: Option<HashAlgorithm>,
    anchor: ChainAnchor,
}

impl ChainVerifier {
    /// Accept any supported algorithm, anchor at genesis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every archive to use `algorithm`.
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_anchor(mut self, anchor: ChainAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Check one archive's entries against its own linking info.
    ///
    /// Returns `InvalidContainer` for structural problems and
    /// `IntegrityViolation` when contents or links do not match.
    pub fn verify_archive(&self, path: &Path) -> ArchiveResult<ArchiveSummary> {
        let archive = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let contents = read_container(path)?;
        let linking = &contents.linking;

        if let Some(required) = self.algorithm {
            if linking.algorithm != required {
                return Err(ArchiveError::IntegrityViolation {
                    archive,
                    reason: format!("sealed with {} but {} is required", linking.algorithm, required),
                });
            }
        }

        contents
            .verify()
            .map_err(|fault| ArchiveError::IntegrityViolation {
                archive: archive.clone(),
                reason: fault.to_string(),
            })?;

        debug!(archive = %archive, records = contents.entries.len(), "archive verified");
        Ok(ArchiveSummary {
            archive,
            algorithm: linking.algorithm,
            previous_digest: linking.previous_digest.clone(),
            digest: linking.digest.clone(),
            record_count: contents.entries.len(),
        })
    }

    /// Verify every archive in `dir` and the links between them.
    ///
    /// Only failures to list the directory are returned as errors; problems
    /// with individual archives end up in the report. `report.archives` is
    /// in chain order.
    pub fn verify_directory(&self, dir: &Path) -> ArchiveResult<ChainReport> {
        let mut report = ChainReport {
            passed: true,
            ..ChainReport::default()
        };

        let mut pending = Vec::new();
        let mut broken = 0usize;
        for name in list_archives(dir)? {
            match self.verify_archive(&dir.join(&name)) {
                Ok(summary) => pending.push(summary),
                Err(e) => {
                    broken += 1;
                    report.fail(&name, e.to_string());
                }
            }
        }

        let mut cursor: Option<Vec<u8>> = match &self.anchor {
            ChainAnchor::Genesis => None,
            ChainAnchor::Digest(d) => Some(d.clone()),
        };
        while !pending.is_empty() {
            // `pending` stays in name order, so the first match wins a tie.
            let next = pending.iter().position(|a| match &cursor {
                None => a.previous_digest == a.algorithm.genesis(),
                Some(head) => &a.previous_digest == head,
            });
            let summary = match next {
                Some(pos) => pending.remove(pos),
                None => {
                    let pos = segment_start(&pending);
                    let orphan = pending.remove(pos);
                    report_unlinked(&mut report, &orphan, broken);
                    orphan
                }
            };

            let switched = report
                .archives
                .last()
                .filter(|prior| prior.algorithm != summary.algorithm)
                .map(|prior| {
                    format!(
                        "algorithm changed from {} to {} mid-chain",
                        prior.algorithm, summary.algorithm
                    )
                });
            if let Some(reason) = switched {
                report.fail(&summary.archive, reason);
            }
            cursor = Some(summary.digest.clone());
            report.archives.push(summary);
        }

        Ok(report)
    }

    /// [`verify_directory`](Self::verify_directory), then check that the
    /// ledger knows every archive and that its head is the last one.
    pub fn verify_with_ledger(
        &self,
        dir: &Path,
        ledger: &dyn ArchiveLedger,
    ) -> ArchiveResult<ChainReport> {
        let mut report = self.verify_directory(dir)?;

        let names: Vec<String> = report.archives.iter().map(|a| a.archive.clone()).collect();
        for name in names {
            if !ledger.is_archive_recorded(&name)? {
                report.fail(&name, "archive is not recorded in the ledger");
            }
        }

        let head = ledger.last_digest_entry()?;
        match (head, report.archives.last().cloned()) {
            (None, None) => {}
            (None, Some(last)) => report.fail(last.archive, "ledger has no head entry"),
            (Some(head), None) => report.fail(
                head.archive_filename(),
                "ledger head has no intact archive on disk",
            ),
            (Some(head), Some(last)) => {
                if head.archive_filename() != last.archive || head.digest() != last.digest.as_slice() {
                    report.fail(
                        head.archive_filename(),
                        format!(
                            "ledger head {} ({}) is not the last archive {} ({})",
                            head.archive_filename(),
                            head.digest_hex(),
                            last.archive,
                            hex::encode(&last.digest)
                        ),
                    );
                }
            }
        }

        Ok(report)
    }
}

/// Report an archive that does not continue the chain built so far.
fn report_unlinked(report: &mut ChainReport, orphan: &ArchiveSummary, broken: usize) {
    let predecessor = report
        .archives
        .iter()
        .find(|a| a.digest == orphan.previous_digest)
        .map(|a| a.archive.clone());
    match predecessor {
        Some(name) => report.fail(
            &orphan.archive,
            format!("forks the chain: '{}' already has a successor", name),
        ),
        // The missing predecessor may be one of the broken archives.
        None if broken > 0 => {}
        None => report.fail(
            &orphan.archive,
            format!(
                "links to {} but no archive with that digest is its predecessor",
                hex::encode(&orphan.previous_digest)
            ),
        ),
    }
}

/// Index of the first archive whose predecessor is not among `pending`.
fn segment_start(pending: &[ArchiveSummary]) -> usize {
    pending
        .iter()
        .position(|a| !pending.iter().any(|b| b.digest == a.previous_digest))
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use chainlog_archive::{
        container::write_container, ledger::InMemoryLedger, ArchiveWriter, NameSource,
    };
    use chainlog_contracts::{
        config::{ArchiverConfig, RotationPolicy},
        record::{LogRecord, MessageRecord},
    };

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn message(id: u64) -> LogRecord {
        MessageRecord {
            id,
            time: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::minutes(id as i64),
            query_id: format!("q-{id}"),
            message: format!("<m>{id}</m>"),
            signature: "sig".to_string(),
            response: true,
        }
        .into()
    }

    /// Write `count` records with rotation every `per_archive`; returns the ledger.
    fn populate(dir: &Path, count: u64, per_archive: usize, algorithm: &str) -> Arc<InMemoryLedger> {
        let ledger = Arc::new(InMemoryLedger::new());
        let config = ArchiverConfig::new(dir)
            .with_rotation(RotationPolicy::by_count(per_archive))
            .with_hash_algorithm(algorithm);
        let writer = ArchiveWriter::open(config, ledger.clone()).unwrap();
        for id in 1..=count {
            writer.write(message(id)).unwrap();
        }
        writer.close().unwrap();
        ledger
    }

    /// Hands out the given disambiguators in order.
    struct Scripted(Vec<&'static str>);

    impl NameSource for Scripted {
        fn next_disambiguator(&mut self) -> String {
            if self.0.is_empty() {
                "exhausted0".to_string()
            } else {
                self.0.remove(0).to_string()
            }
        }
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_intact_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = populate(dir.path(), 9, 3, "SHA-256");

        let report = ChainVerifier::new()
            .with_algorithm(HashAlgorithm::Sha256)
            .verify_with_ledger(dir.path(), ledger.as_ref())
            .unwrap();

        assert!(report.passed, "failures: {:?}", report.failures);
        assert_eq!(report.archives.len(), 3);
        assert_eq!(report.head(), ledger.archives().last().map(|e| e.digest()));
        assert!(report.archives.iter().all(|a| a.record_count == 3));
    }

    /// Two batches sealed in the same second: name order is the reverse of
    /// chain order, and the chain must still verify.
    #[test]
    fn test_same_second_archives_verify_in_chain_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let config = ArchiverConfig::new(dir.path()).with_rotation(RotationPolicy::by_count(3));
        let writer = ArchiveWriter::with_name_source(
            config,
            ledger.clone(),
            Box::new(Scripted(vec!["zzzzzzzzzz", "aaaaaaaaaa"])),
        )
        .unwrap();
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        for id in 1..=6 {
            let LogRecord::Message(mut m) = message(id) else {
                unreachable!()
            };
            m.time = time;
            writer.write(m.into()).unwrap();
        }
        writer.close().unwrap();

        let recorded = ledger.archives();
        assert!(list_archives(dir.path()).unwrap()[0] != recorded[0].archive_filename());

        let report = ChainVerifier::new()
            .verify_with_ledger(dir.path(), ledger.as_ref())
            .unwrap();
        assert!(report.passed, "failures: {:?}", report.failures);
        let order: Vec<&str> = report.archives.iter().map(|a| a.archive.as_str()).collect();
        assert_eq!(
            order,
            vec![recorded[0].archive_filename(), recorded[1].archive_filename()]
        );
    }

    #[test]
    fn test_empty_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        let report = ChainVerifier::new().verify_directory(dir.path()).unwrap();
        assert!(report.passed);
        assert!(report.head().is_none());
    }

    #[test]
    fn test_deleted_archive_breaks_chain() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = populate(dir.path(), 9, 3, "SHA-256");
        let middle = ledger.archives()[1].archive_filename().to_string();
        std::fs::remove_file(dir.path().join(&middle)).unwrap();

        let report = ChainVerifier::new().verify_directory(dir.path()).unwrap();
        assert!(!report.passed);
        assert_eq!(report.failures.len(), 1);
        let third = ledger.archives()[2].archive_filename().to_string();
        assert_eq!(report.failures[0].archive, third);
        assert!(report.failures[0].reason.contains("predecessor"));
    }

    #[test]
    fn test_modified_record_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = populate(dir.path(), 4, 2, "SHA-256");
        let first = ledger.archives()[0].archive_filename().to_string();
        let path = dir.path().join(&first);

        let mut contents = read_container(&path).unwrap();
        contents.entries[0].bytes = br#"{"forged":true}"#.to_vec();
        let file = File::create(&path).unwrap();
        write_container(file, &contents.entries, &contents.linking, 0).unwrap();

        let report = ChainVerifier::new().verify_directory(dir.path()).unwrap();
        assert!(!report.passed);
        assert_eq!(report.failures[0].archive, first);
        assert!(report.failures[0].reason.contains("integrity violation"));
        // The successor cannot be link-checked, but it is still verified on its own.
        assert_eq!(report.archives.len(), 1);
    }

    #[test]
    fn test_anchor_allows_verifying_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = populate(dir.path(), 6, 2, "SHA-512");
        let archives = ledger.archives();
        std::fs::remove_file(dir.path().join(archives[0].archive_filename())).unwrap();

        let genesis_report = ChainVerifier::new().verify_directory(dir.path()).unwrap();
        assert!(!genesis_report.passed);

        let anchored = ChainVerifier::new()
            .with_anchor(ChainAnchor::Digest(archives[0].digest().to_vec()))
            .verify_directory(dir.path())
            .unwrap();
        assert!(anchored.passed, "failures: {:?}", anchored.failures);
        assert_eq!(anchored.archives.len(), 2);
    }

    #[test]
    fn test_required_algorithm_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), 2, 2, "SHA-384");

        let report = ChainVerifier::new()
            .with_algorithm(HashAlgorithm::Sha256)
            .verify_directory(dir.path())
            .unwrap();
        assert!(!report.passed);
        assert!(report.failures[0].reason.contains("SHA-384"));
    }

    #[test]
    fn test_ledger_missing_archive_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), 4, 2, "SHA-256");

        let empty = InMemoryLedger::new();
        let report = ChainVerifier::new()
            .verify_with_ledger(dir.path(), &empty)
            .unwrap();
        assert!(!report.passed);
        // Two unrecorded archives plus the missing head.
        assert_eq!(report.failures.len(), 3);
    }
}
