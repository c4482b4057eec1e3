//! # chainlog-chain
//!
//! Digest algorithms and the cross-archive hash chain for chainlog.
//!
//! ## Overview
//!
//! Each sealed archive embeds [`LinkingInfo`]: the previous archive's digest
//! and one link per entry. The final link is the archive's digest, and it
//! becomes the `previous_digest` of the next archive. Removing, reordering
//! or editing any archive breaks the next archive's linkage.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chainlog_chain::{HashAlgorithm, LinkingChainBuilder};
//!
//! let mut builder = LinkingChainBuilder::new(HashAlgorithm::Sha256, &ledger, false)?;
//! let info = builder.prepare([("records/000000-1.json", bytes.as_slice())]);
//! // publish the container, record DigestEntry::new(info.digest.clone(), name) ...
//! builder.after_archive_saved(&entry)?;
//! ```

pub mod builder;
pub mod hash;
pub mod linking;

pub use builder::LinkingChainBuilder;
pub use hash::HashAlgorithm;
pub use linking::{link_step, LinkFault, LinkedEntry, LinkingInfo};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chainlog_contracts::{
        digest::DigestEntry,
        error::{ArchiveError, LedgerResult},
        ledger::ArchiveLedger,
        record::LogRecord,
    };

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Ledger holding at most a head entry; enough to seed a builder.
    #[derive(Default)]
    struct HeadLedger {
        head: Mutex<Option<DigestEntry>>,
    }

    impl HeadLedger {
        fn with_head(entry: DigestEntry) -> Self {
            Self {
                head: Mutex::new(Some(entry)),
            }
        }
    }

    impl ArchiveLedger for HeadLedger {
        fn mark_record_archived(&self, _record: &LogRecord) -> LedgerResult<()> {
            Ok(())
        }

        fn mark_archive_created(&self, entry: &DigestEntry) -> LedgerResult<()> {
            *self.head.lock().unwrap() = Some(entry.clone());
            Ok(())
        }

        fn last_digest_entry(&self) -> LedgerResult<Option<DigestEntry>> {
            Ok(self.head.lock().unwrap().clone())
        }

        fn is_archive_recorded(&self, archive_filename: &str) -> LedgerResult<bool> {
            Ok(self
                .head
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|e| e.archive_filename() == archive_filename))
        }
    }

    fn batch() -> Vec<(String, Vec<u8>)> {
        vec![
            ("records/000000-1.json".to_string(), b"{\"id\":1}".to_vec()),
            ("records/000001-2.json".to_string(), b"{\"id\":2}".to_vec()),
            ("records/000002-3.json".to_string(), b"{\"id\":3}".to_vec()),
        ]
    }

    fn as_pairs(entries: &[(String, Vec<u8>)]) -> impl Iterator<Item = (&str, &[u8])> {
        entries.iter().map(|(n, b)| (n.as_str(), b.as_slice()))
    }

    // ── Hash algorithms ───────────────────────────────────────────────────────

    #[test]
    fn test_algorithm_parses_short_names_and_uris() {
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert_eq!(
            "http://www.w3.org/2001/04/xmldsig-more#sha384"
                .parse::<HashAlgorithm>()
                .unwrap(),
            HashAlgorithm::Sha384
        );
        assert!(matches!(
            "MD5".parse::<HashAlgorithm>(),
            Err(ArchiveError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_algorithm_output_lengths_match_digests() {
        for alg in [
            HashAlgorithm::Sha224,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(alg.digest(b"abc").len(), alg.output_len());
            assert_eq!(alg.genesis().len(), alg.output_len());
        }
    }

    #[test]
    fn test_sha256_matches_known_vector() {
        assert_eq!(
            hex::encode(HashAlgorithm::Sha256.digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_parts_equals_digest_of_concatenation() {
        let alg = HashAlgorithm::Sha384;
        assert_eq!(alg.digest_parts(&[b"ab", b"c"]), alg.digest(b"abc"));
    }

    // ── Linking info ──────────────────────────────────────────────────────────

    #[test]
    fn test_linking_is_deterministic() {
        let entries = batch();
        let prev = HashAlgorithm::Sha256.digest(b"previous archive");
        let a = LinkingInfo::build(HashAlgorithm::Sha256, &prev, as_pairs(&entries));
        let b = LinkingInfo::build(HashAlgorithm::Sha256, &prev, as_pairs(&entries));
        assert_eq!(a, b);
        assert_eq!(a.digest, a.entries.last().unwrap().link_digest);
    }

    #[test]
    fn test_linking_depends_on_entry_order() {
        let entries = batch();
        let mut reversed = entries.clone();
        reversed.reverse();
        let genesis = HashAlgorithm::Sha256.genesis();
        let a = LinkingInfo::build(HashAlgorithm::Sha256, &genesis, as_pairs(&entries));
        let b = LinkingInfo::build(HashAlgorithm::Sha256, &genesis, as_pairs(&reversed));
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_linking_depends_on_previous_digest() {
        let entries = batch();
        let alg = HashAlgorithm::Sha256;
        let a = LinkingInfo::build(alg, &alg.genesis(), as_pairs(&entries));
        let b = LinkingInfo::build(alg, &alg.digest(b"other"), as_pairs(&entries));
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_first_link_is_hash_of_previous_and_entry_digest() {
        let entries = batch();
        let alg = HashAlgorithm::Sha256;
        let info = LinkingInfo::build(alg, &alg.genesis(), as_pairs(&entries));
        let expected = alg.digest_parts(&[&alg.genesis(), &alg.digest(&entries[0].1)]);
        assert_eq!(info.entries[0].link_digest, expected);
    }

    #[test]
    fn test_verify_contents_accepts_untouched_entries() {
        let entries = batch();
        let alg = HashAlgorithm::Sha512;
        let info = LinkingInfo::build(alg, &alg.genesis(), as_pairs(&entries));
        assert_eq!(info.verify_contents(as_pairs(&entries)), Ok(()));
    }

    #[test]
    fn test_verify_contents_detects_modified_entry() {
        let mut entries = batch();
        let alg = HashAlgorithm::Sha256;
        let info = LinkingInfo::build(alg, &alg.genesis(), as_pairs(&entries));
        entries[1].1 = b"{\"id\":99}".to_vec();
        assert_eq!(
            info.verify_contents(as_pairs(&entries)),
            Err(LinkFault::EntryDigest {
                name: "records/000001-2.json".to_string()
            })
        );
    }

    #[test]
    fn test_verify_contents_detects_removed_entry() {
        let mut entries = batch();
        let alg = HashAlgorithm::Sha256;
        let info = LinkingInfo::build(alg, &alg.genesis(), as_pairs(&entries));
        entries.pop();
        assert_eq!(
            info.verify_contents(as_pairs(&entries)),
            Err(LinkFault::EntryCount {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_verify_links_detects_forged_final_digest() {
        let entries = batch();
        let alg = HashAlgorithm::Sha256;
        let mut info = LinkingInfo::build(alg, &alg.genesis(), as_pairs(&entries));
        info.digest = alg.digest(b"forged");
        assert_eq!(info.verify_links(), Err(LinkFault::FinalDigest));
    }

    #[test]
    fn test_linking_info_json_round_trip_keeps_algorithm_id() {
        let entries = batch();
        let alg = HashAlgorithm::Sha224;
        let info = LinkingInfo::build(alg, &alg.genesis(), as_pairs(&entries));
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"SHA-224\""));
        let decoded: LinkingInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, info);
    }

    // ── Builder ───────────────────────────────────────────────────────────────

    #[test]
    fn test_builder_starts_from_genesis_on_empty_ledger() {
        let ledger = HeadLedger::default();
        let builder = LinkingChainBuilder::new(HashAlgorithm::Sha256, &ledger, false).unwrap();
        assert_eq!(builder.last_digest(), HashAlgorithm::Sha256.genesis().as_slice());
        assert!(builder.created_archive_last_digest().is_none());
    }

    #[test]
    fn test_builder_resumes_from_ledger_head() {
        let head = HashAlgorithm::Sha256.digest(b"head");
        let ledger = HeadLedger::with_head(DigestEntry::new(head.clone(), "archive-a.tar"));
        let builder = LinkingChainBuilder::new(HashAlgorithm::Sha256, &ledger, false).unwrap();
        assert_eq!(builder.last_digest(), head.as_slice());
    }

    #[test]
    fn test_builder_rejects_algorithm_change_without_acknowledgement() {
        let head = HashAlgorithm::Sha256.digest(b"head");
        let ledger = HeadLedger::with_head(DigestEntry::new(head, "archive-a.tar"));
        let err = LinkingChainBuilder::new(HashAlgorithm::Sha512, &ledger, false)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ArchiveError::AlgorithmMismatch {
                expected_len: 64,
                found_len: 32,
                ..
            }
        ));
    }

    #[test]
    fn test_builder_restarts_chain_when_algorithm_change_acknowledged() {
        let head = HashAlgorithm::Sha256.digest(b"head");
        let ledger = HeadLedger::with_head(DigestEntry::new(head, "archive-a.tar"));
        let builder = LinkingChainBuilder::new(HashAlgorithm::Sha512, &ledger, true).unwrap();
        assert_eq!(builder.last_digest(), HashAlgorithm::Sha512.genesis().as_slice());
    }

    #[test]
    fn test_prepare_does_not_advance_chain_state() {
        let entries = batch();
        let mut builder = LinkingChainBuilder::from_digest(
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha256.genesis(),
        );
        let digest = builder.prepare(as_pairs(&entries)).digest.clone();
        assert_eq!(builder.created_archive_last_digest(), Some(digest.as_slice()));
        assert_eq!(builder.last_digest(), HashAlgorithm::Sha256.genesis().as_slice());
    }

    #[test]
    fn test_after_archive_saved_advances_to_prepared_digest() {
        let entries = batch();
        let mut builder = LinkingChainBuilder::from_digest(
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha256.genesis(),
        );
        let digest = builder.prepare(as_pairs(&entries)).digest.clone();
        builder
            .after_archive_saved(&DigestEntry::new(digest.clone(), "archive-1.tar"))
            .unwrap();
        assert_eq!(builder.last_digest(), digest.as_slice());
        assert!(builder.created_archive_last_digest().is_none());

        // The next batch chains onto the confirmed digest.
        let next = builder.prepare(as_pairs(&entries)).clone();
        assert_eq!(next.previous_digest, digest);
    }

    #[test]
    fn test_after_archive_saved_without_prepare_is_desync() {
        let mut builder = LinkingChainBuilder::from_digest(
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha256.genesis(),
        );
        let entry = DigestEntry::new(vec![1; 32], "archive-1.tar");
        assert!(matches!(
            builder.after_archive_saved(&entry),
            Err(ArchiveError::ChainDesync { .. })
        ));
    }

    #[test]
    fn test_after_archive_saved_with_wrong_digest_is_desync() {
        let entries = batch();
        let mut builder = LinkingChainBuilder::from_digest(
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha256.genesis(),
        );
        builder.prepare(as_pairs(&entries));
        let entry = DigestEntry::new(vec![1; 32], "archive-1.tar");
        assert!(matches!(
            builder.after_archive_saved(&entry),
            Err(ArchiveError::ChainDesync { .. })
        ));
        // State must be unchanged after the rejected confirmation.
        assert_eq!(builder.last_digest(), HashAlgorithm::Sha256.genesis().as_slice());
        assert!(builder.created_archive_last_digest().is_some());
    }
}
