//! Linking info: the chain metadata embedded in every sealed container.
//!
//! Layout of the chain inside one archive:
//!
//! ```text
//!   d_0 = previous archive digest (or genesis)
//!   d_i = H(d_{i-1} || H(entry_i))      for each entry, in container order
//!   archive digest = d_n
//! ```
//!
//! Every intermediate `d_i` is stored next to its entry so a verifier can
//! pinpoint the first tampered entry instead of only learning that the
//! final digest is wrong.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chainlog_contracts::digest::hex_bytes;

use crate::hash::HashAlgorithm;

/// One container entry's position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedEntry {
    /// Entry name inside the container.
    pub name: String,

    /// `H(entry bytes)`.
    #[serde(with = "hex_bytes")]
    pub entry_digest: Vec<u8>,

    /// `H(previous link || entry_digest)`.
    #[serde(with = "hex_bytes")]
    pub link_digest: Vec<u8>,
}

/// Chain linkage for one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingInfo {
    pub algorithm: HashAlgorithm,

    /// Digest of the predecessor archive, or genesis for the first one.
    #[serde(with = "hex_bytes")]
    pub previous_digest: Vec<u8>,

    pub entries: Vec<LinkedEntry>,

    /// Final link value; becomes the archive's `DigestEntry` digest.
    #[serde(with = "hex_bytes")]
    pub digest: Vec<u8>,
}

/// The first way in which linking info disagrees with the data it describes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkFault {
    #[error("linking info lists {expected} entries but the container holds {found}")]
    EntryCount { expected: usize, found: usize },

    #[error("entry {index} is '{found}' but linking info expects '{expected}'")]
    EntryName {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("content digest of entry '{name}' does not match")]
    EntryDigest { name: String },

    #[error("link digest of entry '{name}' does not match")]
    LinkDigest { name: String },

    #[error("final archive digest does not match the last link")]
    FinalDigest,

    #[error("previous digest is {found} bytes, {algorithm} produces {expected}")]
    DigestLength {
        algorithm: HashAlgorithm,
        expected: usize,
        found: usize,
    },
}

/// One step of the chain: `H(previous || entry_digest)`.
pub fn link_step(algorithm: HashAlgorithm, previous: &[u8], entry_digest: &[u8]) -> Vec<u8> {
    algorithm.digest_parts(&[previous, entry_digest])
}

impl LinkingInfo {
    /// Chain `entries` onto `previous_digest`, in iteration order.
    ///
    /// Deterministic: the same ordered entries and previous digest always
    /// produce the same bytes.
    pub fn build<'a, I>(algorithm: HashAlgorithm, previous_digest: &[u8], entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut link = previous_digest.to_vec();
        let mut linked = Vec::new();

        for (name, content) in entries {
            let entry_digest = algorithm.digest(content);
            link = link_step(algorithm, &link, &entry_digest);
            linked.push(LinkedEntry {
                name: name.to_string(),
                entry_digest,
                link_digest: link.clone(),
            });
        }

        Self {
            algorithm,
            previous_digest: previous_digest.to_vec(),
            entries: linked,
            digest: link,
        }
    }

    /// Check that the stored links form a valid chain from `previous_digest`.
    ///
    /// Uses only the stored entry digests; see [`verify_contents`](Self::verify_contents)
    /// to also re-hash the entries themselves.
    pub fn verify_links(&self) -> Result<(), LinkFault> {
        let expected_len = self.algorithm.output_len();
        if self.previous_digest.len() != expected_len {
            return Err(LinkFault::DigestLength {
                algorithm: self.algorithm,
                expected: expected_len,
                found: self.previous_digest.len(),
            });
        }

        let mut link = self.previous_digest.clone();
        for entry in &self.entries {
            link = link_step(self.algorithm, &link, &entry.entry_digest);
            if link != entry.link_digest {
                return Err(LinkFault::LinkDigest {
                    name: entry.name.clone(),
                });
            }
        }

        if link != self.digest {
            return Err(LinkFault::FinalDigest);
        }
        Ok(())
    }

    /// Re-hash `contents` (name, bytes) in container order and check them
    /// against this linking info, then check the links themselves.
    pub fn verify_contents<'a, I>(&self, contents: I) -> Result<(), LinkFault>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut found = 0usize;
        for (index, (name, bytes)) in contents.into_iter().enumerate() {
            found += 1;
            let Some(entry) = self.entries.get(index) else {
                continue;
            };
            if entry.name != name {
                return Err(LinkFault::EntryName {
                    index,
                    expected: entry.name.clone(),
                    found: name.to_string(),
                });
            }
            if self.algorithm.digest(bytes) != entry.entry_digest {
                return Err(LinkFault::EntryDigest {
                    name: entry.name.clone(),
                });
            }
        }

        if found != self.entries.len() {
            return Err(LinkFault::EntryCount {
                expected: self.entries.len(),
                found,
            });
        }

        self.verify_links()
    }
}
