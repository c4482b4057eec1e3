//! Digest algorithm selection.
//!
//! The algorithm is chosen once, from configuration, when a chain builder is
//! constructed. Identifiers are accepted in the short form (`SHA-256`,
//! `sha256`) and as XML-DSig digest method URIs, which is what older
//! deployments stored in their configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use chainlog_contracts::error::ArchiveError;

/// A supported digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Canonical identifier, written into every container's linking info.
    pub fn id(self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "SHA-224",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// The chain value used before any archive exists: all zero bytes.
    pub fn genesis(self) -> Vec<u8> {
        vec![0u8; self.output_len()]
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        self.digest_parts(&[data])
    }

    /// Digest the concatenation of `parts` without materializing it.
    pub fn digest_parts(self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha224 => digest_with::<Sha224>(parts),
            HashAlgorithm::Sha256 => digest_with::<Sha256>(parts),
            HashAlgorithm::Sha384 => digest_with::<Sha384>(parts),
            HashAlgorithm::Sha512 => digest_with::<Sha512>(parts),
        }
    }
}

fn digest_with<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

impl FromStr for HashAlgorithm {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let algorithm = match normalized.as_str() {
            "sha-224" | "sha224" | "http://www.w3.org/2001/04/xmldsig-more#sha224" => {
                HashAlgorithm::Sha224
            }
            "sha-256" | "sha256" | "http://www.w3.org/2001/04/xmlenc#sha256" => HashAlgorithm::Sha256,
            "sha-384" | "sha384" | "http://www.w3.org/2001/04/xmldsig-more#sha384" => {
                HashAlgorithm::Sha384
            }
            "sha-512" | "sha512" | "http://www.w3.org/2001/04/xmlenc#sha512" => HashAlgorithm::Sha512,
            _ => {
                return Err(ArchiveError::UnsupportedAlgorithm {
                    name: s.to_string(),
                })
            }
        };
        Ok(algorithm)
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = ArchiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashAlgorithm> for String {
    fn from(algorithm: HashAlgorithm) -> Self {
        algorithm.id().to_string()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
