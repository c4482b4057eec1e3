//! The persisted position of one sealed archive in the hash chain.

use serde::{Deserialize, Serialize};

/// `{digest, archive_filename}` for one durably published archive.
///
/// Created exactly once per archive, after the archive file is visible under
/// its final name. Fields are private so an entry cannot be altered after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigestEntry {
    #[serde(with = "hex_bytes")]
    digest: Vec<u8>,
    archive_filename: String,
}

impl DigestEntry {
    pub fn new(digest: Vec<u8>, archive_filename: impl Into<String>) -> Self {
        Self {
            digest,
            archive_filename: archive_filename.into(),
        }
    }

    /// The chain digest produced when this archive was sealed.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Lowercase hex rendering of [`digest`](Self::digest).
    pub fn digest_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    /// File name (no directory) of the archive under the output directory.
    pub fn archive_filename(&self) -> &str {
        &self.archive_filename
    }
}

/// Serde adapter storing raw digest bytes as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
