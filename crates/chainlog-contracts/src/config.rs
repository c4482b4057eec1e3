//! Archiver configuration.
//!
//! Loaded from TOML. Every field except `output_dir` has a default, so the
//! smallest useful document is a single line:
//!
//! ```toml
//! output_dir = "/var/lib/chainlog/archives"
//! ```
//!
//! A fuller example:
//!
//! ```toml
//! output_dir = "/var/lib/chainlog/archives"
//! hash_algorithm = "SHA-512"
//! max_name_attempts = 1000
//!
//! [rotation]
//! max_records = 5000
//! max_bytes = 33554432
//! max_span_secs = 3600
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, ArchiveResult};

pub const DEFAULT_HASH_ALGORITHM: &str = "SHA-256";
pub const DEFAULT_DISAMBIGUATOR_LENGTH: usize = 10;
pub const DEFAULT_MAX_NAME_ATTEMPTS: u32 = 1000;
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 32 * 1024 * 1024;

/// When the in-progress batch should be sealed.
///
/// Rotation happens as soon as any configured limit is reached. At least one
/// limit must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotationPolicy {
    /// Seal once this many message records are buffered.
    #[serde(default)]
    pub max_records: Option<usize>,

    /// Seal once the serialized size of buffered records reaches this many bytes.
    #[serde(default)]
    pub max_bytes: Option<u64>,

    /// Seal once the batch spans this many seconds of record time.
    #[serde(default)]
    pub max_span_secs: Option<u64>,
}

impl RotationPolicy {
    /// Rotate after every `n` message records and nothing else.
    pub fn by_count(n: usize) -> Self {
        Self {
            max_records: Some(n),
            max_bytes: None,
            max_span_secs: None,
        }
    }

    fn validate(&self) -> ArchiveResult<()> {
        if self.max_records.is_none() && self.max_bytes.is_none() && self.max_span_secs.is_none() {
            return Err(ArchiveError::ConfigError {
                reason: "rotation policy must set at least one of max_records, max_bytes, max_span_secs"
                    .to_string(),
            });
        }
        if self.max_records == Some(0) || self.max_bytes == Some(0) {
            return Err(ArchiveError::ConfigError {
                reason: "rotation limits must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_records: None,
            max_bytes: Some(DEFAULT_MAX_ARCHIVE_BYTES),
            max_span_secs: None,
        }
    }
}

/// Everything the archive writer needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiverConfig {
    /// Directory that receives sealed archives. Temp containers are created
    /// here too so publication is a same-volume rename.
    pub output_dir: PathBuf,

    /// Digest algorithm identifier, e.g. `SHA-256`. Pinned for the lifetime
    /// of the chain.
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,

    #[serde(default)]
    pub rotation: RotationPolicy,

    /// Length of the random alphanumeric part of archive names.
    #[serde(default = "default_disambiguator_length")]
    pub disambiguator_length: usize,

    /// Upper bound on name generation attempts per rotation.
    #[serde(default = "default_max_name_attempts")]
    pub max_name_attempts: u32,

    /// Allow starting a new chain from genesis when the ledger head was
    /// produced by a different digest algorithm.
    #[serde(default)]
    pub acknowledge_chain_restart: bool,
}

fn default_hash_algorithm() -> String {
    DEFAULT_HASH_ALGORITHM.to_string()
}

fn default_disambiguator_length() -> usize {
    DEFAULT_DISAMBIGUATOR_LENGTH
}

fn default_max_name_attempts() -> u32 {
    DEFAULT_MAX_NAME_ATTEMPTS
}

impl ArchiverConfig {
    /// Defaults for everything but the output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            hash_algorithm: default_hash_algorithm(),
            rotation: RotationPolicy::default(),
            disambiguator_length: DEFAULT_DISAMBIGUATOR_LENGTH,
            max_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
            acknowledge_chain_restart: false,
        }
    }

    pub fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.hash_algorithm = algorithm.into();
        self
    }

    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `ArchiveError::ConfigError` if the TOML is malformed, does not
    /// match the `ArchiverConfig` schema, or fails validation.
    pub fn from_toml_str(s: &str) -> ArchiveResult<Self> {
        let config: ArchiverConfig = toml::from_str(s).map_err(|e| ArchiveError::ConfigError {
            reason: format!("failed to parse archiver TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as archiver configuration.
    pub fn from_file(path: &Path) -> ArchiveResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ArchiveError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check the invariants the writer relies on.
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ArchiveError::ConfigError {
                reason: "output_dir must not be empty".to_string(),
            });
        }
        if self.disambiguator_length == 0 {
            return Err(ArchiveError::ConfigError {
                reason: "disambiguator_length must be greater than zero".to_string(),
            });
        }
        if self.max_name_attempts == 0 {
            return Err(ArchiveError::ConfigError {
                reason: "max_name_attempts must be greater than zero".to_string(),
            });
        }
        self.rotation.validate()
    }
}
