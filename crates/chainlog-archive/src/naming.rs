//! Archive file naming and collision-free name allocation.
//!
//! Final names look like `archive-20240301120000-20240301121500-a1B2c3D4e5.tar`:
//! batch start, batch end (UTC, fixed width so names sort by time) and a
//! random alphanumeric disambiguator. Temp containers use a leading dot so
//! nothing that lists `archive-*` ever sees them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use tracing::debug;

use chainlog_contracts::error::{ArchiveError, ArchiveResult};

pub const ARCHIVE_PREFIX: &str = "archive-";
pub const ARCHIVE_EXTENSION: &str = "tar";
pub const TEMP_PREFIX: &str = ".archive-";
pub const TEMP_SUFFIX: &str = ".tmp";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Supplies the random part of archive names.
///
/// Injected into the writer so tests can force collisions.
pub trait NameSource: Send {
    fn next_disambiguator(&mut self) -> String;
}

/// Default source: `length` random ASCII letters and digits.
#[derive(Debug, Clone)]
pub struct RandomAlphanumeric {
    length: usize,
}

impl RandomAlphanumeric {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl NameSource for RandomAlphanumeric {
    fn next_disambiguator(&mut self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}

/// Result of [`allocate_archive_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameAllocation {
    /// A path that did not exist when it was checked.
    Allocated(PathBuf),
    /// Every generated name already existed.
    Exhausted { attempts: u32 },
}

pub fn archive_filename(start: DateTime<Utc>, end: DateTime<Utc>, random: &str) -> String {
    format!(
        "{ARCHIVE_PREFIX}{}-{}-{random}.{ARCHIVE_EXTENSION}",
        start.format(TIMESTAMP_FORMAT),
        end.format(TIMESTAMP_FORMAT)
    )
}

/// Whether `name` looks like a published archive (not a temp or quarantined file).
pub fn is_archive_filename(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

pub fn is_temp_filename(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

/// Generate archive names until one does not exist in `dir`.
///
/// Calls `source` at most `max_attempts` times.
pub fn allocate_archive_path(
    dir: &Path,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source: &mut dyn NameSource,
    max_attempts: u32,
) -> ArchiveResult<NameAllocation> {
    for attempt in 1..=max_attempts {
        let candidate = dir.join(archive_filename(start, end, &source.next_disambiguator()));
        let exists = candidate.try_exists().map_err(|e| {
            ArchiveError::io(format!("checking for '{}'", candidate.display()), e)
        })?;
        if !exists {
            return Ok(NameAllocation::Allocated(candidate));
        }
        debug!(attempt, candidate = %candidate.display(), "archive name collision");
    }
    Ok(NameAllocation::Exhausted {
        attempts: max_attempts,
    })
}
