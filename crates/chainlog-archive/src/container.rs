//! The sealed container format.
//!
//! A container is a POSIX tar file:
//!
//! ```text
//!   records/000000-<id>.json     canonical JSON of each message record,
//!   records/000001-<id>.json     in batch order
//!   ...
//!   linkinginfo.json             LinkingInfo, always the last entry
//! ```
//!
//! Linking info is written last so a container that ends without it is
//! recognisably incomplete.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use chainlog_chain::{LinkFault, LinkingInfo};
use chainlog_contracts::{
    error::{ArchiveError, ArchiveResult},
    record::{MessageRecord, RecordId},
};

pub const LINKING_INFO_NAME: &str = "linkinginfo.json";
pub const RECORDS_DIR: &str = "records";

pub fn record_entry_name(sequence: usize, id: RecordId) -> String {
    format!("{RECORDS_DIR}/{sequence:06}-{id}.json")
}

/// One named entry inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Write `entries` followed by `linking` as a tar stream into `out`.
pub fn write_container<W: Write>(
    out: W,
    entries: &[ContainerEntry],
    linking: &LinkingInfo,
    mtime: u64,
) -> ArchiveResult<W> {
    let linking_json = serde_json::to_vec_pretty(linking).map_err(|e| ArchiveError::Serialization {
        reason: format!("linking info: {}", e),
    })?;

    let mut tar = tar::Builder::new(out);
    for entry in entries {
        append_entry(&mut tar, &entry.name, &entry.bytes, mtime)?;
    }
    append_entry(&mut tar, LINKING_INFO_NAME, &linking_json, mtime)?;

    tar.into_inner()
        .map_err(|e| ArchiveError::io("finishing container", e))
}

fn append_entry<W: Write>(
    tar: &mut tar::Builder<W>,
    name: &str,
    bytes: &[u8],
    mtime: u64,
) -> ArchiveResult<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_cksum();
    tar.append_data(&mut header, name, bytes)
        .map_err(|e| ArchiveError::io(format!("appending '{}' to container", name), e))
}

/// Everything read back from a container file.
#[derive(Debug, Clone)]
pub struct ContainerContents {
    pub entries: Vec<ContainerEntry>,
    pub linking: LinkingInfo,
}

impl ContainerContents {
    /// Re-hash every entry and check the embedded chain.
    pub fn verify(&self) -> Result<(), LinkFault> {
        self.linking.verify_contents(
            self.entries
                .iter()
                .map(|e| (e.name.as_str(), e.bytes.as_slice())),
        )
    }

    /// Decode the record entries.
    pub fn records(&self) -> ArchiveResult<Vec<MessageRecord>> {
        self.entries
            .iter()
            .map(|e| {
                serde_json::from_slice(&e.bytes).map_err(|err| ArchiveError::Serialization {
                    reason: format!("record entry '{}': {}", e.name, err),
                })
            })
            .collect()
    }
}

/// Read a container file. Structural problems are `InvalidContainer`;
/// content integrity is checked separately with [`ContainerContents::verify`].
pub fn read_container(path: &Path) -> ArchiveResult<ContainerContents> {
    let archive_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let invalid = |reason: String| ArchiveError::InvalidContainer {
        archive: archive_name.clone(),
        reason,
    };

    let file = File::open(path)
        .map_err(|e| ArchiveError::io(format!("opening '{}'", path.display()), e))?;
    let mut archive = tar::Archive::new(BufReader::new(file));

    let mut entries = Vec::new();
    let mut linking: Option<LinkingInfo> = None;

    let iter = archive
        .entries()
        .map_err(|e| invalid(format!("not a tar archive: {}", e)))?;
    for entry in iter {
        let mut entry = entry.map_err(|e| invalid(format!("unreadable entry: {}", e)))?;
        let name = entry
            .path()
            .map_err(|e| invalid(format!("bad entry path: {}", e)))?
            .to_string_lossy()
            .into_owned();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| invalid(format!("truncated entry '{}': {}", name, e)))?;

        if linking.is_some() {
            return Err(invalid(format!("entry '{}' follows the linking info", name)));
        }
        if name == LINKING_INFO_NAME {
            let info = serde_json::from_slice(&bytes)
                .map_err(|e| invalid(format!("malformed linking info: {}", e)))?;
            linking = Some(info);
        } else {
            entries.push(ContainerEntry { name, bytes });
        }
    }

    let Some(linking) = linking else {
        return Err(invalid("missing linking info".to_string()));
    };
    Ok(ContainerContents { entries, linking })
}

/// A fully written and synced container that is not yet visible under its
/// final name.
///
/// Dropping the handle deletes the temp file. [`publish`](Self::publish)
/// consumes it.
#[derive(Debug)]
pub struct TempContainer {
    file: NamedTempFile,
    record_count: usize,
    linking: LinkingInfo,
}

impl TempContainer {
    /// Create a temp file in `dir` and write the container into it.
    pub(crate) fn create(
        dir: &Path,
        entries: &[ContainerEntry],
        linking: LinkingInfo,
        mtime: u64,
    ) -> ArchiveResult<Self> {
        let file = tempfile::Builder::new()
            .prefix(crate::naming::TEMP_PREFIX)
            .suffix(crate::naming::TEMP_SUFFIX)
            .tempfile_in(dir)
            .map_err(|e| {
                ArchiveError::io(format!("creating temp container in '{}'", dir.display()), e)
            })?;

        let writer = write_container(BufWriter::new(file.as_file()), entries, &linking, mtime)?;
        writer
            .into_inner()
            .map_err(|e| ArchiveError::io("flushing temp container", e.into_error()))?;
        file.as_file()
            .sync_all()
            .map_err(|e| ArchiveError::io("syncing temp container", e))?;

        debug!(
            temp = %file.path().display(),
            records = entries.len(),
            "materialized temp container"
        );
        Ok(Self {
            file,
            record_count: entries.len(),
            linking,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Number of batch records the container holds.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn linking(&self) -> &LinkingInfo {
        &self.linking
    }

    /// The chain digest this container will have once recorded.
    pub fn digest(&self) -> &[u8] {
        &self.linking.digest
    }

    /// Atomically move the container to `target` in the same directory.
    ///
    /// Never replaces an existing file. On failure the temp file is removed
    /// and nothing appears under `target`. On success the archive is
    /// visible, but the rename is durable only after [`sync_dir`] on the
    /// parent directory.
    pub fn publish(self, target: &Path) -> ArchiveResult<PathBuf> {
        self.file.persist_noclobber(target).map_err(|e| {
            ArchiveError::io(format!("publishing '{}'", target.display()), e.error)
        })?;
        Ok(target.to_path_buf())
    }
}

/// Make a rename in `dir` durable.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> ArchiveResult<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| ArchiveError::io(format!("syncing directory '{}'", dir.display()), e))
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> ArchiveResult<()> {
    Ok(())
}
