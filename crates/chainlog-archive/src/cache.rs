//! The archive cache: the batch of message records awaiting sealing.
//!
//! Two-phase by construction. [`ArchiveCache::materialize`] writes a temp
//! container from the current batch without consuming it; the writer calls
//! [`ArchiveCache::confirm_published`] only once the container is visible
//! under its final name and recorded in the ledger. A failure anywhere in
//! between leaves the batch intact for the next attempt.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use chainlog_chain::LinkingChainBuilder;
use chainlog_contracts::{
    config::RotationPolicy,
    error::{ArchiveError, ArchiveResult},
    record::MessageRecord,
};

use crate::container::{record_entry_name, ContainerEntry, TempContainer};

/// Tar header plus JSON framing, added to each record's size estimate.
const ENTRY_OVERHEAD_BYTES: u64 = 512 + 128;

pub struct ArchiveCache {
    output_dir: PathBuf,
    rotation: RotationPolicy,
    records: Vec<MessageRecord>,
    buffered_bytes: u64,
}

impl ArchiveCache {
    pub fn new(output_dir: impl Into<PathBuf>, rotation: RotationPolicy) -> Self {
        Self {
            output_dir: output_dir.into(),
            rotation,
            records: Vec::new(),
            buffered_bytes: 0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Append a record to the batch.
    pub fn add(&mut self, record: MessageRecord) {
        self.buffered_bytes += estimated_size(&record);
        self.records.push(record);
    }

    /// Whether the batch has reached any configured rotation limit.
    pub fn is_rotating(&self) -> bool {
        let (Some(start), Some(end)) = (self.start_time(), self.end_time()) else {
            return false;
        };

        if self
            .rotation
            .max_records
            .is_some_and(|max| self.records.len() >= max)
        {
            return true;
        }
        if self
            .rotation
            .max_bytes
            .is_some_and(|max| self.buffered_bytes >= max)
        {
            return true;
        }
        if let Some(max_span) = self.rotation.max_span_secs {
            let span = end.signed_duration_since(start).num_seconds();
            if span >= 0 && span as u64 >= max_span {
                return true;
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Time of the first buffered record.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.records.first().map(|r| r.time)
    }

    /// Time of the most recently buffered record.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.records.last().map(|r| r.time)
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Serialize the batch and its linking info into a temp container.
    ///
    /// Prepares (but does not confirm) the batch's chain link on `builder`.
    /// The batch is left untouched whether this succeeds or fails.
    pub fn materialize(&self, builder: &mut LinkingChainBuilder) -> ArchiveResult<TempContainer> {
        let Some(end) = self.end_time() else {
            return Err(ArchiveError::InvalidArgument {
                reason: "cannot materialize an empty batch".to_string(),
            });
        };

        let entries = self
            .records
            .iter()
            .enumerate()
            .map(|(seq, record)| {
                let bytes = serde_json::to_vec(record).map_err(|e| ArchiveError::Serialization {
                    reason: format!("record {}: {}", record.id, e),
                })?;
                Ok(ContainerEntry {
                    name: record_entry_name(seq, record.id),
                    bytes,
                })
            })
            .collect::<ArchiveResult<Vec<_>>>()?;

        let linking = builder
            .prepare(entries.iter().map(|e| (e.name.as_str(), e.bytes.as_slice())))
            .clone();

        let mtime = u64::try_from(end.timestamp()).unwrap_or(0);
        match TempContainer::create(&self.output_dir, &entries, linking, mtime) {
            Ok(temp) => Ok(temp),
            Err(e) => {
                builder.discard_prepared();
                Err(e)
            }
        }
    }

    /// Drop the first `count` records after their container was published
    /// and recorded.
    pub fn confirm_published(&mut self, count: usize) {
        let count = count.min(self.records.len());
        for record in self.records.drain(..count) {
            self.buffered_bytes = self.buffered_bytes.saturating_sub(estimated_size(&record));
        }
    }

    /// Release buffered state. Records still buffered are dropped with a warning.
    pub fn close(&mut self) {
        if !self.records.is_empty() {
            warn!(
                records = self.records.len(),
                "closing archive cache with unsealed records"
            );
        }
        self.records.clear();
        self.buffered_bytes = 0;
    }
}

fn estimated_size(record: &MessageRecord) -> u64 {
    (record.message.len() + record.signature.len() + record.query_id.len()) as u64
        + ENTRY_OVERHEAD_BYTES
}
