//! Audit record types accepted by the archive writer.
//!
//! Records arrive already signed by the upstream producer; chainlog never
//! inspects message bodies beyond what it needs to hash and name them.
//! Only [`MessageRecord`]s are buffered into archives. Other kinds are
//! marked archived in the ledger and otherwise ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, ArchiveResult};

/// Unique identifier assigned to a record by its producer.
pub type RecordId = u64;

/// A signed request or response exchanged with a remote party.
///
/// This is the archivable kind: each one becomes a separate, individually
/// hashed entry inside a sealed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Producer-assigned identifier, unique across all record kinds.
    pub id: RecordId,
    /// Logical time the message was logged (UTC).
    pub time: DateTime<Utc>,
    /// Correlates a request with its response.
    pub query_id: String,
    /// The message body exactly as it was signed.
    pub message: String,
    /// Detached signature over `message`, encoded by the producer.
    pub signature: String,
    /// `true` for responses, `false` for requests.
    pub response: bool,
}

/// A time-stamp token obtained for one or more message records.
///
/// Time-stamp records carry their own batch hash chain and are never written
/// into archives; the ledger still has to learn that they were processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRecord {
    /// Producer-assigned identifier, unique across all record kinds.
    pub id: RecordId,
    /// Logical time the token was obtained (UTC).
    pub time: DateTime<Utc>,
    /// Encoded time-stamp token as returned by the TSA.
    pub token: String,
}

/// Any record the writer may receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogRecord {
    Message(MessageRecord),
    Timestamp(TimestampRecord),
}

impl LogRecord {
    pub fn id(&self) -> RecordId {
        match self {
            LogRecord::Message(m) => m.id,
            LogRecord::Timestamp(t) => t.id,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            LogRecord::Message(m) => m.time,
            LogRecord::Timestamp(t) => t.time,
        }
    }

    /// Returns the message record if this record belongs in an archive.
    pub fn as_archivable(&self) -> Option<&MessageRecord> {
        match self {
            LogRecord::Message(m) => Some(m),
            LogRecord::Timestamp(_) => None,
        }
    }

    /// Reject records that cannot be archived or bookkept meaningfully.
    ///
    /// Returns `ArchiveError::InvalidArgument` when a message record has an
    /// empty query id or body, or a time-stamp record has an empty token.
    pub fn validate(&self) -> ArchiveResult<()> {
        match self {
            LogRecord::Message(m) => {
                if m.query_id.is_empty() {
                    return Err(ArchiveError::InvalidArgument {
                        reason: format!("message record {} has an empty query id", m.id),
                    });
                }
                if m.message.is_empty() {
                    return Err(ArchiveError::InvalidArgument {
                        reason: format!("message record {} has an empty message body", m.id),
                    });
                }
            }
            LogRecord::Timestamp(t) => {
                if t.token.is_empty() {
                    return Err(ArchiveError::InvalidArgument {
                        reason: format!("timestamp record {} has an empty token", t.id),
                    });
                }
            }
        }
        Ok(())
    }
}

impl From<MessageRecord> for LogRecord {
    fn from(record: MessageRecord) -> Self {
        LogRecord::Message(record)
    }
}

impl From<TimestampRecord> for LogRecord {
    fn from(record: TimestampRecord) -> Self {
        LogRecord::Timestamp(record)
    }
}
