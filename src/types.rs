//! Core value types for the sync layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier of a document within its collection.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Open mapping from field name to JSON-compatible value.
pub type Fields = serde_json::Map<String, Value>;

/// Materialized view of a document at a point in time.
///
/// Produced by a subscription each time the store signals a change, consumed
/// read-only, and replaced wholesale on the next change. No incremental
/// patching is visible to consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: DocumentId,
    #[serde(flatten)]
    pub fields: Fields,
}

impl SnapshotRecord {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: DocumentId(id.into()),
            fields,
        }
    }

    /// Look up a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// How `set` treats fields already present on the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOption {
    /// Replace the document's fields entirely.
    Replace,
    /// Merge the payload into the existing fields.
    Merge,
}

impl Default for MergeOption {
    fn default() -> Self {
        MergeOption::Replace
    }
}

/// Kind of write operation, used to tag error events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Create,
    Set,
    Update,
    Delete,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteKind::Create => "create",
            WriteKind::Set => "set",
            WriteKind::Update => "update",
            WriteKind::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

/// A write failure, broadcast on the error channel.
///
/// At-most-once: the channel retains no history, so late observers miss
/// past events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Which operation failed.
    pub source: WriteKind,
    /// Path of the target reference.
    pub path: String,
    /// Store-reported failure message.
    pub message: String,
    /// When the failure was observed.
    pub timestamp: Timestamp,
}

impl ErrorEvent {
    pub fn new(source: WriteKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
            message: message.into(),
            timestamp: Timestamp::now(),
        }
    }
}
