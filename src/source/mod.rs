//! # Source
//!
//! Read-only access to the system new users are created in.
//!
//! * `sled_store` - embedded document store holding the user collection and
//!   the sync tracking document

pub mod sled_store;

pub use sled_store::{SledCheckpointStore, SledSource};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{FieldMapping, TargetField};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// A user as projected out of the source. The pipeline never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Answer of a "created after" query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceScan {
    /// Ascending by `created_at`, all strictly after the queried checkpoint
    pub records: Vec<SourceRecord>,
    /// Ids of documents that cannot be placed relative to any checkpoint:
    /// unreadable JSON, or a creation time that is missing or unparseable.
    /// Every query reports them until the source data is fixed.
    pub undated: Vec<String>,
}

impl SourceScan {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records,
            undated: Vec::new(),
        }
    }
}

/// Query side of the source system
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records created strictly after `after`, ascending by `created_at`,
    /// projected through `mapping`.
    async fn find_created_after(
        &self,
        after: Checkpoint,
        mapping: &FieldMapping,
    ) -> SyncResult<SourceScan>;
}

/// Stand-in for a source that could not be opened.
///
/// Every query and checkpoint read fails with the original reason, so the
/// failure surfaces in the `Extracting` stage of the run like any other
/// connection error.
#[derive(Debug, Clone)]
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RecordSource for UnavailableSource {
    async fn find_created_after(
        &self,
        _after: Checkpoint,
        _mapping: &FieldMapping,
    ) -> SyncResult<SourceScan> {
        Err(SyncError::connection_error(self.reason.clone()))
    }
}

impl CheckpointStore for UnavailableSource {
    fn get(&self) -> SyncResult<Checkpoint> {
        Err(SyncError::connection_error(self.reason.clone()))
    }

    fn set(&self, _checkpoint: Checkpoint) -> SyncResult<()> {
        Err(SyncError::connection_error(self.reason.clone()))
    }
}

/// Project a stored document onto a [`SourceRecord`].
///
/// Returns `None` when the creation time is absent or unreadable: such a
/// document cannot be placed relative to the checkpoint.
pub fn project_document(id: &str, doc: &Value, mapping: &FieldMapping) -> Option<SourceRecord> {
    let field = |target: TargetField| mapping.source_field(target).and_then(|f| doc.get(f));

    let created_at = field(TargetField::CreatedAt).and_then(parse_timestamp)?;
    let email = field(TargetField::Email)
        .and_then(Value::as_str)
        .map(str::to_string);
    let display_name = field(TargetField::Name)
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(SourceRecord {
        id: id.to_string(),
        email,
        display_name,
        created_at,
    })
}

/// Accepts RFC 3339 strings, epoch milliseconds (integer or float) and the
/// extended-JSON wrappers `{"$date": ...}` and `{"$numberLong": "..."}`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => {
            if let Some(date) = map.get("$date") {
                parse_timestamp(date)
            } else {
                map.get("$numberLong")
                    .and_then(Value::as_str)
                    .and_then(|raw| raw.parse::<i64>().ok())
                    .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            }
        }
        _ => None,
    }
}
