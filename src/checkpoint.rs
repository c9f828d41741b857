//! Checkpoint: the creation time of the newest record confirmed imported

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boundary between synced and not-yet-synced source records.
///
/// A record belongs to the next batch when its `created_at` is strictly
/// greater than the checkpoint. A store that was never written reads as
/// [`Checkpoint::epoch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Checkpoint(DateTime<Utc>);

impl Checkpoint {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }

    /// Sentinel for "never synced"
    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::default())
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn is_epoch(&self) -> bool {
        *self == Self::epoch()
    }

    /// Whether a record created at `created_at` lies after this checkpoint
    pub fn admits(&self, created_at: DateTime<Utc>) -> bool {
        created_at > self.0
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::epoch()
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

/// Persistence of the single checkpoint value.
///
/// `set` overwrites unconditionally. Only the orchestrator calls it, and only
/// after the target confirmed an import; single-flight execution is the
/// scheduler's job, not the store's.
pub trait CheckpointStore: Send + Sync {
    fn get(&self) -> SyncResult<Checkpoint>;

    fn set(&self, checkpoint: Checkpoint) -> SyncResult<()>;
}

/// Operator override of the stored checkpoint.
///
/// Moving the checkpoint backwards makes the next run re-import everything
/// created since `to`, so it is refused unless `allow_rewind` is set. Returns
/// the previous value.
pub fn override_checkpoint(
    store: &dyn CheckpointStore,
    to: Checkpoint,
    allow_rewind: bool,
) -> SyncResult<Checkpoint> {
    let previous = store.get()?;
    if to < previous && !allow_rewind {
        return Err(SyncError::checkpoint_error(format!(
            "refusing to move checkpoint back from {} to {}",
            previous, to
        )));
    }
    store.set(to)?;
    info!("Checkpoint set from {} to {}", previous, to);
    Ok(previous)
}

/// Parse an operator-supplied checkpoint: RFC 3339 or `now`.
pub fn parse_checkpoint(raw: &str, now: DateTime<Utc>) -> SyncResult<Checkpoint> {
    if raw.eq_ignore_ascii_case("now") {
        return Ok(Checkpoint::new(now));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Checkpoint::new(dt.with_timezone(&Utc)))
        .map_err(|e| SyncError::checkpoint_error(format!("invalid timestamp '{}': {}", raw, e)))
}

/// Stored shape of the tracking document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TrackingDocument {
    pub timestamp: DateTime<Utc>,
}
