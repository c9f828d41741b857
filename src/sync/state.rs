//! Run states, outcomes and the per-run report

use crate::checkpoint::Checkpoint;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// States of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Idle,
    Extracting,
    NoNewRecords,
    HasRecords,
    Transforming,
    Authenticating,
    Uploading,
    Committing,
    Notifying,
    Failed,
    Done,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Extracting => "extracting",
            SyncState::NoNewRecords => "no_new_records",
            SyncState::HasRecords => "has_records",
            SyncState::Transforming => "transforming",
            SyncState::Authenticating => "authenticating",
            SyncState::Uploading => "uploading",
            SyncState::Committing => "committing",
            SyncState::Notifying => "notifying",
            SyncState::Failed => "failed",
            SyncState::Done => "done",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing created since the checkpoint
    NoNewRecords,
    /// Records were found but every one of them was skipped as malformed
    NothingToImport,
    /// The target confirmed the import and the checkpoint was committed
    Imported,
    /// Extract-only run; artifacts written, nothing uploaded
    Extracted,
    Failed { stage: SyncState, error: String },
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// Everything a run did, in numbers
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    /// New records returned by the extractor
    pub found: usize,
    /// Rows produced by the transformer
    pub transformed: usize,
    /// Records skipped as malformed
    pub skipped: usize,
    /// Source documents whose creation time is missing or unparseable
    pub undated: usize,
    /// Rows the target confirmed
    pub imported: usize,
    pub checkpoint_before: Checkpoint,
    pub checkpoint_after: Checkpoint,
    /// Every state entered, in order
    pub states: Vec<SyncState>,
}

impl RunReport {
    pub(crate) fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            outcome: RunOutcome::NoNewRecords,
            found: 0,
            transformed: 0,
            skipped: 0,
            undated: 0,
            imported: 0,
            checkpoint_before: Checkpoint::epoch(),
            checkpoint_after: Checkpoint::epoch(),
            states: vec![SyncState::Idle],
        }
    }

    /// `0` for success or nothing to do, `1` for any failure
    pub fn exit_code(&self) -> u8 {
        if self.outcome.is_failure() {
            1
        } else {
            0
        }
    }

    pub fn current_state(&self) -> SyncState {
        self.states.last().copied().unwrap_or(SyncState::Idle)
    }

    pub fn visited(&self, state: SyncState) -> bool {
        self.states.contains(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let mut report = RunReport::new(Uuid::new_v4(), Utc::now());
        assert_eq!(report.exit_code(), 0);

        report.outcome = RunOutcome::NothingToImport;
        assert_eq!(report.exit_code(), 0);

        report.outcome = RunOutcome::Failed {
            stage: SyncState::Uploading,
            error: "boom".to_string(),
        };
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_new_report_starts_idle() {
        let report = RunReport::new(Uuid::new_v4(), Utc::now());
        assert_eq!(report.current_state(), SyncState::Idle);
        assert!(report.checkpoint_before.is_epoch());
    }
}
