//! The orchestrator: one pipeline run from checkpoint read to notification

use crate::artifacts::ArtifactWriter;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::extract::Extractor;
use crate::listmonk::{ImportParams, ImportUpload, SubscriberTarget};
use crate::notify::{NotificationMessage, Notifier};
use crate::source::RecordSource;
use crate::sync::state::{RunOutcome, RunReport, SyncState};
use crate::transform::Transformer;
use chrono::Utc;
use log::{debug, error, info, warn};
use uuid::Uuid;

/// What a run is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Extract, upload, commit and notify
    Full,
    /// Extract and write artifacts only; no target calls, no commit, no notification
    ExtractOnly,
}

/// A stage error tagged with the state it happened in
struct StageFailure {
    stage: SyncState,
    error: SyncError,
}

fn fail_at(stage: SyncState) -> impl FnOnce(SyncError) -> StageFailure {
    move |error| StageFailure { stage, error }
}

/// Sequences extraction, transformation, authentication, upload, commit and
/// notification for one run.
///
/// The checkpoint is written only after the target confirms the import, and
/// only ever forward. Scheduling is external: each call to [`SyncPipeline::run`]
/// is one run, and runs must not overlap.
pub struct SyncPipeline<'a> {
    config: &'a SyncConfig,
    source: &'a dyn RecordSource,
    checkpoints: &'a dyn CheckpointStore,
    target: &'a dyn SubscriberTarget,
    notifier: &'a dyn Notifier,
    run_id: Uuid,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(
        config: &'a SyncConfig,
        source: &'a dyn RecordSource,
        checkpoints: &'a dyn CheckpointStore,
        target: &'a dyn SubscriberTarget,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            source,
            checkpoints,
            target,
            notifier,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Execute one run. Never panics on stage failures; the outcome and exit
    /// code are in the returned report.
    pub async fn run(&self, mode: RunMode) -> RunReport {
        let mut report = RunReport::new(self.run_id, Utc::now());
        info!("Starting Listmonk sync run {} ({:?})", self.run_id, mode);

        if let Err(failure) = self.execute(mode, &mut report).await {
            error!("Sync failed during {}: {}", failure.stage, failure.error);
            report.outcome = RunOutcome::Failed {
                stage: failure.stage,
                error: failure.error.to_string(),
            };
            enter(&mut report, SyncState::Failed);
        }

        if mode == RunMode::Full {
            self.notify(&mut report).await;
        }

        enter(&mut report, SyncState::Done);
        info!(
            "Sync run {} finished: {:?}, found {}, imported {}, skipped {}, undated {}, checkpoint {}",
            self.run_id,
            report.outcome,
            report.found,
            report.imported,
            report.skipped,
            report.undated,
            report.checkpoint_after
        );
        report
    }

    async fn execute(&self, mode: RunMode, report: &mut RunReport) -> Result<(), StageFailure> {
        enter(report, SyncState::Extracting);
        let before = self
            .checkpoints
            .get()
            .map_err(fail_at(SyncState::Extracting))?;
        report.checkpoint_before = before;
        report.checkpoint_after = before;

        let mapping = &self.config.field_mapping;
        let batch = Extractor::new(self.source, mapping)
            .extract(before, self.config.target.list_id)
            .await
            .map_err(fail_at(SyncState::Extracting))?;
        report.found = batch.len();
        report.undated = batch.undated.len();

        if batch.is_empty() {
            enter(report, SyncState::NoNewRecords);
            info!("No new users found");
            report.outcome = RunOutcome::NoNewRecords;
            return Ok(());
        }
        enter(report, SyncState::HasRecords);

        enter(report, SyncState::Transforming);
        let transformed = Transformer::new().transform_batch(&batch);
        report.transformed = transformed.rows.len();
        report.skipped = transformed.skipped.len();

        let artifacts = ArtifactWriter::new(&self.config.paths);
        artifacts
            .write_raw(&batch, mapping)
            .await
            .map_err(fail_at(SyncState::Transforming))?;
        artifacts
            .write_processed(&transformed)
            .await
            .map_err(fail_at(SyncState::Transforming))?;

        if mode == RunMode::ExtractOnly {
            info!(
                "Extract-only run: {} users written to {}, nothing uploaded",
                transformed.rows.len(),
                self.config.paths.processed_csv.display()
            );
            report.outcome = RunOutcome::Extracted;
            return Ok(());
        }

        if transformed.is_empty() {
            warn!(
                "All {} new users were skipped as malformed; nothing to upload",
                batch.len()
            );
            report.outcome = RunOutcome::NothingToImport;
            return Ok(());
        }

        enter(report, SyncState::Authenticating);
        let session = self
            .target
            .authenticate()
            .await
            .map_err(fail_at(SyncState::Authenticating))?;

        enter(report, SyncState::Uploading);
        let file = artifacts
            .read_processed()
            .await
            .map_err(fail_at(SyncState::Uploading))?;
        let upload = ImportUpload {
            file,
            rows: transformed.rows.len(),
            params: ImportParams::for_list(transformed.list_id),
        };
        let result = self
            .target
            .import_subscribers(&session, upload)
            .await
            .map_err(fail_at(SyncState::Uploading))?;
        if !result.is_success() {
            return Err(StageFailure {
                stage: SyncState::Uploading,
                error: SyncError::upload_error(result.describe()),
            });
        }
        report.imported = result.imported_count;
        info!("Listmonk accepted {} subscribers", result.imported_count);

        enter(report, SyncState::Committing);
        if let Some(newest) = transformed.max_created_at() {
            let next = Checkpoint::new(newest);
            self.commit(before, next)
                .map_err(fail_at(SyncState::Committing))?;
            report.checkpoint_after = next.max(before);
        }

        report.outcome = RunOutcome::Imported;
        Ok(())
    }

    fn commit(&self, before: Checkpoint, next: Checkpoint) -> SyncResult<()> {
        if next <= before {
            debug!("Checkpoint {} already covers {}", before, next);
            return Ok(());
        }
        self.checkpoints.set(next)?;
        info!("Checkpoint advanced from {} to {}", before, next);
        Ok(())
    }

    async fn notify(&self, report: &mut RunReport) {
        enter(report, SyncState::Notifying);
        let message = NotificationMessage::from_report(report, Utc::now());
        if let Err(e) = self.notifier.push(&message).await {
            warn!("Notification via {} failed: {}", self.notifier.name(), e);
        }
    }
}

fn enter(report: &mut RunReport, state: SyncState) {
    debug!("{} -> {}", report.current_state(), state);
    report.states.push(state);
}
