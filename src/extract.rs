//! Extraction of records created after the checkpoint

use crate::checkpoint::Checkpoint;
use crate::config::FieldMapping;
use crate::error::SyncResult;
use crate::source::{RecordSource, SourceRecord};
use chrono::{DateTime, Utc};
use log::{info, warn};

/// Records selected for one run, destined for one list. Never persisted.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Ascending by `created_at`, all strictly after `checkpoint`
    pub records: Vec<SourceRecord>,
    pub list_id: u64,
    /// Checkpoint the batch was extracted against
    pub checkpoint: Checkpoint,
    /// Source documents that could not be placed relative to the checkpoint
    pub undated: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_created_at(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.created_at).max()
    }
}

/// Queries a [`RecordSource`] against the checkpoint
pub struct Extractor<'a> {
    source: &'a dyn RecordSource,
    mapping: &'a FieldMapping,
}

impl<'a> Extractor<'a> {
    pub fn new(source: &'a dyn RecordSource, mapping: &'a FieldMapping) -> Self {
        Self { source, mapping }
    }

    /// Build the batch of records created strictly after `checkpoint`.
    ///
    /// The source's answer is re-checked here, so a loose backend can never
    /// widen the batch past the checkpoint or hand back an unordered list.
    pub async fn extract(&self, checkpoint: Checkpoint, list_id: u64) -> SyncResult<Batch> {
        let scan = self
            .source
            .find_created_after(checkpoint, self.mapping)
            .await?;
        let returned = scan.records.len();

        let mut records: Vec<SourceRecord> = scan
            .records
            .into_iter()
            .filter(|r| checkpoint.admits(r.created_at))
            .collect();
        if records.len() != returned {
            warn!(
                "Source returned {} records at or before checkpoint {}; dropped",
                returned - records.len(),
                checkpoint
            );
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        info!(
            "Found {} new users since last sync ({})",
            records.len(),
            checkpoint
        );
        if !scan.undated.is_empty() {
            warn!(
                "{} source users have no usable creation time and cannot be synced: {}",
                scan.undated.len(),
                scan.undated.join(", ")
            );
        }

        Ok(Batch {
            records,
            list_id,
            checkpoint,
            undated: scan.undated,
        })
    }
}
