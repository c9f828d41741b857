//! Intermediate files written during a run
//!
//! The raw extraction and the processed import file are kept on disk so an
//! operator can inspect what a run saw and what it uploaded. The loader reads
//! the processed file back, so a missing file fails the upload.

use crate::config::{FieldMapping, PathsConfig, TargetField};
use crate::error::{SyncError, SyncResult};
use crate::extract::Batch;
use crate::transform::{csv_line, TransformedBatch};
use chrono::SecondsFormat;
use log::info;
use std::path::Path;

/// Writes and reads the run's CSV artifacts
pub struct ArtifactWriter<'a> {
    paths: &'a PathsConfig,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(paths: &'a PathsConfig) -> Self {
        Self { paths }
    }

    /// Raw extraction with the source field names as header.
    pub async fn write_raw(&self, batch: &Batch, mapping: &FieldMapping) -> SyncResult<()> {
        let header = [TargetField::Email, TargetField::Name, TargetField::CreatedAt]
            .map(|t| mapping.source_field(t).unwrap_or(t.as_str()).to_string());

        let mut out = csv_line(header.iter().map(String::as_str));
        for record in &batch.records {
            let created_at = record.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true);
            let fields = [
                record.email.as_deref().unwrap_or_default(),
                record.display_name.as_deref().unwrap_or_default(),
                created_at.as_str(),
            ];
            out.push_str(&csv_line(fields.into_iter()));
        }

        write_file(&self.paths.raw_csv, &out).await?;
        info!(
            "Exported {} users to {}",
            batch.len(),
            self.paths.raw_csv.display()
        );
        Ok(())
    }

    /// The file handed to the import endpoint.
    pub async fn write_processed(&self, batch: &TransformedBatch) -> SyncResult<()> {
        write_file(&self.paths.processed_csv, &batch.to_csv()).await?;
        info!(
            "Wrote {} import rows to {}",
            batch.rows.len(),
            self.paths.processed_csv.display()
        );
        Ok(())
    }

    /// Read the processed file back for upload.
    pub async fn read_processed(&self) -> SyncResult<Vec<u8>> {
        let path = &self.paths.processed_csv;
        match tokio::fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(SyncError::missing_output(format!(
                "{} is empty",
                path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                SyncError::missing_output(format!("{} does not exist", path.display())),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_file(path: &Path, contents: &str) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}
