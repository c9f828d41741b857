use crate::checkpoint::{Checkpoint, CheckpointStore, TrackingDocument};
use crate::config::{FieldMapping, SourceConfig, TargetField};
use crate::error::{SyncError, SyncResult};
use crate::source::{project_document, RecordSource, SourceScan};
use async_trait::async_trait;
use log::warn;
use serde_json::Value;

/// Source backed by an embedded sled database.
///
/// User documents are JSON values in the `collection` tree keyed by id. The
/// checkpoint lives in the `tracking_collection` tree under `last_sync_key`.
#[derive(Clone)]
pub struct SledSource {
    db: sled::Db,
    users_tree: sled::Tree,
    tracking_tree: sled::Tree,
    last_sync_key: String,
}

impl SledSource {
    /// Open the database named by the configuration.
    pub fn open(config: &SourceConfig) -> SyncResult<Self> {
        let db = sled::open(&config.db_path).map_err(|e| {
            SyncError::connection_error(format!(
                "cannot open source database {}: {}",
                config.db_path.display(),
                e
            ))
        })?;
        Self::from_db(db, config)
    }

    pub fn from_db(db: sled::Db, config: &SourceConfig) -> SyncResult<Self> {
        let users_tree = db.open_tree(&config.collection)?;
        let tracking_tree = db.open_tree(&config.tracking_collection)?;

        Ok(Self {
            db,
            users_tree,
            tracking_tree,
            last_sync_key: config.last_sync_key.clone(),
        })
    }

    /// Gets a reference to the underlying database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Store a user document, replacing any document with the same id.
    pub fn insert_document(&self, id: &str, doc: &Value) -> SyncResult<()> {
        let bytes = serde_json::to_vec(doc)?;
        self.users_tree.insert(id.as_bytes(), bytes)?;
        self.users_tree.flush()?;
        Ok(())
    }

    pub fn document_count(&self) -> usize {
        self.users_tree.len()
    }

    /// Checkpoint store sharing this database
    pub fn checkpoint_store(&self) -> SledCheckpointStore {
        SledCheckpointStore {
            tracking_tree: self.tracking_tree.clone(),
            key: self.last_sync_key.clone(),
        }
    }
}

#[async_trait]
impl RecordSource for SledSource {
    async fn find_created_after(
        &self,
        after: Checkpoint,
        mapping: &FieldMapping,
    ) -> SyncResult<SourceScan> {
        let mut records = Vec::new();
        let mut undated = Vec::new();

        for entry in self.users_tree.iter() {
            let (key, bytes) = entry
                .map_err(|e| SyncError::connection_error(format!("source scan failed: {}", e)))?;
            let id = String::from_utf8_lossy(&key).to_string();

            let doc: Value = match serde_json::from_slice(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Ignoring unreadable source document '{}': {}", id, e);
                    undated.push(id);
                    continue;
                }
            };

            match project_document(&id, &doc, mapping) {
                Some(record) if after.admits(record.created_at) => records.push(record),
                Some(_) => {}
                None => {
                    warn!(
                        "Source document '{}' has no usable '{}' value; it cannot be synced",
                        id,
                        mapping.source_field(TargetField::CreatedAt).unwrap_or_default()
                    );
                    undated.push(id);
                }
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(SourceScan { records, undated })
    }
}

/// Checkpoint persisted as a tracking document in the source database
#[derive(Clone)]
pub struct SledCheckpointStore {
    tracking_tree: sled::Tree,
    key: String,
}

impl CheckpointStore for SledCheckpointStore {
    fn get(&self) -> SyncResult<Checkpoint> {
        match self.tracking_tree.get(self.key.as_bytes())? {
            Some(bytes) => {
                let doc: TrackingDocument = serde_json::from_slice(&bytes).map_err(|e| {
                    SyncError::checkpoint_error(format!(
                        "tracking document '{}' is unreadable: {}",
                        self.key, e
                    ))
                })?;
                Ok(Checkpoint::new(doc.timestamp))
            }
            None => Ok(Checkpoint::epoch()),
        }
    }

    fn set(&self, checkpoint: Checkpoint) -> SyncResult<()> {
        let doc = TrackingDocument {
            timestamp: checkpoint.timestamp(),
        };
        let bytes = serde_json::to_vec(&doc)?;
        self.tracking_tree.insert(self.key.as_bytes(), bytes)?;

        // Ensure the checkpoint is durably written to disk
        self.tracking_tree.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SledSource) {
        let dir = TempDir::new().unwrap();
        let config = SourceConfig {
            db_path: dir.path().join("source"),
            collection: "users".to_string(),
            tracking_collection: "sync_tracking".to_string(),
            last_sync_key: "listmonk_last_sync".to_string(),
        };
        let source = SledSource::open(&config).unwrap();
        (dir, source)
    }

    #[test]
    fn test_unset_checkpoint_reads_epoch() {
        let (_dir, source) = open_temp();
        assert!(source.checkpoint_store().get().unwrap().is_epoch());
    }

    #[test]
    fn test_checkpoint_overwrites() {
        let (_dir, source) = open_temp();
        let store = source.checkpoint_store();
        let first = Checkpoint::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let second = Checkpoint::new(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());

        store.set(first).unwrap();
        store.set(second).unwrap();
        assert_eq!(store.get().unwrap(), second);
    }

    #[tokio::test]
    async fn test_find_created_after_filters_and_sorts() {
        let (_dir, source) = open_temp();
        source
            .insert_document("b", &json!({"email": "b@x.io", "createdAt": "2024-01-03T00:00:00Z"}))
            .unwrap();
        source
            .insert_document("a", &json!({"email": "a@x.io", "createdAt": "2024-01-02T00:00:00Z"}))
            .unwrap();
        source
            .insert_document("old", &json!({"email": "o@x.io", "createdAt": "2024-01-01T00:00:00Z"}))
            .unwrap();
        source
            .insert_document("undated", &json!({"email": "u@x.io"}))
            .unwrap();

        let after = Checkpoint::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let scan = source
            .find_created_after(after, &FieldMapping::default())
            .await
            .unwrap();

        let ids: Vec<&str> = scan.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(scan.undated, vec!["undated".to_string()]);
    }
}
