//! In-memory collaborators for exercising the pipeline without a database,
//! a Listmonk instance or a chat channel.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{FieldMapping, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::listmonk::{parse_import_response, ImportResult, ImportUpload, Session, SubscriberTarget};
use crate::notify::{NotificationMessage, Notifier};
use crate::source::{RecordSource, SourceRecord, SourceScan};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Build a record with the given email (empty string means "no email")
pub fn record(id: &str, email: &str, created_at: DateTime<Utc>) -> SourceRecord {
    SourceRecord {
        id: id.to_string(),
        email: (!email.is_empty()).then(|| email.to_string()),
        display_name: Some(format!("User {}", id)),
        created_at,
    }
}

/// Configuration pointing all artifacts and logs into `dir`
pub fn test_config(dir: &Path) -> SyncConfig {
    let raw = serde_json::json!({
        "source": { "db_path": dir.join("source") },
        "field_mapping": FieldMapping::default(),
        "target": {
            "base_url": "http://127.0.0.1:9",
            "username": "admin",
            "password": "secret",
            "list_id": 3
        },
        "paths": {
            "raw_csv": dir.join("tmp/raw_users.csv"),
            "processed_csv": dir.join("tmp/listmonk_import.csv"),
            "log_dir": dir.join("logs")
        }
    });
    serde_json::from_value(raw).expect("test config is valid")
}

/// Source holding records in memory
#[derive(Default)]
pub struct MemorySource {
    records: Mutex<Vec<SourceRecord>>,
    /// Return every record regardless of the checkpoint, unsorted
    loose: bool,
    unreachable: bool,
    undated: Vec<String>,
}

impl MemorySource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    /// A source that ignores the filter and ordering
    pub fn loose(records: Vec<SourceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            loose: true,
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    /// Also report these document ids as impossible to place
    pub fn with_undated(mut self, ids: &[&str]) -> Self {
        self.undated = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn push(&self, record: SourceRecord) {
        self.records.lock().unwrap().push(record);
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn find_created_after(
        &self,
        after: Checkpoint,
        _mapping: &FieldMapping,
    ) -> SyncResult<SourceScan> {
        if self.unreachable {
            return Err(SyncError::connection_error("source unreachable"));
        }
        let records = self.records.lock().unwrap().clone();
        let mut found: Vec<SourceRecord> = if self.loose {
            records
        } else {
            records
                .into_iter()
                .filter(|r| after.admits(r.created_at))
                .collect()
        };
        if !self.loose {
            found.sort_by_key(|r| r.created_at);
        }
        Ok(SourceScan {
            records: found,
            undated: self.undated.clone(),
        })
    }
}

/// Checkpoint held in memory, counting writes
#[derive(Default)]
pub struct MemoryCheckpointStore {
    value: Mutex<Option<Checkpoint>>,
    writes: AtomicUsize,
    reject_writes: bool,
}

impl MemoryCheckpointStore {
    pub fn at(checkpoint: Checkpoint) -> Self {
        Self {
            value: Mutex::new(Some(checkpoint)),
            ..Default::default()
        }
    }

    /// Reads succeed, every write fails and leaves the value untouched
    pub fn rejecting_writes(checkpoint: Checkpoint) -> Self {
        Self {
            reject_writes: true,
            ..Self::at(checkpoint)
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self) -> SyncResult<Checkpoint> {
        Ok(self.value.lock().unwrap().unwrap_or_default())
    }

    fn set(&self, checkpoint: Checkpoint) -> SyncResult<()> {
        if self.reject_writes {
            return Err(SyncError::checkpoint_error("tracking document is read-only"));
        }
        *self.value.lock().unwrap() = Some(checkpoint);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

enum LoginScript {
    Accept,
    Reject,
}

enum ImportScript {
    Respond { status: u16, body: String },
    Unreachable,
}

/// Target answering from a script; import answers go through the real
/// response parser.
pub struct ScriptedTarget {
    login: LoginScript,
    import: ImportScript,
    auth_calls: AtomicUsize,
    uploads: Mutex<Vec<ImportUpload>>,
}

impl ScriptedTarget {
    /// Accepts the login and starts every import
    pub fn accepting() -> Self {
        Self {
            login: LoginScript::Accept,
            import: ImportScript::Respond {
                status: 200,
                body: r#"{"data":{"name":"subscribers.csv","total":0,"imported":0,"status":"importing"}}"#
                    .to_string(),
            },
            auth_calls: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_login() -> Self {
        Self {
            login: LoginScript::Reject,
            ..Self::accepting()
        }
    }

    pub fn with_import_response(status: u16, body: &str) -> Self {
        Self {
            import: ImportScript::Respond {
                status,
                body: body.to_string(),
            },
            ..Self::accepting()
        }
    }

    pub fn with_unreachable_import() -> Self {
        Self {
            import: ImportScript::Unreachable,
            ..Self::accepting()
        }
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<ImportUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriberTarget for ScriptedTarget {
    async fn authenticate(&self) -> SyncResult<Session> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        match self.login {
            LoginScript::Accept => Ok(Session::new("session", "test-session")),
            LoginScript::Reject => Err(SyncError::authentication_error(
                "login returned status 200 without a 'session' cookie",
            )),
        }
    }

    async fn import_subscribers(
        &self,
        _session: &Session,
        upload: ImportUpload,
    ) -> SyncResult<ImportResult> {
        let rows = upload.rows;
        self.uploads.lock().unwrap().push(upload);
        match &self.import {
            ImportScript::Respond { status, body } => {
                Ok(parse_import_response(*status, body, rows))
            }
            ImportScript::Unreachable => Err(SyncError::connection_error("import request failed")),
        }
    }
}

/// Notifier that keeps every pushed message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<NotificationMessage>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Records messages but reports every push as failed
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn push(&self, message: &NotificationMessage) -> SyncResult<()> {
        self.messages.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(SyncError::notification_error("channel unavailable"));
        }
        Ok(())
    }
}
