use chrono::{TimeZone, Utc};
use listmonk_sync::config::{FieldMapping, TargetField};
use listmonk_sync::testing::{test_config, RecordingNotifier, ScriptedTarget};
use listmonk_sync::{
    Checkpoint, CheckpointStore, RecordSource, RunMode, RunOutcome, SledSource, SyncPipeline,
};
use serde_json::json;
use tempfile::TempDir;

fn seed(source: &SledSource) {
    source
        .insert_document(
            "64f0a1",
            &json!({"email": "grace@example.com", "name": "Grace Hopper", "createdAt": "2024-04-01T10:00:00Z"}),
        )
        .unwrap();
    source
        .insert_document(
            "64f0a2",
            &json!({"email": "alan@example.com", "name": "Alan Turing", "createdAt": {"$date": 1711972800000_i64}}),
        )
        .unwrap();
    source
        .insert_document("64f0a3", &json!({"name": "No Email", "createdAt": "2024-04-01T11:00:00Z"}))
        .unwrap();
}

#[tokio::test]
async fn test_run_persists_checkpoint_in_tracking_document() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    {
        let source = SledSource::open(&config.source).unwrap();
        seed(&source);
        let checkpoints = source.checkpoint_store();
        let target = ScriptedTarget::accepting();
        let notifier = RecordingNotifier::default();

        let report = SyncPipeline::new(&config, &source, &checkpoints, &target, &notifier)
            .run(RunMode::Full)
            .await;

        assert_eq!(report.outcome, RunOutcome::Imported);
        assert_eq!(report.found, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.imported, 2);
        source.db().flush().unwrap();
    }

    // Reopen: the checkpoint survives the process
    let source = SledSource::open(&config.source).unwrap();
    let stored = source.checkpoint_store().get().unwrap();
    assert_eq!(
        stored,
        Checkpoint::new(Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap())
    );

    let remaining = source
        .find_created_after(stored, &config.field_mapping)
        .await
        .unwrap();
    assert!(remaining.records.is_empty());
    assert!(remaining.undated.is_empty());
}

#[tokio::test]
async fn test_custom_field_mapping() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = SledSource::open(&config.source).unwrap();
    source
        .insert_document(
            "u1",
            &json!({"contact": {"x": 1}, "mail": "ada@example.com", "full_name": "Ada", "signed_up": "2024-05-01T00:00:00Z"}),
        )
        .unwrap();

    let mapping = FieldMapping::new([
        ("mail", TargetField::Email),
        ("full_name", TargetField::Name),
        ("signed_up", TargetField::CreatedAt),
    ]);
    let records = source
        .find_created_after(Checkpoint::epoch(), &mapping)
        .await
        .unwrap()
        .records;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].email.as_deref(), Some("ada@example.com"));
    assert_eq!(records[0].display_name.as_deref(), Some("Ada"));

    // The default mapping finds no creation time in this document
    let scan = source
        .find_created_after(Checkpoint::epoch(), &FieldMapping::default())
        .await
        .unwrap();
    assert!(scan.records.is_empty());
    assert_eq!(scan.undated, vec!["u1".to_string()]);
}

#[tokio::test]
async fn test_undated_users_are_counted_and_reported() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = SledSource::open(&config.source).unwrap();
    source
        .insert_document(
            "rfc3339",
            &json!({"email": "grace@example.com", "name": "Grace", "createdAt": "2024-04-01T10:00:00Z"}),
        )
        .unwrap();
    source
        .insert_document(
            "number-long",
            &json!({"email": "alan@example.com", "name": "Alan", "createdAt": {"$date": {"$numberLong": "1711972800000"}}}),
        )
        .unwrap();
    source
        .insert_document(
            "naive",
            &json!({"email": "ada@example.com", "name": "Ada", "createdAt": "2024-04-01 10:00:00"}),
        )
        .unwrap();

    let checkpoints = source.checkpoint_store();
    let target = ScriptedTarget::accepting();
    let notifier = RecordingNotifier::default();
    let report = SyncPipeline::new(&config, &source, &checkpoints, &target, &notifier)
        .run(RunMode::Full)
        .await;

    assert_eq!(report.outcome, RunOutcome::Imported);
    assert_eq!(report.found, 2);
    assert_eq!(report.imported, 2);
    assert_eq!(report.undated, 1);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].undated, 1);
    assert!(messages[0]
        .render()
        .contains("1 source users have no usable creation time"));
}

#[test]
fn test_open_failure_is_connection_error() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a database").unwrap();
    config.source.db_path = blocker.join("source");

    let err = SledSource::open(&config.source).err().unwrap();
    assert!(err.to_string().starts_with("Connection error: cannot open source database"));
}
