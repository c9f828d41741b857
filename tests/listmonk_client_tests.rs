use chrono::{TimeZone, Utc};
use listmonk_sync::config::{NotifierConfig, TargetConfig};
use listmonk_sync::listmonk::{ImportParams, ImportStatus, ImportUpload, Session};
use listmonk_sync::notify::{NotificationMessage, TelegramNotifier};
use listmonk_sync::testing::{record, test_config, MemoryCheckpointStore, MemorySource, RecordingNotifier};
use listmonk_sync::{
    Checkpoint, CheckpointStore, ListmonkClient, Notifier, RunMode, RunOutcome, SubscriberTarget,
    SyncError, SyncPipeline,
};
use mockito::Matcher;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

fn target_config(base_url: &str) -> TargetConfig {
    serde_json::from_value(json!({
        "base_url": format!("{}/", base_url),
        "username": "admin",
        "password": "s3cret",
        "list_id": 3,
        "timeout_seconds": 5
    }))
    .unwrap()
}

fn upload(csv: &str, rows: usize) -> ImportUpload {
    ImportUpload {
        file: csv.as_bytes().to_vec(),
        rows,
        params: ImportParams::for_list(3),
    }
}

#[tokio::test]
async fn test_login_reads_session_cookie() {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("POST", "/admin/login")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("username".into(), "admin".into()),
            Matcher::UrlEncoded("password".into(), "s3cret".into()),
        ]))
        .with_status(302)
        .with_header("location", "/admin")
        .with_header("set-cookie", "session=abc123; Path=/; HttpOnly")
        .create_async()
        .await;

    let client = ListmonkClient::new(&target_config(&server.url())).unwrap();
    let session = client.authenticate().await.unwrap();

    assert_eq!(session, Session::new("session", "abc123"));
    login.assert_async().await;
}

#[tokio::test]
async fn test_login_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/admin/login")
        .with_status(403)
        .create_async()
        .await;

    let client = ListmonkClient::new(&target_config(&server.url())).unwrap();
    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, SyncError::AuthenticationError(_)));
}

#[tokio::test]
async fn test_login_without_cookie_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/admin/login")
        .with_status(200)
        .with_body("<html>Login</html>")
        .create_async()
        .await;

    let client = ListmonkClient::new(&target_config(&server.url())).unwrap();
    let err = client.authenticate().await.unwrap_err();
    assert!(err.to_string().contains("without a 'session' cookie"));
}

#[tokio::test]
async fn test_login_server_error_is_connection_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/admin/login")
        .with_status(503)
        .create_async()
        .await;

    let client = ListmonkClient::new(&target_config(&server.url())).unwrap();
    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, SyncError::ConnectionError(_)));
}

#[tokio::test]
async fn test_import_sends_session_and_params() {
    let mut server = mockito::Server::new_async().await;
    let import = server
        .mock("POST", "/api/import/subscribers")
        .match_header("cookie", "session=abc123")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""overwrite":false"#.into()),
            Matcher::Regex(r#""subscription_status":"confirmed""#.into()),
            Matcher::Regex(r#""lists":\[3\]"#.into()),
            Matcher::Regex(r#"filename="subscribers.csv""#.into()),
            Matcher::Regex("ada@example.com,Ada".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"data":{"name":"subscribers.csv","total":0,"imported":0,"status":"importing"}}"#)
        .create_async()
        .await;

    let client = ListmonkClient::new(&target_config(&server.url())).unwrap();
    let session = Session::new("session", "abc123");
    let result = client
        .import_subscribers(
            &session,
            upload("email,name,attributes,status\nada@example.com,Ada,{},confirmed\n", 1),
        )
        .await
        .unwrap();

    assert_eq!(result.status, ImportStatus::Success);
    assert_eq!(result.imported_count, 1);
    import.assert_async().await;
}

#[tokio::test]
async fn test_import_error_body_with_ok_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/import/subscribers")
        .with_status(200)
        .with_body(r#"{"message":"An import is already running. Wait for it to finish or stop it before trying again."}"#)
        .create_async()
        .await;

    let client = ListmonkClient::new(&target_config(&server.url())).unwrap();
    let result = client
        .import_subscribers(&Session::new("session", "abc123"), upload("email\n", 0))
        .await
        .unwrap();

    assert_eq!(result.status, ImportStatus::Failure);
    assert!(result.describe().contains("already running"));
}

#[tokio::test]
async fn test_full_run_against_listmonk() {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("POST", "/admin/login")
        .with_status(302)
        .with_header("set-cookie", "session=run-session; Path=/")
        .create_async()
        .await;
    let import = server
        .mock("POST", "/api/import/subscribers")
        .match_header("cookie", "session=run-session")
        .with_status(200)
        .with_body(r#"{"data":{"total":0,"imported":0,"status":"importing"}}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.target = target_config(&server.url());

    let newest = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
    let source = MemorySource::new(vec![
        record("a", "a@example.com", newest - chrono::Duration::hours(1)),
        record("b", "b@example.com", newest),
    ]);
    let checkpoints = MemoryCheckpointStore::default();
    let client = ListmonkClient::new(&config.target).unwrap();
    let notifier = RecordingNotifier::default();

    let report = SyncPipeline::new(&config, &source, &checkpoints, &client, &notifier)
        .run(RunMode::Full)
        .await;

    assert_eq!(report.outcome, RunOutcome::Imported);
    assert_eq!(report.imported, 2);
    assert_eq!(checkpoints.get().unwrap(), Checkpoint::new(newest));
    login.assert_async().await;
    import.assert_async().await;
}

fn notifier_config(api_base_url: String) -> NotifierConfig {
    NotifierConfig {
        enabled: true,
        api_base_url,
        bot_token: "123:abc".to_string(),
        chat_id: "-100200".to_string(),
        thread_id: Some(7),
    }
}

fn message() -> NotificationMessage {
    NotificationMessage {
        outcome: RunOutcome::NoNewRecords,
        found: 0,
        imported: 0,
        skipped: 0,
        undated: 0,
        timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_telegram_send_message() {
    let mut server = mockito::Server::new_async().await;
    let send = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::PartialJson(json!({
            "chat_id": "-100200",
            "message_thread_id": 7,
            "text": "Listmonk sync 2024-07-01T06:00:00Z: no new users to import"
        })))
        .with_status(200)
        .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
        .create_async()
        .await;

    let notifier = TelegramNotifier::new(&notifier_config(server.url()), Duration::from_secs(5)).unwrap();
    notifier.push(&message()).await.unwrap();
    send.assert_async().await;
}

#[tokio::test]
async fn test_telegram_rejection_is_notification_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/bot123:abc/sendMessage")
        .with_status(400)
        .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
        .create_async()
        .await;

    let notifier = TelegramNotifier::new(&notifier_config(server.url()), Duration::from_secs(5)).unwrap();
    let err = notifier.push(&message()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotificationError(_)));
    assert!(err.to_string().contains("chat not found"));
}
