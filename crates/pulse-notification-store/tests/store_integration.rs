//! End-to-end tests over the SQLite backend.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pulse_notification_store::{
    KeyValueStore, NotificationService, PushReconciler, SqliteKeyValueStore, StoreEvent,
    NOTIFICATIONS_KEY,
};
use pulse_protocol::{NotificationRecord, PushDraft, UserIdentity};
use serde_json::json;
use tempfile::tempdir;

fn live_record(id: &str) -> NotificationRecord {
    NotificationRecord::from_value(json!({
        "id": id,
        "userId": "u1",
        "type": "offer_received",
        "title": "New offer",
        "message": "You received an offer",
        "data": {"task_id": "t1"},
        "read": false,
        "created_at": "2025-06-01T12:00:00Z"
    }))
    .unwrap()
}

#[test]
fn test_live_then_push_same_id_yields_one_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notifications.sqlite");

    let service = Arc::new(NotificationService::open(
        SqliteKeyValueStore::open(&path).unwrap(),
    ));
    service.login(UserIdentity::new("u1"));
    let reconciler = PushReconciler::new(service.clone());

    assert!(service.add_one(live_record("n1")));

    let push = PushDraft::from_json(
        r#"{"notification": {"title": "Different title"}, "data": {"notification_id": "n1"}}"#,
    )
    .unwrap();
    let outcome = reconciler.ingest(&push);

    assert!(!outcome.inserted);
    let records = service.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "New offer");
}

#[test]
fn test_state_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notifications.sqlite");

    {
        let service = NotificationService::open(SqliteKeyValueStore::open(&path).unwrap());
        service.login(UserIdentity::new("u1"));
        service.add_one(live_record("n1"));
        service.add_one(live_record("n2"));
        service.mark_read("n1");
    }

    let backend = SqliteKeyValueStore::open(&path).unwrap();
    let raw = backend.get(NOTIFICATIONS_KEY).unwrap().unwrap();
    let stored: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[0].get("created_at").is_some());

    let service = NotificationService::open(backend);
    assert_eq!(service.user().unwrap().id, "u1");
    assert_eq!(service.unread_count(), 1);

    // Push redelivery of a reloaded id is absorbed.
    let reconciler = PushReconciler::new(Arc::new(service));
    let push = PushDraft::from_json(r#"{"messageId": "n2"}"#).unwrap();
    assert!(!reconciler.ingest(&push).inserted);
}

#[tokio::test]
async fn test_push_insert_is_broadcast() {
    let service = Arc::new(NotificationService::open(
        SqliteKeyValueStore::open_in_memory().unwrap(),
    ));
    let mut events = service.subscribe();
    let reconciler = PushReconciler::new(service.clone());

    let push = PushDraft::from_json(
        r#"{"type": "FCM_MESSAGE", "payload": {"notification": {"title": "Task done"}, "data": {"type": "task_completed", "id": "n9"}}}"#,
    )
    .unwrap();
    let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    reconciler.ingest_at(&push, at);

    match events.recv().await.unwrap() {
        StoreEvent::Inserted(record) => {
            assert_eq!(record.id, "n9");
            assert_eq!(record.title, "Task done");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
