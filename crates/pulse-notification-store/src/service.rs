//! Shared, persisted notification service.

use parking_lot::Mutex;
use pulse_protocol::{NotificationRecord, UserIdentity};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{KeyValueStore, NotificationStore, StoreResult, LOGGED_IN_USER_KEY, NOTIFICATIONS_KEY};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notifications emitted after each effective mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A new record was inserted (toast-style surfacing).
    Inserted(NotificationRecord),
    /// One record was marked read.
    Read { id: String },
    /// All unread records were marked read.
    AllRead { count: usize },
    /// The collection was replaced wholesale.
    Replaced { count: usize },
    /// The collection was emptied.
    Cleared,
}

/// Entry point shared by the live and push delivery paths.
pub trait NotificationSink: Send + Sync {
    /// Insert-or-ignore by id. Returns whether the record was new.
    fn accept(&self, record: NotificationRecord) -> bool;
}

struct Inner {
    store: NotificationStore,
    user: Option<UserIdentity>,
    backend: Box<dyn KeyValueStore>,
}

impl Inner {
    fn persist_notifications(&self) {
        if let Err(e) = self.try_persist_notifications() {
            warn!(error = %e, "Failed to persist notifications");
        }
    }

    fn try_persist_notifications(&self) -> StoreResult<()> {
        let json = serde_json::to_string(self.store.records())?;
        self.backend.set(NOTIFICATIONS_KEY, &json)
    }

    fn persist_user(&self) {
        let result = match &self.user {
            Some(user) => serde_json::to_string(user)
                .map_err(Into::into)
                .and_then(|json| self.backend.set(LOGGED_IN_USER_KEY, &json)),
            None => self.backend.delete(LOGGED_IN_USER_KEY).map(|_| ()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist logged-in user");
        }
    }
}

/// Mutex-guarded [`NotificationStore`] with write-through persistence.
///
/// Writes reach the backend in mutation order because the backend lives
/// under the same lock as the collection.
pub struct NotificationService {
    inner: Mutex<Inner>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl NotificationService {
    /// Open the service, reloading the persisted user and collection.
    ///
    /// Unreadable persisted state is logged and replaced by an empty store.
    pub fn open(backend: impl KeyValueStore + 'static) -> Self {
        let mut store = NotificationStore::new();

        let user = match load_json::<UserIdentity>(&backend, LOGGED_IN_USER_KEY) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable logged-in user");
                None
            }
        };

        match load_json::<Vec<NotificationRecord>>(&backend, NOTIFICATIONS_KEY) {
            Ok(Some(records)) => store.set_all(records),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Discarding unreadable notifications"),
        }

        info!(
            notifications = store.len(),
            user_id = user.as_ref().map(|u| u.id.as_str()),
            "Notification store loaded"
        );

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                store,
                user,
                backend: Box::new(backend),
            }),
            event_tx,
        }
    }

    /// Subscribe to store change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn set_all(&self, records: Vec<NotificationRecord>) {
        let count = {
            let mut inner = self.inner.lock();
            inner.store.set_all(records);
            inner.persist_notifications();
            inner.store.len()
        };
        debug!(count, "Notifications replaced");
        self.emit(StoreEvent::Replaced { count });
    }

    /// Insert-or-ignore by id. Returns whether the record was new.
    pub fn add_one(&self, record: NotificationRecord) -> bool {
        let id = record.id.clone();
        let inserted = {
            let mut inner = self.inner.lock();
            let inserted = inner.store.add_one(record.clone());
            if inserted {
                inner.persist_notifications();
            }
            inserted
        };

        if inserted {
            debug!(notification_id = %id, "Notification inserted");
            self.emit(StoreEvent::Inserted(record));
        } else {
            debug!(notification_id = %id, "Duplicate notification ignored");
        }
        inserted
    }

    pub fn mark_read(&self, id: &str) -> bool {
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.store.mark_read(id);
            if changed {
                inner.persist_notifications();
            }
            changed
        };

        if changed {
            self.emit(StoreEvent::Read { id: id.to_string() });
        }
        changed
    }

    pub fn mark_all_read(&self) -> usize {
        let count = {
            let mut inner = self.inner.lock();
            let count = inner.store.mark_all_read();
            if count > 0 {
                inner.persist_notifications();
            }
            count
        };

        if count > 0 {
            self.emit(StoreEvent::AllRead { count });
        }
        count
    }

    pub fn clear(&self) {
        {
            let mut inner = self.inner.lock();
            inner.store.clear();
            inner.persist_notifications();
        }
        self.emit(StoreEvent::Cleared);
    }

    /// Remember the logged-in user.
    ///
    /// Switching to a different user drops the previous user's records.
    pub fn login(&self, user: UserIdentity) {
        let switched = {
            let mut inner = self.inner.lock();
            let switched = inner.user.as_ref().is_some_and(|u| u.id != user.id);
            if switched {
                inner.store.clear();
                inner.persist_notifications();
            }
            info!(user_id = %user.id, "User logged in");
            inner.user = Some(user);
            inner.persist_user();
            switched
        };

        if switched {
            self.emit(StoreEvent::Cleared);
        }
    }

    /// Forget the user and every record, including read state.
    pub fn logout(&self) {
        {
            let mut inner = self.inner.lock();
            inner.store.clear();
            inner.user = None;
            if let Err(e) = inner.backend.delete(NOTIFICATIONS_KEY) {
                warn!(error = %e, "Failed to delete persisted notifications");
            }
            inner.persist_user();
        }
        info!("User logged out");
        self.emit(StoreEvent::Cleared);
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.inner.lock().user.clone()
    }

    /// Copy of the collection, most recent first.
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.inner.lock().store.records().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.lock().store.unread_count()
    }

    pub fn latest(&self) -> Option<NotificationRecord> {
        self.inner.lock().store.latest().cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().store.contains(id)
    }
}

impl NotificationSink for NotificationService {
    fn accept(&self, record: NotificationRecord) -> bool {
        self.add_one(record)
    }
}

fn load_json<T: serde::de::DeserializeOwned>(
    backend: &dyn KeyValueStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match backend.get(key)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryKeyValueStore, StoreError};
    use chrono::{TimeZone, Utc};
    use pulse_protocol::NotificationKind;

    fn record(id: &str, minute: u32) -> NotificationRecord {
        NotificationRecord::new(
            id,
            NotificationKind::TaskStarted,
            "Task started",
            "",
            Utc.with_ymd_and_hms(2025, 6, 1, 9, minute, 0).unwrap(),
        )
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Backend("disk unavailable".to_string()))
        }
        fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
            Err(StoreError::Backend("disk unavailable".to_string()))
        }
        fn delete(&self, _key: &str) -> StoreResult<bool> {
            Err(StoreError::Backend("disk unavailable".to_string()))
        }
    }

    #[test]
    fn test_reload_restores_collection_and_user() {
        let disk = MemoryKeyValueStore::new();
        {
            let service = NotificationService::open(disk.clone());
            service.login(UserIdentity::new("u1"));
            service.add_one(record("a", 1));
            service.add_one(record("b", 2));
            service.mark_read("a");
        }

        let service = NotificationService::open(disk);
        let ids: Vec<_> = service.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(service.unread_count(), 1);
        assert_eq!(service.user().unwrap().id, "u1");
        assert!(service.latest().is_none());

        // Dedup sees reloaded ids.
        assert!(!service.add_one(record("a", 3)));
    }

    #[test]
    fn test_corrupt_persisted_state_starts_empty() {
        let disk = MemoryKeyValueStore::new();
        disk.set(NOTIFICATIONS_KEY, "{not json").unwrap();
        disk.set(LOGGED_IN_USER_KEY, "42").unwrap();

        let service = NotificationService::open(disk);
        assert!(service.snapshot().is_empty());
        assert!(service.user().is_none());
    }

    #[test]
    fn test_backend_failures_are_not_surfaced() {
        let service = NotificationService::open(FailingStore);
        assert!(service.add_one(record("a", 1)));
        assert!(service.mark_read("a"));
        service.login(UserIdentity::new("u1"));
        service.logout();
        assert!(service.snapshot().is_empty());
    }

    #[test]
    fn test_events_follow_effective_mutations() {
        let service = NotificationService::open(MemoryKeyValueStore::new());
        let mut events = service.subscribe();

        service.add_one(record("a", 1));
        service.add_one(record("a", 1));
        service.mark_read("a");
        service.mark_read("a");
        service.mark_all_read();
        service.set_all(vec![record("x", 0)]);
        service.clear();

        assert!(matches!(events.try_recv().unwrap(), StoreEvent::Inserted(r) if r.id == "a"));
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Read { id: "a".into() });
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Replaced { count: 1 });
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Cleared);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_logout_forgets_everything() {
        let disk = MemoryKeyValueStore::new();
        let service = NotificationService::open(disk.clone());
        service.login(UserIdentity::new("u1"));
        service.add_one(record("a", 1));
        service.logout();

        assert!(service.user().is_none());
        assert!(service.snapshot().is_empty());
        assert!(disk.get(LOGGED_IN_USER_KEY).unwrap().is_none());
        assert!(disk.get(NOTIFICATIONS_KEY).unwrap().is_none());
    }

    #[test]
    fn test_login_as_other_user_drops_records() {
        let service = NotificationService::open(MemoryKeyValueStore::new());
        service.login(UserIdentity::new("u1"));
        service.add_one(record("a", 1));

        service.login(UserIdentity::new("u1"));
        assert_eq!(service.snapshot().len(), 1);

        service.login(UserIdentity::new("u2"));
        assert!(service.snapshot().is_empty());
    }

    #[test]
    fn test_sink_accepts_through_add_one() {
        let service = NotificationService::open(MemoryKeyValueStore::new());
        let sink: &dyn NotificationSink = &service;
        assert!(sink.accept(record("a", 1)));
        assert!(!sink.accept(record("a", 1)));
        assert!(service.contains("a"));
    }
}
