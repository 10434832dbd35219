//! Notification store for the realtime client.
//!
//! One deduplicated, most-recent-first collection of notification records,
//! fed by both the live connection and the push channel, and persisted to a
//! key/value backend so it survives restarts.

mod error;
mod migrations;
mod persistence;
mod push;
mod service;
mod store;

pub use error::{StoreError, StoreResult};
pub use persistence::{
    KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, LOGGED_IN_USER_KEY,
    NOTIFICATIONS_KEY,
};
pub use push::{IdSource, IngestOutcome, PushReconciler, DEFAULT_PUSH_TITLE};
pub use service::{NotificationService, NotificationSink, StoreEvent};
pub use store::NotificationStore;
