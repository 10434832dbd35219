use std::time::Duration;

use pulse_protocol::NotificationRecord;
use serde_json::Value;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Closed by the caller; stays here until the next `connect`.
    Closed,
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    /// A reconnect timer was armed.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The server rejected the credentials; no retry follows.
    AuthRejected { reason: String },
    /// `max_reconnect_attempts` consecutive reconnects failed.
    ReconnectExhausted { attempts: u32 },
    /// `new_message` frame payload.
    NewMessage(Value),
    /// `new_notification` frame payload; `inserted` is false for duplicates.
    NewNotification {
        record: NotificationRecord,
        inserted: bool,
    },
}
