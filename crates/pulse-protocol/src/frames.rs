//! Wire frame types.
//!
//! Every frame is a JSON object tagged with a `type` string. Inbound
//! application frames carry no topic: the server sends the inner message
//! for whichever room caused it, so consumers must self-filter.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{NotificationRecord, ProtocolError, ProtocolResult};

/// Opaque subscription key (conversation id, feed id, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of an inbound frame by its `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Keepalive request from the peer; answered with `pong`.
    Ping,
    /// Keepalive response.
    Pong,
    /// A chat message was delivered.
    NewMessage,
    /// A notification record was delivered.
    NewNotification,
    /// Any other application frame (task/offer lifecycle, ...).
    Other,
}

impl FrameKind {
    pub fn from_type(frame_type: &str) -> Self {
        match frame_type {
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "new_message" => Self::NewMessage,
            "new_notification" => Self::NewNotification,
            _ => Self::Other,
        }
    }

    /// Control frames are consumed by the connection manager and never
    /// reach application handlers.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

/// A decoded inbound frame: the `type` tag plus every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl InboundFrame {
    /// Create a frame with no fields besides its type.
    pub fn new(frame_type: impl Into<String>) -> Self {
        Self {
            frame_type: frame_type.into(),
            fields: Map::new(),
        }
    }

    /// Set a field.
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::from_type(&self.frame_type)
    }

    pub fn is_control(&self) -> bool {
        self.kind().is_control()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The `message` field carried by `new_message` and `new_notification`.
    pub fn message(&self) -> Option<&Value> {
        self.field("message")
    }

    /// Decode the notification carried by a `new_notification` frame.
    ///
    /// Returns `Ok(None)` for every other frame type.
    pub fn notification(&self) -> ProtocolResult<Option<NotificationRecord>> {
        if self.kind() != FrameKind::NewNotification {
            return Ok(None);
        }

        let message = self.message().ok_or_else(|| ProtocolError::InvalidPayload {
            frame_type: self.frame_type.clone(),
            reason: "missing 'message' field".to_string(),
        })?;

        NotificationRecord::from_value(message.clone())
            .map(Some)
            .map_err(|e| ProtocolError::InvalidPayload {
                frame_type: self.frame_type.clone(),
                reason: e.to_string(),
            })
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Ping,
    Pong,
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
}

impl OutboundFrame {
    pub fn subscribe(topic: impl Into<Topic>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
        }
    }

    pub fn unsubscribe(topic: impl Into<Topic>) -> Self {
        Self::Unsubscribe {
            topic: topic.into(),
        }
    }
}
