//! Notification records shared by the live and push delivery paths.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Notification category.
///
/// Unknown categories are preserved verbatim so records written by a newer
/// backend survive a round trip through local storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    OfferReceived,
    OfferAccepted,
    OfferDeclined,
    OfferWithdrawn,
    TaskStarted,
    TaskCompleted,
    TaskCancelled,
    PaymentReleased,
    ReviewReceived,
    DisputeRaised,
    RevisionRequested,
    ProgressUpdate,
    MessageReceived,
    #[default]
    Info,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OfferReceived => "offer_received",
            Self::OfferAccepted => "offer_accepted",
            Self::OfferDeclined => "offer_declined",
            Self::OfferWithdrawn => "offer_withdrawn",
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::TaskCancelled => "task_cancelled",
            Self::PaymentReleased => "payment_released",
            Self::ReviewReceived => "review_received",
            Self::DisputeRaised => "dispute_raised",
            Self::RevisionRequested => "revision_requested",
            Self::ProgressUpdate => "progress_update",
            Self::MessageReceived => "message_received",
            Self::Info => "info",
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for NotificationKind {
    fn from(value: &str) -> Self {
        match value {
            "offer_received" => Self::OfferReceived,
            "offer_accepted" => Self::OfferAccepted,
            "offer_declined" => Self::OfferDeclined,
            "offer_withdrawn" => Self::OfferWithdrawn,
            "task_started" => Self::TaskStarted,
            "task_completed" => Self::TaskCompleted,
            "task_cancelled" => Self::TaskCancelled,
            "payment_released" => Self::PaymentReleased,
            "review_received" => Self::ReviewReceived,
            "dispute_raised" => Self::DisputeRaised,
            "revision_requested" => Self::RevisionRequested,
            "progress_update" => Self::ProgressUpdate,
            "message_received" => Self::MessageReceived,
            "info" => Self::Info,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for NotificationKind {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification as stored locally and rendered by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub read: bool,
    #[serde(rename = "created_at", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl NotificationRecord {
    /// Create an unread record with empty data.
    pub fn new(
        id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            kind,
            title: title.into(),
            message: message.into(),
            data: Map::new(),
            read: false,
            created_at,
            action_url: None,
            task_id: None,
            offer_id: None,
        }
    }

    /// Decode a record from a JSON value (the `message` of a
    /// `new_notification` frame, or one element of a REST listing).
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Read a string entry from `data`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Task this notification refers to, from the top-level field or `data`.
    pub fn task_ref(&self) -> Option<&str> {
        self.task_id
            .as_deref()
            .or_else(|| self.data_str("task_id"))
            .or_else(|| self.data_str("taskId"))
    }
}
