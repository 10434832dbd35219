//! Push payload reconciliation.
//!
//! Push payloads arrive independently of the live connection and may carry
//! the same notification the connection already delivered. Both paths meet
//! in [`NotificationService::add_one`], so the id chosen here decides
//! whether they collapse into one record.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse_protocol::{NotificationKind, NotificationRecord, PushDraft};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::NotificationService;

/// Title used when the payload has no display title.
pub const DEFAULT_PUSH_TITLE: &str = "New Notification";

/// Width of the arrival-time bucket folded into synthetic ids.
const SYNTHETIC_BUCKET_SECS: i64 = 60;

/// `data` keys carrying the backend notification id, in priority order.
const ID_KEYS: [&str; 3] = ["notification_id", "notificationId", "id"];

/// Where a normalized record's id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// Supplied by the backend or the push provider.
    Provider,
    /// Derived from content and arrival time.
    Synthetic,
}

/// Result of ingesting one push payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub id: String,
    pub source: IdSource,
    /// False when the id was already present.
    pub inserted: bool,
}

/// Normalizes push payloads and feeds them into the notification service.
#[derive(Clone)]
pub struct PushReconciler {
    service: Arc<NotificationService>,
}

impl PushReconciler {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }

    /// Ingest a payload received now. Works regardless of connection state.
    pub fn ingest(&self, draft: &PushDraft) -> IngestOutcome {
        self.ingest_at(draft, Utc::now())
    }

    pub fn ingest_at(&self, draft: &PushDraft, now: DateTime<Utc>) -> IngestOutcome {
        let user_id = self.service.user().map(|u| u.id).unwrap_or_default();
        let (record, source) = Self::normalize(draft, &user_id, now);
        let id = record.id.clone();

        if source == IdSource::Synthetic {
            warn!(notification_id = %id, "Push payload has no stable id; using synthetic id");
        }

        let inserted = self.service.add_one(record);
        debug!(notification_id = %id, inserted, "Push payload ingested");

        IngestOutcome {
            id,
            source,
            inserted,
        }
    }

    /// Build a notification record from a push payload.
    pub fn normalize(
        draft: &PushDraft,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> (NotificationRecord, IdSource) {
        let kind = NotificationKind::from(draft.data_str("type").unwrap_or("info"));
        let title = draft.title().unwrap_or(DEFAULT_PUSH_TITLE).to_string();
        let body = draft.body().unwrap_or_default().to_string();

        let (id, source) = match stable_id(draft) {
            Some(id) => (id.to_string(), IdSource::Provider),
            None => (synthetic_id(&kind, &title, &body, now), IdSource::Synthetic),
        };

        let created_at = ["created_at", "createdAt"]
            .iter()
            .filter_map(|key| draft.data_str(key))
            .find_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or(now);

        let mut record = NotificationRecord::new(id, kind, title, body, created_at)
            .with_user(user_id);
        record.action_url = first_data_str(draft, &["action_url", "actionUrl"]);
        record.task_id = first_data_str(draft, &["task_id", "taskId"]);
        record.offer_id = first_data_str(draft, &["offer_id", "offerId"]);
        record.data = draft.data.clone().unwrap_or_default();

        (record, source)
    }
}

fn stable_id(draft: &PushDraft) -> Option<&str> {
    ID_KEYS
        .iter()
        .find_map(|key| draft.data_str(key))
        .or_else(|| draft.message_id.as_deref().filter(|id| !id.is_empty()))
}

fn first_data_str(draft: &PushDraft, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| draft.data_str(key))
        .map(str::to_string)
}

/// `push-` followed by 16 hex chars of SHA-256 over the visible content and
/// the arrival minute. Redeliveries within the same bucket collapse.
fn synthetic_id(kind: &NotificationKind, title: &str, body: &str, now: DateTime<Utc>) -> String {
    let bucket = now.timestamp().div_euclid(SYNTHETIC_BUCKET_SECS);

    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(body.as_bytes());
    hasher.update(b"|");
    hasher.update(bucket.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut id = String::with_capacity(21);
    id.push_str("push-");
    for byte in &digest[..8] {
        let _ = write!(id, "{byte:02x}");
    }
    id
}
