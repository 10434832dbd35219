//! Push payloads delivered outside the live connection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ProtocolError, ProtocolResult};

/// `type` of the envelope a service worker uses to forward a push payload
/// to an open page.
pub const SERVICE_WORKER_MESSAGE_TYPE: &str = "FCM_MESSAGE";

/// Display part of a push payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A raw push payload before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<PushNotification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(
        rename = "messageId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<String>,
}

impl PushDraft {
    /// Parse a push payload, unwrapping the service-worker envelope
    /// (`{"type": "FCM_MESSAGE", "payload": {...}}`) when present.
    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::MalformedFrame(
                "push payload is not a JSON object".to_string(),
            ));
        };

        let is_envelope = object.get("type").and_then(Value::as_str)
            == Some(SERVICE_WORKER_MESSAGE_TYPE);
        if is_envelope {
            let payload = object.remove("payload").ok_or_else(|| {
                ProtocolError::InvalidPayload {
                    frame_type: SERVICE_WORKER_MESSAGE_TYPE.to_string(),
                    reason: "missing 'payload' field".to_string(),
                }
            })?;
            return Ok(serde_json::from_value(payload)?);
        }

        Ok(serde_json::from_value(Value::Object(object))?)
    }

    pub fn title(&self) -> Option<&str> {
        self.notification.as_ref()?.title.as_deref()
    }

    pub fn body(&self) -> Option<&str> {
        self.notification.as_ref()?.body.as_deref()
    }

    /// Read a non-empty string entry from `data`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .as_ref()?
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_payload() {
        let draft = PushDraft::from_json(
            r#"{
                "notification": {"title": "Offer accepted", "body": "Start work"},
                "data": {"type": "offer_accepted", "notification_id": "n1"},
                "messageId": "0:1234"
            }"#,
        )
        .unwrap();

        assert_eq!(draft.title(), Some("Offer accepted"));
        assert_eq!(draft.body(), Some("Start work"));
        assert_eq!(draft.data_str("type"), Some("offer_accepted"));
        assert_eq!(draft.message_id.as_deref(), Some("0:1234"));
    }

    #[test]
    fn test_parse_service_worker_envelope() {
        let draft = PushDraft::from_json(
            r#"{"type": "FCM_MESSAGE", "payload": {"notification": {"title": "Hi"}}}"#,
        )
        .unwrap();

        assert_eq!(draft.title(), Some("Hi"));
        assert!(draft.body().is_none());
        assert!(draft.data.is_none());
    }

    #[test]
    fn test_envelope_without_payload_is_error() {
        let err = PushDraft::from_json(r#"{"type": "FCM_MESSAGE"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_empty_object_is_empty_draft() {
        let draft = PushDraft::from_json("{}").unwrap();
        assert_eq!(draft, PushDraft::default());
    }

    #[test]
    fn test_data_str_ignores_empty_and_non_strings() {
        let draft = PushDraft::from_json(r#"{"data": {"id": "", "count": 3}}"#).unwrap();
        assert!(draft.data_str("id").is_none());
        assert!(draft.data_str("count").is_none());
        assert!(draft.data_str("missing").is_none());
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        assert!(matches!(
            PushDraft::from_json("[]").unwrap_err(),
            ProtocolError::MalformedFrame(_)
        ));
    }
}
