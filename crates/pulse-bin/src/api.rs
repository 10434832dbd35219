//! REST client for the notifications API.
//!
//! Used for the initial sync before the live connection opens and for
//! read receipts. Every call carries the user's bearer token.

use pulse_protocol::NotificationRecord;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("Invalid API base URL: {0}")]
    InvalidBase(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Body of `POST /users/fcm-token`.
#[derive(Debug, Serialize)]
struct PushTokenRequest<'a> {
    token: &'a str,
    device: &'a str,
}

#[derive(Clone, Debug)]
pub struct NotificationsApi {
    http_client: reqwest::Client,
    base: Url,
    token: String,
}

impl NotificationsApi {
    pub fn new(base: Url, token: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base,
            token: token.into(),
        }
    }

    /// `GET /notifications`, newest first.
    pub async fn list(&self) -> ApiResult<Vec<NotificationRecord>> {
        let url = self.endpoint(&["notifications"])?;
        let response = self.check(self.http_client.get(url)).await?;
        let records: Vec<NotificationRecord> = response.json().await?;
        debug!(count = records.len(), "Fetched notifications");
        Ok(records)
    }

    /// `PATCH /notifications/{id}/read`.
    pub async fn mark_read(&self, id: &str) -> ApiResult<()> {
        let url = self.endpoint(&["notifications", id, "read"])?;
        self.check(self.http_client.patch(url)).await?;
        Ok(())
    }

    /// `PATCH /notifications/read-all`.
    pub async fn mark_all_read(&self) -> ApiResult<()> {
        let url = self.endpoint(&["notifications", "read-all"])?;
        self.check(self.http_client.patch(url)).await?;
        Ok(())
    }

    /// `POST /users/fcm-token`, so the server can reach this device while
    /// the live connection is down.
    pub async fn register_push_token(&self, push_token: &str, device: &str) -> ApiResult<()> {
        let url = self.endpoint(&["users", "fcm-token"])?;
        let body = PushTokenRequest {
            token: push_token,
            device,
        };
        self.check(self.http_client.post(url).json(&body)).await?;
        debug!(device, "Registered push token");
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidBase(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(&self, request: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body_len = message.len(), "Notifications API error");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> NotificationsApi {
        NotificationsApi::new(Url::parse(base).unwrap(), "token-1")
    }

    #[test]
    fn test_endpoint_appends_segments() {
        let api = api("http://localhost:8080/api/v1");
        assert_eq!(
            api.endpoint(&["notifications"]).unwrap().as_str(),
            "http://localhost:8080/api/v1/notifications"
        );
        assert_eq!(
            api.endpoint(&["notifications", "read-all"]).unwrap().as_str(),
            "http://localhost:8080/api/v1/notifications/read-all"
        );
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let api = api("http://localhost:8080/api/v1/");
        assert_eq!(
            api.endpoint(&["notifications", "n1", "read"]).unwrap().as_str(),
            "http://localhost:8080/api/v1/notifications/n1/read"
        );
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let api = api("http://localhost:8080/api/v1");
        let url = api.endpoint(&["notifications", "a/b", "read"]).unwrap();
        assert_eq!(url.path(), "/api/v1/notifications/a%2Fb/read");
    }

    #[test]
    fn test_cannot_be_a_base_is_rejected() {
        let api = api("mailto:ops@example.com");
        assert!(matches!(
            api.endpoint(&["notifications"]),
            Err(ApiError::InvalidBase(_))
        ));
    }

    #[test]
    fn test_push_token_endpoint_and_body() {
        let api = api("http://localhost:8080/api/v1");
        assert_eq!(
            api.endpoint(&["users", "fcm-token"]).unwrap().as_str(),
            "http://localhost:8080/api/v1/users/fcm-token"
        );

        let body = serde_json::to_value(PushTokenRequest {
            token: "fcm-abc",
            device: "cli",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"token": "fcm-abc", "device": "cli"}));
    }

    #[test]
    fn test_list_response_decodes() {
        let body = r#"[{
            "id": "n1",
            "userId": "u1",
            "type": "offer_received",
            "title": "New offer",
            "message": "You got an offer",
            "data": null,
            "read": false,
            "created_at": "2025-06-01T12:00:00Z"
        }]"#;
        let records: Vec<NotificationRecord> = serde_json::from_str(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "n1");
        assert!(records[0].data.is_empty());
    }
}
