//! Connection settings.

use std::time::Duration;

use pulse_protocol::UserIdentity;
use url::Url;

use crate::{Backoff, ClientResult};

/// Realtime client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, without credentials.
    pub url: String,
    /// Interval between keepalive pings while connected. Zero disables them.
    pub heartbeat_interval: Duration,
    /// First reconnect delay.
    pub reconnect_base_delay: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Give up after this many consecutive failed reconnects. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Drop a connection that has been silent this long. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/api/v1/ws".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(10_000),
            max_reconnect_attempts: None,
            idle_timeout: Some(Duration::from_secs(75)),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.reconnect_base_delay, self.reconnect_max_delay)
    }

    /// Endpoint URL carrying the credentials as `user_id` and `token`.
    pub fn endpoint(&self, identity: &UserIdentity, token: &str) -> ClientResult<Url> {
        let mut url = Url::parse(self.url.trim_end_matches('/'))?;
        url.query_pairs_mut()
            .append_pair("user_id", &identity.id)
            .append_pair("token", token);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect_max_delay, Duration::from_millis(10_000));
        assert!(config.max_reconnect_attempts.is_none());
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(75)));
    }

    #[test]
    fn test_endpoint_appends_credentials() {
        let config = ClientConfig {
            url: "wss://api.example.com/api/v1/ws/".to_string(),
            ..Default::default()
        };
        let url = config
            .endpoint(&UserIdentity::new("u 1"), "tok&en")
            .unwrap();

        assert_eq!(url.path(), "/api/v1/ws");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("user_id".to_string(), "u 1".to_string()),
                ("token".to_string(), "tok&en".to_string()),
            ]
        );
    }

    #[test]
    fn test_endpoint_keeps_existing_query() {
        let config = ClientConfig {
            url: "ws://localhost:8080/ws?v=2".to_string(),
            ..Default::default()
        };
        let url = config.endpoint(&UserIdentity::new("u1"), "t").unwrap();
        assert_eq!(url.query(), Some("v=2&user_id=u1&token=t"));
    }

    #[test]
    fn test_endpoint_rejects_invalid_url() {
        let config = ClientConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.endpoint(&UserIdentity::new("u1"), "t").is_err());
    }
}
