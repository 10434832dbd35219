//! Command implementations.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use pulse_config_and_utils::{Config, Paths};
use pulse_notification_store::{NotificationService, PushReconciler, SqliteKeyValueStore};
use pulse_protocol::{NotificationRecord, PushDraft, UserIdentity};
use pulse_realtime::{
    ClientConfig, ClientEvent, ConnectionManager, ConnectionState, Handler, InboundFrame,
    WebSocketTransport,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::NotificationsApi;

pub fn open_service(paths: &Paths) -> anyhow::Result<Arc<NotificationService>> {
    paths.ensure_dirs()?;
    let backend = SqliteKeyValueStore::open(&paths.database_file())
        .with_context(|| format!("opening {}", paths.database_file().display()))?;
    Ok(Arc::new(NotificationService::open(backend)))
}

pub fn client_config(config: &Config) -> anyhow::Result<ClientConfig> {
    config.validate()?;
    Ok(ClientConfig {
        url: config.ws_url.clone(),
        heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
        reconnect_base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
        reconnect_max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
        max_reconnect_attempts: config.max_reconnect_attempts,
        idle_timeout: config.idle_timeout_secs.map(Duration::from_secs),
        ..ClientConfig::default()
    })
}

/// Log in, sync, connect and print notifications until Ctrl-C.
pub async fn run_listen(
    config: &Config,
    paths: &Paths,
    user_id: String,
    token: String,
    topics: Vec<String>,
) -> anyhow::Result<()> {
    let service = open_service(paths)?;
    service.login(UserIdentity::new(user_id.clone()));

    let api = NotificationsApi::new(config.api_url()?, token.clone());
    match api.list().await {
        Ok(records) => {
            info!(count = records.len(), "Initial sync complete");
            service.set_all(records);
        }
        Err(e) => warn!(error = %e, "Initial sync failed; keeping stored notifications"),
    }
    print_unread_summary(&service);

    let manager = ConnectionManager::spawn(
        client_config(config)?,
        Arc::new(WebSocketTransport),
        Some(service.clone()),
    );

    let handler = Handler::new(|frame: &InboundFrame| {
        debug!(frame_type = %frame.frame_type, "Frame delivered");
    });
    for topic in &topics {
        manager.subscribe(topic.as_str(), &handler);
    }

    let mut events = manager.events();
    manager.connect(UserIdentity::new(user_id), token)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(ClientEvent::NewNotification { record, inserted: true }) => {
                    println!("{}", format_record(&record));
                }
                Ok(ClientEvent::StateChanged(state)) => {
                    eprintln!("[{}]", state_label(state));
                }
                Ok(ClientEvent::ReconnectScheduled { attempt, delay }) => {
                    eprintln!("[reconnecting in {}ms, attempt {attempt}]", delay.as_millis());
                }
                Ok(ClientEvent::AuthRejected { reason }) => {
                    break Err(anyhow::anyhow!("authentication rejected: {reason}"));
                }
                Ok(ClientEvent::ReconnectExhausted { attempts }) => {
                    break Err(anyhow::anyhow!("gave up after {attempts} reconnect attempts"));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => break Ok(()),
            }
        }
    };

    manager.close().await?;
    outcome
}

/// Ingest one push payload from `file`, or stdin when absent.
pub fn run_push(paths: &Paths, file: Option<&Path>) -> anyhow::Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let draft = PushDraft::from_json(&text)?;

    let service = open_service(paths)?;
    let outcome = PushReconciler::new(service).ingest(&draft);
    if outcome.inserted {
        println!("stored {}", outcome.id);
    } else {
        println!("duplicate {}", outcome.id);
    }
    Ok(())
}

pub fn run_list(paths: &Paths, unread_only: bool) -> anyhow::Result<()> {
    let service = open_service(paths)?;
    for record in service
        .snapshot()
        .iter()
        .filter(|record| !unread_only || !record.read)
    {
        println!("{}", format_record(record));
    }
    print_unread_summary(&service);
    Ok(())
}

/// Mark locally, then tell the server when a token is given.
pub async fn run_mark_read(
    config: &Config,
    paths: &Paths,
    id: &str,
    token: Option<String>,
) -> anyhow::Result<()> {
    let service = open_service(paths)?;
    if !service.contains(id) {
        bail!("no notification with id {id}");
    }
    service.mark_read(id);

    if let Some(token) = token {
        if let Err(e) = NotificationsApi::new(config.api_url()?, token)
            .mark_read(id)
            .await
        {
            warn!(error = %e, notification_id = %id, "Server read receipt failed");
        }
    }
    print_unread_summary(&service);
    Ok(())
}

pub async fn run_mark_all_read(
    config: &Config,
    paths: &Paths,
    token: Option<String>,
) -> anyhow::Result<()> {
    let service = open_service(paths)?;
    let changed = service.mark_all_read();
    println!("marked {changed} as read");

    if let Some(token) = token {
        if let Err(e) = NotificationsApi::new(config.api_url()?, token)
            .mark_all_read()
            .await
        {
            warn!(error = %e, "Server read-all receipt failed");
        }
    }
    Ok(())
}

pub async fn run_register_push_token(
    config: &Config,
    push_token: &str,
    device: &str,
    token: String,
) -> anyhow::Result<()> {
    NotificationsApi::new(config.api_url()?, token)
        .register_push_token(push_token, device)
        .await
        .context("push token registration failed")?;
    println!("registered push token for {device}");
    Ok(())
}

pub fn run_logout(paths: &Paths) -> anyhow::Result<()> {
    let service = open_service(paths)?;
    let user = service.user();
    service.logout();
    match user {
        Some(user) => println!("logged out {}", user.id),
        None => println!("no user logged in"),
    }
    Ok(())
}

fn print_unread_summary(service: &NotificationService) {
    eprintln!("{} unread", service.unread_count());
}

fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Reconnecting => "reconnecting",
        ConnectionState::Closed => "closed",
    }
}

/// One line per record: read marker, timestamp, kind, title, task, id.
pub fn format_record(record: &NotificationRecord) -> String {
    let marker = if record.read { ' ' } else { '*' };
    let mut line = format!(
        "{marker} {} {:<20} {}",
        record.created_at.format("%Y-%m-%d %H:%M"),
        record.kind.as_str(),
        record.title,
    );
    if !record.message.is_empty() {
        line.push_str(" - ");
        line.push_str(&record.message);
    }
    if let Some(task) = record.task_ref() {
        line.push_str(&format!(" [task {task}]"));
    }
    line.push_str(&format!("  ({})", record.id));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pulse_protocol::NotificationKind;
    use tempfile::tempdir;

    fn record(id: &str, read: bool) -> NotificationRecord {
        let created = chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        let mut record = NotificationRecord::new(
            id,
            NotificationKind::from("task_completed".to_string()),
            "Task done",
            "Your task finished",
            created,
        );
        record.read = read;
        record
    }

    #[test]
    fn test_format_record_marks_unread() {
        let line = format_record(&record("n1", false));
        assert!(line.starts_with("* 2025-06-01 12:30 task_completed"));
        assert!(line.contains("Task done - Your task finished"));
        assert!(line.ends_with("(n1)"));

        assert!(format_record(&record("n2", true)).starts_with("  "));
    }

    #[test]
    fn test_format_record_shows_task_reference() {
        let mut with_task = record("n3", false);
        with_task
            .data
            .insert("taskId".to_string(), serde_json::json!("t42"));
        let line = format_record(&with_task);
        assert!(line.contains("Your task finished [task t42]  (n3)"));

        assert!(!format_record(&record("n4", false)).contains("[task"));
    }

    #[test]
    fn test_client_config_from_config() {
        let config = Config {
            ws_url: "wss://pulse.example.com/ws".to_string(),
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 4000,
            max_reconnect_attempts: Some(3),
            idle_timeout_secs: None,
            ..Config::default()
        };

        let client = client_config(&config).unwrap();
        assert_eq!(client.url, "wss://pulse.example.com/ws");
        assert_eq!(client.reconnect_base_delay, Duration::from_millis(500));
        assert_eq!(client.reconnect_max_delay, Duration::from_millis(4000));
        assert_eq!(client.max_reconnect_attempts, Some(3));
        assert_eq!(client.idle_timeout, None);
        assert_eq!(client.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_client_config_rejects_bad_delays() {
        let config = Config {
            reconnect_base_delay_ms: 0,
            ..Config::default()
        };
        assert!(client_config(&config).is_err());
    }

    #[test]
    fn test_push_then_list_from_file() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let payload = dir.path().join("push.json");
        std::fs::write(
            &payload,
            r#"{"notification": {"title": "Offer", "body": "New offer"},
                "data": {"type": "offer_received", "notification_id": "n9"}}"#,
        )
        .unwrap();

        run_push(&paths, Some(&payload)).unwrap();
        run_push(&paths, Some(&payload)).unwrap();

        let service = open_service(&paths).unwrap();
        let records = service.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "n9");
        assert_eq!(records[0].title, "Offer");
    }

    #[test]
    fn test_logout_clears_store() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        {
            let service = open_service(&paths).unwrap();
            service.login(UserIdentity::new("u1"));
            service.add_one(record("n1", false));
        }

        run_logout(&paths).unwrap();

        let service = open_service(&paths).unwrap();
        assert!(service.user().is_none());
        assert!(service.snapshot().is_empty());
    }
}
