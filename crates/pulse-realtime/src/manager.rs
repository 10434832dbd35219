//! Connection manager actor.
//!
//! One task owns the link, the timers, the attempt counter and the set of
//! topics announced on the current connection. Commands, topic changes,
//! connect results, inbound frames and timer expiries are handled one at a
//! time, so there is no shared connection state to race on.

use std::collections::HashSet;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use pulse_notification_store::NotificationSink;
use pulse_protocol::{
    decode_frame, encode_frame, FrameKind, InboundFrame, OutboundFrame, Topic, UserIdentity,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AUTH_CLOSE_CODES;
use crate::{
    Backoff, ClientConfig, ClientError, ClientEvent, ClientResult, ConnectionState, Handler,
    MessageRouter, SubscriptionRegistry, TopicChange, Transport, TransportEvent, TransportLink,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

enum Command {
    Connect {
        identity: UserIdentity,
        token: String,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

/// Handle to the connection manager task.
///
/// Dropping the handle stops the task and closes the connection.
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    event_tx: broadcast::Sender<ClientEvent>,
    last_message: Arc<Mutex<Option<InboundFrame>>>,
    registry: SubscriptionRegistry,
}

impl ConnectionManager {
    /// Spawn the manager task. Must be called within a tokio runtime.
    ///
    /// Notification frames are handed to `sink` when one is given.
    pub fn spawn(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        sink: Option<Arc<dyn NotificationSink>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (registry, topic_rx) = SubscriptionRegistry::new();
        let last_message = Arc::new(Mutex::new(None));

        let actor = Actor {
            backoff: config.backoff(),
            config,
            transport,
            router: MessageRouter::new(registry.clone(), sink, event_tx.clone()),
            registry: registry.clone(),
            cmd_rx,
            topic_rx,
            state_tx,
            event_tx: event_tx.clone(),
            last_message: last_message.clone(),
            credentials: None,
            attempt: 0,
            pending: None,
            link: None,
            connection_id: None,
            announced: HashSet::new(),
            heartbeat: None,
            reconnect_at: None,
            idle_deadline: None,
        };
        tokio::spawn(actor.run());

        Self {
            cmd_tx,
            state_rx,
            event_tx,
            last_message,
            registry,
        }
    }

    /// Start connecting with the given credentials. Returns immediately.
    ///
    /// A no-op while connecting or connected. While a reconnect is pending
    /// the timer is cancelled and a new attempt starts now.
    pub fn connect(&self, identity: UserIdentity, token: impl Into<String>) -> ClientResult<()> {
        self.cmd_tx
            .send(Command::Connect {
                identity,
                token: token.into(),
            })
            .map_err(|_| ClientError::ManagerStopped)
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Returns once the in-flight attempt, the reconnect timer and the
    /// heartbeat are cancelled and the state is [`ConnectionState::Closed`].
    pub async fn close(&self) -> ClientResult<()> {
        let (ack, done) = oneshot::channel();
        self.cmd_tx
            .send(Command::Close { ack })
            .map_err(|_| ClientError::ManagerStopped)?;
        done.await.map_err(|_| ClientError::ManagerStopped)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Most recent application frame.
    pub fn last_message(&self) -> Option<InboundFrame> {
        self.last_message.lock().clone()
    }

    /// Subscribe to client events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Register `handler` for `topic`.
    pub fn subscribe(&self, topic: impl Into<Topic>, handler: &Handler) -> bool {
        self.registry.subscribe(topic, handler)
    }

    /// Remove `handler` from `topic`.
    pub fn unsubscribe(&self, topic: impl Into<Topic>, handler: &Handler) -> bool {
        self.registry.unsubscribe(topic, handler)
    }
}

struct Credentials {
    identity: UserIdentity,
    token: String,
}

struct Actor {
    config: ClientConfig,
    backoff: Backoff,
    transport: Arc<dyn Transport>,
    registry: SubscriptionRegistry,
    router: MessageRouter,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    topic_rx: mpsc::UnboundedReceiver<TopicChange>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<ClientEvent>,
    last_message: Arc<Mutex<Option<InboundFrame>>>,

    credentials: Option<Credentials>,
    /// Consecutive failed attempts since the last successful open.
    attempt: u32,
    pending: Option<JoinHandle<ClientResult<TransportLink>>>,
    link: Option<TransportLink>,
    connection_id: Option<Uuid>,
    /// Topics a `subscribe` frame was sent for on the current link.
    announced: HashSet<Topic>,
    heartbeat: Option<Interval>,
    reconnect_at: Option<Pin<Box<Sleep>>>,
    idle_deadline: Option<Pin<Box<Sleep>>>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(change) = self.topic_rx.recv() => {
                    self.handle_topic_change(change).await;
                }
                result = wait_pending(&mut self.pending) => {
                    self.pending = None;
                    self.handle_connect_result(result).await;
                }
                event = wait_link(&mut self.link) => {
                    self.handle_link_event(event).await;
                }
                _ = wait_tick(&mut self.heartbeat) => {
                    self.send_frame(&OutboundFrame::Ping).await;
                }
                _ = wait_sleep(&mut self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.start_attempt();
                }
                _ = wait_sleep(&mut self.idle_deadline) => {
                    warn!(connection_id = ?self.connection_id, "Connection idle, dropping");
                    self.handle_transient_failure("idle timeout");
                }
            }
        }

        self.cancel_all();
        self.set_state(ConnectionState::Closed);
        debug!("Connection manager stopped");
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Connection state changed");
            let _ = self.event_tx.send(ClientEvent::StateChanged(state));
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { identity, token } => match self.state() {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    debug!("Already connecting or connected");
                }
                ConnectionState::Reconnecting => {
                    info!(attempt = self.attempt, "Connect requested, retrying now");
                    self.reconnect_at = None;
                    self.credentials = Some(Credentials { identity, token });
                    self.start_attempt();
                }
                ConnectionState::Disconnected | ConnectionState::Closed => {
                    self.credentials = Some(Credentials { identity, token });
                    self.attempt = 0;
                    self.start_attempt();
                }
            },
            Command::Close { ack } => {
                self.cancel_all();
                self.credentials = None;
                self.attempt = 0;
                self.set_state(ConnectionState::Closed);
                info!("Connection closed by caller");
                let _ = ack.send(());
            }
        }
    }

    /// Launch one connection attempt in the background.
    fn start_attempt(&mut self) {
        let Some(credentials) = &self.credentials else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        let url = match self.config.endpoint(&credentials.identity, &credentials.token) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Cannot build connection URL");
                self.credentials = None;
                self.set_state(ConnectionState::Disconnected);
                return;
            }
        };

        info!(url = %self.config.url, attempt = self.attempt, "Connecting");
        self.set_state(ConnectionState::Connecting);

        let transport = self.transport.clone();
        let connect_timeout = self.config.connect_timeout;
        self.pending = Some(tokio::spawn(async move {
            match time::timeout(connect_timeout, transport.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            }
        }));
    }

    async fn handle_connect_result(&mut self, result: Result<ClientResult<TransportLink>, JoinError>) {
        match result {
            Ok(Ok(link)) => self.handle_open(link).await,
            Ok(Err(ClientError::Unauthorized(reason))) => self.handle_auth_rejected(reason),
            Ok(Err(e)) => {
                warn!(error = %e, attempt = self.attempt, "Connection attempt failed");
                self.handle_transient_failure("connect failed");
            }
            Err(e) => {
                error!(error = %e, "Connection attempt task failed");
                self.handle_transient_failure("connect task failed");
            }
        }
    }

    async fn handle_open(&mut self, link: TransportLink) {
        let connection_id = Uuid::new_v4();
        self.connection_id = Some(connection_id);
        self.link = Some(link);
        self.attempt = 0;
        self.announced.clear();

        // A zero interval disables the heartbeat.
        let period = self.config.heartbeat_interval;
        self.heartbeat = (!period.is_zero()).then(|| {
            let mut heartbeat = time::interval_at(Instant::now() + period, period);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            heartbeat
        });
        self.reset_idle_deadline();

        self.set_state(ConnectionState::Connected);

        let topics = self.registry.active_topics();
        for topic in topics {
            if self.send_frame(&OutboundFrame::subscribe(topic.clone())).await {
                self.announced.insert(topic);
            }
        }
        info!(
            connection_id = %connection_id,
            replayed = self.announced.len(),
            "Connected"
        );
    }

    async fn handle_link_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Text(text)) => {
                self.reset_idle_deadline();
                self.handle_text(&text).await;
            }
            Some(TransportEvent::Closed { code: Some(code), reason })
                if AUTH_CLOSE_CODES.contains(&code) =>
            {
                self.handle_auth_rejected(format!("closed with code {code}: {reason}"));
            }
            Some(TransportEvent::Closed { code, reason }) => {
                info!(connection_id = ?self.connection_id, ?code, reason = %reason, "Connection closed");
                self.handle_transient_failure("closed");
            }
            Some(TransportEvent::Error(e)) => {
                warn!(connection_id = ?self.connection_id, error = %e, "Connection error");
                self.handle_transient_failure("error");
            }
            None => {
                warn!(connection_id = ?self.connection_id, "Connection dropped");
                self.handle_transient_failure("dropped");
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection_id = ?self.connection_id, error = %e, "Dropping malformed frame");
                return;
            }
        };

        match frame.kind() {
            FrameKind::Ping => {
                self.send_frame(&OutboundFrame::Pong).await;
            }
            FrameKind::Pong => debug!("Heartbeat acknowledged"),
            _ => {
                *self.last_message.lock() = Some(frame.clone());
                self.router.route(&frame);
            }
        }
    }

    async fn handle_topic_change(&mut self, change: TopicChange) {
        if self.state() != ConnectionState::Connected || self.link.is_none() {
            // Replayed from the registry on the next open.
            return;
        }

        match change {
            TopicChange::Activated(topic) => {
                if self.registry.is_active(&topic)
                    && !self.announced.contains(&topic)
                    && self.send_frame(&OutboundFrame::subscribe(topic.clone())).await
                {
                    debug!(topic = %topic, "Subscribed");
                    self.announced.insert(topic);
                }
            }
            TopicChange::Deactivated(topic) => {
                if !self.registry.is_active(&topic) && self.announced.remove(&topic) {
                    self.send_frame(&OutboundFrame::unsubscribe(topic.clone())).await;
                    debug!(topic = %topic, "Unsubscribed");
                }
            }
        }
    }

    /// Queue a frame on the current link. Returns whether it was queued.
    async fn send_frame(&mut self, frame: &OutboundFrame) -> bool {
        let Some(link) = &self.link else {
            return false;
        };

        let text = match encode_frame(frame) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to encode frame");
                return false;
            }
        };

        match link.send(text).await {
            Ok(()) => true,
            Err(e) => {
                // The reader reports the failure and drives the reconnect.
                warn!(connection_id = ?self.connection_id, error = %e, "Failed to send frame");
                false
            }
        }
    }

    fn handle_transient_failure(&mut self, reason: &str) {
        self.drop_link();

        if self.credentials.is_none() {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        if let Some(max) = self.config.max_reconnect_attempts {
            if self.attempt >= max {
                warn!(attempts = self.attempt, "Max reconnect attempts reached");
                self.credentials = None;
                self.set_state(ConnectionState::Disconnected);
                let _ = self.event_tx.send(ClientEvent::ReconnectExhausted {
                    attempts: self.attempt,
                });
                return;
            }
        }

        let delay = self.backoff.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.reconnect_at = Some(Box::pin(time::sleep(delay)));
        self.set_state(ConnectionState::Reconnecting);

        info!(
            reason,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        let _ = self.event_tx.send(ClientEvent::ReconnectScheduled {
            attempt: self.attempt,
            delay,
        });
    }

    fn handle_auth_rejected(&mut self, reason: String) {
        self.drop_link();
        self.reconnect_at = None;
        self.credentials = None;
        self.attempt = 0;
        self.set_state(ConnectionState::Disconnected);

        warn!(reason = %reason, "Credentials rejected, not retrying");
        let _ = self.event_tx.send(ClientEvent::AuthRejected { reason });
    }

    fn reset_idle_deadline(&mut self) {
        let Some(idle) = self.config.idle_timeout else {
            return;
        };
        let deadline = Instant::now() + idle;
        match &mut self.idle_deadline {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.idle_deadline = Some(Box::pin(time::sleep_until(deadline))),
        }
    }

    fn drop_link(&mut self) {
        self.link = None;
        self.connection_id = None;
        self.heartbeat = None;
        self.idle_deadline = None;
        self.announced.clear();
    }

    fn cancel_all(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.reconnect_at = None;
        self.drop_link();
    }
}

async fn wait_pending(
    pending_task: &mut Option<JoinHandle<ClientResult<TransportLink>>>,
) -> Result<ClientResult<TransportLink>, JoinError> {
    match pending_task {
        Some(handle) => handle.await,
        None => pending().await,
    }
}

async fn wait_link(link: &mut Option<TransportLink>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.recv().await,
        None => pending().await,
    }
}

async fn wait_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn wait_sleep(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
