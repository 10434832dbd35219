//! Scripted in-memory transport for connection manager tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_realtime::{
    ClientError, ClientEvent, ClientResult, ConnectionManager, ConnectionState, Transport,
    TransportEvent, TransportLink,
};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use url::Url;

/// Upper bound for any single wait in a test (virtual time).
pub const WAIT: Duration = Duration::from_secs(600);

/// Outcome of one connection attempt.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Accept,
    Refuse,
    Reject,
    Hang,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    attempts: Vec<Url>,
}

/// Transport whose attempts follow a script. Unscripted attempts are accepted.
#[derive(Clone)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

/// Test-side view of a [`MockTransport`].
pub struct MockControl {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedReceiver<MockPeer>,
}

pub fn mock_transport(steps: &[Step]) -> (Arc<MockTransport>, MockControl) {
    let script = Arc::new(Mutex::new(Script {
        steps: steps.iter().copied().collect(),
        attempts: Vec::new(),
    }));
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();
    (
        Arc::new(MockTransport {
            script: script.clone(),
            peers: peers_tx,
        }),
        MockControl {
            script,
            peers: peers_rx,
        },
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &Url) -> ClientResult<TransportLink> {
        let step = {
            let mut script = self.script.lock();
            script.attempts.push(url.clone());
            script.steps.pop_front().unwrap_or(Step::Accept)
        };

        match step {
            Step::Accept => {
                let (out_tx, out_rx) = mpsc::channel(64);
                let (in_tx, in_rx) = mpsc::channel(64);
                let _ = self.peers.send(MockPeer {
                    url: url.clone(),
                    sent: out_rx,
                    inbound: in_tx,
                });
                Ok(TransportLink::new(out_tx, in_rx))
            }
            Step::Refuse => Err(ClientError::Connection("connection refused".to_string())),
            Step::Reject => Err(ClientError::Unauthorized("HTTP 401".to_string())),
            Step::Hang => std::future::pending().await,
        }
    }
}

impl MockControl {
    pub fn attempts(&self) -> usize {
        self.script.lock().attempts.len()
    }

    pub fn attempt_urls(&self) -> Vec<Url> {
        self.script.lock().attempts.clone()
    }

    /// Wait for the next accepted connection.
    pub async fn next_peer(&mut self) -> MockPeer {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("transport dropped")
    }
}

/// Server side of an accepted link.
pub struct MockPeer {
    pub url: Url,
    sent: mpsc::Receiver<String>,
    inbound: mpsc::Sender<TransportEvent>,
}

impl MockPeer {
    /// Next frame the client sent, as JSON.
    pub async fn next_frame(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("client link dropped");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Frames already queued by the client.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.sent.try_recv() {
            frames.push(serde_json::from_str(&text).expect("client sent invalid JSON"));
        }
        frames
    }

    pub async fn send(&self, frame: Value) {
        self.send_raw(&frame.to_string()).await;
    }

    pub async fn send_raw(&self, text: &str) {
        self.inbound
            .send(TransportEvent::Text(text.to_string()))
            .await
            .expect("client link dropped");
    }

    pub async fn close(&self, code: Option<u16>) {
        let _ = self
            .inbound
            .send(TransportEvent::Closed {
                code,
                reason: "bye".to_string(),
            })
            .await;
    }
}

pub async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
    let mut rx = manager.watch_state();
    tokio::time::timeout(WAIT, rx.wait_for(|state| *state == target))
        .await
        .expect("timed out waiting for state")
        .expect("manager stopped");
}

/// Receive events until `pick` returns `Some`.
pub async fn next_event<T>(
    events: &mut broadcast::Receiver<ClientEvent>,
    mut pick: impl FnMut(ClientEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if let Some(found) = pick(event) {
                return found;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Let the manager process everything that is ready.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
