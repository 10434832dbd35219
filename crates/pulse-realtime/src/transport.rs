//! Duplex text transport.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, warn};
use url::Url;

use crate::{ClientError, ClientResult};

const CHANNEL_CAPACITY: usize = 100;

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Text(String),
    /// The peer closed the link.
    Closed { code: Option<u16>, reason: String },
    /// The link failed.
    Error(String),
}

/// An open link: a FIFO outbound queue and an inbound event stream.
///
/// Background tasks driving the link are aborted when it is dropped.
pub struct TransportLink {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<TransportEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl TransportLink {
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<TransportEvent>) -> Self {
        Self {
            outbound,
            inbound,
            tasks: Vec::new(),
        }
    }

    /// Tie a background task to the link's lifetime.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Queue a text frame. Fails once the writer is gone.
    pub async fn send(&self, text: String) -> ClientResult<()> {
        self.outbound
            .send(text)
            .await
            .map_err(|_| ClientError::Connection("link writer closed".to_string()))
    }

    /// Next inbound event; `None` once the link is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Opens links to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a link. Credential rejection must surface as
    /// [`ClientError::Unauthorized`] so it is not retried.
    async fn connect(&self, url: &Url) -> ClientResult<TransportLink>;
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> ClientResult<TransportLink> {
        let (ws_stream, _) = match connect_async(url.as_str()).await {
            Ok(connected) => connected,
            Err(tungstenite::Error::Http(response))
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                return Err(ClientError::Unauthorized(format!(
                    "handshake rejected with HTTP {}",
                    response.status()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(CHANNEL_CAPACITY);

        let writer = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = write.close().await;
            debug!("WebSocket writer finished");
        });

        let reader = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                let event = match msg_result {
                    Ok(Message::Text(text)) => TransportEvent::Text(text.to_string()),
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        let _ = in_tx.send(TransportEvent::Closed { code, reason }).await;
                        return;
                    }
                    // Protocol-level ping/pong is answered by tungstenite.
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                if in_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = in_tx
                .send(TransportEvent::Closed {
                    code: None,
                    reason: "stream ended".to_string(),
                })
                .await;
        });

        Ok(TransportLink::new(out_tx, in_rx)
            .with_task(writer)
            .with_task(reader))
    }
}
