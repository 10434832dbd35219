use std::sync::Arc;

use pulse_notification_store::NotificationSink;
use pulse_protocol::{FrameKind, InboundFrame, NotificationRecord};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use crate::{ClientEvent, SubscriptionRegistry};

/// Delivers application frames.
///
/// Frames carry no topic, so every frame goes to every registered handler
/// and handlers self-filter. Notification frames are also fed into the
/// notification sink.
#[derive(Clone)]
pub struct MessageRouter {
    registry: SubscriptionRegistry,
    sink_tx: Option<mpsc::UnboundedSender<NotificationRecord>>,
    event_tx: broadcast::Sender<ClientEvent>,
}

impl MessageRouter {
    /// With a sink, must be called within a tokio runtime.
    pub fn new(
        registry: SubscriptionRegistry,
        sink: Option<Arc<dyn NotificationSink>>,
        event_tx: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let sink_tx = sink.map(|sink| spawn_sink_worker(sink, event_tx.clone()));
        Self {
            registry,
            sink_tx,
            event_tx,
        }
    }

    /// Route one non-control frame. Returns the number of handlers invoked.
    ///
    /// Never blocks on the sink: notifications are queued and the
    /// `NewNotification` event follows once the sink has taken them.
    pub fn route(&self, frame: &InboundFrame) -> usize {
        match frame.kind() {
            FrameKind::NewMessage => match frame.message() {
                Some(message) => {
                    let _ = self.event_tx.send(ClientEvent::NewMessage(message.clone()));
                }
                None => warn!("new_message frame without 'message' field"),
            },
            FrameKind::NewNotification => match frame.notification() {
                Ok(Some(record)) => self.deliver(record),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Undecodable notification payload"),
            },
            FrameKind::Ping | FrameKind::Pong | FrameKind::Other => {}
        }

        // Cloned out of the lock so handlers may (un)subscribe.
        let handlers = self.registry.handlers();
        for handler in &handlers {
            handler.call(frame);
        }
        handlers.len()
    }

    fn deliver(&self, record: NotificationRecord) {
        match &self.sink_tx {
            Some(sink_tx) => {
                if let Err(mpsc::error::SendError(record)) = sink_tx.send(record) {
                    error!(notification_id = %record.id, "Notification sink stopped");
                }
            }
            None => {
                debug!(notification_id = %record.id, "Live notification");
                let _ = self.event_tx.send(ClientEvent::NewNotification {
                    record,
                    inserted: true,
                });
            }
        }
    }
}

/// Feed queued records to `sink` one at a time on the blocking pool, so
/// storage writes never stall the connection task and keep arrival order.
fn spawn_sink_worker(
    sink: Arc<dyn NotificationSink>,
    event_tx: broadcast::Sender<ClientEvent>,
) -> mpsc::UnboundedSender<NotificationRecord> {
    let (tx, mut rx) = mpsc::unbounded_channel::<NotificationRecord>();
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let sink = sink.clone();
            let accepted = record.clone();
            let inserted = match tokio::task::spawn_blocking(move || sink.accept(accepted)).await {
                Ok(inserted) => inserted,
                Err(e) => {
                    error!(error = %e, notification_id = %record.id, "Notification sink failed");
                    continue;
                }
            };
            debug!(notification_id = %record.id, inserted, "Live notification");
            let _ = event_tx.send(ClientEvent::NewNotification { record, inserted });
        }
    });
    tx
}
