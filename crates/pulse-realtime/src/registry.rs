//! Topic subscriptions.
//!
//! The registry is the single source of truth for which topics are active.
//! A topic is active exactly while it has at least one handler. Activation
//! and deactivation are reported to the connection manager, which decides
//! whether a control frame goes out now or on the next open.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use pulse_protocol::{InboundFrame, Topic};
use tokio::sync::mpsc;
use tracing::debug;

type HandlerFn = dyn Fn(&InboundFrame) + Send + Sync;

/// A frame callback. Identity is the identity of the shared closure, so
/// clones of one `Handler` are the same handler.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new(f: impl Fn(&InboundFrame) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, frame: &InboundFrame) {
        (self.0)(frame)
    }

    fn key(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Handler {}

impl Hash for Handler {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.key()).finish()
    }
}

/// Change in the active-topic set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicChange {
    Activated(Topic),
    Deactivated(Topic),
}

struct Inner {
    /// `(topic, handler)` pairs in subscription order.
    entries: Vec<(Topic, Handler)>,
    changes: mpsc::UnboundedSender<TopicChange>,
}

impl Inner {
    fn has_topic(&self, topic: &Topic) -> bool {
        self.entries.iter().any(|(t, _)| t == topic)
    }
}

/// Shared subscription registry. Clones share state.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SubscriptionRegistry {
    /// Create a registry and the receiver for its topic changes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TopicChange>) {
        let (changes, rx) = mpsc::unbounded_channel();
        let registry = Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: Vec::new(),
                changes,
            })),
        };
        (registry, rx)
    }

    /// Register `handler` for `topic`. Returns false if it was already registered.
    pub fn subscribe(&self, topic: impl Into<Topic>, handler: &Handler) -> bool {
        let topic = topic.into();
        let mut inner = self.inner.lock();

        if inner
            .entries
            .iter()
            .any(|(t, h)| *t == topic && h == handler)
        {
            return false;
        }

        let activated = !inner.has_topic(&topic);
        inner.entries.push((topic.clone(), handler.clone()));

        if activated {
            debug!(topic = %topic, "Topic activated");
            // Sent under the lock so changes arrive in mutation order.
            let _ = inner.changes.send(TopicChange::Activated(topic));
        }
        true
    }

    /// Remove `handler` from `topic`. Returns false if it was not registered.
    pub fn unsubscribe(&self, topic: impl Into<Topic>, handler: &Handler) -> bool {
        let topic = topic.into();
        let mut inner = self.inner.lock();

        let Some(index) = inner
            .entries
            .iter()
            .position(|(t, h)| *t == topic && h == handler)
        else {
            return false;
        };
        inner.entries.remove(index);

        if !inner.has_topic(&topic) {
            debug!(topic = %topic, "Topic deactivated");
            let _ = inner.changes.send(TopicChange::Deactivated(topic));
        }
        true
    }

    /// Topics with at least one handler.
    pub fn active_topics(&self) -> BTreeSet<Topic> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn is_active(&self, topic: &Topic) -> bool {
        self.inner.lock().has_topic(topic)
    }

    /// Every distinct handler, in the order it was first subscribed.
    pub fn handlers(&self) -> Vec<Handler> {
        let inner = self.inner.lock();
        let mut handlers: Vec<Handler> = Vec::new();
        for (_, handler) in &inner.entries {
            if !handlers.contains(handler) {
                handlers.push(handler.clone());
            }
        }
        handlers
    }
}
