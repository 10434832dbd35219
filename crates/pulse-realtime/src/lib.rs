//! Live connection for the realtime notification client.
//!
//! This crate provides:
//! - A connection manager actor with heartbeat, idle detection and
//!   reconnection with capped exponential backoff
//! - A subscription registry whose active topics are replayed on every open
//! - A message router that fans frames out to handlers and feeds
//!   notification frames into the notification store
//! - A pluggable transport, with a WebSocket implementation

mod backoff;
mod config;
mod error;
mod events;
mod manager;
mod registry;
mod router;
mod transport;

pub use backoff::Backoff;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use events::{ClientEvent, ConnectionState};
pub use manager::ConnectionManager;
pub use registry::{Handler, SubscriptionRegistry, TopicChange};
pub use router::MessageRouter;
pub use transport::{Transport, TransportEvent, TransportLink, WebSocketTransport};

pub use pulse_protocol::{InboundFrame, Topic};
