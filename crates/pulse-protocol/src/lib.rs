//! Wire protocol types for the realtime notification client.
//!
//! This crate provides:
//! - Inbound/outbound frame types (`{"type": ..., ...}` JSON objects)
//! - The frame codec used by the connection manager
//! - Notification records shared by the live and push delivery paths
//! - Push payload shapes delivered outside the live connection

mod codec;
mod error;
mod frames;
mod identity;
mod notification;
mod push;

pub use codec::{decode_frame, encode_frame};
pub use error::{ProtocolError, ProtocolResult};
pub use frames::{FrameKind, InboundFrame, OutboundFrame, Topic};
pub use identity::UserIdentity;
pub use notification::{NotificationKind, NotificationRecord};
pub use push::{PushDraft, PushNotification, SERVICE_WORKER_MESSAGE_TYPE};
