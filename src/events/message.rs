//! Event stream wire messages
//!
//! Every frame on the stream is a JSON envelope `{"event": ..., "data": ...}`.
//! The `data` field is either a plain status string (for `message` events)
//! or a JSON document carrying a [`ChangeEvent`] (for `change-event`).

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Envelope discriminator for status messages
pub const EVENT_MESSAGE: &str = "message";

/// Envelope discriminator for change notifications
pub const EVENT_CHANGE: &str = "change-event";

/// Status payload confirming the subscription is live
pub const DATA_CONNECTED: &str = "connected";

/// The only change kind the monitor acts on
pub const KIND_CONNECTION: &str = "connection";

/// Outer envelope of every frame, and of the reservation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Discriminator (`message` or `change-event`)
    pub event: String,
    /// Status string or nested JSON payload
    #[serde(default)]
    pub data: String,
}

impl SubscriptionMessage {
    /// Decode an envelope from raw JSON text
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::Decode(format!("envelope: {}", e)))
    }

    /// Whether this is the handshake confirming the subscription
    pub fn is_connected_handshake(&self) -> bool {
        self.event == EVENT_MESSAGE && self.data == DATA_CONNECTED
    }

    /// Whether this envelope carries a change payload
    pub fn is_change(&self) -> bool {
        self.event == EVENT_CHANGE
    }
}

/// Lifecycle action reported for a catalog resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Resource was created
    Created,
    /// Resource was deleted
    Deleted,
    /// Resource was updated
    Updated,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::Updated => "updated",
        };
        f.write_str(s)
    }
}

/// One change notification from the catalog
///
/// Equality and ordering only look at `id`: two notifications about the
/// same resource are the same unit of pending work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened to the resource
    pub action: ChangeAction,
    /// Resource category
    pub kind: String,
    /// Catalog identifier of the resource
    pub id: String,
    /// Number of times handling has been retried
    #[serde(skip, default)]
    pub retry_count: u32,
}

impl ChangeEvent {
    /// Create a fresh event with no retries
    pub fn new(action: ChangeAction, kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            action,
            kind: kind.into(),
            id: id.into(),
            retry_count: 0,
        }
    }

    /// Decode the nested change payload of an envelope
    pub fn decode(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| SyncError::Decode(format!("change payload: {}", e)))
    }

    /// Whether this event concerns a connection
    pub fn is_connection(&self) -> bool {
        self.kind == KIND_CONNECTION
    }
}

impl PartialEq for ChangeEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChangeEvent {}

impl PartialOrd for ChangeEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChangeEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.action, self.kind, self.id)?;
        if self.retry_count > 0 {
            write!(f, " (retry {})", self.retry_count)?;
        }
        Ok(())
    }
}

/// What a single inbound frame amounts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Handshake: the subscription is live
    Connected,
    /// A connection change to apply
    Change(ChangeEvent),
    /// Change of a kind the monitor does not handle
    IgnoredKind(ChangeEvent),
    /// Well-formed envelope with nothing to do
    Other(SubscriptionMessage),
}

/// Classify a text frame
pub fn decode_frame(text: &str) -> Result<Decoded> {
    let msg = SubscriptionMessage::decode(text)?;

    if msg.is_connected_handshake() {
        return Ok(Decoded::Connected);
    }

    if msg.is_change() {
        let event = ChangeEvent::decode(&msg.data)?;
        if event.is_connection() {
            return Ok(Decoded::Change(event));
        }
        return Ok(Decoded::IgnoredKind(event));
    }

    Ok(Decoded::Other(msg))
}

/// Turn a binary frame into text
pub fn binary_to_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}
