//! Shared value types for the fan-out layer.

use std::fmt;

use bytes::Bytes;
pub use durable_stream::Offset;
use uuid::Uuid;

/// One record read from the durable log.
///
/// The payload is an already-serialized application message; nothing in the
/// fan-out path looks inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub offset: Offset,
    pub payload: Bytes,
}

impl Event {
    pub fn new(offset: Offset, payload: impl Into<Bytes>) -> Self {
        Self {
            offset,
            payload: payload.into(),
        }
    }
}

/// Identity handed out by the channel registry on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one client registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Channel added to the registry, nothing delivered yet
    Registered,
    /// Backfilling history up to the registration snapshot
    Replaying,
    /// Forwarding broadcast events
    Live,
    /// Channel removed from the registry
    Removed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Registered => write!(f, "registered"),
            SessionPhase::Replaying => write!(f, "replaying"),
            SessionPhase::Live => write!(f, "live"),
            SessionPhase::Removed => write!(f, "removed"),
        }
    }
}
