//! Channel registry: the process-wide fan-out hub.
//!
//! The registry owns one bounded queue per connected client. It is the only
//! place that touches the live cursor's value and the client map together:
//! [`ChannelRegistry::add_channel`] snapshots the cursor under the same lock
//! that [`ChannelRegistry::broadcast`] holds while advancing it, so a client
//! registering concurrently with a broadcast sees each event exactly once,
//! either in its replay or on its queue.

use std::{collections::HashMap, fmt, str::FromStr};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::{
    cursor::LiveCursor,
    types::{ClientId, Event, Offset},
};

/// Default per-client queue capacity
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// What broadcast does when a client's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the update for that client and keep it connected
    #[default]
    Drop,
    /// Remove the client; its session ends and the viewer reconnects with a full replay
    Disconnect,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Drop => write!(f, "drop"),
            OverflowPolicy::Disconnect => write!(f, "disconnect"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(OverflowPolicy::Drop),
            "disconnect" => Ok(OverflowPolicy::Disconnect),
            other => Err(format!("unknown overflow policy '{}'", other)),
        }
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients whose queue accepted the payload
    pub delivered: usize,
    /// Clients whose queue was full
    pub dropped: usize,
    /// Clients removed during this broadcast (gone, or full under `Disconnect`)
    pub disconnected: usize,
}

/// Create a bounded client queue.
pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
    mpsc::channel(capacity.max(1))
}

/// Registry of connected client queues.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<ClientId, mpsc::Sender<Bytes>>>,
    cursor: LiveCursor,
    overflow: OverflowPolicy,
}

impl ChannelRegistry {
    pub fn new(overflow: OverflowPolicy) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            cursor: LiveCursor::new(),
            overflow,
        }
    }

    /// Register a client queue.
    ///
    /// Returns the new identity and the replay boundary: every event below it
    /// was broadcast before this registration, every event at or above it
    /// will be pushed onto `queue`.
    pub fn add_channel(&self, queue: mpsc::Sender<Bytes>) -> (ClientId, Offset) {
        let id = ClientId::new();
        let mut channels = self.channels.write();
        let snapshot = self.cursor.load();
        channels.insert(id, queue);
        let clients = channels.len();
        drop(channels);

        info!(client_id = %id, offset = snapshot, clients, "Registered client channel");
        (id, snapshot)
    }

    /// Deregister a client. Removing an unknown id is a no-op.
    pub fn remove_channel(&self, id: ClientId) -> bool {
        let removed = self.channels.write().remove(&id).is_some();
        if removed {
            info!(client_id = %id, "Removed client channel");
        } else {
            debug!(client_id = %id, "Client channel already removed");
        }
        removed
    }

    /// Push one event to every registered client without blocking.
    ///
    /// Must only be called by the single log-consuming task, in offset order.
    pub fn broadcast(&self, event: &Event) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut evicted = Vec::new();

        {
            let channels = self.channels.read();
            self.cursor.advance_past(event.offset);

            for (id, queue) in channels.iter() {
                match queue.try_send(event.payload.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        report.dropped += 1;
                        warn!(
                            client_id = %id,
                            offset = event.offset,
                            policy = %self.overflow,
                            "Client queue full, dropping update"
                        );
                        if self.overflow == OverflowPolicy::Disconnect {
                            evicted.push(*id);
                        }
                    }
                    Err(TrySendError::Closed(_)) => evicted.push(*id),
                }
            }
        }

        if !evicted.is_empty() {
            let mut channels = self.channels.write();
            for id in evicted {
                if channels.remove(&id).is_some() {
                    report.disconnected += 1;
                    info!(client_id = %id, "Disconnected client channel");
                }
            }
        }

        debug!(
            offset = event.offset,
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast event"
        );
        report
    }

    /// The live offset cursor
    pub fn cursor(&self) -> &LiveCursor {
        &self.cursor
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(OverflowPolicy::default())
    }
}
