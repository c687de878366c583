//! Per-connection control flow: register, replay, go live, deregister.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{SessionError, TransportError},
    registry::{self, ChannelRegistry},
    replay::ReplayReader,
    types::{ClientId, Offset, SessionPhase},
};

/// Ordered sink of opaque frames for one client.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;
}

#[async_trait]
impl Transport for mpsc::Sender<Bytes> {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        mpsc::Sender::send(self, frame)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// What a finished session delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub client_id: ClientId,
    /// Replay boundary taken at registration
    pub offset_at_registration: Offset,
    /// Events delivered from history
    pub replayed: usize,
    /// Events delivered from live broadcast
    pub live: usize,
}

/// Drives one client connection end-to-end.
#[derive(Clone)]
pub struct ClientSession {
    registry: Arc<ChannelRegistry>,
    replay: ReplayReader,
    buffer: usize,
}

impl ClientSession {
    pub fn new(registry: Arc<ChannelRegistry>, replay: ReplayReader, buffer: usize) -> Self {
        Self {
            registry,
            replay,
            buffer,
        }
    }

    /// Run the session until `cancel` fires, the transport fails, or the
    /// registry drops this client.
    ///
    /// The registry entry is removed on every exit path.
    pub async fn run<T>(
        &self,
        mut transport: T,
        cancel: CancellationToken,
    ) -> Result<SessionSummary, SessionError>
    where
        T: Transport,
    {
        let (queue, mut rx) = registry::channel(self.buffer);
        let (client_id, snapshot) = self.registry.add_channel(queue);
        let mut registration = Registration {
            registry: &self.registry,
            client_id,
            phase: SessionPhase::Registered,
        };

        let mut summary = SessionSummary {
            client_id,
            offset_at_registration: snapshot,
            replayed: 0,
            live: 0,
        };
        registration.enter(SessionPhase::Replaying);

        let replayed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(client_id = %client_id, "Client cancelled during replay");
                return Ok(summary);
            }
            result = self.replay.replay_until(snapshot, &mut transport) => result?,
        };
        summary.replayed = replayed;
        registration.enter(SessionPhase::Live);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(client_id = %client_id, "Client connection cancelled");
                    break;
                }
                frame = rx.recv() => match frame {
                    Some(frame) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                debug!(client_id = %client_id, "Client cancelled while writing");
                                break;
                            }
                            result = transport.send(frame) => result?,
                        }
                        summary.live += 1;
                    }
                    None => {
                        info!(client_id = %client_id, "Client dropped by registry");
                        break;
                    }
                },
            }
        }

        drop(registration);
        info!(
            client_id = %client_id,
            replayed = summary.replayed,
            live = summary.live,
            "Client session ended"
        );
        Ok(summary)
    }
}

/// Removes the client from the registry when dropped, on every exit path.
struct Registration<'a> {
    registry: &'a ChannelRegistry,
    client_id: ClientId,
    phase: SessionPhase,
}

impl Registration<'_> {
    fn enter(&mut self, phase: SessionPhase) {
        debug!(client_id = %self.client_id, from = %self.phase, to = %phase, "Session phase change");
        self.phase = phase;
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove_channel(self.client_id);
        self.enter(SessionPhase::Removed);
    }
}
