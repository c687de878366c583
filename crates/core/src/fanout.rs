//! The single task that reads the log and feeds the registry.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{log::LogClient, registry::ChannelRegistry, types::Offset};

/// Consumes the log from the live cursor and broadcasts every event.
///
/// Exactly one consumer may run per registry: it is the only writer of the
/// cursor.
pub struct FanoutConsumer {
    log: LogClient,
    registry: Arc<ChannelRegistry>,
    retry_interval: Duration,
}

impl FanoutConsumer {
    pub fn new(log: LogClient, registry: Arc<ChannelRegistry>, retry_interval: Duration) -> Self {
        Self {
            log,
            registry,
            retry_interval,
        }
    }

    /// Consume until `cancel` fires.
    ///
    /// Read errors are logged and skipped. When the subscription ends it is
    /// reopened at the next expected offset after `retry_interval`; events
    /// re-delivered by the new subscription are skipped.
    pub async fn run(self, cancel: CancellationToken) {
        let mut next: Offset = self.registry.cursor().load();
        info!(topic = %self.log.topic(), offset = next, "Starting fan-out consumer");

        loop {
            let subscription = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.log.subscribe_from(next) => result,
            };

            match subscription {
                Ok(mut stream) => loop {
                    let item = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!(offset = next, "Fan-out consumer stopped");
                            return;
                        }
                        item = stream.next() => item,
                    };

                    match item {
                        Some(Ok(event)) => {
                            if event.offset < next {
                                debug!(offset = event.offset, next, "Skipping re-delivered event");
                                continue;
                            }
                            if event.offset > next {
                                warn!(
                                    expected = next,
                                    offset = event.offset,
                                    "Log skipped ahead, records before it are no longer retained"
                                );
                            }
                            next = event.offset + 1;
                            self.registry.broadcast(&event);
                        }
                        Some(Err(e)) => {
                            error!(offset = next, error = %e, "Error reading from log");
                        }
                        None => {
                            warn!(offset = next, "Log subscription ended, resubscribing");
                            break;
                        }
                    }
                },
                Err(e) => {
                    error!(offset = next, error = %e, "Failed to subscribe to log");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }

        info!(offset = next, "Fan-out consumer stopped");
    }
}
