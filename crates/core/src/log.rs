//! Log client: one topic of a [`Broker`], plus the startup connection loop.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::{
    broker::{Broker, EventStream},
    error::{LogError, Result},
    types::Offset,
};

/// How startup retries an unreachable broker
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Fixed delay between connection attempts
    pub delay: Duration,

    /// Maximum number of connection attempts (0 = infinite)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: 0, // infinite
        }
    }
}

/// Handle on one topic of the durable log.
#[derive(Clone)]
pub struct LogClient {
    broker: Arc<dyn Broker>,
    topic: String,
}

impl LogClient {
    /// Wrap a broker without checking that it is reachable.
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    /// Connect to the broker, retrying on a fixed delay until it answers.
    ///
    /// With `max_attempts == 0` this never gives up. Otherwise the last error
    /// is reported once every attempt has failed.
    pub async fn connect(
        broker: Arc<dyn Broker>,
        topic: impl Into<String>,
        policy: &ReconnectPolicy,
    ) -> Result<Self> {
        let client = Self::new(broker, topic);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match client.broker.ping(&client.topic).await {
                Ok(()) => {
                    info!(
                        broker = client.broker.name(),
                        topic = %client.topic,
                        attempt,
                        "Connected to durable log"
                    );
                    return Ok(client);
                }
                Err(e) if policy.max_attempts > 0 && attempt >= policy.max_attempts => {
                    error!(
                        topic = %client.topic,
                        attempts = attempt,
                        error = %e,
                        "Max connection attempts reached"
                    );
                    return Err(LogError::ConnectAttemptsExhausted {
                        attempts: attempt,
                        last_error: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        topic = %client.topic,
                        attempt,
                        error = %e,
                        delay_ms = policy.delay.as_millis() as u64,
                        "Durable log unavailable, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    /// Append a record. Returns once the broker acknowledged it.
    pub async fn publish(&self, payload: impl Into<Bytes>) -> Result<Offset> {
        match self.broker.publish(&self.topic, payload.into()).await {
            Ok(offset) => {
                debug!(topic = %self.topic, offset, "Published record");
                Ok(offset)
            }
            Err(e) => {
                error!(topic = %self.topic, error = %e, "Failed to publish record");
                Err(e)
            }
        }
    }

    /// Ordered, unbounded subscription starting at `offset`.
    pub async fn subscribe_from(&self, offset: Offset) -> Result<EventStream> {
        self.broker.subscribe(&self.topic, offset).await
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn broker_name(&self) -> &'static str {
        self.broker.name()
    }
}
