//! Backfill of historical events for a newly registered client.

use futures::StreamExt;
use tracing::debug;

use crate::{
    error::{LogError, ReplayError},
    log::LogClient,
    session::Transport,
    types::Offset,
};

/// Re-reads the log from its earliest retained record.
#[derive(Clone)]
pub struct ReplayReader {
    log: LogClient,
}

impl ReplayReader {
    pub fn new(log: LogClient) -> Self {
        Self { log }
    }

    /// Deliver every retained event with `offset < target`, in log order.
    ///
    /// Stops at the first event at or past `target`: that event belongs to
    /// live delivery. Returns the number of delivered events. The first
    /// delivery or read failure aborts the whole replay.
    pub async fn replay_until<T>(&self, target: Offset, deliver: &mut T) -> Result<usize, ReplayError>
    where
        T: Transport + ?Sized,
    {
        if target == 0 {
            return Ok(0);
        }

        let mut stream = self.log.subscribe_from(0).await?;
        let mut delivered = 0;

        while let Some(item) = stream.next().await {
            let event = item?;
            if event.offset >= target {
                debug!(offset = event.offset, target, "Replay reached live boundary");
                return Ok(delivered);
            }

            let offset = event.offset;
            deliver.send(event.payload).await?;
            delivered += 1;

            if offset + 1 >= target {
                return Ok(delivered);
            }
        }

        Err(LogError::SubscriptionEnded.into())
    }
}
