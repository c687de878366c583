use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use durable_stream::{StreamConfig, StreamStore};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::{topic_path, Broker, EventStream};
use crate::{
    error::LogError,
    types::{Event, Offset},
};

/// Broker backed by an in-process [`StreamStore`].
#[derive(Clone)]
pub struct MemoryBroker {
    store: Arc<StreamStore>,
}

impl MemoryBroker {
    /// Create a broker over a fresh store.
    pub fn new(max_records: Option<usize>) -> Self {
        Self::with_store(StreamStore::with_retention(max_records))
    }

    /// Create a broker sharing an existing store.
    pub fn with_store(store: Arc<StreamStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<StreamStore> {
        &self.store
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ping(&self, topic: &str) -> Result<(), LogError> {
        self.store
            .create(&topic_path(topic), StreamConfig::default())
            .map(|_| ())
            .map_err(LogError::from)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<Offset, LogError> {
        Ok(self.store.append(&topic_path(topic), payload.to_vec(), None)?)
    }

    async fn subscribe(&self, topic: &str, from: Offset) -> Result<EventStream, LogError> {
        let path = topic_path(topic);
        if !self.store.has(&path) {
            return Err(durable_stream::StoreError::NotFound(path).into());
        }

        let store = Arc::clone(&self.store);
        let stream = async_stream::stream! {
            // Subscribe before the first read so no append slips between the two
            let mut rx = store.subscribe();
            let mut next = from;

            loop {
                match store.read(&path, next) {
                    Ok(result) => {
                        for record in result.records {
                            next = record.offset + 1;
                            yield Ok(Event::new(record.offset, record.data));
                        }
                    }
                    Err(e) => {
                        yield Err(LogError::from(e));
                        break;
                    }
                }

                match rx.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => {
                        debug!(path = %path, "Store closed, ending subscription");
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
