//! Durable log brokers.
//!
//! A [`Broker`] is the gateway's view of the append-only log: it can be
//! pinged, appended to, and subscribed to from any offset. Two
//! implementations ship with the crate:
//!
//! - [`MemoryBroker`] embeds a [`durable_stream::StreamStore`] in-process
//! - [`HttpBroker`] talks to a `durable-stream` server over HTTP and SSE

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::{
    error::LogError,
    types::{Event, Offset},
};

mod http;
mod memory;

pub use http::HttpBroker;
pub use memory::MemoryBroker;

/// Ordered stream of records produced by a subscription.
///
/// Errors are yielded in-band so that a consumer can log them and keep reading.
pub type EventStream = BoxStream<'static, Result<Event, LogError>>;

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Check that the broker is reachable and the topic exists, creating it if needed.
    async fn ping(&self, topic: &str) -> Result<(), LogError>;

    /// Append a record and wait for the broker to acknowledge it.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<Offset, LogError>;

    /// Subscribe to a topic starting at `from` (inclusive).
    ///
    /// Offsets older than the earliest retained record start at the earliest
    /// retained record. The stream is unbounded: once caught up it waits for
    /// new appends.
    async fn subscribe(&self, topic: &str, from: Offset) -> Result<EventStream, LogError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Normalize a topic name into a store path.
pub(crate) fn topic_path(topic: &str) -> String {
    format!("/{}", topic.trim_matches('/'))
}
