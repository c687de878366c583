//! In-memory stream storage.
//!
//! Provides a thread-safe in-memory implementation of append-only streams
//! with offset addressing, retention and append notifications for
//! long-polling and SSE.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::types::{normalize_content_type, Offset, ReadResult, Stream, StreamConfig};

/// Error types for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Stream already exists with different configuration")]
    ConfigMismatch,

    #[error("Content-type mismatch: expected {expected}, got {actual}")]
    ContentTypeMismatch { expected: String, actual: String },

    #[error("Invalid offset format: {0}")]
    InvalidOffset(String),

    #[error("Empty body not allowed")]
    EmptyBody,
}

/// Notification sent when new data is appended to a stream.
#[derive(Debug, Clone)]
pub struct AppendNotification {
    pub path: String,
    pub offset: Offset,
}

/// In-memory stream store with long-poll support.
pub struct StreamStore {
    /// Streams indexed by path
    streams: RwLock<HashMap<String, Stream>>,
    /// Broadcast channel for append notifications
    notify_tx: broadcast::Sender<AppendNotification>,
    /// Retention applied to streams created without their own limit
    default_max_records: Option<usize>,
}

impl StreamStore {
    /// Create a new empty stream store that retains every record.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a new stream store keeping at most `max_records` per stream.
    pub fn with_retention(max_records: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            default_max_records: max_records,
            ..Self::default()
        })
    }

    /// Subscribe to append notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AppendNotification> {
        self.notify_tx.subscribe()
    }

    /// Check if a stream exists.
    pub fn has(&self, path: &str) -> bool {
        self.streams.read().contains_key(path)
    }

    /// Get a snapshot of a stream by path.
    pub fn get(&self, path: &str) -> Option<Stream> {
        self.streams.read().get(path).cloned()
    }

    /// Create a new stream.
    ///
    /// Returns Ok(true) if created, Ok(false) if already exists with same config.
    /// Returns Err if already exists with different config.
    pub fn create(&self, path: &str, config: StreamConfig) -> Result<bool, StoreError> {
        let mut streams = self.streams.write();

        if let Some(existing) = streams.get(path) {
            let existing_ct = existing.content_type.as_deref().map(normalize_content_type);
            let new_ct = config.content_type.as_deref().map(normalize_content_type);

            if existing_ct != new_ct {
                return Err(StoreError::ConfigMismatch);
            }

            // Already exists with same config - idempotent
            return Ok(false);
        }

        let mut stream = Stream::new(path.to_string());
        stream.content_type = config.content_type.clone();
        stream.max_records = config.max_records.or(self.default_max_records);

        info!(path = %path, max_records = ?stream.max_records, "Created stream");
        streams.insert(path.to_string(), stream);

        Ok(true)
    }

    /// Delete a stream.
    pub fn delete(&self, path: &str) -> bool {
        let removed = self.streams.write().remove(path).is_some();

        if removed {
            info!(path = %path, "Deleted stream");
        }

        removed
    }

    /// Append one record to a stream.
    ///
    /// # Returns
    /// The offset assigned to the appended record
    pub fn append(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<Offset, StoreError> {
        if data.is_empty() {
            return Err(StoreError::EmptyBody);
        }

        let offset = {
            let mut streams = self.streams.write();

            let stream = streams
                .get_mut(path)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

            if let (Some(ct), Some(stream_ct)) = (content_type, stream.content_type.as_ref()) {
                if normalize_content_type(ct) != normalize_content_type(stream_ct) {
                    return Err(StoreError::ContentTypeMismatch {
                        expected: stream_ct.clone(),
                        actual: ct.to_string(),
                    });
                }
            }

            stream.push(data)
        };

        debug!(path = %path, offset, "Appended to stream");

        // Notify waiters
        let _ = self.notify_tx.send(AppendNotification {
            path: path.to_string(),
            offset,
        });

        Ok(offset)
    }

    /// Read records from a stream starting at the given offset (inclusive).
    ///
    /// Offsets older than the earliest retained record read from the
    /// earliest retained record.
    pub fn read(&self, path: &str, from: Offset) -> Result<ReadResult, StoreError> {
        let streams = self.streams.read();
        let stream = streams
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let records = stream.records_from(from);
        let next_offset = records
            .last()
            .map(|r| r.offset + 1)
            .unwrap_or_else(|| from.max(stream.earliest_offset()).min(stream.next_offset));

        Ok(ReadResult {
            up_to_date: next_offset >= stream.next_offset,
            records,
            next_offset,
        })
    }

    /// Offset of the oldest retained record of a stream.
    pub fn earliest_offset(&self, path: &str) -> Option<Offset> {
        self.streams.read().get(path).map(Stream::earliest_offset)
    }

    /// Offset the next append to a stream will receive.
    pub fn next_offset(&self, path: &str) -> Option<Offset> {
        self.streams.read().get(path).map(|s| s.next_offset)
    }

    /// List all streams.
    pub fn list(&self) -> Vec<String> {
        self.streams.read().keys().cloned().collect()
    }
}

impl Default for StreamStore {
    fn default() -> Self {
        let (notify_tx, _) = broadcast::channel(1024);
        Self {
            streams: RwLock::new(HashMap::new()),
            notify_tx,
            default_max_records: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_stream(store: &StreamStore, path: &str) {
        store
            .create(
                path,
                StreamConfig {
                    content_type: Some("text/plain".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[test]
    fn test_create_and_get_stream() {
        let store = StreamStore::new();
        text_stream(&store, "/test/stream");

        let stream = store.get("/test/stream").unwrap();
        assert_eq!(stream.path, "/test/stream");
        assert_eq!(stream.content_type, Some("text/plain".to_string()));
        assert_eq!(stream.next_offset, 0);
    }

    #[test]
    fn test_create_idempotent() {
        let store = StreamStore::new();

        let config = StreamConfig {
            content_type: Some("text/plain".to_string()),
            ..Default::default()
        };

        let created1 = store.create("/test/stream", config.clone()).unwrap();
        let created2 = store.create("/test/stream", config).unwrap();

        assert!(created1);
        assert!(!created2);
    }

    #[test]
    fn test_create_config_mismatch() {
        let store = StreamStore::new();
        text_stream(&store, "/test/stream");

        let result = store.create(
            "/test/stream",
            StreamConfig {
                content_type: Some("application/json".to_string()),
                ..Default::default()
            },
        );

        assert!(matches!(result, Err(StoreError::ConfigMismatch)));
    }

    #[test]
    fn test_append_assigns_dense_offsets() {
        let store = StreamStore::new();
        text_stream(&store, "/test/stream");

        assert_eq!(store.append("/test/stream", b"a".to_vec(), None).unwrap(), 0);
        assert_eq!(store.append("/test/stream", b"b".to_vec(), None).unwrap(), 1);
        assert_eq!(store.append("/test/stream", b"c".to_vec(), None).unwrap(), 2);
        assert_eq!(store.next_offset("/test/stream"), Some(3));
    }

    #[test]
    fn test_append_and_read() {
        let store = StreamStore::new();
        text_stream(&store, "/test/stream");

        store
            .append("/test/stream", b"hello".to_vec(), Some("text/plain"))
            .unwrap();
        store
            .append("/test/stream", b"world".to_vec(), Some("text/plain"))
            .unwrap();

        let result = store.read("/test/stream", 0).unwrap();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].data, b"hello");
        assert_eq!(result.records[1].data, b"world");
        assert_eq!(result.next_offset, 2);
        assert!(result.up_to_date);
    }

    #[test]
    fn test_read_after_offset() {
        let store = StreamStore::new();
        text_stream(&store, "/test/stream");

        store.append("/test/stream", b"msg1".to_vec(), None).unwrap();
        let second = store.append("/test/stream", b"msg2".to_vec(), None).unwrap();

        let result = store.read("/test/stream", second).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].data, b"msg2");

        let result = store.read("/test/stream", 10).unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.next_offset, 2);
    }

    #[test]
    fn test_retention_moves_earliest_offset() {
        let store = StreamStore::with_retention(Some(3));
        text_stream(&store, "/test/stream");

        for i in 0..10u8 {
            store.append("/test/stream", vec![b'0' + i], None).unwrap();
        }

        assert_eq!(store.earliest_offset("/test/stream"), Some(7));
        let result = store.read("/test/stream", 0).unwrap();
        let offsets: Vec<Offset> = result.records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![7, 8, 9]);
    }

    #[test]
    fn test_content_type_mismatch() {
        let store = StreamStore::new();
        text_stream(&store, "/test/stream");

        let result = store.append("/test/stream", b"{}".to_vec(), Some("application/json"));
        assert!(matches!(result, Err(StoreError::ContentTypeMismatch { .. })));
    }

    #[test]
    fn test_empty_append_rejected() {
        let store = StreamStore::new();
        text_stream(&store, "/test/stream");

        let result = store.append("/test/stream", Vec::new(), None);
        assert!(matches!(result, Err(StoreError::EmptyBody)));
    }

    #[test]
    fn test_append_missing_stream() {
        let store = StreamStore::new();
        let result = store.append("/nope", b"x".to_vec(), None);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_append_notifies_subscribers() {
        let store = StreamStore::new();
        text_stream(&store, "/test/stream");
        let mut rx = store.subscribe();

        store.append("/test/stream", b"x".to_vec(), None).unwrap();

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.path, "/test/stream");
        assert_eq!(notification.offset, 0);
    }

    #[test]
    fn test_delete_then_list() {
        let store = StreamStore::new();
        store.create("/a", StreamConfig::default()).unwrap();
        store.create("/b", StreamConfig::default()).unwrap();

        assert!(store.delete("/a"));
        assert!(!store.delete("/a"));
        assert!(matches!(
            store.append("/a", b"x".to_vec(), None),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.list(), vec!["/b".to_string()]);
    }
}
