//! Core types for the durable streams server.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Position of a record inside a stream. Dense, starting at 0.
pub type Offset = u64;

/// A record stored in a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Position of this record in its stream
    pub offset: Offset,
    /// Raw record bytes
    pub data: Vec<u8>,
    /// Timestamp when the record was appended (milliseconds since epoch)
    pub timestamp: i64,
}

/// Stream metadata and retained records.
#[derive(Debug, Clone)]
pub struct Stream {
    /// URL path identifying the stream
    pub path: String,
    /// MIME type of the stream content
    pub content_type: Option<String>,
    /// Retained records, oldest first
    pub records: std::collections::VecDeque<StreamRecord>,
    /// Offset the next append will receive
    pub next_offset: Offset,
    /// Maximum number of retained records (None keeps everything)
    pub max_records: Option<usize>,
    /// Creation timestamp (milliseconds since epoch)
    pub created_at: i64,
}

impl Stream {
    /// Create a new empty stream with the given path.
    pub fn new(path: String) -> Self {
        Self {
            path,
            content_type: None,
            records: std::collections::VecDeque::new(),
            next_offset: 0,
            max_records: None,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Offset of the oldest retained record, or the tail when empty.
    pub fn earliest_offset(&self) -> Offset {
        self.records
            .front()
            .map(|r| r.offset)
            .unwrap_or(self.next_offset)
    }

    /// Append a record and apply retention. Returns the record's offset.
    pub(crate) fn push(&mut self, data: Vec<u8>) -> Offset {
        let offset = self.next_offset;
        self.records.push_back(StreamRecord {
            offset,
            data,
            timestamp: Utc::now().timestamp_millis(),
        });
        self.next_offset += 1;

        if let Some(max) = self.max_records {
            while self.records.len() > max.max(1) {
                self.records.pop_front();
            }
        }
        offset
    }

    /// Records with `offset >= from`, clamped to the earliest retained record.
    pub(crate) fn records_from(&self, from: Offset) -> Vec<StreamRecord> {
        let earliest = self.earliest_offset();
        let skip = from.saturating_sub(earliest) as usize;
        self.records.iter().skip(skip).cloned().collect()
    }
}

/// Configuration for creating a stream.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub content_type: Option<String>,
    /// Overrides the store-wide retention for this stream
    pub max_records: Option<usize>,
}

/// Result of reading from a stream.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Records read from the stream
    pub records: Vec<StreamRecord>,
    /// Next offset to use for subsequent reads
    pub next_offset: Offset,
    /// Whether we've caught up to the tail
    pub up_to_date: bool,
}

/// JSON representation of a record on the wire.
///
/// `data` is base64 (standard alphabet) so arbitrary bytes survive JSON and SSE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub offset: Offset,
    pub data: String,
    pub timestamp: i64,
}

impl From<&StreamRecord> for WireRecord {
    fn from(record: &StreamRecord) -> Self {
        Self {
            offset: record.offset,
            data: STANDARD.encode(&record.data),
            timestamp: record.timestamp,
        }
    }
}

impl WireRecord {
    /// Decode the base64 payload back into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// Server configuration options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Port to listen on (0 for auto-assign)
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Long-poll timeout in milliseconds
    pub long_poll_timeout_ms: u64,
    /// Default retention per stream (None keeps everything)
    pub max_records: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: 4437,
            host: "127.0.0.1".to_string(),
            long_poll_timeout_ms: 30_000,
            max_records: None,
        }
    }
}

/// Parse an offset query value. `-1` and the empty string mean "from the beginning".
pub fn parse_offset(offset: &str) -> Option<Offset> {
    match offset.trim() {
        "" | "-1" => Some(0),
        other => other.parse().ok(),
    }
}

/// Normalize a content type by stripping charset and parameters.
pub fn normalize_content_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}
