//! Application messages carried by the feed.
//!
//! Only the write path builds these; readers receive the serialized JSON
//! verbatim and the fan-out layer never parses it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One post on the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Post {
    pub content: String,
    pub time_posted: DateTime<Utc>,
    pub post_id: i64,
}

impl Post {
    /// New post stamped with the current time and a random positive id
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            time_posted: Utc::now(),
            post_id: rand::random_range(0..i64::MAX),
        }
    }
}

/// Envelope written to the log: `{"Name": ..., "Payload": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Name", content = "Payload")]
pub enum FeedMessage {
    #[serde(rename = "newMessage")]
    New(Post),
    #[serde(rename = "deleteMessage")]
    Delete(i64),
}

impl FeedMessage {
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}
