//! Durable Streams Server
//!
//! An append-only, offset-addressed log with replay support, served over HTTP.
//! It is the reference broker the livefeed gateway consumes from.
//!
//! # Features
//!
//! - **Append-only streams**: Create streams and append records with dense `u64` offsets
//! - **Replay support**: Read from any offset to catch up on missed records
//! - **Retention**: Keep only the newest N records per stream
//! - **Long-polling**: Wait for new records with configurable timeout
//! - **Server-Sent Events (SSE)**: Continuous streaming of new records
//!
//! # Example
//!
//! ```rust,no_run
//! use durable_stream::{server, types::ServerOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ServerOptions {
//!         port: 4437,
//!         host: "127.0.0.1".to_string(),
//!         ..Default::default()
//!     };
//!
//!     server::start_server(options).await.unwrap();
//! }
//! ```
//!
//! # Protocol
//!
//! ## Creating a stream
//!
//! ```text
//! PUT /messages HTTP/1.1
//! Stream-Max-Records: 10000
//!
//! Response: 201 Created
//! Stream-Next-Offset: 0
//! ```
//!
//! ## Appending a record
//!
//! ```text
//! POST /messages HTTP/1.1
//!
//! {"Name": "newMessage", ...}
//!
//! Response: 200 OK
//! Stream-Offset: 41
//! Stream-Next-Offset: 42
//! ```
//!
//! ## Reading records
//!
//! ```text
//! GET /messages?offset=-1 HTTP/1.1
//!
//! Response: 200 OK
//! Stream-Next-Offset: 42
//! Content-Type: application/json
//!
//! [{"offset": 0, "data": "eyJOYW1lIjoi...", "timestamp": 1729000000000}, ...]
//! ```
//!
//! ## Long-polling
//!
//! ```text
//! GET /messages?offset=42&live=long-poll HTTP/1.1
//!
//! Response: 204 No Content (if no new data)
//! Stream-Up-To-Date: true
//! ```
//!
//! ## Server-Sent Events
//!
//! ```text
//! GET /messages?offset=0&live=sse HTTP/1.1
//!
//! event: data
//! id: 0
//! data: eyJOYW1lIjoi...
//! ```

pub mod server;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use server::{create_router, start_server, AppState};
pub use store::{AppendNotification, StoreError, StreamStore};
pub use types::{
    Offset, ReadResult, ServerOptions, Stream, StreamConfig, StreamRecord,
    WireRecord,
};
