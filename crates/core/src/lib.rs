//! livefeed core
//!
//! Server-Sent Events fan-out over a durable, offset-ordered log. Every
//! connected client first replays the retained history and then receives live
//! events, with no gap and no duplicate at the handover.
//!
//! # Overview
//!
//! - [`LogClient`] - one topic of a [`Broker`] (in-process [`MemoryBroker`] or
//!   remote [`HttpBroker`])
//! - [`FanoutConsumer`] - the single task reading the log and broadcasting
//! - [`ChannelRegistry`] - bounded per-client queues plus the [`LiveCursor`]
//! - [`ClientSession`] - register, replay, go live, deregister
//! - [`Gateway`] - wires the above behind the HTTP API
//!
//! # Handover
//!
//! [`ChannelRegistry::add_channel`] reads the cursor under the same lock that
//! [`ChannelRegistry::broadcast`] holds while advancing it. A client that
//! registers when the cursor reads `n` replays offsets below `n` from the log
//! and receives `n` onwards on its queue.
//!
//! # Example
//!
//! ```ignore
//! use livefeed_core::{BrokerConfig, Gateway, GatewayConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::new(BrokerConfig::http("http://localhost:4437"))
//!     .with_frontend_url("http://localhost:5173");
//!
//!     let gateway = Gateway::connect(config).await?;
//!     gateway.serve(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod broker;
pub mod config;
pub mod cursor;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod log;
pub mod message;
pub mod registry;
pub mod replay;
pub mod session;
pub mod types;

pub use broker::{Broker, EventStream, HttpBroker, MemoryBroker};
pub use config::{BrokerConfig, GatewayConfig};
pub use cursor::LiveCursor;
pub use error::{GatewayError, LogError, ReplayError, SessionError, TransportError};
pub use fanout::FanoutConsumer;
pub use gateway::Gateway;
pub use log::{LogClient, ReconnectPolicy};
pub use message::{FeedMessage, Post};
pub use registry::{BroadcastReport, ChannelRegistry, OverflowPolicy};
pub use replay::ReplayReader;
pub use session::{ClientSession, SessionSummary, Transport};
pub use types::{ClientId, Event, Offset, SessionPhase};
