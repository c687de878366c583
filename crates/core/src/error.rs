use thiserror::Error;

/// Errors talking to the durable log
#[derive(Error, Debug)]
pub enum LogError {
    /// The broker could not be reached or refused the connection
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker answered with a non-success status
    #[error("Broker rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// HTTP error from reqwest
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error from the embedded store
    #[error("Store error: {0}")]
    Store(#[from] durable_stream::StoreError),

    /// A record arrived in a shape we cannot decode
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// The subscription ended before the requested offset was reached
    #[error("Subscription ended")]
    SubscriptionEnded,

    /// Startup gave up after the configured number of attempts
    #[error("Gave up connecting to broker after {attempts} attempts: {last_error}")]
    ConnectAttemptsExhausted {
        attempts: u32,
        last_error: Box<LogError>,
    },
}

/// Errors writing frames to a client transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The client side of the transport is gone
    #[error("Transport closed")]
    Closed,
}

/// Errors replaying history to one client
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Replay read failed: {0}")]
    Log(#[from] LogError),

    #[error("Replay delivery failed: {0}")]
    Delivery(#[from] TransportError),
}

/// Errors ending a client session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("Live delivery failed: {0}")]
    Transport(#[from] TransportError),
}

/// Result type alias for log operations
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors starting or running the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Log(#[from] LogError),

    /// The configured frontend URL cannot be used as a CORS origin
    #[error("Invalid frontend URL '{0}'")]
    InvalidOrigin(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}
