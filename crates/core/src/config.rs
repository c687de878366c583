use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use crate::{
    log::ReconnectPolicy,
    registry::{DEFAULT_CLIENT_BUFFER, OverflowPolicy},
};

/// Default topic holding the message feed
pub const DEFAULT_TOPIC: &str = "messages";

/// Default address the gateway listens on
pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);

/// Where the durable log lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerConfig {
    /// Embedded in-process store, lost on restart
    Memory {
        /// Records kept per topic (`None` = unbounded)
        max_records: Option<usize>,
    },
    /// Remote `durable-stream` server
    Http {
        /// Base URL, e.g. `http://localhost:4437`
        url: String,
        /// Retention requested when the topic is created (`None` = server default)
        max_records: Option<usize>,
    },
}

impl BrokerConfig {
    /// Remote broker with the server's default retention
    pub fn http(url: impl Into<String>) -> Self {
        BrokerConfig::Http {
            url: url.into(),
            max_records: None,
        }
    }

    pub fn max_records(&self) -> Option<usize> {
        match self {
            BrokerConfig::Memory { max_records } | BrokerConfig::Http { max_records, .. } => {
                *max_records
            }
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig::Memory { max_records: None }
    }
}

/// Configuration for a gateway instance
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub broker: BrokerConfig,

    /// Log topic carrying the feed
    pub topic: String,

    pub listen: SocketAddr,

    /// Origin allowed by CORS (`None` = any origin)
    pub frontend_url: Option<String>,

    /// Capacity of each client's queue
    pub client_buffer: usize,

    /// What to do with a client whose queue is full
    pub overflow: OverflowPolicy,

    /// Startup connection retries; its delay also paces resubscription
    pub reconnect: ReconnectPolicy,

    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            topic: DEFAULT_TOPIC.to_string(),
            listen: DEFAULT_LISTEN,
            frontend_url: None,
            client_buffer: DEFAULT_CLIENT_BUFFER,
            overflow: OverflowPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            keep_alive: Duration::from_secs(15),
        }
    }
}

impl GatewayConfig {
    /// Create a configuration reading from the given broker
    pub fn new(broker: BrokerConfig) -> Self {
        Self {
            broker,
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Restrict CORS to one frontend origin
    pub fn with_frontend_url(mut self, url: impl Into<String>) -> Self {
        self.frontend_url = Some(url.into());
        self
    }

    pub fn with_client_buffer(mut self, capacity: usize) -> Self {
        self.client_buffer = capacity;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the delay between broker connection attempts
    pub fn with_retry_interval(mut self, delay: Duration) -> Self {
        self.reconnect.delay = delay;
        self
    }

    /// Set maximum connection attempts (0 = infinite)
    pub fn with_max_connect_attempts(mut self, max: u32) -> Self {
        self.reconnect.max_attempts = max;
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }
}
