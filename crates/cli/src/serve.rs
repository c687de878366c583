use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use console::style;
use livefeed_core::{BrokerConfig, Gateway, GatewayConfig, OverflowPolicy};
use tracing::warn;

use crate::shutdown_on_ctrl_c;

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct ServeCommand {
    /// Base URL of the durable log server (embedded in-memory log when unset)
    #[arg(long, env = "LIVEFEED_BROKER_URL")]
    pub broker_url: Option<String>,

    /// Log topic carrying the feed
    #[arg(long, env = "LIVEFEED_TOPIC", default_value = "messages")]
    pub topic: String,

    /// Address to listen on (overrides --port)
    #[arg(long, env = "LIVEFEED_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Port to listen on, on all interfaces
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Frontend origin allowed by CORS (any origin when unset)
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Capacity of each client's queue
    #[arg(long, env = "LIVEFEED_CLIENT_BUFFER", default_value = "256")]
    pub client_buffer: usize,

    /// What to do with a client whose queue is full: drop or disconnect
    #[arg(long, env = "LIVEFEED_OVERFLOW", default_value = "drop")]
    pub overflow: OverflowPolicy,

    /// Seconds between broker connection attempts
    #[arg(long, default_value = "5")]
    pub retry_interval: u64,

    /// Maximum broker connection attempts (0 = infinite)
    #[arg(long, default_value = "0")]
    pub max_connect_attempts: u32,

    /// Records kept per topic; sent to a remote broker when it creates the topic
    #[arg(long)]
    pub max_records: Option<usize>,

    /// Seconds between SSE keep-alive comments
    #[arg(long, default_value = "15")]
    pub keep_alive: u64,
}

impl ServeCommand {
    pub fn gateway_config(&self) -> GatewayConfig {
        let broker = match &self.broker_url {
            Some(url) => BrokerConfig::Http {
                url: url.clone(),
                max_records: self.max_records,
            },
            None => BrokerConfig::Memory {
                max_records: self.max_records,
            },
        };
        let listen = self
            .listen
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], self.port)));

        let mut config = GatewayConfig::new(broker)
            .with_topic(self.topic.clone())
            .with_listen(listen)
            .with_client_buffer(self.client_buffer)
            .with_overflow(self.overflow)
            .with_retry_interval(Duration::from_secs(self.retry_interval))
            .with_max_connect_attempts(self.max_connect_attempts)
            .with_keep_alive(Duration::from_secs(self.keep_alive));
        if let Some(url) = &self.frontend_url {
            config = config.with_frontend_url(url.clone());
        }
        config
    }

    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.gateway_config();

        println!();
        println!("{}{}", style("live").white(), style("feed").green());
        println!("{}", style("Starting SSE gateway").dim());
        println!();

        match &config.broker {
            BrokerConfig::Http { url, .. } => println!("  Broker   {}", url),
            BrokerConfig::Memory { .. } => {
                println!("  Broker   {}", style("embedded (in-memory)").yellow());
                warn!("No broker URL configured, messages will not survive a restart");
            }
        }
        println!("  Topic    {}", config.topic);
        println!(
            "  Frontend {}",
            config.frontend_url.as_deref().unwrap_or("any origin")
        );
        println!();
        println!("  GET    http://{}/watch", config.listen);
        println!("  POST   http://{}/", config.listen);
        println!("  DELETE http://{}/", config.listen);
        println!("  GET    http://{}/health", config.listen);
        println!();
        println!("{}", style("Press Ctrl+C to stop").dim());
        println!();

        let shutdown = shutdown_on_ctrl_c();
        let gateway = tokio::select! {
            gateway = Gateway::connect(config) => gateway.context("Failed to connect to broker")?,
            _ = shutdown.cancelled() => return Ok(()),
        };

        gateway
            .serve(shutdown)
            .await
            .context("Gateway server failed")
    }
}
