use anyhow::Context;
use console::style;
use durable_stream::{start_server, types::ServerOptions};
use tracing::info;

use crate::shutdown_on_ctrl_c;

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct BrokerCommand {
    /// Host to bind to
    #[arg(long, env = "LIVEFEED_BROKER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to run the log server on
    #[arg(long, env = "LIVEFEED_BROKER_PORT", default_value = "4437")]
    pub port: u16,

    /// Milliseconds a long-poll read waits for new records
    #[arg(long, default_value = "30000")]
    pub long_poll_timeout_ms: u64,

    /// Records kept per topic (all when unset)
    #[arg(long)]
    pub max_records: Option<usize>,
}

impl BrokerCommand {
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            port: self.port,
            host: self.host.clone(),
            long_poll_timeout_ms: self.long_poll_timeout_ms,
            max_records: self.max_records,
        }
    }

    pub async fn execute(&self) -> anyhow::Result<()> {
        let options = self.server_options();

        println!();
        println!("{}", style("Starting durable log server").dim());
        println!("  http://{}:{}/{{topic}}", options.host, options.port);
        println!();

        let shutdown = shutdown_on_ctrl_c();
        tokio::select! {
            result = start_server(options) => result.context("Log server failed")?,
            _ = shutdown.cancelled() => info!("Log server stopped"),
        }
        Ok(())
    }
}
