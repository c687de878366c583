use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::{
    api::{self, AppState},
    broker::{Broker, HttpBroker, MemoryBroker},
    config::{BrokerConfig, GatewayConfig},
    error::GatewayError,
    fanout::FanoutConsumer,
    log::LogClient,
    registry::ChannelRegistry,
    replay::ReplayReader,
    session::ClientSession,
};

/// A connected gateway: one log client, one registry, one fan-out consumer
/// and the HTTP surface over them.
pub struct Gateway {
    log: LogClient,
    registry: Arc<ChannelRegistry>,
    cors: CorsLayer,
    config: GatewayConfig,
}

impl Gateway {
    /// Build the configured broker and connect to it, retrying per
    /// `config.reconnect`.
    pub async fn connect(config: GatewayConfig) -> Result<Self, GatewayError> {
        let broker: Arc<dyn Broker> = match &config.broker {
            BrokerConfig::Memory { max_records } => Arc::new(MemoryBroker::new(*max_records)),
            BrokerConfig::Http { url, max_records } => {
                let broker = HttpBroker::new(url.clone());
                Arc::new(match max_records {
                    Some(max) => broker.with_max_records(*max),
                    None => broker,
                })
            }
        };
        Self::with_broker(broker, config).await
    }

    /// Connect over an already constructed broker. `config.broker` is ignored.
    pub async fn with_broker(
        broker: Arc<dyn Broker>,
        config: GatewayConfig,
    ) -> Result<Self, GatewayError> {
        let cors = api::cors_layer(config.frontend_url.as_deref())?;
        let log = LogClient::connect(broker, config.topic.clone(), &config.reconnect).await?;
        let registry = Arc::new(ChannelRegistry::new(config.overflow));

        Ok(Self {
            log,
            registry,
            cors,
            config,
        })
    }

    pub fn log(&self) -> &LogClient {
        &self.log
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// A session driver sharing this gateway's registry and log
    pub fn session(&self) -> ClientSession {
        ClientSession::new(
            self.registry.clone(),
            ReplayReader::new(self.log.clone()),
            self.config.client_buffer,
        )
    }

    /// The fan-out consumer for this gateway. Run exactly one.
    pub fn consumer(&self) -> FanoutConsumer {
        FanoutConsumer::new(
            self.log.clone(),
            self.registry.clone(),
            self.config.reconnect.delay,
        )
    }

    pub fn router(&self, shutdown: CancellationToken) -> Router {
        let state = AppState {
            log: self.log.clone(),
            registry: self.registry.clone(),
            session: self.session(),
            client_buffer: self.config.client_buffer,
            keep_alive: self.config.keep_alive,
            shutdown,
        };
        api::create_router(state, self.cors.clone())
    }

    /// Bind `config.listen` and serve until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(self.config.listen).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires.
    ///
    /// Starts the fan-out consumer, then the HTTP server. On shutdown open
    /// `/watch` streams end and the consumer stops.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), GatewayError> {
        let addr = listener.local_addr()?;
        let consumer = tokio::spawn(self.consumer().run(shutdown.clone()));
        let app = self.router(shutdown.clone());

        info!(
            addr = %addr,
            topic = %self.log.topic(),
            broker = self.log.broker_name(),
            overflow = %self.config.overflow,
            "Starting livefeed gateway"
        );

        let signal = shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;

        shutdown.cancel();
        if let Err(e) = consumer.await {
            error!(error = %e, "Fan-out consumer task failed");
        }

        served?;
        info!("Gateway stopped");
        Ok(())
    }
}
