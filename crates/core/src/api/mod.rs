pub mod endpoints;

use std::{sync::Arc, time::Duration};

use axum::{
    Extension, Router,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{
    error::GatewayError, log::LogClient, registry::ChannelRegistry, session::ClientSession,
};

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub log: LogClient,
    pub registry: Arc<ChannelRegistry>,
    pub session: ClientSession,
    /// Capacity of the bridge between a session task and its SSE body
    pub client_buffer: usize,
    pub keep_alive: Duration,
    /// Cancelled on server shutdown; every `/watch` session holds a child token
    pub shutdown: CancellationToken,
}

/// CORS for the feed frontend.
///
/// Allows GET, POST and DELETE from `frontend_url`, or from any origin when
/// no frontend is configured.
pub fn cors_layer(frontend_url: Option<&str>) -> Result<CorsLayer, GatewayError> {
    let origin = match frontend_url {
        Some(url) => {
            let value = HeaderValue::from_str(url.trim_end_matches('/'))
                .map_err(|_| GatewayError::InvalidOrigin(url.to_string()))?;
            AllowOrigin::exact(value)
        }
        None => AllowOrigin::from(Any),
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any))
}

/// Create the gateway router
///
/// Routes:
/// - `GET /watch` - SSE feed: full retained backlog, then live events
/// - `POST /` - publish a new post
/// - `DELETE /` - publish deletions for a list of post ids
/// - `GET /health` - liveness, connected clients and live cursor
pub fn create_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route(
            "/",
            post(endpoints::messages::create_post_handler)
                .delete(endpoints::messages::delete_posts_handler),
        )
        .route("/watch", get(endpoints::watch::watch_handler))
        .route("/health", get(endpoints::health::health_handler))
        .layer(Extension(state))
        .layer(cors)
}
