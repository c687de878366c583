use std::convert::Infallible;

use axum::{
    Extension,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::AppState;

/// GET /watch - SSE feed
///
/// Every retained message up to the moment of connection is replayed, then
/// live messages follow with no gap and no duplicate. Each log payload is sent
/// as one `data:` event.
///
/// The session runs on its own task and writes into a bounded bridge drained
/// by the response body. Dropping the body (client went away) cancels the
/// session, which removes it from the registry.
pub async fn watch_handler(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let (tx, mut rx) = mpsc::channel::<Bytes>(state.client_buffer.max(1));
    let cancel = state.shutdown.child_token();
    let session = state.session.clone();

    info!("Client connected to /watch");
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = session.run(tx, cancel).await {
                warn!(error = %e, "Client session ended with error");
            }
        }
    });

    let guard = cancel.drop_guard();
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(SseEvent::default().data(String::from_utf8_lossy(&frame)));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{Body, HttpBody},
        http::Request,
    };
    use tower::ServiceExt;

    use crate::{api::test_support, types::Event};

    async fn next_chunk(body: &mut Body) -> String {
        let frame = tokio::time::timeout(
            Duration::from_secs(1),
            std::future::poll_fn(|cx| std::pin::Pin::new(&mut *body).poll_frame(cx)),
        )
        .await
        .unwrap()
        .unwrap()
        .unwrap();
        String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_watch_replays_then_streams_live() {
        let state = test_support::state().await;
        state.registry.broadcast(&Event::new(0, "seed"));
        let registry = state.registry.clone();
        let log = state.log.clone();

        let response = test_support::router(state)
            .oneshot(Request::builder().uri("/watch").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");

        let mut body = response.into_body();
        assert_eq!(next_chunk(&mut body).await, "data: seed\n\n");

        while registry.is_empty() {
            tokio::task::yield_now().await;
        }
        let offset = log.publish("live").await.unwrap();
        registry.broadcast(&Event::new(offset, "live"));
        assert_eq!(next_chunk(&mut body).await, "data: live\n\n");

        drop(body);
        tokio::time::timeout(Duration::from_secs(1), async {
            while !registry.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("dropping the response must deregister the client");
    }

    #[tokio::test]
    async fn test_shutdown_ends_open_streams() {
        let state = test_support::state().await;
        let shutdown = state.shutdown.clone();

        let response = test_support::router(state)
            .oneshot(Request::builder().uri("/watch").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut body = response.into_body();

        shutdown.cancel();
        let end = tokio::time::timeout(
            Duration::from_secs(1),
            std::future::poll_fn(|cx| std::pin::Pin::new(&mut body).poll_frame(cx)),
        )
        .await
        .unwrap();
        assert!(end.is_none());
    }
}
