//! Write path: posts and deletions are published to the log, never
//! broadcast directly. Readers see them once the fan-out consumer does.

use axum::{
    Extension, Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    api::AppState,
    log::LogClient,
    message::{FeedMessage, Post},
};

/// Request body for POST /
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
}

/// Request body for DELETE /
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePostsRequest {
    pub post_ids: Vec<i64>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

async fn publish(log: &LogClient, message: &FeedMessage) -> Result<(), Response> {
    let payload = message.encode().map_err(|e| {
        error!(error = %e, "Failed to serialize message");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    log.publish(payload)
        .await
        .map(|_| ())
        .map_err(|e| error_response(StatusCode::BAD_GATEWAY, e.to_string()))
}

/// POST / - publish a new post
pub async fn create_post_handler(
    Extension(state): Extension<AppState>,
    body: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if request.content.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "content is required");
    }

    let post = Post::new(request.content);
    info!(post_id = post.post_id, "Received new post");

    match publish(&state.log, &FeedMessage::New(post)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(response) => response,
    }
}

/// DELETE / - publish one deletion per post id, in request order
pub async fn delete_posts_handler(
    Extension(state): Extension<AppState>,
    body: Result<Json<DeletePostsRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    info!(post_ids = ?request.post_ids, "Received delete request");

    for post_id in request.post_ids {
        if let Err(response) = publish(&state.log, &FeedMessage::Delete(post_id)).await {
            return response;
        }
    }
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request};
    use futures::StreamExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{api::test_support, broker::MemoryBroker};

    fn json_request(method: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn log_values(log: &LogClient, from: u64, count: usize) -> Vec<Value> {
        let mut stream = log.subscribe_from(from).await.unwrap();
        let mut values = Vec::new();
        for _ in 0..count {
            let event = stream.next().await.unwrap().unwrap();
            values.push(serde_json::from_slice(&event.payload).unwrap());
        }
        values
    }

    #[tokio::test]
    async fn test_create_post_publishes_new_message() {
        let state = test_support::state().await;
        let log = state.log.clone();

        let response = test_support::router(state)
            .oneshot(json_request("POST", r#"{"content":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let values = log_values(&log, 1, 1).await;
        assert_eq!(values[0]["Name"], "newMessage");
        assert_eq!(values[0]["Payload"]["Content"], "hello");
        assert!(values[0]["Payload"]["PostId"].as_i64().unwrap() >= 0);
        assert!(values[0]["Payload"]["TimePosted"].is_string());
    }

    #[tokio::test]
    async fn test_create_post_rejects_missing_content() {
        let state = test_support::state().await;

        for body in [r#"{}"#, r#"{"content":""}"#, "not json"] {
            let response = test_support::router(state.clone())
                .oneshot(json_request("POST", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        }
    }

    #[tokio::test]
    async fn test_delete_publishes_one_message_per_id() {
        let state = test_support::state().await;
        let log = state.log.clone();

        let response = test_support::router(state)
            .oneshot(json_request("DELETE", r#"{"postIds":[3,1,2]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let values = log_values(&log, 1, 3).await;
        let ids: Vec<i64> = values
            .iter()
            .map(|v| {
                assert_eq!(v["Name"], "deleteMessage");
                v["Payload"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_broker_failure_is_bad_gateway() {
        let mut state = test_support::state().await;
        // Topic never created, so every append fails
        state.log = LogClient::new(Arc::new(MemoryBroker::default()), "missing");

        let response = test_support::router(state)
            .oneshot(json_request("POST", r#"{"content":"hello"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value["error"].is_string());
    }
}
