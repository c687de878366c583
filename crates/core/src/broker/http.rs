use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use durable_stream::server::{MAX_RECORDS_HEADER, OFFSET_HEADER};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use reqwest_eventsource::{Event as SseEvent, EventSource};
use tracing::{debug, info, warn};

use super::{Broker, EventStream, topic_path};
use crate::{
    error::LogError,
    types::{Event, Offset},
};

/// Broker speaking the durable streams HTTP protocol.
///
/// Appends are plain `POST`s; subscriptions are SSE reads (`live=sse`) where
/// every `data` event carries the record offset as its id and the record
/// bytes as base64.
#[derive(Clone)]
pub struct HttpBroker {
    /// Base URL of the durable streams server
    endpoint: String,

    /// Retention requested when the topic is created
    max_records: Option<usize>,

    client: Client,
}

impl HttpBroker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_records: None,
            client: Client::new(),
        }
    }

    /// Ask the server to retain at most `max` records when creating the topic
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }

    fn topic_url(&self, topic: &str) -> String {
        format!(
            "{}{}",
            self.endpoint.trim_end_matches('/'),
            topic_path(topic)
        )
    }

    fn subscribe_url(&self, topic: &str, from: Offset) -> String {
        format!("{}?offset={}&live=sse", self.topic_url(topic), from)
    }
}

#[async_trait]
impl Broker for HttpBroker {
    async fn ping(&self, topic: &str) -> Result<(), LogError> {
        let mut request = self.client.put(self.topic_url(topic));
        if let Some(max) = self.max_records {
            request = request.header(MAX_RECORDS_HEADER, max.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| LogError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            status => Err(rejected(status, response).await),
        }
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<Offset, LogError> {
        let response = self
            .client
            .post(self.topic_url(topic))
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response.status(), response).await);
        }

        response
            .headers()
            .get(OFFSET_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| LogError::Malformed(format!("missing {} header", OFFSET_HEADER)))
    }

    async fn subscribe(&self, topic: &str, from: Offset) -> Result<EventStream, LogError> {
        let url = self.subscribe_url(topic, from);
        let mut es = EventSource::new(self.client.get(&url))
            .map_err(|e| LogError::Unavailable(e.to_string()))?;

        info!(url = %url, "Subscribing to durable stream");

        let stream = async_stream::stream! {
            while let Some(event) = es.next().await {
                match event {
                    Ok(SseEvent::Open) => {
                        debug!(url = %url, "SSE connection opened");
                    }
                    Ok(SseEvent::Message(msg)) if msg.event == "data" => {
                        yield decode_record(&msg.id, &msg.data);
                    }
                    Ok(SseEvent::Message(_)) => {
                        // control frames only report the tail position
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "SSE subscription failed");
                        yield Err(LogError::Unavailable(e.to_string()));
                        break;
                    }
                }
            }
            es.close();
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Decode one SSE `data` frame into an event.
fn decode_record(id: &str, data: &str) -> Result<Event, LogError> {
    let offset = id
        .parse()
        .map_err(|_| LogError::Malformed(format!("invalid record offset '{}'", id)))?;
    let payload = STANDARD
        .decode(data.trim())
        .map_err(|e| LogError::Malformed(e.to_string()))?;
    Ok(Event::new(offset, payload))
}

async fn rejected(status: StatusCode, response: reqwest::Response) -> LogError {
    LogError::Rejected {
        status: status.as_u16(),
        message: response.text().await.unwrap_or_default(),
    }
}
