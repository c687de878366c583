#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use livefeed_core::{
    Broker, ChannelRegistry, ClientSession, FanoutConsumer, LogClient, MemoryBroker,
    OverflowPolicy, ReconnectPolicy, ReplayReader, SessionError, SessionSummary,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// A log, a registry and a running fan-out consumer.
pub struct Harness {
    pub log: LogClient,
    pub registry: Arc<ChannelRegistry>,
    pub cancel: CancellationToken,
    pub client_buffer: usize,
}

impl Harness {
    pub async fn start(overflow: OverflowPolicy, client_buffer: usize) -> Self {
        Self::with_broker(Arc::new(MemoryBroker::default()), overflow, client_buffer).await
    }

    pub async fn with_broker(
        broker: Arc<dyn Broker>,
        overflow: OverflowPolicy,
        client_buffer: usize,
    ) -> Self {
        let log = LogClient::connect(broker, "messages", &ReconnectPolicy::default())
            .await
            .unwrap();
        let registry = Arc::new(ChannelRegistry::new(overflow));
        let cancel = CancellationToken::new();
        tokio::spawn(
            FanoutConsumer::new(log.clone(), registry.clone(), Duration::from_secs(5))
                .run(cancel.clone()),
        );
        Self {
            log,
            registry,
            cancel,
            client_buffer,
        }
    }

    pub fn session(&self) -> ClientSession {
        ClientSession::new(
            self.registry.clone(),
            ReplayReader::new(self.log.clone()),
            self.client_buffer,
        )
    }

    /// Start a client whose transport is an mpsc queue of `transport_capacity`.
    pub fn connect(&self, transport_capacity: usize) -> Client {
        let (tx, rx) = mpsc::channel(transport_capacity);
        let cancel = self.cancel.child_token();
        let session = self.session();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { session.run(tx, cancel).await }
        });
        Client { rx, cancel, handle }
    }

    pub async fn publish_all(&self, range: std::ops::Range<u64>) {
        for i in range {
            self.log.publish(payload(i)).await.unwrap();
        }
    }

    pub async fn wait_for_cursor(&self, target: u64) {
        within(async {
            while self.registry.cursor().load() < target {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
    }

    pub async fn wait_for_clients(&self, n: usize) {
        within(async {
            while self.registry.len() != n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct Client {
    pub rx: mpsc::Receiver<Bytes>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<Result<SessionSummary, SessionError>>,
}

impl Client {
    pub async fn take(&mut self, n: usize) -> Vec<String> {
        let mut frames = Vec::with_capacity(n);
        for _ in 0..n {
            let frame = within(self.rx.recv()).await.expect("session ended early");
            frames.push(String::from_utf8(frame.to_vec()).unwrap());
        }
        frames
    }

    pub async fn finish(self) -> SessionSummary {
        self.cancel.cancel();
        within(self.handle).await.unwrap().unwrap()
    }
}

pub fn payload(i: u64) -> String {
    format!("event-{}", i)
}

pub fn payloads(range: std::ops::Range<u64>) -> Vec<String> {
    range.map(payload).collect()
}

/// Bound every wait in the suite.
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(30), future)
        .await
        .expect("timed out")
}
