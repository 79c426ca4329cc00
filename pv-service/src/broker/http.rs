use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Router,
};
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use super::{Channel, DeliveryStream, InMemoryChannel, Publisher, Subscriber};
use crate::pipeline::PipelineError;

/// Hosts named queues over HTTP so meters in other processes can publish.
///
/// Routes:
/// - `GET /health`
/// - `PUT /queues/{queue}` declare (idempotent)
/// - `POST /queues/{queue}` publish the raw request body
/// - `DELETE /queues/{queue}` delete (idempotent)
#[derive(Clone)]
pub struct HttpChannelServer {
    queues: Arc<InMemoryChannel>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl HttpChannelServer {
    pub async fn bind(host: &str, port: u16) -> Result<Self, PipelineError> {
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(|e| PipelineError::Connection(format!("failed to bind {host}:{port}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| PipelineError::Connection(format!("failed to read bound address: {e}")))?;

        let queues = Arc::new(InMemoryChannel::new());
        let app = Router::new()
            .route("/health", get(health))
            .route(
                "/queues/:queue",
                put(declare_queue).post(publish_message).delete(delete_queue),
            )
            .with_state(queues.clone());

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "HTTP channel server error");
            }
        });

        tracing::info!(addr = %local_addr, "HTTP channel listening");

        Ok(Self {
            queues,
            local_addr,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests. Queued messages stay consumable.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

#[async_trait::async_trait]
impl Channel for HttpChannelServer {
    async fn open_channel(&self, queue: &str) -> Result<(), PipelineError> {
        self.queues.open_channel(queue).await
    }

    async fn delete_channel(&self, queue: &str) -> Result<(), PipelineError> {
        self.queues.delete_channel(queue).await
    }
}

#[async_trait::async_trait]
impl Subscriber for HttpChannelServer {
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, PipelineError> {
        self.queues.consume(queue).await
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn declare_queue(
    State(queues): State<Arc<InMemoryChannel>>,
    Path(queue): Path<String>,
) -> StatusCode {
    match queues.open_channel(&queue).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::error!(queue = %queue, error = %e, "queue declaration failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn publish_message(
    State(queues): State<Arc<InMemoryChannel>>,
    Path(queue): Path<String>,
    body: Bytes,
) -> StatusCode {
    metrics::counter!("http_channel_publish_requests_total").increment(1);

    match queues.publish(&queue, body.to_vec()).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            metrics::counter!("http_channel_publish_failed_total").increment(1);
            tracing::error!(queue = %queue, error = %e, "publish failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn delete_queue(
    State(queues): State<Arc<InMemoryChannel>>,
    Path(queue): Path<String>,
) -> StatusCode {
    match queues.delete_channel(&queue).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::error!(queue = %queue, error = %e, "queue deletion failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Producer side of the HTTP channel.
#[derive(Clone)]
pub struct HttpChannelClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpChannelClient {
    /// Probes `GET /health` once; an unreachable endpoint is a connection error.
    pub async fn connect(host: &str, port: u16) -> Result<Self, PipelineError> {
        let base_url = Url::parse(&format!("http://{host}:{port}/")).map_err(|e| {
            PipelineError::Connection(format!("invalid broker address {host}:{port}: {e}"))
        })?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Connection(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(%base_url, "connection attempt");

        let health = base_url
            .join("health")
            .map_err(|e| PipelineError::Connection(e.to_string()))?;
        http.get(health)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                PipelineError::Connection(format!("broker unreachable at {base_url}: {e}"))
            })?;

        tracing::info!("connection established");

        Ok(Self { http, base_url })
    }

    fn queue_url(&self, queue: &str) -> Result<Url, PipelineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PipelineError::Channel(format!("cannot build queue URL from {}", self.base_url))
            })?
            .pop_if_empty()
            .push("queues")
            .push(queue);
        Ok(url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        queue: &str,
    ) -> Result<(), PipelineError> {
        request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| PipelineError::Channel(format!("request for queue '{queue}' failed: {e}")))
    }
}

#[async_trait::async_trait]
impl Channel for HttpChannelClient {
    async fn open_channel(&self, queue: &str) -> Result<(), PipelineError> {
        let url = self.queue_url(queue)?;
        self.send(self.http.put(url), queue).await
    }

    async fn delete_channel(&self, queue: &str) -> Result<(), PipelineError> {
        let url = self.queue_url(queue)?;
        self.send(self.http.delete(url), queue).await
    }
}

#[async_trait::async_trait]
impl Publisher for HttpChannelClient {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), PipelineError> {
        let url = self.queue_url(queue)?;
        self.send(self.http.post(url).body(payload), queue).await
    }
}
