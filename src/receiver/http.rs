//! HTTP OTLP receiver implementation.
//!
//! Implements the OTLP/HTTP trace endpoint (`POST /v1/traces`) for both JSON and
//! protobuf payloads. Protobuf bodies may be gzip-compressed.
//!
//! Responses carry a status code only, with the request's `Content-Type`
//! echoed back; no `ExportTraceServiceResponse` body is written. OTLP SDKs only
//! look at the status code for the success case.
//!
//! Unlike the GRPC receiver, ingestion stops at the first rejected resource
//! span group: there is no partial-success body to report the rest in.

use super::{IngestorSlot, Lifecycle, Listener};
use crate::core::{ResourceSpanGroup, Result, SharedIngestor, TracedockError};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{
        header::{CONTENT_ENCODING, CONTENT_TYPE},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    Router,
};
use flate2::read::GzDecoder;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;
use std::io::Read;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;

/// Path of the OTLP/HTTP trace endpoint.
pub const TRACES_PATH: &str = "/v1/traces";

/// Grace period given to in-flight requests on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum request body size (16 MiB), applied after decompression.
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// OTLP/HTTP trace listener.
pub struct HttpListener {
    ingestor: IngestorSlot,
    lifecycle: Lifecycle,
    shutdown_timeout: Duration,
    max_body_size: usize,
}

impl Default for HttpListener {
    fn default() -> Self {
        Self {
            ingestor: IngestorSlot::default(),
            lifecycle: Lifecycle::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl HttpListener {
    /// Create a listener without an ingestor; one must be registered before `start`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a listener wired to `ingestor`.
    pub fn with_ingestor(ingestor: SharedIngestor) -> Self {
        Self {
            ingestor: IngestorSlot::new(Some(ingestor)),
            ..Self::default()
        }
    }

    /// Set the grace period `stop` waits before closing remaining connections.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the maximum accepted body size in bytes.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Address the listener is bound to while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.local_addr()
    }

    /// Create the HTTP router serving the trace endpoint.
    ///
    /// Every request goes through a single handler so that the content type is
    /// validated before the method and the path.
    pub fn router(&self) -> Router {
        let state = HttpState {
            ingestor: self.ingestor.clone(),
            max_body_size: self.max_body_size,
        };

        Router::new()
            .fallback(handle_request)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

#[async_trait::async_trait]
impl Listener for HttpListener {
    async fn start(&self, addr: &str) -> Result<()> {
        tracing::info!("starting HTTP server at {}", addr);

        if self.ingestor.get().is_none() {
            return Err(TracedockError::NoIngestionCallback);
        }

        let signals = self.lifecycle.begin();
        let _drained = signals.drained.clone().drop_guard();

        let listener = super::bind(addr).await?;
        self.lifecycle.set_local_addr(listener.local_addr().ok());
        tracing::info!("HTTP OTLP receiver listening on {}", addr);

        let builder = auto::Builder::new(TokioExecutor::new());
        let router = self.router();
        let mut connections = JoinSet::new();

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        tracing::warn!("HTTP server on {} failed to accept connection: {}", addr, e);
                        continue;
                    },
                },
                Some(_) = connections.join_next() => continue,
                () = signals.shutdown.cancelled() => break,
            };

            let builder = builder.clone();
            let service = TowerToHyperService::new(router.clone());
            let shutdown = signals.shutdown.clone();

            connections.spawn(async move {
                let conn = builder.serve_connection(TokioIo::new(stream), service);
                tokio::pin!(conn);

                let mut draining = false;
                loop {
                    tokio::select! {
                        result = conn.as_mut() => {
                            if let Err(e) = result {
                                tracing::debug!("HTTP connection from {} closed with error: {}", peer, e);
                            }
                            break;
                        },
                        () = shutdown.cancelled(), if !draining => {
                            draining = true;
                            conn.as_mut().graceful_shutdown();
                        },
                    }
                }
            });
        }

        // Stop accepting before draining.
        drop(listener);

        let forced = tokio::select! {
            () = drain(&mut connections) => false,
            () = signals.abort.cancelled() => true,
        };

        if forced {
            tracing::warn!(
                "HTTP server on {} closing {} connections before their requests drained",
                addr,
                connections.len()
            );
            connections.shutdown().await;
        }

        self.lifecycle.set_local_addr(None);
        tracing::info!("HTTP server on {} stopped", addr);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(signals) = self.lifecycle.take() else {
            return Ok(());
        };

        tracing::info!(
            "stopping HTTP server, draining for up to {:?}",
            self.shutdown_timeout
        );
        signals.shutdown.cancel();

        if tokio::time::timeout(self.shutdown_timeout, signals.drained.cancelled())
            .await
            .is_ok()
        {
            return Ok(());
        }

        signals.abort.cancel();
        signals.drained.cancelled().await;

        Err(TracedockError::Timeout {
            timeout_ms: u64::try_from(self.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn register_ingestion_callback(&self, ingestor: SharedIngestor) {
        self.ingestor.set(ingestor);
    }
}

/// HTTP OTLP server state.
#[derive(Clone)]
struct HttpState {
    ingestor: IngestorSlot,
    max_body_size: usize,
}

/// Payload encodings accepted on the trace endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadFormat {
    Json,
    Protobuf,
}

impl PayloadFormat {
    fn from_headers(headers: &HeaderMap) -> std::result::Result<Self, HttpError> {
        match headers.get(CONTENT_TYPE).map(HeaderValue::as_bytes) {
            Some(b"application/json") => Ok(Self::Json),
            Some(b"application/x-protobuf") => Ok(Self::Protobuf),
            other => Err(HttpError::UnsupportedMediaType(
                other.map(|v| String::from_utf8_lossy(v).into_owned()),
            )),
        }
    }
}

/// HTTP-specific error type.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Missing or unsupported `Content-Type`
    #[error("unsupported content type: {0:?}")]
    UnsupportedMediaType(Option<String>),

    /// Anything but `POST`
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// Anything but the trace endpoint
    #[error("path {0} not found")]
    NotFound(String),

    /// Unreadable or oversized body
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Undecodable payload, or a missing or failing ingestor
    #[error(transparent)]
    Export(#[from] TracedockError),
}

impl HttpError {
    /// Status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            HttpError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::BadRequest(_) | HttpError::Export(TracedockError::Protocol(_)) => {
                StatusCode::BAD_REQUEST
            },
            HttpError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Handle every request reaching the HTTP receiver.
async fn handle_request(State(state): State<HttpState>, request: Request) -> Response {
    let content_type = request.headers().get(CONTENT_TYPE).cloned();

    let status = match process_request(&state, request).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::warn!("Failed to process HTTP trace export request: {}", e);
            } else {
                tracing::debug!("Rejected HTTP trace export request: {}", e);
            }
            status
        },
    };

    let mut response = status.into_response();
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

async fn process_request(state: &HttpState, request: Request) -> std::result::Result<(), HttpError> {
    let format = PayloadFormat::from_headers(request.headers())?;

    if request.method() != Method::POST {
        return Err(HttpError::MethodNotAllowed(request.method().clone()));
    }

    if !is_traces_path(request.uri().path()) {
        return Err(HttpError::NotFound(request.uri().path().to_string()));
    }

    let ingestor = state.ingestor.get().ok_or(TracedockError::NoIngestionCallback)?;

    let gzip = request
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let body = axum::body::to_bytes(request.into_body(), state.max_body_size)
        .await
        .map_err(|e| HttpError::BadRequest(format!("Failed to read body: {}", e)))?;

    let groups = match format {
        PayloadFormat::Json => vec![super::json::decode_resource_spans(&body)?],
        PayloadFormat::Protobuf => {
            let body = if gzip {
                Bytes::from(gunzip(&body, state.max_body_size)?)
            } else {
                body
            };
            decode_protobuf(&body)?
        },
    };

    tracing::debug!("Received HTTP trace export request with {} resource spans", groups.len());

    for group in &groups {
        ingestor.ingest(std::slice::from_ref(group)).await?;
    }

    Ok(())
}

/// Matches the trace endpoint, with or without a trailing slash.
fn is_traces_path(path: &str) -> bool {
    path.strip_prefix(TRACES_PATH)
        .is_some_and(|rest| rest.is_empty() || rest == "/")
}

/// Parse protobuf OTLP request.
fn decode_protobuf(body: &[u8]) -> Result<Vec<ResourceSpanGroup>> {
    ExportTraceServiceRequest::decode(body)
        .map(|request| request.resource_spans)
        .map_err(|e| TracedockError::protocol(format!("Failed to parse protobuf: {}", e)))
}

/// Decompress a gzip body, refusing output larger than `limit` bytes.
fn gunzip(body: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(body)
        .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
        .read_to_end(&mut decoded)
        .map_err(|e| TracedockError::protocol(format!("Invalid gzip body: {}", e)))?;

    if decoded.len() > limit {
        return Err(TracedockError::protocol(format!(
            "Decompressed body exceeds {} bytes",
            limit
        )));
    }

    Ok(decoded)
}

async fn drain(connections: &mut JoinSet<()>) {
    while connections.join_next().await.is_some() {}
}
