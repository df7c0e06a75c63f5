//! OpenTelemetry receiver implementation.
//!
//! This module implements the GRPC and HTTP receivers for OTLP trace data.
//! Both are [`Listener`]s: they bind an address, decode incoming payloads into
//! [`ResourceSpanGroup`](crate::core::ResourceSpanGroup)s and hand them to the
//! registered [`TraceIngestor`](crate::core::TraceIngestor).

pub mod grpc;
pub mod http;
mod json;

pub use grpc::GrpcListener;
pub use http::HttpListener;

use crate::core::{Result, SharedIngestor, TracedockError};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A network-facing ingestion endpoint.
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    /// Bind `addr` and serve until [`Listener::stop`] is called.
    ///
    /// Resolves only once the listener has stopped or failed. Fails with
    /// [`TracedockError::NoIngestionCallback`] before binding if no ingestor
    /// was registered.
    async fn start(&self, addr: &str) -> Result<()>;

    /// Stop accepting new requests, drain in-flight ones and release the socket.
    async fn stop(&self) -> Result<()>;

    /// Register the ingestor receiving decoded trace data. Last write wins.
    fn register_ingestion_callback(&self, ingestor: SharedIngestor);
}

/// Ingestor slot shared between a listener and its request handlers.
#[derive(Clone, Default)]
pub(crate) struct IngestorSlot(Arc<RwLock<Option<SharedIngestor>>>);

impl IngestorSlot {
    pub(crate) fn new(ingestor: Option<SharedIngestor>) -> Self {
        Self(Arc::new(RwLock::new(ingestor)))
    }

    pub(crate) fn set(&self, ingestor: SharedIngestor) {
        *self.0.write() = Some(ingestor);
    }

    pub(crate) fn get(&self) -> Option<SharedIngestor> {
        self.0.read().clone()
    }
}

/// Shutdown signals of one `start` call.
#[derive(Clone)]
pub(crate) struct ServeSignals {
    /// Cancelled by `stop` to begin a graceful drain
    pub(crate) shutdown: CancellationToken,
    /// Cancelled by `stop` once the drain grace period is exhausted
    pub(crate) abort: CancellationToken,
    /// Cancelled by `start` once the server has fully stopped
    pub(crate) drained: CancellationToken,
}

/// Tracks the serving state shared by `start` and `stop`.
#[derive(Default)]
pub(crate) struct Lifecycle {
    active: Mutex<Option<ServeSignals>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Lifecycle {
    /// Register a new serve loop, replacing any previous one.
    pub(crate) fn begin(&self) -> ServeSignals {
        let signals = ServeSignals {
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
            drained: CancellationToken::new(),
        };
        *self.active.lock() = Some(signals.clone());
        signals
    }

    /// Take the signals of the running serve loop, if any.
    pub(crate) fn take(&self) -> Option<ServeSignals> {
        self.active.lock().take()
    }

    pub(crate) fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self.local_addr.lock() = addr;
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

/// Bind a TCP listener, accepting the `:port` shorthand for all interfaces.
pub(crate) async fn bind(addr: &str) -> Result<TcpListener> {
    let resolved = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };

    TcpListener::bind(resolved.as_str())
        .await
        .map_err(|e| TracedockError::network(format!("Failed to bind to {}: {}", addr, e)))
}
