//! GRPC OTLP receiver implementation.
//!
//! Serves `opentelemetry.proto.collector.trace.v1.TraceService/Export`.
//! Every resource span group of a request is offered to the ingestor, even when
//! earlier groups were rejected; all failures are reported back in one status.

use super::{IngestorSlot, Lifecycle, Listener};
use crate::core::{Result, SharedIngestor, TracedockError};
use opentelemetry_proto::tonic::collector::trace::v1::{
    trace_service_server::{TraceService, TraceServiceServer},
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use std::net::SocketAddr;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{transport::Server, Request, Response, Status};

/// OTLP/gRPC trace listener.
#[derive(Default)]
pub struct GrpcListener {
    ingestor: IngestorSlot,
    lifecycle: Lifecycle,
}

impl GrpcListener {
    /// Create a listener without an ingestor; one must be registered before `start`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a listener wired to `ingestor`.
    pub fn with_ingestor(ingestor: SharedIngestor) -> Self {
        Self {
            ingestor: IngestorSlot::new(Some(ingestor)),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Address the listener is bound to while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.local_addr()
    }

    /// The trace service backing this listener, sharing its ingestor.
    pub fn trace_service(&self) -> GrpcTraceService {
        GrpcTraceService {
            ingestor: self.ingestor.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Listener for GrpcListener {
    async fn start(&self, addr: &str) -> Result<()> {
        tracing::info!("starting GRPC server at {}", addr);

        if self.ingestor.get().is_none() {
            return Err(TracedockError::NoIngestionCallback);
        }

        let signals = self.lifecycle.begin();
        let _drained = signals.drained.clone().drop_guard();

        let listener = super::bind(addr).await?;
        self.lifecycle.set_local_addr(listener.local_addr().ok());
        tracing::info!("GRPC server listening on {}", addr);

        let result = Server::builder()
            .add_service(TraceServiceServer::new(self.trace_service()))
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                signals.shutdown.cancelled_owned(),
            )
            .await;

        self.lifecycle.set_local_addr(None);

        match result {
            Ok(()) => {
                tracing::info!("GRPC server stopped gracefully");
                Ok(())
            },
            Err(e) => {
                tracing::error!("GRPC server error: {} (bound to {})", e, addr);
                Err(e.into())
            },
        }
    }

    async fn stop(&self) -> Result<()> {
        let Some(signals) = self.lifecycle.take() else {
            return Ok(());
        };

        tracing::info!("stopping GRPC server, waiting for in-flight calls");
        signals.shutdown.cancel();
        signals.drained.cancelled().await;

        Ok(())
    }

    fn register_ingestion_callback(&self, ingestor: SharedIngestor) {
        self.ingestor.set(ingestor);
    }
}

/// GRPC trace service implementation.
pub struct GrpcTraceService {
    ingestor: IngestorSlot,
}

#[tonic::async_trait]
impl TraceService for GrpcTraceService {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> std::result::Result<Response<ExportTraceServiceResponse>, Status> {
        let Some(ingestor) = self.ingestor.get() else {
            tracing::error!("GRPC export rejected: no trace ingestor registered");
            return Err(TracedockError::NoIngestionCallback.into());
        };

        let export_request = request.into_inner();
        tracing::debug!(
            "Export request contains {} resource spans",
            export_request.resource_spans.len()
        );

        let mut failures = Vec::new();
        for group in &export_request.resource_spans {
            if let Err(e) = ingestor.ingest(std::slice::from_ref(group)).await {
                tracing::warn!(category = e.category(), "Failed to ingest resource spans: {}", e);
                failures.push(e);
            }
        }

        if let Some(err) = TracedockError::join(failures) {
            return Err(Status::internal(err.to_string()));
        }

        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}
