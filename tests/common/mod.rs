//! Common test utilities and fixtures.
#![allow(dead_code)]

use opentelemetry_proto::tonic::{
    collector::trace::v1::ExportTraceServiceRequest,
    common::v1::{any_value::Value, AnyValue, KeyValue},
    resource::v1::Resource,
    trace::v1::{ScopeSpans, Span},
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracedock_lib::core::{
    types::service_name, ResourceSpanGroup, Result, SharedIngestor, TraceIngestor, TracedockError,
};
use tracedock_lib::receiver::Listener;

/// Listener that serves until stopped, counting every call.
#[derive(Default)]
pub struct MockListener {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub started_on: Mutex<Vec<String>>,
    stopped: CancellationToken,
    fail_start: bool,
    fail_stop: bool,
}

impl MockListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// `start` fails immediately, as if the address could not be bound.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }

    /// `stop` reports an error after stopping.
    pub fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Default::default()
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Listener for MockListener {
    async fn start(&self, addr: &str) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.started_on.lock().push(addr.to_string());

        if self.fail_start {
            return Err(TracedockError::network(format!("Failed to bind to {}", addr)));
        }

        self.stopped.cancelled().await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.cancel();

        if self.fail_stop {
            return Err(TracedockError::network("listener refused to stop"));
        }
        Ok(())
    }

    fn register_ingestion_callback(&self, _ingestor: SharedIngestor) {}
}

/// Ingestor recording every group it accepts, rejecting groups of the given
/// services.
#[derive(Default)]
pub struct RecordingIngestor {
    pub groups: Mutex<Vec<ResourceSpanGroup>>,
    pub calls: AtomicUsize,
    reject: Vec<String>,
}

impl RecordingIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(services: &[&str]) -> Self {
        Self {
            reject: services.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Service names of the accepted groups, in arrival order.
    pub fn services(&self) -> Vec<String> {
        self.groups
            .lock()
            .iter()
            .map(|g| service_name(g).unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait::async_trait]
impl TraceIngestor for RecordingIngestor {
    async fn ingest(&self, groups: &[ResourceSpanGroup]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        for group in groups {
            let service = service_name(group).unwrap_or_default();
            if self.reject.iter().any(|r| r == service) {
                return Err(TracedockError::ingestion(format!("rejected {}", service)));
            }
        }

        self.groups.lock().extend_from_slice(groups);
        Ok(())
    }
}

/// Ingestor that blocks until released, signalling when a call has entered
/// and when it has returned.
#[derive(Default)]
pub struct BlockingIngestor {
    pub entered: CancellationToken,
    pub release: CancellationToken,
    pub finished: CancellationToken,
}

#[async_trait::async_trait]
impl TraceIngestor for BlockingIngestor {
    async fn ingest(&self, _groups: &[ResourceSpanGroup]) -> Result<()> {
        self.entered.cancel();
        self.release.cancelled().await;
        self.finished.cancel();
        Ok(())
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

/// Create a resource span group for `service` with `span_count` spans.
pub fn create_resource_spans(service: &str, span_count: usize) -> ResourceSpanGroup {
    let start = now_nanos();
    let spans = (0..span_count)
        .map(|i| Span {
            trace_id: vec![0xab; 16],
            span_id: ((i as u64) + 1).to_be_bytes().to_vec(),
            name: format!("{}-operation-{}", service, i),
            start_time_unix_nano: start,
            end_time_unix_nano: start + 1_000_000,
            ..Default::default()
        })
        .collect();

    ResourceSpanGroup {
        resource: Some(Resource {
            attributes: vec![KeyValue {
                key: "service.name".to_string(),
                value: Some(AnyValue {
                    value: Some(Value::StringValue(service.to_string())),
                }),
            }],
            ..Default::default()
        }),
        scope_spans: vec![ScopeSpans {
            spans,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Create an export request with one group per service.
pub fn create_export_request(services: &[&str]) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: services.iter().map(|s| create_resource_spans(s, 2)).collect(),
    }
}

/// Poll `addr` until the listener reports its bound address.
pub async fn wait_for_addr(addr: impl Fn() -> Option<SocketAddr>) -> SocketAddr {
    for _ in 0..500 {
        if let Some(addr) = addr() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("listener did not bind within 5s");
}

/// Loopback address on the same port, for listeners bound to all interfaces.
pub fn loopback(addr: SocketAddr) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], addr.port()))
}
