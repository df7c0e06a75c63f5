//! Core domain types shared by every receiver.

use crate::core::Result;
use std::sync::Arc;

/// One resource's worth of spans, grouped by instrumentation scope.
///
/// This is the unit of ingestion: both receivers decode their payloads into
/// a sequence of these and hand them to the registered [`TraceIngestor`].
pub type ResourceSpanGroup = opentelemetry_proto::tonic::trace::v1::ResourceSpans;

/// Shared handle to an ingestor, cloned into every receiver.
pub type SharedIngestor = Arc<dyn TraceIngestor>;

/// Downstream consumer of decoded trace data.
///
/// Implementations are invoked concurrently from both receivers and from many
/// in-flight requests at once; no mutual exclusion is provided, so any shared
/// state must carry its own synchronization. The groups are only borrowed for
/// the duration of the call.
#[async_trait::async_trait]
pub trait TraceIngestor: Send + Sync {
    /// Ingest one or more resource span groups, in order.
    async fn ingest(&self, groups: &[ResourceSpanGroup]) -> Result<()>;
}

#[async_trait::async_trait]
impl<F> TraceIngestor for F
where
    F: Fn(&[ResourceSpanGroup]) -> Result<()> + Send + Sync,
{
    async fn ingest(&self, groups: &[ResourceSpanGroup]) -> Result<()> {
        self(groups)
    }
}

/// Count every span across the scope groups of a resource.
pub fn span_count(group: &ResourceSpanGroup) -> usize {
    group.scope_spans.iter().map(|scope| scope.spans.len()).sum()
}

/// Read the `service.name` resource attribute, if present.
pub fn service_name(group: &ResourceSpanGroup) -> Option<&str> {
    use opentelemetry_proto::tonic::common::v1::any_value::Value;

    group
        .resource
        .as_ref()?
        .attributes
        .iter()
        .find(|attr| attr.key == "service.name")
        .and_then(|attr| match attr.value.as_ref()?.value.as_ref()? {
            Value::StringValue(s) => Some(s.as_str()),
            _ => None,
        })
}
