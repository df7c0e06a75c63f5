//! Default trace ingestor used by the `tracedock` binary.

use crate::core::{types::span_count, Config, ResourceSpanGroup, Result, TraceIngestor};
use std::sync::Arc;

/// Accepts every group and logs how many spans it carried.
pub struct SpanCounter {
    config: Arc<Config>,
}

impl SpanCounter {
    /// Create a counter holding the loaded configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Configuration the ingestor was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait::async_trait]
impl TraceIngestor for SpanCounter {
    async fn ingest(&self, groups: &[ResourceSpanGroup]) -> Result<()> {
        for group in groups {
            tracing::debug!(
                service = crate::core::types::service_name(group).unwrap_or("unknown"),
                "ingesting {} spans",
                span_count(group)
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::trace::v1::{ScopeSpans, Span};

    #[tokio::test]
    async fn test_accepts_empty_and_populated_groups() {
        let counter = SpanCounter::new(Arc::new(Config::default()));
        let group = ResourceSpanGroup {
            scope_spans: vec![ScopeSpans {
                spans: vec![Span::default(); 3],
                ..Default::default()
            }],
            ..Default::default()
        };

        assert!(counter.ingest(&[]).await.is_ok());
        assert!(counter.ingest(&[ResourceSpanGroup::default(), group]).await.is_ok());
    }

    #[test]
    fn test_keeps_config() {
        let config = Arc::new(Config::default());
        let counter = SpanCounter::new(Arc::clone(&config));
        assert_eq!(counter.config(), config.as_ref());
    }
}
