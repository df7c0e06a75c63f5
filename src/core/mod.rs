//! Core domain types, errors and configuration for tracedock.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{Result, TracedockError};
pub use types::{ResourceSpanGroup, SharedIngestor, TraceIngestor};
