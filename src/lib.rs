//! tracedock - OpenTelemetry trace collector front door.
//!
//! tracedock accepts distributed-tracing data over OTLP/gRPC and OTLP/HTTP at
//! the same time, decodes it into resource span groups and hands every group
//! to a single registered ingestor.
//!
//! # Architecture
//!
//! - `core`: error type, configuration and the ingestion contract
//! - `receiver`: the [`Listener`](receiver::Listener) abstraction and its GRPC
//!   and HTTP implementations
//! - `orchestrator`: starts listeners together, stops them on SIGINT/SIGTERM
//! - `ingestor`: the default span-counting ingestor
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracedock_lib::core::{ResourceSpanGroup, Result};
//! use tracedock_lib::orchestrator::Orchestrator;
//! use tracedock_lib::receiver::{GrpcListener, HttpListener};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ingestor = Arc::new(|groups: &[ResourceSpanGroup]| -> Result<()> {
//!         println!("received {} resource spans", groups.len());
//!         Ok(())
//!     });
//!
//!     let mut orchestrator = Orchestrator::new();
//!     orchestrator.add(":4317", Arc::new(GrpcListener::with_ingestor(ingestor.clone())));
//!     orchestrator.add(":4318", Arc::new(HttpListener::with_ingestor(ingestor)));
//!     orchestrator.run()?;
//!     orchestrator.wait().await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod ingestor;
pub mod orchestrator;
pub mod receiver;

// Re-export core types for convenience
pub use crate::core::{Config, Result, TracedockError};
