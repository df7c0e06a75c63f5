//! Error types for tracedock.

use thiserror::Error;

/// Errors produced by listeners, the orchestrator and configuration loading.
#[derive(Error, Debug)]
pub enum TracedockError {
    /// A listener was started or called before an ingestor was registered
    #[error("no trace ingestor registered")]
    NoIngestionCallback,

    /// `run` called while running
    #[error("orchestrator is already running")]
    AlreadyRunning,

    /// `wait` called while stopped
    #[error("orchestrator is not running")]
    NotRunning,

    /// `run` called with no registered listener
    #[error("no listeners to start")]
    EmptyListenerSet,

    /// Malformed OTLP payload
    #[error("OTEL protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// An ingestor rejected a resource span group
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Several failures of one request, in order
    #[error("{}", join_messages(.0))]
    IngestionFailures(Vec<TracedockError>),

    /// File or socket IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Address resolution or bind failure
    #[error("Network error: {0}")]
    Network(String),

    /// GRPC server failure
    #[error("GRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A graceful drain did not finish in time
    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout {
        /// Grace period that elapsed, in milliseconds
        timeout_ms: u64,
    },
}

/// Result type alias for tracedock operations
pub type Result<T> = std::result::Result<T, TracedockError>;

fn join_messages(errors: &[TracedockError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl TracedockError {
    /// Creates a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new ingestion error, the failure an ingestor reports back
    pub fn ingestion<S: Into<String>>(msg: S) -> Self {
        Self::Ingestion(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Wraps every collected failure into a single error.
    ///
    /// Returns `None` when nothing failed and unwraps a lone failure so callers
    /// see the original message.
    pub fn join(mut errors: Vec<TracedockError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::IngestionFailures(errors)),
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoIngestionCallback
            | Self::AlreadyRunning
            | Self::NotRunning
            | Self::EmptyListenerSet
            | Self::Config(_) => "config",
            Self::Protocol(_) => "protocol",
            Self::Ingestion(_) | Self::IngestionFailures(_) => "ingestion",
            Self::Io(_) => "io",
            Self::Network(_) | Self::Transport(_) => "network",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<TracedockError> for tonic::Status {
    fn from(err: TracedockError) -> Self {
        match err {
            TracedockError::NoIngestionCallback => tonic::Status::unavailable(err.to_string()),
            TracedockError::Protocol(_) => tonic::Status::invalid_argument(err.to_string()),
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}
