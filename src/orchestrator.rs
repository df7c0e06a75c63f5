//! Listener orchestration.
//!
//! The [`Orchestrator`] owns every listener keyed by its bind address, starts
//! them together and stops them together once the process is asked to
//! terminate.

use crate::core::{Result, TracedockError};
use crate::receiver::Listener;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No listener is running.
    Stopped,
    /// Every listener has been started.
    Running,
}

/// Starts and stops a set of listeners as one unit.
pub struct Orchestrator {
    state: State,
    listeners: HashMap<String, Arc<dyn Listener>>,
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Create an empty, stopped orchestrator.
    pub fn new() -> Self {
        Self {
            state: State::Stopped,
            listeners: HashMap::new(),
            handles: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Register `listener` to be started on `addr`, replacing any listener
    /// already registered for that address.
    pub fn add(&mut self, addr: impl Into<String>, listener: Arc<dyn Listener>) {
        let addr = addr.into();
        if self.listeners.insert(addr.clone(), listener).is_some() {
            tracing::debug!("Replaced listener registered for {}", addr);
        }
    }

    /// Start every registered listener on its own task and return immediately.
    ///
    /// Start failures are not reported here; each task logs its own.
    pub fn run(&mut self) -> Result<()> {
        if self.state == State::Running {
            return Err(TracedockError::AlreadyRunning);
        }

        if self.listeners.is_empty() {
            return Err(TracedockError::EmptyListenerSet);
        }

        tracing::info!("Starting {} listeners", self.listeners.len());

        for (addr, listener) in &self.listeners {
            let addr = addr.clone();
            let listener = Arc::clone(listener);
            self.handles.push(tokio::spawn(async move {
                if let Err(e) = listener.start(&addr).await {
                    tracing::error!(category = e.category(), "Listener on {} failed: {}", addr, e);
                }
            }));
        }

        self.state = State::Running;
        Ok(())
    }

    /// Block until SIGINT, SIGTERM or [`Orchestrator::shutdown_handle`]
    /// cancellation, then stop every listener.
    ///
    /// Every listener is stopped even if some fail to; the first failure is
    /// returned.
    pub async fn wait(&mut self) -> Result<()> {
        if self.state != State::Running {
            return Err(TracedockError::NotRunning);
        }

        tokio::select! {
            () = shutdown_signal() => {},
            () = self.cancel.cancelled() => tracing::info!("Shutdown requested"),
        }

        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        self.stop_all().await
    }

    async fn stop_all(&mut self) -> Result<()> {
        tracing::info!("Stopping {} listeners", self.listeners.len());

        let mut first_error = None;
        for (addr, listener) in &self.listeners {
            if let Err(e) = listener.stop().await {
                tracing::error!(category = e.category(), "Failed to stop listener on {}: {}", addr, e);
                first_error.get_or_insert(e);
            }
        }

        for handle in self.handles.drain(..) {
            if !handle.is_finished() {
                handle.abort();
            }
        }

        self.state = State::Stopped;
        tracing::info!("All listeners stopped");

        first_error.map_or(Ok(()), Err)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener has been added.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Whether a listener is registered for `addr`.
    pub fn contains(&self, addr: &str) -> bool {
        self.listeners.contains_key(addr)
    }

    /// Token that ends the pending or next [`Orchestrator::wait`] when cancelled.
    ///
    /// A cancelled token is consumed by that `wait`; take a new handle for
    /// later runs.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SharedIngestor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves until stopped; counts calls.
    #[derive(Default)]
    struct StubListener {
        starts: AtomicUsize,
        stops: AtomicUsize,
        stopped: CancellationToken,
        fail_stop: bool,
    }

    #[async_trait::async_trait]
    impl Listener for StubListener {
        async fn start(&self, _addr: &str) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.stopped.cancelled().await;
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stopped.cancel();
            if self.fail_stop {
                return Err(TracedockError::network("stop failed"));
            }
            Ok(())
        }

        fn register_ingestion_callback(&self, _ingestor: SharedIngestor) {}
    }

    #[test]
    fn test_new_is_empty_and_stopped() {
        let orchestrator = Orchestrator::new();
        assert_eq!(orchestrator.state(), State::Stopped);
        assert!(orchestrator.is_empty());
    }

    #[test]
    fn test_add_replaces_same_address() {
        let mut orchestrator = Orchestrator::new();
        orchestrator.add(":4317", Arc::new(StubListener::default()));
        orchestrator.add(":4317", Arc::new(StubListener::default()));
        orchestrator.add(":4318", Arc::new(StubListener::default()));

        assert_eq!(orchestrator.len(), 2);
        assert!(orchestrator.contains(":4317"));
        assert!(!orchestrator.contains(":9999"));
    }

    #[test]
    fn test_run_without_listeners() {
        let mut orchestrator = Orchestrator::new();
        assert!(matches!(orchestrator.run(), Err(TracedockError::EmptyListenerSet)));
        assert_eq!(orchestrator.state(), State::Stopped);
    }

    #[tokio::test]
    async fn test_wait_when_stopped() {
        let mut orchestrator = Orchestrator::new();
        assert!(matches!(orchestrator.wait().await, Err(TracedockError::NotRunning)));
    }

    #[tokio::test]
    async fn test_run_twice() {
        let mut orchestrator = Orchestrator::new();
        orchestrator.add("127.0.0.1:0", Arc::new(StubListener::default()));

        orchestrator.run().unwrap();
        assert!(matches!(orchestrator.run(), Err(TracedockError::AlreadyRunning)));
        assert_eq!(orchestrator.state(), State::Running);

        orchestrator.shutdown_handle().cancel();
        orchestrator.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_every_listener_once() {
        let failing = Arc::new(StubListener {
            fail_stop: true,
            ..Default::default()
        });
        let healthy = Arc::new(StubListener::default());

        let mut orchestrator = Orchestrator::new();
        orchestrator.add("a", failing.clone());
        orchestrator.add("b", healthy.clone());
        orchestrator.run().unwrap();

        orchestrator.shutdown_handle().cancel();
        let err = orchestrator.wait().await.unwrap_err();

        assert_eq!(err.category(), "network");
        assert_eq!(orchestrator.state(), State::Stopped);
        assert_eq!(failing.stops.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_after_wait() {
        let mut orchestrator = Orchestrator::new();
        orchestrator.add("a", Arc::new(StubListener::default()));

        orchestrator.run().unwrap();
        orchestrator.shutdown_handle().cancel();
        orchestrator.wait().await.unwrap();

        assert!(!orchestrator.shutdown_handle().is_cancelled());
        orchestrator.run().unwrap();
        assert_eq!(orchestrator.state(), State::Running);
        orchestrator.shutdown_handle().cancel();
        orchestrator.wait().await.unwrap();
    }
}
