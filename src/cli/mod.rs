//! Command-line interface for tracedock.
//!
//! `tracedock server start` runs both OTLP receivers until SIGINT or SIGTERM;
//! `tracedock version` prints the build version.

use crate::core::config::LogLevel;
use crate::core::{Config, Result, SharedIngestor, TracedockError};
use crate::ingestor::SpanCounter;
use crate::orchestrator::Orchestrator;
use crate::receiver::{GrpcListener, HttpListener};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// OpenTelemetry trace collector front door.
#[derive(Parser, Debug)]
#[command(name = "tracedock")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the trace receivers
    Server {
        /// Server action
        #[command(subcommand)]
        action: ServerCommand,
    },
    /// Print version information
    Version,
}

/// `tracedock server` actions.
#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// Start the GRPC and HTTP receivers
    Start(StartArgs),
}

/// Options of `tracedock server start`.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Bind address of the GRPC receiver, e.g. 0.0.0.0:4317 or :4317
    #[arg(long = "grpc-port", env = "TRACEDOCK_GRPC_ADDR")]
    pub grpc_addr: Option<String>,

    /// Bind address of the HTTP receiver, e.g. 0.0.0.0:4318 or :4318
    #[arg(long = "http-port", env = "TRACEDOCK_HTTP_ADDR")]
    pub http_addr: Option<String>,

    /// Configuration file path (default: /etc/tracedock/config.yaml)
    #[arg(short, long, env = "TRACEDOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

impl StartArgs {
    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref()).map_err(|e| match e {
            TracedockError::Io(e) => TracedockError::config(format!(
                "Failed to read config file {:?}: {}",
                self.config, e
            )),
            other => other,
        })?;

        if let Some(addr) = &self.grpc_addr {
            config.server.grpc_addr = addr.clone();
        }
        if let Some(addr) = &self.http_addr {
            config.server.http_addr = addr.clone();
        }
        if self.debug {
            config.log.level = LogLevel::Debug;
        }

        config.validate()?;
        Ok(config)
    }

    /// Initialize logging based on configuration.
    ///
    /// `RUST_LOG` wins over everything; otherwise `TRACEDOCK_LOG_LEVEL` wins
    /// over the configured level.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = std::env::var("TRACEDOCK_LOG_LEVEL")
            .ok()
            .filter(|_| !self.debug)
            .unwrap_or_else(|| config.log.level.as_str().to_string());

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TracedockError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the tracedock command line.
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Version => {
            println!("tracedock {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        },
        Command::Server {
            action: ServerCommand::Start(args),
        } => start_server(args).await,
    }
}

async fn start_server(args: StartArgs) -> Result<()> {
    let config = args.load_config()?;
    args.init_logging(&config)?;

    let config = Arc::new(config);
    let ingestor: SharedIngestor = Arc::new(SpanCounter::new(Arc::clone(&config)));

    let grpc = GrpcListener::with_ingestor(Arc::clone(&ingestor));
    let http = HttpListener::with_ingestor(ingestor)
        .with_shutdown_timeout(config.server.shutdown_timeout)
        .with_max_body_size(config.server.max_body_size);

    let mut orchestrator = Orchestrator::new();
    orchestrator.add(config.server.grpc_addr.clone(), Arc::new(grpc));
    orchestrator.add(config.server.http_addr.clone(), Arc::new(http));

    orchestrator.run()?;
    tracing::info!("tracedock running");
    tracing::info!("  GRPC receiver on {}", config.server.grpc_addr);
    tracing::info!("  HTTP receiver on {}", config.server.http_addr);

    orchestrator.wait().await
}
