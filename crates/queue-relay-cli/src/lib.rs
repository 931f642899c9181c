//! # Queue Relay CLI
//!
//! Command-line entry point for relaying messages between two queues.
//!
//! This module provides:
//! - Command-line parsing with environment fallbacks
//! - Layered configuration (files, environment, flags)
//! - Logging initialization
//! - Backend construction and signal-driven shutdown
//! - Mapping of failures to process exit codes

use clap::{Parser, ValueEnum};
use queue_relay_core::{RelayConfig, RelayDriver, RelayError, RelayStage, RelaySummary};
use queue_relay_runtime::{
    InMemoryConfig, ProviderConfig, QueueBackend, QueueBackendFactory, QueueError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Filter used when neither `--log-level` nor `RUST_LOG` is given
pub const DEFAULT_LOG_FILTER: &str =
    "queue_relay_cli=info,queue_relay_core=info,queue_relay_runtime=info";

const SYSTEM_CONFIG_FILE: &str = "/etc/queue-relay/relay";
const LOCAL_CONFIG_FILE: &str = "config/relay";
const ENV_PREFIX: &str = "QR";

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue Relay - move messages from one queue to another
#[derive(Debug, Parser)]
#[command(name = "queue-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relays messages from a source queue to a destination queue")]
#[command(
    long_about = "Continuously receives batches from a source queue, forwards them to a destination queue and deletes them from the source once forwarded"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging filter, e.g. `debug` or `queue_relay_core=trace`
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Queue to receive from
    #[arg(long)]
    pub source: Option<String>,

    /// Queue to forward to
    #[arg(long)]
    pub destination: Option<String>,

    /// Queue backend
    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// AWS region
    #[arg(long)]
    pub region: Option<String>,

    /// Override the SQS endpoint, e.g. `http://localhost:4566`
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Messages requested per receive call (1-10)
    #[arg(long)]
    pub max_batch_size: Option<u32>,

    /// Long-poll wait per receive call in seconds (0-20)
    #[arg(long)]
    pub wait_time_seconds: Option<u32>,

    /// Stop after this many cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,
}

/// Backends selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    AwsSqs,
    InMemory,
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to create queue backend: {0}")]
    Backend(#[source] QueueError),

    #[error("Relay failed: {0}")]
    Relay(#[from] RelayError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Signal(_) => 1,
            Self::Backend(_) => 2,
            Self::Relay(e) => match e.stage() {
                RelayStage::Receive => 3,
                RelayStage::Forward => 4,
                RelayStage::Acknowledge => 5,
            },
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Relay(#[from] queue_relay_core::ConfigError),

    #[error("Invalid logging filter '{filter}': {message}")]
    Logging { filter: String, message: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Complete relay process configuration
///
/// Every field has a default, so an empty configuration relays
/// `fromQueueName` to `toQueueName` on SQS in `us-east-1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Source, destination and loop settings
    pub relay: RelayConfig,

    /// Queue backend settings
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(ref source) = cli.source {
            self.relay.source = source.clone();
        }
        if let Some(ref destination) = cli.destination {
            self.relay.destination = destination.clone();
        }
        if let Some(size) = cli.max_batch_size {
            self.relay.max_batch_size = size;
        }
        if let Some(wait) = cli.wait_time_seconds {
            self.relay.wait_time_seconds = Some(wait);
        }
        if let Some(cycles) = cli.max_cycles {
            self.relay.max_cycles = Some(cycles);
        }

        match cli.provider {
            Some(ProviderKind::AwsSqs) if !matches!(self.provider, ProviderConfig::AwsSqs(_)) => {
                self.provider = ProviderConfig::AwsSqs(Default::default());
            }
            Some(ProviderKind::InMemory)
                if !matches!(self.provider, ProviderConfig::InMemory(_)) =>
            {
                self.provider = ProviderConfig::InMemory(Default::default());
            }
            _ => {}
        }

        if let ProviderConfig::AwsSqs(ref mut aws) = self.provider {
            if let Some(ref region) = cli.region {
                aws.region = region.clone();
            }
            if let Some(ref endpoint_url) = cli.endpoint_url {
                aws.endpoint_url = Some(endpoint_url.clone());
            }
        }
    }

    /// Provider configuration ready for backend construction
    ///
    /// SQS credentials missing from the configuration are taken from the
    /// standard `AWS_*` environment variables. The in-memory backend gets
    /// the relay's source and destination queues created up front.
    pub fn effective_provider(&self) -> ProviderConfig {
        match self.provider {
            ProviderConfig::AwsSqs(ref aws) => {
                ProviderConfig::AwsSqs(aws.clone().with_env_credentials())
            }
            ProviderConfig::InMemory(ref memory) => {
                let mut queues = memory.queues.clone();
                for name in [&self.relay.source, &self.relay.destination] {
                    if !queues.contains(name) {
                        queues.push(name.clone());
                    }
                }
                ProviderConfig::InMemory(InMemoryConfig {
                    queues,
                    ..memory.clone()
                })
            }
        }
    }
}

/// Load configuration from files, environment and command-line flags
///
/// Sources, later ones overriding earlier ones:
/// 1. `/etc/queue-relay/relay.yaml`
/// 2. `./config/relay.yaml`
/// 3. the `--config` / `QUEUE_RELAY_CONFIG` file, which must exist
/// 4. environment variables prefixed `QR__`, e.g. `QR__RELAY__SOURCE`
/// 5. command-line flags
pub fn load_configuration(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name(SYSTEM_CONFIG_FILE)
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name(LOCAL_CONFIG_FILE)
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(ref path) = cli.config {
        builder = builder.add_source(
            config::File::with_name(&path.to_string_lossy())
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let mut app_config: AppConfig = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    app_config.apply_overrides(cli);
    app_config.relay.validate()?;
    Ok(app_config)
}

// ============================================================================
// Logging
// ============================================================================

/// Build the log filter from `--log-level`, then `RUST_LOG`, then the default
pub fn build_env_filter(log_level: Option<&str>) -> Result<EnvFilter, ConfigError> {
    match log_level {
        Some(level) => EnvFilter::try_new(level).map_err(|e| ConfigError::Logging {
            filter: level.to_string(),
            message: e.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

/// Initialize the global tracing subscriber
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = build_env_filter(cli.log_level.as_deref())?;

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

// ============================================================================
// Relay Execution
// ============================================================================

/// Create the configured queue backend
pub fn create_backend(app_config: &AppConfig) -> Result<Arc<dyn QueueBackend>, CliError> {
    QueueBackendFactory::create_backend(&app_config.effective_provider()).map_err(CliError::Backend)
}

/// Cancel the token on SIGINT or SIGTERM
///
/// Handlers are installed before this returns, so a signal arriving right
/// after startup is not lost.
pub fn spawn_shutdown_listener(shutdown: CancellationToken) -> Result<(), CliError> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(CliError::Signal)?;

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = terminate.recv();

        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = ctrl_c => match result {
                Ok(()) => info!("Received SIGINT (Ctrl+C), stopping after the current cycle"),
                Err(e) => error!(error = %e, "Ctrl+C handler failed; stopping"),
            },
            _ = terminate => {
                info!("Received SIGTERM, stopping after the current cycle");
            },
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });

    Ok(())
}

/// Run the relay with already-loaded configuration until it stops
pub async fn run_relay(
    app_config: AppConfig,
    shutdown: CancellationToken,
) -> Result<RelaySummary, CliError> {
    let backend = create_backend(&app_config)?;

    info!(
        source = %app_config.relay.source,
        destination = %app_config.relay.destination,
        provider = %backend.provider_type(),
        "Starting queue relay"
    );

    let mut driver =
        RelayDriver::new(backend, app_config.relay).map_err(ConfigError::Relay)?;
    Ok(driver.run(shutdown).await?)
}

/// Main CLI entry point
pub async fn run_cli() -> Result<RelaySummary, CliError> {
    let cli = Cli::parse();

    // Initialize logging
    initialize_logging(&cli)?;

    // Load configuration
    let app_config = load_configuration(&cli)?;

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone())?;

    run_relay(app_config, shutdown).await
}
