use queue_relay_cli::{run_cli, CliError, ConfigError};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    match run_cli().await {
        Ok(summary) => {
            info!(
                cycles = summary.cycles_completed,
                relayed = summary.messages_relayed,
                "Queue relay finished"
            );
        }
        Err(e) => {
            error!(error = %e, "Queue relay failed");

            // Logging is not up when its own filter was rejected
            if matches!(
                e,
                CliError::Configuration(ConfigError::Logging { .. })
            ) {
                eprintln!("queue-relay: {}", e);
            }

            std::process::exit(e.exit_code());
        }
    }
}
