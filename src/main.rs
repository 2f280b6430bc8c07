use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_sequential_thinking::{
    cli::{execute_command, Cli, Commands},
    config::{Config, LogFormat},
    server::{AppState, McpServer},
    storage::FileStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    let storage = match FileStorage::open(
        config.storage.session_paths(),
        config.storage.lock_timeout(),
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to open session");
            return Err(e.into());
        }
    };

    if let Some(backup) = storage.last_backup().await {
        info!(backup = %backup.display(), "Previous session file was unreadable and has been backed up");
    }

    let state = Arc::new(AppState::new(config, storage));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                "Server ready, waiting for requests on stdin..."
            );
            let server = McpServer::new(state);
            if let Err(e) = server.run().await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
            info!("Server shutdown complete");
            Ok(())
        }
        Commands::Session(command) => {
            let result = execute_command(command, &state.thinking).await;
            if result.exit_code == 0 {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            std::process::exit(result.exit_code);
        }
    }
}

/// Initialize tracing/logging. Output goes to stderr; stdout carries MCP.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
