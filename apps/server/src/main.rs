//! Falcon MCP Server entry point

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use falcon_mcp_core::{branding, ServerConfig};
use falcon_mcp_gateway::{FalconMcpServer, ServerDependencies};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match cli.into_builder().build() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("{}: configuration error: {}", branding::SERVER_NAME, e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[Server] Fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Arc<ServerConfig>) -> anyhow::Result<()> {
    let dependencies = ServerDependencies::from_config(&config)?;
    let server = FalconMcpServer::new(config, dependencies)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    server.run(shutdown).await
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("[Server] Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("[Server] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("[Server] Shutdown signal received");
    shutdown.cancel();
}

/// Initialize tracing: compact console output on stderr (stdout carries the
/// stdio protocol), plus daily-rotated files when a log directory is set
fn init_tracing(config: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // RUST_LOG takes precedence
    // Note: crate names use underscores in tracing targets
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if config.debug { "debug" } else { "info" };
        EnvFilter::new(format!(
            "warn,falcon_mcp={level},falcon_mcp_core={level},falcon_mcp_gateway={level},tower_http=warn"
        ))
    });

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = std::fs::create_dir_all(dir)
                .map_err(|e| e.to_string())
                .and_then(|_| {
                    RollingFileAppender::builder()
                        .rotation(Rotation::DAILY)
                        .filename_prefix(branding::SERVER_NAME)
                        .filename_suffix("log")
                        .build(dir)
                        .map_err(|e| e.to_string())
                });
            match appender {
                Ok(appender) => {
                    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                    let layer = fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_thread_ids(true)
                        .with_line_number(true)
                        .with_file(true)
                        .with_target(true);
                    (Some(layer), Some(guard))
                }
                Err(e) => {
                    eprintln!("Warning: file logging disabled ({}): {}", dir.display(), e);
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
