//! sitesync entry point.
//!
//! Binary name: `sitesync`
//!
//! Parses CLI arguments, loads configuration from the environment, then
//! starts the trigger server, the worker server, or a one-off deployment.

mod cli;
mod http;
mod state;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;
use sitesync_infra::config::{resolve_pipeline_config, Settings};
use sitesync_observe::tracing_setup::{init_tracing, shutdown_tracing, LogOptions};

use cli::{Cli, Commands};
use http::router::{build_router, Role};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need configuration
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "sitesync", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&LogOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        json: cli.json_logs,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let result = run(cli.command).await;
    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    shutdown_tracing();
    result
}

async fn run(command: Commands) -> anyhow::Result<()> {
    // Refuse to start without the required environment.
    let settings = Settings::from_env().context("invalid configuration")?;
    settings.check_ssh_key()?;
    let config = resolve_pipeline_config(&settings).await?;

    match command {
        Commands::Serve { port, host } => {
            let state = AppState::for_trigger(&settings, &config);
            serve(state, Role::Trigger, &host, port).await
        }
        Commands::Worker { port, host } => {
            let state = AppState::for_worker(&settings, &config);
            serve(state, Role::Worker, &host, port).await
        }
        Commands::Deploy { branch } => cli::deploy::deploy(&settings, &config, branch).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

async fn serve(state: AppState, role: Role, host: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(state.clone(), role);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, ?role, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Wait for in-flight deployments.
    state.shutdown().await;
    tracing::info!("server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
