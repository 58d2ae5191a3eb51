//! Volpina CLI and HTTP API entry point.
//!
//! Binary name: `volpina`
//!
//! Parses CLI arguments, initializes the store and message service, then
//! dispatches to the requested command or starts the HTTP server.

mod cli;
mod http;
mod state;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    volpina_observe::tracing_setup::init_tracing(cli.otel, cli::log_filter(cli.verbose, cli.quiet))
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "volpina", &mut std::io::stdout());
        return Ok(());
    }

    // Initialize application state (DB, service)
    let state = AppState::init().await?;
    let db_pool = state.db_pool.clone();

    let result = match cli.command {
        Commands::Serve { port, host } => serve(state, host, port, cli.quiet).await,
        Commands::Messages { action } => cli::message::run(&state, action, cli.json).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    db_pool.close().await;
    volpina_observe::tracing_setup::shutdown_tracing();

    result
}

/// Bind the listener and serve the HTTP API until a shutdown signal arrives.
async fn serve(
    state: AppState,
    host: Option<String>,
    port: Option<u16>,
    quiet: bool,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.host.clone());
    let port = port.unwrap_or(state.config.port);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        retention_cap = state.message_service.policy().cap(),
        data_dir = %state.data_dir.display(),
        "HTTP server starting"
    );

    if !quiet {
        println!(
            "  {} Volpina API listening on {}",
            console::style("●").bold(),
            console::style(format!("http://{addr}")).cyan()
        );
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
