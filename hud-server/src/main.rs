//! HUD telemetry server
//!
//! Reads the configured avionics inputs, fuses their telemetry and serves
//! it over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use hud_server::{api, config, manager, state};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Avionics telemetry decoder and traffic fusion server")]
struct Args {
    /// Config file (default ~/.hud/config.ini)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP port from the config file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let config = config::Config::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    info!(inputs = config.inputs.len(), "Starting HUD telemetry server");

    let state = state::AppState::new(config.ignore_radius_mi);
    let app = api::create_router(state.clone());

    let (tx, rx) = manager::fusion_channel();
    let fusion = tokio::spawn(manager::run_fusion(state.clone(), rx, config.cleanup_interval));
    let readers = manager::start_inputs(&state, &config, tx).await;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port.unwrap_or(config.http_port)));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down inputs");
    state.stop_all_inputs().await;
    tokio::task::spawn_blocking(move || {
        for reader in readers {
            let _ = reader.join();
        }
    })
    .await?;
    state.shutdown.cancel();
    fusion.await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
