//! aigwd - AI Gateway Daemon
//!
//! Control plane and HTTP surface for a multi-backend AI gateway:
//! discovers backends, tracks their health, and relays chat/image/
//! audio requests as normalized event streams.
//!
//! Usage:
//!   aigwd [config.toml]
//!
//! With no config file the gateway starts empty: no static backends,
//! no registry, everything on defaults.

use std::net::SocketAddr;

use aigw_api::{create_router, AppState};
use aigw_control::{ControlPlane, GatewayConfig};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parsed command-line arguments
struct Args {
    /// Gateway config file (TOML)
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let mut result = Args { config_path: None };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                result.config_path = Some(arg.to_string());
            }
            _ => {
                tracing::warn!("Unknown argument: {}", arg);
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"aigwd - AI Gateway Daemon

Usage: aigwd [config.toml]

Options:
  -h, --help    Print this help message

Examples:
  # Run with defaults (no backends until registered)
  aigwd

  # Run with a config file
  aigwd gateway.toml
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aigwd=info,aigw_api=info,aigw_control=info,aigw_client=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting aigwd (AI Gateway Daemon)");

    let args = parse_args();
    let config = match &args.config_path {
        Some(path) => {
            tracing::info!("Loading config from: {}", path);
            GatewayConfig::load_from_file(path)?
        }
        None => {
            tracing::info!("No config file provided, using defaults");
            GatewayConfig::default()
        }
    };

    let port = config.server.port;
    let relay_config = config.relay.clone();

    let plane = ControlPlane::new(config);
    let snapshot = plane.handle();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let plane_task = tokio::spawn(plane.run(shutdown_rx));

    let state = AppState::new(snapshot, relay_config);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Server drained; stop the control plane loop.
    shutdown_tx.send(true).ok();
    plane_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
