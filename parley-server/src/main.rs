//! Parley signaling relay

mod args;

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use args::Args;
use parley_server::constants::*;
use parley_server::listener::{RelayConfig, serve};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(args.debug);
    info!("{}{}", MSG_BANNER, env!("CARGO_PKG_VERSION"));

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "{ERR_BIND}");
            std::process::exit(1);
        }
    };
    info!(%addr, presence = args.presence, "{MSG_LISTENING}");

    let config = RelayConfig {
        presence: args.presence,
        max_connections_per_ip: args.max_connections_per_ip,
    };
    serve(listener, config, setup_shutdown_signal()).await;
}

/// Install the fmt subscriber; `RUST_LOG` wins over `--debug`
fn init_logging(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Setup graceful shutdown signal handling (Ctrl+C)
async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).expect(ERR_SIGNAL_SIGTERM);
        let mut sigint = signal(SignalKind::interrupt()).expect(ERR_SIGNAL_SIGINT);

        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect(ERR_SIGNAL_CTRLC);
    }
}
