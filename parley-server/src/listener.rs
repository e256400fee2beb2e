//! Relay accept loop

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::connection::ConnectionParams;
use crate::connection_tracker::ConnectionTracker;
use crate::constants::*;
use crate::relay::SignalingRelay;
use crate::websocket::handle_websocket_connection;

/// Runtime options for a relay instance
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Announce registrations and disconnects to other peers
    pub presence: bool,
    /// Maximum concurrent connections per IP (0 = unlimited)
    pub max_connections_per_ip: usize,
}

/// Accept signaling connections on `listener` until `shutdown` resolves
///
/// Each connection runs on its own task with one slot from the per-IP
/// connection tracker. Returns the relay so callers can inspect it after
/// shutdown.
pub async fn serve<F>(listener: TcpListener, config: RelayConfig, shutdown: F) -> SignalingRelay
where
    F: Future<Output = ()>,
{
    let relay = SignalingRelay::new(config.presence);
    let tracker = Arc::new(ConnectionTracker::new(config.max_connections_per_ip));

    tokio::select! {
        _ = shutdown => {
            info!("{MSG_SHUTDOWN_RECEIVED}");
        }
        _ = accept_loop(&listener, &relay, &tracker) => {}
    }

    relay
}

async fn accept_loop(listener: &TcpListener, relay: &SignalingRelay, tracker: &Arc<ConnectionTracker>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer_addr)) => {
                // Check connection limit before the handshake
                let Some(connection_guard) = tracker.try_acquire(peer_addr.ip()) else {
                    debug!(ip = %peer_addr.ip(), "{ERR_CONNECTION_LIMIT}");
                    // Just drop the socket - client will see connection reset
                    continue;
                };

                let params = ConnectionParams {
                    peer_addr,
                    relay: relay.clone(),
                };

                tokio::spawn(async move {
                    // Hold guard until connection ends to track active connections
                    let _guard = connection_guard;

                    if let Err(e) = handle_websocket_connection(socket, params).await {
                        log_connection_error(&e, peer_addr);
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "{ERR_ACCEPT}");
            }
        }
    }
}

/// Log connection errors, keeping routine disconnects at debug level
fn log_connection_error(error: &io::Error, peer_addr: SocketAddr) {
    match error.kind() {
        io::ErrorKind::ConnectionReset | io::ErrorKind::TimedOut | io::ErrorKind::InvalidData => {
            debug!(%peer_addr, error = %error, "{ERR_CONNECTION}");
        }
        _ => warn!(%peer_addr, error = %error, "{ERR_CONNECTION}"),
    }
}
