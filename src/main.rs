//! Realtime state relay - Entry Point
//!
//! Initializes the state store (with fallback), starts the RelayHub actor
//! and, when redis is active, the cross-process fan-out adapter, then
//! accepts websocket connections.

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use sync_relay::{fanout, handle_connection, store, Config, RelayHub};

/// Channel buffer size for hub commands
const CHANNEL_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=sync_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sync_relay=info")),
        )
        .init();

    let config = Config::from_env();

    // Pick the store backend once; a failed redis connection degrades to
    // the in-process store and the hub never knows the difference.
    let (state_store, redis_client) =
        store::connect(config.redis_url.as_deref(), config.ttl).await;

    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let mut hub = RelayHub::new(cmd_rx, state_store);

    // Cross-process fan-out only exists alongside a shared redis store
    if let Some(client) = redis_client {
        let node_id = Uuid::new_v4().to_string();
        match fanout::start(client, node_id.clone(), cmd_tx.clone()).await {
            Ok(publish_tx) => {
                info!("Cross-process fan-out active (node {})", node_id);
                hub = hub.with_fanout(node_id, publish_tx);
            }
            Err(e) => {
                warn!("Fan-out unavailable ({e}), running single-process");
            }
        }
    }

    tokio::spawn(hub.run());
    info!("RelayHub actor started");

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("State relay listening on port {}", config.port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let allowed_origin = config.allowed_origin.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, allowed_origin).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
