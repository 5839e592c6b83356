//! Cross-process broadcast fan-out
//!
//! When several hub processes share one redis-backed state store, a room
//! broadcast issued on one process must also reach members connected to the
//! others. Every process subscribes to a single shared pub/sub channel;
//! envelopes are tagged with the publishing node's id so a process never
//! re-broadcasts (or re-publishes) its own events.
//!
//! Single-process deployments never construct this adapter; the hub's
//! publisher handle is simply absent and no pub/sub code path runs.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::hub::HubCommand;
use crate::message::ServerMessage;
use crate::types::RoomId;

/// Shared pub/sub channel carrying room-scoped envelopes for all rooms
const CHANNEL: &str = "sync-relay:events";

/// Publish queue capacity; events are dropped with a warning when full
/// (e.g. during a prolonged redis outage)
const PUBLISH_BUFFER: usize = 1024;

/// Initial and maximum backoff for subscriber reconnection
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 30;

/// One cross-process broadcast: origin node, target room, event to re-emit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: String,
    pub room: RoomId,
    pub event: ServerMessage,
}

/// Filter an incoming envelope, dropping those this node published itself
fn accept_remote(envelope: Envelope, node_id: &str) -> Option<(RoomId, ServerMessage)> {
    if envelope.origin == node_id {
        return None;
    }
    Some((envelope.room, envelope.event))
}

/// Start the fan-out adapter: one publisher task, one subscriber task
///
/// The returned sender is handed to the hub, which enqueues locally
/// originated broadcasts on it. Received remote envelopes are injected back
/// into the hub as [`HubCommand::Remote`]. Fails only if the initial
/// publisher connection cannot be established; the caller then runs
/// single-process.
pub async fn start(
    client: redis::Client,
    node_id: String,
    hub_tx: mpsc::Sender<HubCommand>,
) -> Result<mpsc::Sender<Envelope>, StoreError> {
    let publish_conn = redis::aio::ConnectionManager::new(client.clone()).await?;
    let (publish_tx, publish_rx) = mpsc::channel(PUBLISH_BUFFER);

    tokio::spawn(run_publisher(publish_conn, publish_rx));
    tokio::spawn(run_subscriber(client, node_id, hub_tx));

    Ok(publish_tx)
}

/// Drain the publish queue into the shared channel
///
/// `ConnectionManager` reconnects on its own; individual publish failures
/// are logged and the event dropped (best-effort, same policy as a failed
/// local broadcast).
async fn run_publisher(
    mut conn: redis::aio::ConnectionManager,
    mut publish_rx: mpsc::Receiver<Envelope>,
) {
    while let Some(envelope) = publish_rx.recv().await {
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize fan-out envelope: {e}");
                continue;
            }
        };
        let result: Result<i64, _> = redis::cmd("PUBLISH")
            .arg(CHANNEL)
            .arg(json)
            .query_async(&mut conn)
            .await;
        match result {
            Ok(receivers) => {
                debug!(room = %envelope.room, receivers, "Published fan-out event");
            }
            Err(e) => {
                warn!(room = %envelope.room, "Fan-out publish failed: {e}");
            }
        }
    }
    debug!("Fan-out publisher stopped");
}

/// Subscribe to the shared channel and forward remote events to the hub
///
/// The pub/sub connection cannot be managed by `ConnectionManager`, so this
/// loop resubscribes itself with exponential backoff when the connection
/// drops.
async fn run_subscriber(client: redis::Client, node_id: String, hub_tx: mpsc::Sender<HubCommand>) {
    let mut backoff_secs = INITIAL_BACKOFF_SECS;
    loop {
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                warn!(backoff_secs, "Fan-out subscriber connection failed: {e}");
                tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }
        };
        if let Err(e) = pubsub.subscribe(CHANNEL).await {
            warn!(backoff_secs, "Fan-out subscribe failed: {e}");
            tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
            continue;
        }
        backoff_secs = INITIAL_BACKOFF_SECS;
        info!(channel = CHANNEL, "Subscribed to fan-out channel");

        let mut messages = pubsub.on_message();
        while let Some(msg) = messages.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Invalid fan-out payload: {e}");
                    continue;
                }
            };
            let envelope: Envelope = match serde_json::from_str(&payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Malformed fan-out envelope: {e}");
                    continue;
                }
            };
            let Some((room, event)) = accept_remote(envelope, &node_id) else {
                continue;
            };
            if hub_tx.send(HubCommand::Remote { room, event }).await.is_err() {
                debug!("Hub closed, stopping fan-out subscriber");
                return;
            }
        }
        warn!("Fan-out subscription ended, reconnecting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(origin: &str) -> Envelope {
        Envelope {
            origin: origin.to_string(),
            room: RoomId::parse("abc123").unwrap(),
            event: ServerMessage::RemoteState {
                room: RoomId::parse("abc123").unwrap(),
                state: json!({"turn": 1}),
            },
        }
    }

    #[test]
    fn test_own_envelope_discarded() {
        assert!(accept_remote(envelope("node-a"), "node-a").is_none());
    }

    #[test]
    fn test_remote_envelope_accepted() {
        let (room, event) = accept_remote(envelope("node-a"), "node-b").unwrap();
        assert_eq!(room.as_str(), "ABC123");
        assert!(matches!(event, ServerMessage::RemoteState { .. }));
    }

    #[test]
    fn test_envelope_round_trip() {
        let json = serde_json::to_string(&envelope("node-a")).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.origin, "node-a");
        assert_eq!(back.room.as_str(), "ABC123");
    }
}
