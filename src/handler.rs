//! WebSocket connection handler
//!
//! Handles individual client connections: the liveness probe, WebSocket
//! handshake (including the origin policy), message parsing, and
//! bidirectional communication with the RelayHub.

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::hub::HubCommand;
use crate::message::{ClientMessage, ServerMessage};
use crate::types::ConnId;

/// Request-line prefix identifying a liveness probe
const HEALTHZ_PREFIX: &[u8] = b"GET /healthz ";

/// Fixed liveness response, written without entering the websocket handshake
const HEALTHZ_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
content-type: text/plain\r\n\
content-length: 2\r\n\
connection: close\r\n\
\r\n\
ok";

/// Handle a new TCP connection
///
/// Answers liveness probes directly, then performs the WebSocket handshake
/// (rejecting disallowed origins), registers with the hub, and runs the
/// read/write tasks until either side closes.
pub async fn handle_connection(
    mut stream: TcpStream,
    cmd_tx: mpsc::Sender<HubCommand>,
    allowed_origin: Option<String>,
) -> Result<(), RelayError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // A liveness probe is plain HTTP with no upgrade headers, so it must be
    // answered before the websocket handshake, which would reject it. The
    // request head is peeked, not consumed, so a real upgrade request passes
    // through untouched.
    let mut head = [0u8; 16];
    let peeked = stream.peek(&mut head).await?;
    if is_liveness_probe(&head[..peeked]) {
        stream.write_all(HEALTHZ_RESPONSE).await?;
        let _ = stream.shutdown().await;
        debug!("Answered liveness probe from {}", peer_addr);
        return Ok(());
    }

    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if let Some(allowed) = &allowed_origin {
            // A missing Origin header means a non-browser client; only an
            // explicit mismatch is rejected.
            let origin = req
                .headers()
                .get("origin")
                .and_then(|v| v.to_str().ok());
            if origin.is_some_and(|o| o != allowed) {
                let mut resp = ErrorResponse::new(None);
                *resp.status_mut() = StatusCode::FORBIDDEN;
                return Err(resp);
            }
        }
        Ok(response)
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => ws_stream,
        // The callback declined the upgrade (origin rejection); the
        // response was already written.
        Err(WsError::Http(resp)) => {
            debug!("Handshake rejected without upgrade ({})", resp.status());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let conn_id = ConnId::new();
    info!("Connection {} established from {}", conn_id, peer_addr);

    // Channel for hub -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(32);

    if cmd_tx
        .send(HubCommand::Connect {
            conn_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - hub closed", conn_id);
        return Err(RelayError::ChannelSend);
    }

    let cmd_tx_read = cmd_tx.clone();

    // Read task (WebSocket -> HubCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            let cmd = client_message_to_command(conn_id, client_msg);
                            if cmd_tx_read.send(cmd).await.is_err() {
                                debug!("Hub closed, ending read task for {}", conn_id);
                                break;
                            }
                        }
                        Err(e) => {
                            // Malformed input is dropped silently at the
                            // protocol boundary; no error event goes back.
                            warn!("Invalid message from {}: {}", conn_id, e);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", conn_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", conn_id);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", conn_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", conn_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", conn_id);
    });

    // Write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for connection");

        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", conn_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", conn_id);
        }
    }

    // A disconnect mid-flight does not abort hub-side work; the hub simply
    // discards the stale membership when it processes this command.
    let _ = cmd_tx.send(HubCommand::Disconnect { conn_id }).await;

    info!("Connection {} closed", conn_id);

    Ok(())
}

/// Whether the peeked request head is a liveness probe
///
/// Matches on the request line alone, so probes with or without upgrade
/// headers are answered the same way.
fn is_liveness_probe(head: &[u8]) -> bool {
    head.starts_with(HEALTHZ_PREFIX)
}

/// Convert a ClientMessage to a HubCommand
fn client_message_to_command(conn_id: ConnId, msg: ClientMessage) -> HubCommand {
    match msg {
        ClientMessage::Join { room } => HubCommand::Join { conn_id, room },
        ClientMessage::StateUpdate { room, state } => HubCommand::StateUpdate {
            conn_id,
            room,
            state,
        },
        ClientMessage::Action {
            room,
            kind,
            payload,
        } => HubCommand::Action {
            conn_id,
            room,
            kind,
            payload,
        },
    }
}
