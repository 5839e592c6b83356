//! Error types for the relay
//!
//! Defines application-level, store-level, and message send errors.
//! Uses thiserror for ergonomic error definitions.
//!
//! The protocol itself carries no error channel: malformed or out-of-place
//! client messages are dropped silently, and backend failures are logged
//! operationally. These types therefore only flow through internal seams,
//! never to clients.

use thiserror::Error;

/// Application-level errors
///
/// Fatal connection-scoped failures surfaced by the websocket handler.
#[derive(Debug, Error)]
pub enum RelayError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error answering a liveness probe (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,
}

/// State store errors
///
/// Only the external-durable backend can fail; a missing key is `Ok(None)`,
/// never an error. Store failures suppress the dependent broadcast but are
/// never fatal to the process.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command or connection failure
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Stored payload could not be (de)serialized
    #[error("state serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
