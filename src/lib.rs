//! Realtime state-synchronization relay library
//!
//! Clients in a named room exchange an opaque shared state blob and
//! discrete action events through a central hub. The hub never interprets
//! payloads - it is a pure transport/fan-out layer with room-scoped
//! membership and a pluggable last-known-state store.
//!
//! # Features
//! - WebSocket connection handling with a handshake-level liveness probe
//! - Room join with last-known-state replay to the joiner
//! - State update broadcast (sender excluded) with write-through to the store
//! - Action event relay (never persisted)
//! - Dual store backend: in-process with TTL sweep, or redis with native
//!   per-key expiry (automatic fallback when redis is unreachable)
//! - Optional cross-process fan-out over redis pub/sub
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RelayHub` is the central actor owning all membership state
//! - Each connection has a `handler` task communicating with the hub
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use sync_relay::{handle_connection, store, Config, RelayHub};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env();
//!     let (state_store, _redis) = store::connect(None, config.ttl).await;
//!
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!     tokio::spawn(RelayHub::new(cmd_rx, state_store).run());
//!
//!     let listener = TcpListener::bind(("0.0.0.0", config.port)).await.unwrap();
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, cmd_tx.clone(), None));
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod hub;
pub mod message;
pub mod registry;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::Config;
pub use error::{RelayError, SendError, StoreError};
pub use handler::handle_connection;
pub use hub::{HubCommand, RelayHub};
pub use message::{ClientMessage, ServerMessage};
pub use registry::RoomRegistry;
pub use store::{MemoryStore, RedisStore, StateStore};
pub use types::{ConnId, RoomId, StateBlob};
