//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.
//!
//! Client-supplied room identifiers arrive as raw strings and are
//! normalized by the hub; everything the hub emits carries an already
//! validated [`RoomId`]. State payloads are opaque [`StateBlob`] values.

use serde::{Deserialize, Serialize};

use crate::types::{RoomId, StateBlob};

/// Client → Hub message
///
/// All messages from client to hub. Uses tagged enum with snake_case naming.
/// Messages that fail to deserialize, or that carry an invalid room
/// identifier, are dropped without a reply.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room (implicitly leaving any current room)
    Join { room: String },
    /// Replace the room's shared state
    StateUpdate { room: String, state: StateBlob },
    /// Relay a discrete action event to the rest of the room
    Action {
        room: String,
        kind: String,
        #[serde(default)]
        payload: StateBlob,
    },
}

/// Hub → Client message
///
/// All messages from hub to client. Uses tagged enum with snake_case naming.
/// Also travels across processes inside a fan-out envelope, hence the
/// `Deserialize` derive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Last known room state, delivered only to a joiner when prior state exists
    StateReplay { room: RoomId, state: StateBlob },
    /// Join acknowledgment, broadcast to all members of the room
    Joined { room: RoomId },
    /// New room state, broadcast to every member except the originator
    RemoteState { room: RoomId, state: StateBlob },
    /// Relayed action event with the relay time in unix milliseconds
    Action {
        kind: String,
        payload: StateBlob,
        at: u64,
    },
}
