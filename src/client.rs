//! Client struct definition
//!
//! Represents a connected client session and its outbound channel.
//! Room membership is not stored here; the hub's [`RoomRegistry`]
//! (`crate::registry`) is the single source of truth for it.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnId;

/// Connected client information
///
/// Holds the transport-assigned identity and the hub → client message
/// channel. The channel's receiving half lives in the connection's write
/// task; when that task ends, sends fail and the client is on its way out.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ConnId,
    /// Hub → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ConnId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, sender }
    }

    /// Send a message to this client
    ///
    /// Returns an error if the channel is closed (client disconnected).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoomId;

    #[tokio::test]
    async fn test_client_send() {
        let (tx, mut rx) = mpsc::channel(32);
        let client = Client::new(ConnId::new(), tx);

        let room = RoomId::parse("abc123").unwrap();
        client
            .send(ServerMessage::Joined { room: room.clone() })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::Joined { room: got } => assert_eq!(got, room),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_send_closed_channel() {
        let (tx, rx) = mpsc::channel(32);
        let client = Client::new(ConnId::new(), tx);
        drop(rx);

        let room = RoomId::parse("abc123").unwrap();
        assert!(client.send(ServerMessage::Joined { room }).await.is_err());
    }
}
