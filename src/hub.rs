//! RelayHub actor implementation
//!
//! The central actor that owns all membership state: connected clients and
//! the room registry. Uses the Actor pattern with mpsc channels for message
//! passing, so no locks are needed - commands from all connection handlers
//! are processed strictly in arrival order, and every broadcast completes
//! within its triggering command's handling.
//!
//! Protocol, per connection: `unjoined` → `joined(room)` via Join (a second
//! Join switches rooms), terminal on Disconnect. Malformed or out-of-place
//! messages are dropped without a reply; store failures suppress the
//! dependent broadcast but never stop the hub.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::fanout::Envelope;
use crate::message::ServerMessage;
use crate::registry::RoomRegistry;
use crate::store::StateStore;
use crate::types::{ConnId, RoomId, StateBlob};

/// Commands sent from handlers (and the fan-out subscriber) to the hub actor
#[derive(Debug)]
pub enum HubCommand {
    /// New connection established
    Connect {
        conn_id: ConnId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Connection closed
    Disconnect { conn_id: ConnId },
    /// Join a room (raw identifier, normalized here)
    Join { conn_id: ConnId, room: String },
    /// Replace the room's shared state
    StateUpdate {
        conn_id: ConnId,
        room: String,
        state: StateBlob,
    },
    /// Relay an action event to the rest of the room
    Action {
        conn_id: ConnId,
        room: String,
        kind: String,
        payload: StateBlob,
    },
    /// Event received from a sibling process, to re-emit locally
    Remote { room: RoomId, event: ServerMessage },
}

/// The relay hub actor
///
/// Holds the client table and room registry, processes commands from its
/// channel, and consults the state store around join/update transitions.
pub struct RelayHub {
    /// All connected clients: ConnId -> Client
    clients: HashMap<ConnId, Client>,
    /// Room membership, hub is the sole writer
    registry: RoomRegistry,
    /// Last-known-state store (backend-agnostic)
    store: Arc<dyn StateStore>,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
    /// This process's identity in fan-out envelopes
    node_id: String,
    /// Cross-process publish queue; absent in single-process deployments
    publisher: Option<mpsc::Sender<Envelope>>,
}

impl RelayHub {
    /// Create a new hub with the given command receiver and store
    pub fn new(receiver: mpsc::Receiver<HubCommand>, store: Arc<dyn StateStore>) -> Self {
        Self {
            clients: HashMap::new(),
            registry: RoomRegistry::new(),
            store,
            receiver,
            node_id: uuid::Uuid::new_v4().to_string(),
            publisher: None,
        }
    }

    /// Attach the cross-process fan-out publisher
    pub fn with_fanout(mut self, node_id: String, publisher: mpsc::Sender<Envelope>) -> Self {
        self.node_id = node_id;
        self.publisher = Some(publisher);
        self
    }

    /// Run the hub event loop
    ///
    /// Continuously receives and processes commands until all senders are
    /// dropped.
    pub async fn run(mut self) {
        info!("RelayHub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("RelayHub shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { conn_id, sender } => {
                self.handle_connect(conn_id, sender);
            }
            HubCommand::Disconnect { conn_id } => {
                self.handle_disconnect(conn_id);
            }
            HubCommand::Join { conn_id, room } => {
                self.handle_join(conn_id, room).await;
            }
            HubCommand::StateUpdate {
                conn_id,
                room,
                state,
            } => {
                self.handle_state_update(conn_id, room, state).await;
            }
            HubCommand::Action {
                conn_id,
                room,
                kind,
                payload,
            } => {
                self.handle_action(conn_id, room, kind, payload).await;
            }
            HubCommand::Remote { room, event } => {
                self.handle_remote(room, event).await;
            }
        }
    }

    /// Handle new connection
    fn handle_connect(&mut self, conn_id: ConnId, sender: mpsc::Sender<ServerMessage>) {
        info!("Connection {} established", conn_id);
        self.clients.insert(conn_id, Client::new(conn_id, sender));
        debug!(
            "Total connections: {}, active rooms: {}",
            self.clients.len(),
            self.registry.room_count()
        );
    }

    /// Handle disconnection
    ///
    /// Membership is dropped silently: no departure event exists in the
    /// protocol, peers detect absence through their own traffic.
    fn handle_disconnect(&mut self, conn_id: ConnId) {
        if let Some(room) = self.registry.leave(conn_id) {
            info!("Connection {} disconnected from room {}", conn_id, room);
        } else {
            info!("Connection {} disconnected", conn_id);
        }
        self.clients.remove(&conn_id);
        debug!(
            "Total connections: {}, active rooms: {}",
            self.clients.len(),
            self.registry.room_count()
        );
    }

    /// Handle a join request
    ///
    /// A connection may switch rooms by joining again; the previous room's
    /// membership is released implicitly, with no notification to it. When
    /// prior state exists it is replayed to the joiner alone, before the
    /// room-wide joined acknowledgment.
    async fn handle_join(&mut self, conn_id: ConnId, room: String) {
        let Some(room) = RoomId::parse(&room) else {
            debug!("Dropping join from {} (invalid room identifier)", conn_id);
            return;
        };
        if !self.clients.contains_key(&conn_id) {
            return;
        }

        self.registry.join(conn_id, room.clone());
        info!("Connection {} joined room {}", conn_id, room);

        match self.store.get(&room).await {
            Ok(Some(state)) => {
                if let Some(client) = self.clients.get(&conn_id) {
                    let _ = client
                        .send(ServerMessage::StateReplay {
                            room: room.clone(),
                            state,
                        })
                        .await;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("State replay read failed for room {}: {}", room, e);
            }
        }

        let event = ServerMessage::Joined { room: room.clone() };
        self.broadcast(&room, None, event.clone()).await;
        self.publish(room, event);
    }

    /// Handle a state update
    ///
    /// Only a current member of the exact room may write its state; any
    /// mismatch is dropped silently. The write happens first, and only a
    /// successful write is broadcast (sender excluded).
    async fn handle_state_update(&mut self, conn_id: ConnId, room: String, state: StateBlob) {
        let Some(room) = RoomId::parse(&room) else {
            debug!("Dropping state update from {} (invalid room identifier)", conn_id);
            return;
        };
        if self.registry.room_of(conn_id) != Some(&room) {
            debug!(
                "Dropping state update from {} for room {} (not a member)",
                conn_id, room
            );
            return;
        }

        match self.store.put(&room, state.clone()).await {
            Ok(()) => {
                let event = ServerMessage::RemoteState {
                    room: room.clone(),
                    state,
                };
                self.broadcast(&room, Some(conn_id), event.clone()).await;
                self.publish(room, event);
            }
            Err(e) => {
                warn!(
                    "State write failed for room {}: {} (broadcast suppressed)",
                    room, e
                );
            }
        }
    }

    /// Handle an action event
    ///
    /// Relayed to the rest of the room with the relay time attached, never
    /// persisted. Same membership integrity check as state updates.
    async fn handle_action(
        &mut self,
        conn_id: ConnId,
        room: String,
        kind: String,
        payload: StateBlob,
    ) {
        let Some(room) = RoomId::parse(&room) else {
            debug!("Dropping action from {} (invalid room identifier)", conn_id);
            return;
        };
        if kind.is_empty() {
            debug!("Dropping action from {} (empty kind)", conn_id);
            return;
        }
        if self.registry.room_of(conn_id) != Some(&room) {
            debug!(
                "Dropping action from {} for room {} (not a member)",
                conn_id, room
            );
            return;
        }

        let event = ServerMessage::Action {
            kind,
            payload,
            at: unix_millis(),
        };
        self.broadcast(&room, Some(conn_id), event.clone()).await;
        self.publish(room, event);
    }

    /// Re-emit an event received from a sibling process
    ///
    /// Delivered to every local member of the room (the originator is
    /// attached elsewhere) and never published again.
    async fn handle_remote(&mut self, room: RoomId, event: ServerMessage) {
        self.broadcast(&room, None, event).await;
    }

    /// Send an event to every member of a room, optionally excluding one
    ///
    /// Sends to closed channels are ignored; the corresponding disconnect
    /// command is already on its way.
    async fn broadcast(&self, room: &RoomId, exclude: Option<ConnId>, event: ServerMessage) {
        let members: Vec<ConnId> = self.registry.members(room).collect();
        for member in members {
            if exclude == Some(member) {
                continue;
            }
            if let Some(client) = self.clients.get(&member) {
                let _ = client.send(event.clone()).await;
            }
        }
    }

    /// Enqueue a locally originated event for cross-process fan-out
    fn publish(&self, room: RoomId, event: ServerMessage) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let envelope = Envelope {
            origin: self.node_id.clone(),
            room,
            event,
        };
        if publisher.try_send(envelope).is_err() {
            warn!("Fan-out queue full, dropping cross-process event");
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
