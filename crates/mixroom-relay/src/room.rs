//! Room broadcaster: membership tracking plus snapshot fan-out.
//!
//! Sessions and room membership live under a single lock, so every
//! state change and the broadcast it triggers are atomic with respect to
//! other operations on the same room. Fan-out only enqueues onto each
//! member's outbound queue; the socket write happens in the owning
//! connection task, never under the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;

use mixroom_protocol::ServerMessage;

use crate::error::ProtocolError;
use crate::registry::{Registry, SessionId};

struct Shared {
    registry: Registry,
    /// room name -> member sessions. A room exists iff it has ≥1 member.
    rooms: HashMap<String, HashSet<SessionId>>,
}

/// Thread-safe room state, shared by all connection tasks.
#[derive(Clone)]
pub struct RoomBroadcaster {
    shared: Arc<RwLock<Shared>>,
}

impl RoomBroadcaster {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RwLock::new(Shared {
                registry: Registry::new(),
                rooms: HashMap::new(),
            })),
        }
    }

    /// Create a pending session for a freshly accepted connection.
    pub async fn register(&self, sender: UnboundedSender<String>) -> SessionId {
        self.shared.write().await.registry.register(sender)
    }

    /// Activate the session and attach it to `room`, creating the room if
    /// absent, then broadcast the new snapshot to every member.
    pub async fn join(
        &self,
        id: &SessionId,
        name: &str,
        room: &str,
        volume: i64,
        muted: bool,
    ) -> Result<(), ProtocolError> {
        let mut shared = self.shared.write().await;
        shared.registry.activate(id, name, room, volume, muted)?;
        shared
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(id.clone());
        Self::broadcast(&mut shared, room);
        Ok(())
    }

    /// Update the session's status and broadcast its room.
    pub async fn update_status(
        &self,
        id: &SessionId,
        volume: i64,
        muted: bool,
    ) -> Result<(), ProtocolError> {
        let mut shared = self.shared.write().await;
        let room = shared.registry.update_status(id, volume, muted)?;
        Self::broadcast(&mut shared, &room);
        Ok(())
    }

    /// Remove the session on any exit path (leave, end of stream, protocol
    /// violation, I/O error). Idempotent. Returns the vacated room, already
    /// re-broadcast to its remaining members.
    pub async fn disconnect(&self, id: &SessionId) -> Option<String> {
        let mut shared = self.shared.write().await;
        let room = shared.registry.remove(id)?;
        Self::leave(&mut shared, &room, id);
        Some(room)
    }

    /// Drop `id` from the room's member set; delete the room when it empties,
    /// otherwise broadcast to the remaining members. No-op if absent.
    fn leave(shared: &mut Shared, room: &str, id: &SessionId) {
        let Some(members) = shared.rooms.get_mut(room) else {
            return;
        };
        members.remove(id);
        if members.is_empty() {
            shared.rooms.remove(room);
        } else {
            Self::broadcast(shared, room);
        }
    }

    /// Build the room snapshot and enqueue it to every member. A member
    /// whose queue is gone counts as an implicit departure: it is removed
    /// and the pass restarts, so the remaining members always end up with a
    /// snapshot that excludes it. Never blocks on I/O.
    fn broadcast(shared: &mut Shared, room: &str) {
        loop {
            let Some(members) = shared.rooms.get(room) else {
                return;
            };
            let update = ServerMessage::Update {
                peers: shared.registry.snapshot(room),
            };
            let payload = serde_json::to_string(&update).unwrap();

            let dead: Vec<SessionId> = members
                .iter()
                .filter(|id| match shared.registry.sender(id) {
                    Some(sender) => sender.send(payload.clone()).is_err(),
                    None => true,
                })
                .cloned()
                .collect();
            if dead.is_empty() {
                return;
            }

            for id in &dead {
                tracing::debug!(session = %id, room, "Dropping unreachable member");
                shared.registry.remove(id);
                if let Some(members) = shared.rooms.get_mut(room) {
                    members.remove(id);
                    if members.is_empty() {
                        shared.rooms.remove(room);
                    }
                }
            }
        }
    }

    /// Display name of an active session, for logging.
    pub async fn display_name(&self, id: &SessionId) -> Option<String> {
        self.shared
            .read()
            .await
            .registry
            .display_name(id)
            .map(str::to_string)
    }

    /// Number of live sessions, pending included.
    pub async fn session_count(&self) -> usize {
        self.shared.read().await.registry.len()
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.shared.read().await.rooms.len()
    }

    /// Number of members in `room`; 0 if the room does not exist.
    pub async fn member_count(&self, room: &str) -> usize {
        self.shared
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashSet::len)
    }
}

impl Default for RoomBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
