//! Connection registry: maps live connections to their session state.
//!
//! A session starts *pending* (accepted, not yet joined) and becomes
//! *active* once a valid join fills in its name, room, and status. Only
//! active sessions appear in snapshots. The registry is a plain table;
//! the room broadcaster wraps it in the lock that makes mutation and
//! snapshot atomic per room.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tokio::sync::mpsc::UnboundedSender;

use mixroom_protocol::PeerStatus;

use crate::error::ProtocolError;

/// Server-generated identity of one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The joined half of a session. Name and room never change after join.
#[derive(Debug)]
struct Profile {
    name: String,
    room: String,
    volume: i64,
    muted: bool,
}

/// State for one connection: its outbound queue plus, once joined, its
/// profile. The queue carries pre-serialized JSON; the connection task owns
/// the socket and drains the queue onto it.
struct Session {
    sender: UnboundedSender<String>,
    profile: Option<Profile>,
}

/// Table of all live sessions, pending and active.
#[derive(Default)]
pub struct Registry {
    sessions: HashMap<SessionId, Session>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending session for a freshly accepted connection.
    pub fn register(&mut self, sender: UnboundedSender<String>) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(
            id.clone(),
            Session {
                sender,
                profile: None,
            },
        );
        id
    }

    /// Transition pending → active on a valid join.
    pub fn activate(
        &mut self,
        id: &SessionId,
        name: &str,
        room: &str,
        volume: i64,
        muted: bool,
    ) -> Result<(), ProtocolError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or(ProtocolError::UnknownSession)?;
        if session.profile.is_some() {
            return Err(ProtocolError::AlreadyJoined);
        }
        session.profile = Some(Profile {
            name: name.to_string(),
            room: room.to_string(),
            volume,
            muted,
        });
        Ok(())
    }

    /// Update an active session's status. Returns the room so the caller can
    /// re-broadcast it.
    pub fn update_status(
        &mut self,
        id: &SessionId,
        volume: i64,
        muted: bool,
    ) -> Result<String, ProtocolError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or(ProtocolError::UnknownSession)?;
        let profile = session.profile.as_mut().ok_or(ProtocolError::NotJoined)?;
        profile.volume = volume;
        profile.muted = muted;
        Ok(profile.room.clone())
    }

    /// Delete a session unconditionally. Returns the room it belonged to (if
    /// it was active) so the caller can re-broadcast. Removing an unknown id
    /// is a no-op.
    pub fn remove(&mut self, id: &SessionId) -> Option<String> {
        self.sessions
            .remove(id)
            .and_then(|session| session.profile)
            .map(|profile| profile.room)
    }

    /// Point-in-time view of a room's active sessions, keyed by display
    /// name. Two members with the same name collapse into one entry; which
    /// one wins is unspecified.
    pub fn snapshot(&self, room: &str) -> BTreeMap<String, PeerStatus> {
        self.sessions
            .values()
            .filter_map(|session| session.profile.as_ref())
            .filter(|profile| profile.room == room)
            .map(|profile| {
                (
                    profile.name.clone(),
                    PeerStatus {
                        volume: profile.volume,
                        muted: profile.muted,
                    },
                )
            })
            .collect()
    }

    /// Outbound queue of a session, if it still exists.
    pub fn sender(&self, id: &SessionId) -> Option<&UnboundedSender<String>> {
        self.sessions.get(id).map(|session| &session.sender)
    }

    /// Display name of an active session, for logging.
    pub fn display_name(&self, id: &SessionId) -> Option<&str> {
        self.sessions
            .get(id)
            .and_then(|session| session.profile.as_ref())
            .map(|profile| profile.name.as_str())
    }

    /// Number of live sessions, pending included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn registry_with_one() -> (Registry, SessionId) {
        let mut registry = Registry::new();
        let (tx, _rx) = unbounded_channel();
        let id = registry.register(tx);
        (registry, id)
    }

    #[test]
    fn pending_sessions_are_invisible() {
        let (registry, _id) = registry_with_one();
        assert_eq!(registry.len(), 1);
        assert!(registry.snapshot("lobby").is_empty());
    }

    #[test]
    fn activate_makes_session_visible() {
        let (mut registry, id) = registry_with_one();
        registry.activate(&id, "alice", "lobby", 50, false).unwrap();

        let snapshot = registry.snapshot("lobby");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot["alice"],
            PeerStatus {
                volume: 50,
                muted: false
            }
        );
        // Other rooms are unaffected.
        assert!(registry.snapshot("other").is_empty());
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let (mut registry, id) = registry_with_one();
        registry.activate(&id, "alice", "lobby", 50, false).unwrap();
        let err = registry
            .activate(&id, "alice", "lobby", 50, false)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AlreadyJoined));
    }

    #[test]
    fn update_before_join_is_rejected() {
        let (mut registry, id) = registry_with_one();
        let err = registry.update_status(&id, 30, true).unwrap_err();
        assert!(matches!(err, ProtocolError::NotJoined));
    }

    #[test]
    fn update_mutates_in_place_and_returns_room() {
        let (mut registry, id) = registry_with_one();
        registry.activate(&id, "alice", "lobby", 50, false).unwrap();

        let room = registry.update_status(&id, 30, true).unwrap();
        assert_eq!(room, "lobby");
        assert_eq!(
            registry.snapshot("lobby")["alice"],
            PeerStatus {
                volume: 30,
                muted: true
            }
        );
    }

    #[test]
    fn remove_is_idempotent_and_reports_room() {
        let (mut registry, id) = registry_with_one();
        registry.activate(&id, "alice", "lobby", 50, false).unwrap();

        assert_eq!(registry.remove(&id).as_deref(), Some("lobby"));
        assert_eq!(registry.remove(&id), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_pending_session_reports_no_room() {
        let (mut registry, id) = registry_with_one();
        assert_eq!(registry.remove(&id), None);
    }

    #[test]
    fn colliding_names_shadow_in_snapshot() {
        let mut registry = Registry::new();
        let (tx_a, _rx_a) = unbounded_channel();
        let (tx_b, _rx_b) = unbounded_channel();
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);
        registry.activate(&a, "alice", "lobby", 50, false).unwrap();
        registry.activate(&b, "alice", "lobby", 10, true).unwrap();

        // Both sessions are live, but the name-keyed snapshot holds one entry.
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.snapshot("lobby").len(), 1);
    }
}
