//! Wire protocol between mixroom clients and the relay.
//!
//! Every logical message is one UTF-8 JSON document carried in a single
//! WebSocket text frame; the `action` field selects the variant. Clients
//! report a volume/mute pair, the relay answers with full room snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One peer's reported status as it appears inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    pub volume: i64,
    pub muted: bool,
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Register as an active member of `room` under `name`.
    Join {
        name: String,
        room: String,
        volume: i64,
        muted: bool,
    },

    /// Update this connection's status. `name` is informational only; the
    /// relay identifies the sender by its connection.
    Volume {
        name: String,
        volume: i64,
        muted: bool,
    },

    /// Voluntarily depart; the relay closes the connection afterwards.
    Leave,
}

/// Messages the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full snapshot of the receiver's room, sent after every membership or
    /// status change. Keyed by display name.
    Update { peers: BTreeMap<String, PeerStatus> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"join","name":"alice","room":"lobby","volume":50,"muted":false}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                name: "alice".into(),
                room: "lobby".into(),
                volume: 50,
                muted: false,
            }
        );
    }

    #[test]
    fn parses_volume_with_informational_name() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"volume","name":"alice","volume":30,"muted":true}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Volume {
                name: "alice".into(),
                volume: 30,
                muted: true,
            }
        );
    }

    #[test]
    fn parses_bare_leave() {
        let msg: ClientMessage = serde_json::from_str(r#"{"action":"leave"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Leave);
    }

    #[test]
    fn rejects_unknown_action() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"shout","text":"hi"}"#).is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        // join without a room
        assert!(serde_json::from_str::<ClientMessage>(
            r#"{"action":"join","name":"alice","volume":50,"muted":false}"#
        )
        .is_err());
    }

    #[test]
    fn update_wire_shape() {
        let mut peers = BTreeMap::new();
        peers.insert(
            "alice".to_string(),
            PeerStatus {
                volume: 50,
                muted: false,
            },
        );
        let json = serde_json::to_string(&ServerMessage::Update { peers }).unwrap();
        assert_eq!(
            json,
            r#"{"action":"update","peers":{"alice":{"volume":50,"muted":false}}}"#
        );
    }
}
