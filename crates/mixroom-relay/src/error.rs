//! Protocol-level errors. Any of these terminates the offending connection;
//! none of them affects other connections or rooms beyond the standard
//! departure broadcast.

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("binary frames are not part of the protocol")]
    BinaryFrame,

    #[error("join received on an already-joined connection")]
    AlreadyJoined,

    #[error("status update received before join")]
    NotJoined,

    #[error("unknown session")]
    UnknownSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_json_converts() {
        let err = serde_json::from_str::<mixroom_protocol::ClientMessage>("not json").unwrap_err();
        let err: ProtocolError = err.into();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
        assert!(err.to_string().starts_with("invalid message:"));
    }

    #[test]
    fn state_machine_error_display() {
        assert_eq!(
            ProtocolError::NotJoined.to_string(),
            "status update received before join"
        );
        assert_eq!(
            ProtocolError::AlreadyJoined.to_string(),
            "join received on an already-joined connection"
        );
    }
}
