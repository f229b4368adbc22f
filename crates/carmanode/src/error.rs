//! Error types for the node runtime

use carma_crypto::CryptoError;
use carma_phonebook::PhonebookError;
use carma_protocol::{ErrorKind, ProtocolError, Psn};
use carma_routing::RoutingError;
use thiserror::Error;

use crate::node::NodeState;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Missing configuration file: {0}")]
    MissingFile(String),

    #[error("Node is {0}")]
    NotReady(NodeState),

    #[error("{peer} is not in the {direction} set of this node")]
    Forbidden { peer: Psn, direction: &'static str },

    #[error("Packet addressed to {0} delivered here")]
    Misaddressed(Psn),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid peer record: {0}")]
    PeerRecord(#[source] serde_json::Error),

    #[error("Failed to read settings {path}: {source}")]
    SettingsIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings {path}: {source}")]
    Settings {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Phonebook(#[from] PhonebookError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::MissingFile(_) => ErrorKind::NotFound,
            NodeError::NotReady(_) | NodeError::Forbidden { .. } | NodeError::Settings { .. } => {
                ErrorKind::ConfigInvariantViolation
            }
            NodeError::Misaddressed(_) | NodeError::PeerRecord(_) => ErrorKind::Corrupt,
            NodeError::Transport(_) | NodeError::SettingsIo { .. } => ErrorKind::IoFailure,
            NodeError::Phonebook(e) => e.kind(),
            NodeError::Routing(e) => e.kind(),
            NodeError::Crypto(e) => e.kind(),
            NodeError::Protocol(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_sources() {
        let err = NodeError::from(ProtocolError::UnknownPacketType(99));
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.to_string(), "unknown packet type: 99");

        let err = NodeError::from(PhonebookError::NotFound("x".to_string()));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = NodeError::Forbidden {
            peer: Psn::from("x"),
            direction: "tx",
        };
        assert_eq!(err.kind(), ErrorKind::ConfigInvariantViolation);

        let source = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        assert_eq!(NodeError::PeerRecord(source).kind(), ErrorKind::Corrupt);
    }
}
