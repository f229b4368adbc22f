//! Routing error types

use carma_phonebook::PhonebookError;
use carma_protocol::{ErrorKind, Psn, Role};
use thiserror::Error;

/// Errors raised while deriving relationship sets
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("{0}")]
    Config(String),

    #[error("Node \"{psn}\" was expected to have role {expected} but has role {role} instead")]
    WrongRole {
        psn: Psn,
        role: Role,
        expected: &'static str,
    },

    #[error("Role {0} has no relationship sets")]
    UnsupportedRole(Role),

    #[error("Phonebook error: {0}")]
    Phonebook(#[from] PhonebookError),
}

impl RoutingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoutingError::Config(_)
            | RoutingError::WrongRole { .. }
            | RoutingError::UnsupportedRole(_) => ErrorKind::ConfigInvariantViolation,
            RoutingError::Phonebook(e) => e.kind(),
        }
    }
}

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;
