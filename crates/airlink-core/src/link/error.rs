//! Peer link errors

use thiserror::Error;

use super::events::Role;

/// Error class carried by [`PeerEvent::Error`](super::PeerEvent::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorCode {
    /// Advertising, discovery, listening or connecting failed
    SetupFailed,
    /// An established session broke
    CommunicationLost,
    /// The link adapter is missing or switched off
    AdapterUnavailable,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link adapter unavailable")]
    AdapterUnavailable,

    /// The existing session is left untouched
    #[error("a {active} session is already active")]
    RoleConflict { active: Role },

    #[error("no active session")]
    NotConnected,

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("communication lost: {0}")]
    Communication(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    pub fn code(&self) -> LinkErrorCode {
        match self {
            LinkError::AdapterUnavailable => LinkErrorCode::AdapterUnavailable,
            LinkError::RoleConflict { .. } | LinkError::NotConnected | LinkError::Setup(_) => {
                LinkErrorCode::SetupFailed
            }
            LinkError::Communication(_) | LinkError::Io(_) => LinkErrorCode::CommunicationLost,
        }
    }
}
