//! Mesh transport boundary
//!
//! The radio link itself lives outside this crate. A host adapts its mesh
//! radio to [`MeshTransport`] and feeds received text into
//! [`TeamEngine::handle_incoming`](crate::TeamEngine::handle_incoming).

use std::fmt;

use async_trait::async_trait;

use crate::error::TeamError;

/// Link state reported by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Connecting,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Best-effort text broadcast over the mesh
#[async_trait]
pub trait MeshTransport: Send + Sync {
    fn connection_state(&self) -> ConnectionState;

    /// The radio's node id, used as the local member id when present
    fn node_id(&self) -> Option<String> {
        None
    }

    /// Broadcast `text` to the channel. No delivery guarantee.
    async fn send_text(&self, text: &str) -> Result<(), TeamError>;

    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }
}
