//! Error types for the session transport

use std::time::Duration;

/// Errors surfaced by the session transport
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport did not open within the configured window
    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// Transport-level failure (handshake, socket, frame write)
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation required a connected channel
    #[error("not connected")]
    NotConnected,

    /// A server-pushed error event, or an undecodable frame
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Whether this error came from the connection layer rather than
    /// the protocol layer
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectionTimeout(_) | SessionError::Transport(_)
        )
    }
}

impl From<SessionError> for String {
    fn from(err: SessionError) -> String {
        err.to_string()
    }
}

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SessionError>;
