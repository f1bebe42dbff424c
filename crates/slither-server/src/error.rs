//! Unified error type for the server.

use slither_protocol::{ClientId, ProtocolError, SessionId};

/// Errors from session matchmaking and lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Both slots are taken.
    #[error("{0} is full")]
    Full(SessionId),

    /// The session has left the waiting phase and accepts no more players.
    #[error("{0} is not accepting players")]
    NotJoinable(SessionId),

    /// A client asked to be seated while already holding a slot.
    #[error("{0} is already seated in {1}")]
    AlreadySeated(ClientId, SessionId),

    /// The session's actor task has stopped.
    #[error("{0} is gone")]
    Closed(SessionId),
}

/// Top-level error that wraps all failure sources of a connection.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// An encode, decode, or envelope-shape error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A matchmaking or session-lifecycle error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A socket-level error (bind, accept).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A WebSocket-level error (handshake, send, recv).
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
