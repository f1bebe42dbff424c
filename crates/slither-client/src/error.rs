//! Unified error type for the client.

use slither_protocol::ProtocolError;

/// Errors surfaced by the transport and the local mirror.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A send was attempted while the socket is down.
    #[error("not connected")]
    NotConnected,

    /// Every allowed reconnect attempt failed.
    #[error("reconnect failed after {0} attempts")]
    ReconnectExhausted(u32),

    /// The client was destroyed and accepts no further calls.
    #[error("client destroyed")]
    Destroyed,

    /// The configured device tile size cannot be negotiated.
    #[error("device tile size must be a positive multiple of 8, got {0}")]
    InvalidTileSize(i32),

    /// An encode, decode, or envelope-shape error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A WebSocket-level error (handshake, send, recv).
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
