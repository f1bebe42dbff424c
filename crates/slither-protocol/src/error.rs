//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating messages.
///
/// Decode failures never cross the wire boundary as panics; callers turn
/// them into an `error` envelope for the sender and keep the connection
/// open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON serialization failed.
    #[error("encode failed: {0}")]
    EncodeText(serde_json::Error),

    /// JSON deserialization failed (malformed text, missing fields,
    /// unknown kind).
    #[error("decode failed: {0}")]
    DecodeText(serde_json::Error),

    /// MessagePack serialization failed.
    #[error("encode failed: {0}")]
    EncodeBinary(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    #[error("decode failed: {0}")]
    DecodeBinary(#[from] rmp_serde::decode::Error),

    /// The message decoded but violates a protocol rule, such as a frame
    /// type that does not match the negotiated codec or a payload whose
    /// shape is wrong for its declared kind.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
