//! Dual wire codec: JSON text frames or MessagePack binary frames.
//!
//! The codec is picked once at handshake from the client's class and cached
//! on the connection; both directions of one connection always use the same
//! codec. Embedded clients get MessagePack (self-describing named maps, so
//! the firmware can skip fields it does not know); everything else gets
//! JSON for inspectability.

use crate::{ClientClass, ProtocolError, WireMessage};

/// A single encoded WebSocket payload, ready to send or just received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Encoding selected for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    Msgpack,
}

impl Codec {
    /// The codec a client of the given class speaks.
    pub fn for_class(class: ClientClass) -> Codec {
        match class {
            ClientClass::Embedded => Codec::Msgpack,
            ClientClass::Mobile | ClientClass::Web => Codec::Json,
        }
    }

    /// Serializes a message into the frame type this codec transmits.
    pub fn encode(self, msg: &WireMessage) -> Result<WireFrame, ProtocolError> {
        match self {
            Codec::Json => serde_json::to_string(msg)
                .map(WireFrame::Text)
                .map_err(ProtocolError::EncodeText),
            Codec::Msgpack => Ok(WireFrame::Binary(rmp_serde::to_vec_named(msg)?)),
        }
    }

    /// Parses an incoming frame.
    ///
    /// A JSON connection tolerates binary frames as long as they hold
    /// UTF-8 JSON (some WebSocket clients only expose a binary send path).
    /// A MessagePack connection rejects text frames outright.
    pub fn decode(self, frame: &WireFrame) -> Result<WireMessage, ProtocolError> {
        match (self, frame) {
            (Codec::Json, WireFrame::Text(text)) => {
                serde_json::from_str(text).map_err(ProtocolError::DecodeText)
            }
            (Codec::Json, WireFrame::Binary(bytes)) => {
                let text = std::str::from_utf8(bytes).map_err(|_| {
                    ProtocolError::InvalidMessage(
                        "binary frame on a JSON connection is not UTF-8".into(),
                    )
                })?;
                serde_json::from_str(text).map_err(ProtocolError::DecodeText)
            }
            (Codec::Msgpack, WireFrame::Binary(bytes)) => {
                Ok(rmp_serde::from_slice(bytes)?)
            }
            (Codec::Msgpack, WireFrame::Text(_)) => Err(ProtocolError::InvalidMessage(
                "text frame on a MessagePack connection".into(),
            )),
        }
    }
}
