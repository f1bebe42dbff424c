//! Wire protocol for slither.
//!
//! Defines the language both sides speak:
//!
//! - **Types** ([`WireMessage`] and its kind discriminants): the envelope
//!   set that travels on the wire.
//! - **Codec** ([`Codec`], [`WireFrame`]): JSON text frames for browsers
//!   and mobile, MessagePack binary frames for embedded controllers, chosen
//!   once per connection at handshake.
//! - **Router** ([`MessageHandlers`], [`route`]): shape validation and
//!   per-kind dispatch.
//! - **Errors** ([`ProtocolError`]): what can go wrong between bytes and
//!   envelopes.
//!
//! The protocol layer knows nothing about sessions or the game simulation;
//! it only converts and dispatches messages.

#![allow(async_fn_in_trait)]

mod codec;
mod error;
mod router;
mod types;

pub use codec::{Codec, WireFrame};
pub use error::ProtocolError;
pub use router::{route, validate, MessageHandlers};
pub use types::{
    validate_tile_size, AssignmentData, ClientClass, ClientEntry, ClientId, CommandKind,
    DataKind, SessionId, Slot, StatusKind, TileSizeVerdict, WireMessage, HANDSHAKE_ACK,
};
