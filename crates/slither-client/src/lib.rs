//! Client SDK for slither: transport plus local game mirror.
//!
//! [`GameClient`] owns a reconnecting WebSocket to the server. It speaks
//! the class-appropriate codec, answers pings, acknowledges the
//! handshake, and downgrades itself when the server goes silent;
//! everything else arrives on an event channel. [`GameMirror`] is the
//! renderable game state: it steps snakes locally at the server's cadence
//! and folds authoritative snapshots and events back in, so the picture
//! stays smooth between broadcasts and honest after them.
//!
//! The two halves are independent on purpose. An application wires
//! transport events into the mirror however its frame loop likes.

mod error;
mod mirror;
mod transport;

pub use error::ClientError;
pub use mirror::{GameMirror, MirrorConfig, MirrorPlayer};
pub use transport::{ClientConfig, ClientEvent, ConnectionStatus, GameClient, NetHealth};
