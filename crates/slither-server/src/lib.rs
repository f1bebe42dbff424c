//! Authoritative multiplayer snake server.
//!
//! Clients connect over WebSocket and are classified by their query
//! string or user agent: browsers and handsets speak JSON, embedded
//! firmware speaks MessagePack. Validated clients are paired into
//! sessions of two; each session runs as its own actor with its own
//! engine and 100 ms tick loop, broadcasting events and state snapshots
//! to its members.
//!
//! The crate exposes only the server builder; everything else is
//! internal plumbing: `gateway` accepts sockets and pumps frames,
//! `registry` tracks who is connected, `manager` pairs clients into
//! sessions, and `session` runs the per-game actor.

mod error;
mod gateway;
mod handlers;
mod manager;
mod registry;
mod server;
mod session;

pub use error::{ServerError, SessionError};
pub use server::{SlitherServer, SlitherServerBuilder};
