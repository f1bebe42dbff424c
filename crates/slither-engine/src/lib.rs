//! Authoritative snake simulation.
//!
//! One [`SnakeEngine`] per session. The session layer owns it, feeds it
//! gated inputs, drives [`SnakeEngine::tick`] on a fixed cadence and
//! broadcasts the returned [`GameEvent`]s plus the compact state fragment
//! from [`SnakeEngine::format_state`].
//!
//! [`Board::step_wrapped`] is shared with the client-side mirror: the same
//! wrap rule runs server-side in grid cells and client-side in device
//! pixels.

mod engine;
mod event;
mod grid;

pub use engine::{EngineError, GameConfig, GamePhase, PlayerState, SnakeEngine, TICK_INTERVAL};
pub use event::{CollisionCause, GameEvent};
pub use grid::{Board, Direction, GridPos};
