//! Local replica of the authoritative game.
//!
//! The mirror never simulates rules on its own authority. It steps snakes
//! forward at the server's cadence using the exact movement function the
//! server uses, then folds in whatever the server says: per-tick snapshot
//! fragments correct length, liveness, food and scores, and game events
//! correct direction, growth and death. Head positions are the one thing
//! only the client tracks, which is why both sides sharing
//! [`Board::step_wrapped`] matters.
//!
//! All positions here are in device pixels: grid cells scaled by the
//! negotiated tile size.

use std::collections::{BTreeMap, VecDeque};

use slither_engine::{Board, Direction, GameEvent, GamePhase, GridPos};
use slither_protocol::Slot;
use tracing::{debug, info};

use crate::error::ClientError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Mirror tuning. Defaults match the production board with the smallest
/// legal tile.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub board: Board,
    /// Overwritten by the `target_score` section of the initial snapshot.
    pub target_score: u32,
    /// Device pixels per grid cell. Must be a positive multiple of 8.
    pub tile_size: i32,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            board: Board::new(40, 30),
            target_score: 100,
            tile_size: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Player state
// ---------------------------------------------------------------------------

/// One snake as the client sees it. The body is head-first in device
/// pixels; `length` is the authoritative target the body settles toward.
#[derive(Debug, Clone)]
pub struct MirrorPlayer {
    pub body: VecDeque<GridPos>,
    pub direction: Direction,
    pub length: usize,
    pub score: u32,
    pub alive: bool,
}

impl MirrorPlayer {
    pub fn head(&self) -> Option<GridPos> {
        self.body.front().copied()
    }

    /// Brings the body in line with the authoritative length without moving
    /// the head. Surplus tail cells are dropped; missing ones are cloned
    /// from the current tail and unstack as the snake moves.
    fn settle_body(&mut self) {
        if self.length == 0 {
            self.body.clear();
            return;
        }
        self.body.truncate(self.length);
        while self.body.len() < self.length {
            let Some(&tail) = self.body.back() else {
                break;
            };
            self.body.push_back(tail);
        }
    }
}

// ---------------------------------------------------------------------------
// Mirror
// ---------------------------------------------------------------------------

/// Client-side game state, reconciled against server broadcasts.
#[derive(Debug)]
pub struct GameMirror {
    config: MirrorConfig,
    local_slot: Slot,
    players: BTreeMap<Slot, MirrorPlayer>,
    food: GridPos,
    phase: GamePhase,
    /// Highest event sequence already applied. Events at or below it are
    /// replays or stale reorderings and are dropped.
    last_sequence: u64,
}

impl GameMirror {
    /// Creates an empty mirror for the given seat.
    ///
    /// Rejects tile sizes the server would refuse to negotiate, so a bad
    /// configuration fails here instead of mid-handshake.
    pub fn new(local_slot: Slot, config: MirrorConfig) -> Result<Self, ClientError> {
        if config.tile_size <= 0 || config.tile_size % 8 != 0 {
            return Err(ClientError::InvalidTileSize(config.tile_size));
        }
        Ok(Self {
            local_slot,
            players: BTreeMap::new(),
            food: GridPos::new(0, 0),
            phase: GamePhase::Waiting,
            last_sequence: 0,
            config,
        })
    }

    // ----- prediction -----------------------------------------------------

    /// Advances every living snake one tile, the same move the server makes
    /// on its tick. No-op outside `playing`.
    pub fn step(&mut self) {
        if self.phase != GamePhase::Playing {
            return;
        }
        let board = self.config.board;
        let tile = self.config.tile_size;
        for player in self.players.values_mut() {
            if !player.alive {
                continue;
            }
            let Some(&head) = player.body.front() else {
                continue;
            };
            let next = board.step_wrapped(head, player.direction, tile);
            player.body.push_front(next);
            if player.body.len() > player.length {
                player.body.pop_back();
            }
        }
    }

    /// Pre-validates a direction change for the local snake: it must exist,
    /// be alive, and the new direction must not reverse the current one.
    /// The server re-checks everything, so this only saves doomed sends.
    pub fn can_change_direction(&self, direction: Direction) -> bool {
        match self.players.get(&self.local_slot) {
            Some(player) => player.alive && direction != player.direction.opposite(),
            None => false,
        }
    }

    // ----- reconciliation -------------------------------------------------

    /// Folds one snapshot fragment into the mirror, e.g.
    /// `p1:len:2,alive:1;p2:len:1,alive:0;food:x:5,y:9;scores:1,0`.
    ///
    /// Unknown and unparseable sections are skipped, never fatal. A player
    /// section for a snake the mirror has not seen yet materializes it at
    /// its spawn point; the `len:0,alive:0` placeholder for an empty slot
    /// does not.
    pub fn apply_snapshot(&mut self, fragment: &str) {
        for section in fragment.split(';') {
            let section = section.trim();
            if let Some(rest) = section.strip_prefix("p1:") {
                self.apply_player_section(Slot::ONE, rest);
            } else if let Some(rest) = section.strip_prefix("p2:") {
                self.apply_player_section(Slot::TWO, rest);
            } else if let Some(rest) = section.strip_prefix("food:") {
                self.apply_food_section(rest);
            } else if let Some(rest) = section.strip_prefix("scores:") {
                self.apply_scores_section(rest);
            } else if let Some(rest) = section.strip_prefix("target_score:") {
                if let Ok(target) = rest.trim().parse() {
                    self.config.target_score = target;
                }
            }
        }
    }

    fn apply_player_section(&mut self, slot: Slot, rest: &str) {
        let mut length = None;
        let mut alive = None;
        for field in rest.split(',') {
            if let Some(value) = field.strip_prefix("len:") {
                length = value.parse::<usize>().ok();
            } else if let Some(value) = field.strip_prefix("alive:") {
                alive = value.parse::<u8>().ok().map(|n| n == 1);
            }
        }
        let Some(length) = length else {
            debug!(%slot, section = rest, "unparseable player section ignored");
            return;
        };

        if !self.players.contains_key(&slot) {
            // `len:0` marks an empty slot, not a zero-length snake.
            if length == 0 {
                return;
            }
            let (start, direction) = self.spawn_point(slot);
            self.players.insert(
                slot,
                MirrorPlayer {
                    body: VecDeque::from([start]),
                    direction,
                    length,
                    score: 0,
                    alive: true,
                },
            );
            info!(%slot, "player materialized from snapshot");
        }

        if let Some(player) = self.players.get_mut(&slot) {
            player.length = length;
            if let Some(alive) = alive {
                player.alive = alive;
            }
            player.settle_body();
        }
    }

    fn apply_food_section(&mut self, rest: &str) {
        let mut x = None;
        let mut y = None;
        for field in rest.split(',') {
            if let Some(value) = field.strip_prefix("x:") {
                x = value.parse::<i32>().ok();
            } else if let Some(value) = field.strip_prefix("y:") {
                y = value.parse::<i32>().ok();
            }
        }
        if let (Some(x), Some(y)) = (x, y) {
            self.food = self.to_device(GridPos::new(x, y));
        }
    }

    /// Scores list players in slot order; the entry index is the slot.
    fn apply_scores_section(&mut self, rest: &str) {
        for (index, value) in rest.split(',').enumerate() {
            let Ok(score) = value.trim().parse::<u32>() else {
                continue;
            };
            if let Some(player) = self.players.get_mut(&Slot(index as u8 + 1)) {
                player.score = score;
            }
        }
    }

    /// Applies one authoritative event.
    pub fn apply_event(&mut self, event: &GameEvent) {
        match *event {
            GameEvent::DirectionChanged {
                slot,
                direction,
                sequence,
            } => {
                if sequence <= self.last_sequence {
                    debug!(
                        sequence,
                        last = self.last_sequence,
                        "stale direction event dropped"
                    );
                    return;
                }
                self.last_sequence = sequence;
                if let Some(player) = self.players.get_mut(&slot) {
                    player.direction = direction;
                }
            }
            GameEvent::FoodEaten {
                slot,
                new_food_x,
                new_food_y,
            } => {
                if let Some(player) = self.players.get_mut(&slot) {
                    player.length += 1;
                    player.score += 1;
                }
                self.food = self.to_device(GridPos::new(new_food_x, new_food_y));
            }
            GameEvent::Collision { slot, .. } => {
                // The body stays on the board where it died.
                if let Some(player) = self.players.get_mut(&slot) {
                    player.alive = false;
                }
            }
        }
    }

    /// Clears everything back to a pre-match state, keeping the seat and
    /// configuration.
    pub fn reset(&mut self) {
        self.players.clear();
        self.food = GridPos::new(0, 0);
        self.phase = GamePhase::Waiting;
        self.last_sequence = 0;
        info!("mirror reset");
    }

    // ----- helpers --------------------------------------------------------

    /// Spawn points match the server: opposite corners, facing away from
    /// each other, scaled to device pixels.
    fn spawn_point(&self, slot: Slot) -> (GridPos, Direction) {
        let b = self.config.board;
        let cell = if slot == Slot::ONE {
            (GridPos::new(2, 2), Direction::Right)
        } else {
            (GridPos::new(b.width - 3, b.height - 3), Direction::Left)
        };
        (self.to_device(cell.0), cell.1)
    }

    fn to_device(&self, pos: GridPos) -> GridPos {
        GridPos::new(pos.x * self.config.tile_size, pos.y * self.config.tile_size)
    }

    // ----- accessors ------------------------------------------------------

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Phase transitions ride `game_start` / `game_end` commands, not
    /// snapshots, so the transport layer sets them explicitly.
    pub fn set_phase(&mut self, phase: GamePhase) {
        self.phase = phase;
    }

    pub fn local_slot(&self) -> Slot {
        self.local_slot
    }

    pub fn food(&self) -> GridPos {
        self.food
    }

    pub fn player(&self, slot: Slot) -> Option<&MirrorPlayer> {
        self.players.get(&slot)
    }

    pub fn local_player(&self) -> Option<&MirrorPlayer> {
        self.players.get(&self.local_slot)
    }

    pub fn players(&self) -> impl Iterator<Item = (Slot, &MirrorPlayer)> {
        self.players.iter().map(|(&slot, player)| (slot, player))
    }

    pub fn target_score(&self) -> u32 {
        self.config.target_score
    }

    pub fn tile_size(&self) -> i32 {
        self.config.tile_size
    }
}

// =========================================================================
// Tests
// =========================================================================
