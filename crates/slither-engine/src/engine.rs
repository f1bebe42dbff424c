//! The authoritative simulation for one session.
//!
//! The engine is a plain state machine with no timers of its own; the
//! session layer drives [`SnakeEngine::tick`] every [`TICK_INTERVAL`] and
//! broadcasts whatever comes back. All mutation happens through `tick`,
//! [`SnakeEngine::apply_input`] and the player add/remove operations, so a
//! single owner serializes the whole thing.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use slither_protocol::Slot;
use tracing::{debug, info, warn};

use crate::{Board, CollisionCause, Direction, GameEvent, GridPos};

/// Fixed authoritative step interval. The client mirror steps at the same
/// cadence.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Attempts at rejection-sampling a free food cell before giving up.
const FOOD_PLACEMENT_ATTEMPTS: u32 = 100;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine tuning. Defaults match the production board.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub board: Board,
    /// Score that ends the game when any player reaches it.
    pub target_score: u32,
    pub max_players: usize,
    /// Minimum gap between accepted inputs from one player.
    pub min_input_interval: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board: Board::new(40, 30),
            target_score: 100,
            max_players: 2,
            min_input_interval: Duration::from_millis(50),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle of a session's game: waiting → playing → ended (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Waiting,
    Playing,
    Ended,
}

impl GamePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            GamePhase::Waiting => "waiting",
            GamePhase::Playing => "playing",
            GamePhase::Ended => "ended",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Player state
// ---------------------------------------------------------------------------

/// One snake, authoritative view. The body is head-first; `body[0]` is the
/// current position. `length` is the target the body grows toward after
/// eating.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub body: VecDeque<GridPos>,
    pub direction: Direction,
    pub length: usize,
    pub score: u32,
    pub alive: bool,
    /// Time of the last accepted input. `None` until the first one, so a
    /// player's first input is never rate-limited.
    last_input: Option<Instant>,
}

impl PlayerState {
    pub fn head(&self) -> Option<GridPos> {
        self.body.front().copied()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural failures when mutating the player roster. Input gating is not
/// an error; gated inputs are silently dropped per the protocol.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("session is full")]
    SessionFull,
    #[error("slot {0} is already occupied")]
    SlotOccupied(Slot),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Authoritative snake simulation for up to two players.
pub struct SnakeEngine {
    config: GameConfig,
    phase: GamePhase,
    players: BTreeMap<Slot, PlayerState>,
    food: GridPos,
    /// Global input sequence, shared by both players. Strictly increasing.
    sequence: u64,
    winner: Option<Slot>,
}

impl SnakeEngine {
    /// Creates an engine in `waiting` with food already placed.
    pub fn new(config: GameConfig) -> Self {
        let mut engine = Self {
            config,
            phase: GamePhase::Waiting,
            players: BTreeMap::new(),
            food: GridPos::new(0, 0),
            sequence: 0,
            winner: None,
        };
        engine.food = engine.place_food();
        engine
    }

    // ----- roster ---------------------------------------------------------

    /// Adds a player at the spawn point for `slot`: opposite corners,
    /// facing away from each other, body a single head cell.
    pub fn add_player(&mut self, slot: Slot) -> Result<(), EngineError> {
        if self.players.len() >= self.config.max_players {
            return Err(EngineError::SessionFull);
        }
        if self.players.contains_key(&slot) {
            return Err(EngineError::SlotOccupied(slot));
        }

        let (start, direction) = self.spawn_point(slot);
        self.players.insert(
            slot,
            PlayerState {
                body: VecDeque::from([start]),
                direction,
                length: 1,
                score: 0,
                alive: true,
                last_input: None,
            },
        );
        info!(%slot, x = start.x, y = start.y, ?direction, "player added");
        Ok(())
    }

    /// Removes a player outright, e.g. on disconnect.
    ///
    /// Deliberately does not end the game here: the next tick's end
    /// evaluation notices the empty field on its own, which keeps teardown
    /// off the disconnect path.
    pub fn remove_player(&mut self, slot: Slot) {
        if self.players.remove(&slot).is_some() {
            info!(%slot, "player removed");
        } else {
            debug!(%slot, "remove for unknown slot ignored");
        }
    }

    fn spawn_point(&self, slot: Slot) -> (GridPos, Direction) {
        let b = self.config.board;
        if slot == Slot::ONE {
            (GridPos::new(2, 2), Direction::Right)
        } else {
            (GridPos::new(b.width - 3, b.height - 3), Direction::Left)
        }
    }

    // ----- lifecycle ------------------------------------------------------

    /// Begins the match. No-op unless the phase is `waiting`.
    pub fn start(&mut self) {
        if self.phase != GamePhase::Waiting {
            return;
        }
        self.phase = GamePhase::Playing;
        info!(players = self.players.len(), "game started");
    }

    /// Transitions straight to `ended` without declaring a winner.
    pub fn force_end(&mut self) {
        if self.phase != GamePhase::Ended {
            self.phase = GamePhase::Ended;
            info!("game force-ended");
        }
    }

    // ----- input ----------------------------------------------------------

    /// Gates and applies a direction change.
    ///
    /// Accepted only while playing, from a living player, when the new
    /// direction is not the exact reversal of the current one, and at least
    /// `min_input_interval` after that player's previous accepted input.
    /// Returns the broadcastable event on acceptance, `None` when gated.
    /// `now` is a parameter so callers and tests control the clock.
    pub fn apply_input(
        &mut self,
        slot: Slot,
        direction: Direction,
        now: Instant,
    ) -> Option<GameEvent> {
        if self.phase != GamePhase::Playing {
            return None;
        }
        let min_interval = self.config.min_input_interval;
        let player = self.players.get_mut(&slot)?;
        if !player.alive {
            return None;
        }
        if direction == player.direction.opposite() {
            return None;
        }
        if let Some(last) = player.last_input {
            if now.duration_since(last) < min_interval {
                return None;
            }
        }

        player.direction = direction;
        player.last_input = Some(now);
        self.sequence += 1;
        debug!(%slot, ?direction, sequence = self.sequence, "direction accepted");
        Some(GameEvent::DirectionChanged {
            slot,
            direction,
            sequence: self.sequence,
        })
    }

    // ----- simulation -----------------------------------------------------

    /// Runs one authoritative step.
    ///
    /// Living players move and collide in slot order; afterwards the end
    /// condition is evaluated once: the game ends when at most one player
    /// remains alive or any score has reached the target. The winner is the
    /// sole survivor, else the highest score; an exact tie crowns nobody.
    pub fn tick(&mut self) -> Vec<GameEvent> {
        if self.phase != GamePhase::Playing {
            return Vec::new();
        }

        let mut events = Vec::new();
        let slots: Vec<Slot> = self.players.keys().copied().collect();
        for slot in slots {
            if self.players.get(&slot).is_none_or(|p| !p.alive) {
                continue;
            }
            self.advance(slot);
            self.collide(slot, &mut events);
        }

        let alive: Vec<Slot> = self
            .players
            .iter()
            .filter(|(_, p)| p.alive)
            .map(|(slot, _)| *slot)
            .collect();
        let score_reached = self
            .players
            .values()
            .any(|p| p.score >= self.config.target_score);

        if alive.len() <= 1 || score_reached {
            self.winner = self.resolve_winner(&alive);
            self.phase = GamePhase::Ended;
            info!(winner = ?self.winner, "game ended");
        }

        events
    }

    /// Moves one snake a single cell, wrapping, and settles the body.
    fn advance(&mut self, slot: Slot) {
        let board = self.config.board;
        let Some(player) = self.players.get_mut(&slot) else {
            return;
        };
        let Some(&head) = player.body.front() else {
            return;
        };

        let next = board.step_wrapped(head, player.direction, 1);
        player.body.push_front(next);
        if player.body.len() > player.length {
            player.body.pop_back();
        }
    }

    /// Collision checks for one snake, in order: self, opponent, food.
    /// A death skips the food check.
    fn collide(&mut self, slot: Slot, events: &mut Vec<GameEvent>) {
        let Some(player) = self.players.get(&slot) else {
            return;
        };
        let Some(head) = player.head() else {
            return;
        };

        // Self collision: head against any non-head segment. A one-cell
        // snake cannot fold onto itself.
        if player.length > 1 && player.body.iter().skip(1).any(|&seg| seg == head) {
            self.kill(slot, CollisionCause::SelfHit, events);
            return;
        }

        // Opponent collision. Dead snakes are pass-through.
        let hit_opponent = self.players.iter().any(|(&other, p)| {
            other != slot && p.alive && p.body.iter().any(|&seg| seg == head)
        });
        if hit_opponent {
            self.kill(slot, CollisionCause::Opponent, events);
            return;
        }

        if head == self.food {
            if let Some(player) = self.players.get_mut(&slot) {
                player.length += 1;
                player.score += 1;
                debug!(%slot, length = player.length, score = player.score, "food eaten");
            }
            let food = self.place_food();
            self.food = food;
            events.push(GameEvent::FoodEaten {
                slot,
                new_food_x: food.x,
                new_food_y: food.y,
            });
        }
    }

    fn kill(&mut self, slot: Slot, cause: CollisionCause, events: &mut Vec<GameEvent>) {
        if let Some(player) = self.players.get_mut(&slot) {
            player.alive = false;
            info!(%slot, ?cause, "collision");
            events.push(GameEvent::Collision { slot, cause });
        }
    }

    /// Rejection-samples a cell not covered by any snake body. Falls back to
    /// the last sample if the board is too crowded to find one.
    fn place_food(&self) -> GridPos {
        let mut rng = rand::rng();
        let mut food = GridPos::new(0, 0);
        for _ in 0..FOOD_PLACEMENT_ATTEMPTS {
            food = GridPos::new(
                rng.random_range(0..self.config.board.width),
                rng.random_range(0..self.config.board.height),
            );
            if !self.cell_occupied(food) {
                return food;
            }
        }
        warn!(
            attempts = FOOD_PLACEMENT_ATTEMPTS,
            "no free cell for food, keeping last sample"
        );
        food
    }

    fn cell_occupied(&self, cell: GridPos) -> bool {
        self.players
            .values()
            .any(|p| p.body.iter().any(|&seg| seg == cell))
    }

    fn resolve_winner(&self, alive: &[Slot]) -> Option<Slot> {
        if alive.len() == 1 {
            return Some(alive[0]);
        }
        let (&best_slot, best) = self.players.iter().max_by_key(|(_, p)| p.score)?;
        let tied = self
            .players
            .values()
            .filter(|p| p.score == best.score)
            .count();
        if tied > 1 { None } else { Some(best_slot) }
    }

    // ----- rendering ------------------------------------------------------

    /// Renders the per-tick broadcast fragment, e.g.
    /// `p1:len:2,alive:1;p2:len:1,alive:0;food:x:5,y:9;scores:1,0`.
    ///
    /// Absent slots render `len:0,alive:0`; scores list existing players in
    /// slot order.
    pub fn format_state(&self) -> String {
        let part = |slot: Slot| match self.players.get(&slot) {
            Some(p) => format!("p{}:len:{},alive:{}", slot, p.length, u8::from(p.alive)),
            None => format!("p{slot}:len:0,alive:0"),
        };
        let scores = self
            .players
            .values()
            .map(|p| p.score.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{};{};food:x:{},y:{};scores:{}",
            part(Slot::ONE),
            part(Slot::TWO),
            self.food.x,
            self.food.y,
            scores
        )
    }

    /// The assignment-time variant of [`format_state`](Self::format_state).
    /// The space after the colon is part of the format.
    pub fn format_initial_state(&self) -> String {
        format!(
            "{};target_score: {}",
            self.format_state(),
            self.config.target_score
        )
    }

    // ----- accessors ------------------------------------------------------

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn winner(&self) -> Option<Slot> {
        self.winner
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, slot: Slot) -> Option<&PlayerState> {
        self.players.get(&slot)
    }

    pub fn food(&self) -> GridPos {
        self.food
    }

    pub fn target_score(&self) -> u32 {
        self.config.target_score
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_two() -> SnakeEngine {
        let mut engine = SnakeEngine::new(GameConfig::default());
        engine.add_player(Slot::ONE).unwrap();
        engine.add_player(Slot::TWO).unwrap();
        engine
    }

    fn playing_engine() -> SnakeEngine {
        let mut engine = engine_with_two();
        engine.start();
        engine
    }

    /// Replaces a player's body wholesale, for scenario setup.
    fn set_body(engine: &mut SnakeEngine, slot: Slot, cells: &[(i32, i32)]) {
        let player = engine.players.get_mut(&slot).unwrap();
        player.body = cells.iter().map(|&(x, y)| GridPos::new(x, y)).collect();
        player.length = cells.len();
    }

    // ===== roster =====

    #[test]
    fn test_add_player_spawns_at_opposite_corners() {
        let engine = engine_with_two();
        let p1 = engine.player(Slot::ONE).unwrap();
        let p2 = engine.player(Slot::TWO).unwrap();

        assert_eq!(p1.head(), Some(GridPos::new(2, 2)));
        assert_eq!(p1.direction, Direction::Right);
        assert_eq!(p2.head(), Some(GridPos::new(37, 27)));
        assert_eq!(p2.direction, Direction::Left);
        assert_eq!(p1.length, 1);
        assert_eq!(p1.body.len(), 1);
    }

    #[test]
    fn test_add_player_rejects_occupied_slot_and_full_session() {
        let mut engine = SnakeEngine::new(GameConfig::default());
        engine.add_player(Slot::ONE).unwrap();
        assert_eq!(
            engine.add_player(Slot::ONE),
            Err(EngineError::SlotOccupied(Slot::ONE))
        );
        engine.add_player(Slot::TWO).unwrap();
        assert_eq!(engine.add_player(Slot(3)), Err(EngineError::SessionFull));
    }

    #[test]
    fn test_remove_player_does_not_end_synchronously() {
        let mut engine = playing_engine();
        engine.remove_player(Slot::TWO);

        // Still playing until the next tick evaluates the end condition.
        assert_eq!(engine.phase(), GamePhase::Playing);
        engine.tick();
        assert_eq!(engine.phase(), GamePhase::Ended);
        assert_eq!(engine.winner(), Some(Slot::ONE));
    }

    // ===== lifecycle =====

    #[test]
    fn test_tick_is_a_no_op_outside_playing() {
        let mut engine = engine_with_two();
        let before = engine.player(Slot::ONE).unwrap().head();
        assert!(engine.tick().is_empty());
        assert_eq!(engine.player(Slot::ONE).unwrap().head(), before);

        engine.start();
        engine.force_end();
        assert!(engine.tick().is_empty());
    }

    #[test]
    fn test_start_only_from_waiting() {
        let mut engine = engine_with_two();
        engine.start();
        engine.force_end();
        engine.start();
        assert_eq!(engine.phase(), GamePhase::Ended);
    }

    // ===== movement =====

    #[test]
    fn test_tick_advances_one_cell() {
        let mut engine = playing_engine();
        engine.food = GridPos::new(20, 20); // out of everyone's path
        engine.tick();
        assert_eq!(
            engine.player(Slot::ONE).unwrap().head(),
            Some(GridPos::new(3, 2))
        );
        assert_eq!(
            engine.player(Slot::TWO).unwrap().head(),
            Some(GridPos::new(36, 27))
        );
    }

    #[test]
    fn test_movement_wraps_toroidally() {
        let mut engine = playing_engine();
        engine.food = GridPos::new(20, 20);
        set_body(&mut engine, Slot::ONE, &[(39, 5)]);
        engine.players.get_mut(&Slot::ONE).unwrap().direction = Direction::Right;
        set_body(&mut engine, Slot::TWO, &[(10, 0)]);
        engine.players.get_mut(&Slot::TWO).unwrap().direction = Direction::Up;

        engine.tick();
        assert_eq!(
            engine.player(Slot::ONE).unwrap().head(),
            Some(GridPos::new(0, 5))
        );
        assert_eq!(
            engine.player(Slot::TWO).unwrap().head(),
            Some(GridPos::new(10, 29))
        );
    }

    #[test]
    fn test_body_follows_head() {
        let mut engine = playing_engine();
        engine.food = GridPos::new(20, 20);
        set_body(&mut engine, Slot::ONE, &[(5, 5), (4, 5), (3, 5)]);

        engine.tick();
        let body: Vec<GridPos> = engine
            .player(Slot::ONE)
            .unwrap()
            .body
            .iter()
            .copied()
            .collect();
        assert_eq!(
            body,
            vec![GridPos::new(6, 5), GridPos::new(5, 5), GridPos::new(4, 5)]
        );
    }

    // ===== input gate =====

    #[test]
    fn test_first_input_is_never_rate_limited() {
        let mut engine = playing_engine();
        let event = engine.apply_input(Slot::ONE, Direction::Down, Instant::now());
        assert!(matches!(
            event,
            Some(GameEvent::DirectionChanged {
                slot: Slot(1),
                direction: Direction::Down,
                sequence: 1,
            })
        ));
    }

    #[test]
    fn test_reversal_is_rejected() {
        let mut engine = playing_engine();
        // Player 1 faces right; left is the exact reversal.
        assert!(engine
            .apply_input(Slot::ONE, Direction::Left, Instant::now())
            .is_none());
        assert_eq!(engine.player(Slot::ONE).unwrap().direction, Direction::Right);
    }

    #[test]
    fn test_inputs_inside_rate_window_are_dropped() {
        let mut engine = playing_engine();
        let t0 = Instant::now();

        assert!(engine.apply_input(Slot::ONE, Direction::Down, t0).is_some());
        // 40ms later: gated, direction unchanged.
        assert!(engine
            .apply_input(Slot::ONE, Direction::Right, t0 + Duration::from_millis(40))
            .is_none());
        assert_eq!(engine.player(Slot::ONE).unwrap().direction, Direction::Down);
        // 50ms after the accepted input: passes.
        assert!(engine
            .apply_input(Slot::ONE, Direction::Right, t0 + Duration::from_millis(50))
            .is_some());
    }

    #[test]
    fn test_rejected_input_does_not_reset_the_rate_window() {
        let mut engine = playing_engine();
        let t0 = Instant::now();

        assert!(engine.apply_input(Slot::ONE, Direction::Down, t0).is_some());
        assert!(engine
            .apply_input(Slot::ONE, Direction::Right, t0 + Duration::from_millis(30))
            .is_none());
        // Window is measured from the accepted input at t0, not the reject.
        assert!(engine
            .apply_input(Slot::ONE, Direction::Right, t0 + Duration::from_millis(55))
            .is_some());
    }

    #[test]
    fn test_sequence_is_global_and_monotonic() {
        let mut engine = playing_engine();
        let t0 = Instant::now();

        let seq = |event: Option<GameEvent>| match event {
            Some(GameEvent::DirectionChanged { sequence, .. }) => sequence,
            other => panic!("expected direction_changed, got {other:?}"),
        };

        assert_eq!(seq(engine.apply_input(Slot::ONE, Direction::Down, t0)), 1);
        assert_eq!(seq(engine.apply_input(Slot::TWO, Direction::Up, t0)), 2);
        assert_eq!(
            seq(engine.apply_input(
                Slot::ONE,
                Direction::Right,
                t0 + Duration::from_millis(60)
            )),
            3
        );
    }

    #[test]
    fn test_input_ignored_outside_playing_and_for_dead_players() {
        let mut engine = engine_with_two();
        assert!(engine
            .apply_input(Slot::ONE, Direction::Down, Instant::now())
            .is_none());

        engine.start();
        engine.players.get_mut(&Slot::ONE).unwrap().alive = false;
        assert!(engine
            .apply_input(Slot::ONE, Direction::Down, Instant::now())
            .is_none());
    }

    // ===== collisions and food =====

    #[test]
    fn test_food_eaten_grows_scores_and_relocates() {
        let mut engine = playing_engine();
        set_body(&mut engine, Slot::ONE, &[(4, 5)]);
        engine.players.get_mut(&Slot::ONE).unwrap().direction = Direction::Right;
        engine.food = GridPos::new(5, 5);

        let events = engine.tick();
        let p1 = engine.player(Slot::ONE).unwrap();
        assert_eq!(p1.length, 2);
        assert_eq!(p1.score, 1);
        assert!(p1.alive);

        let food = engine.food();
        assert_ne!(food, GridPos::new(5, 5));
        assert!(!engine.cell_occupied(food));
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::FoodEaten { slot: Slot(1), new_food_x, new_food_y }
                if (*new_food_x, *new_food_y) == (food.x, food.y)
        )));
        assert!(engine.format_state().starts_with("p1:len:2,alive:1"));
    }

    #[test]
    fn test_body_grows_toward_target_length() {
        let mut engine = playing_engine();
        set_body(&mut engine, Slot::ONE, &[(4, 5)]);
        engine.players.get_mut(&Slot::ONE).unwrap().direction = Direction::Right;
        engine.food = GridPos::new(5, 5);

        engine.tick(); // eats: body 2 of target 2
        assert_eq!(engine.player(Slot::ONE).unwrap().body.len(), 2);
        engine.food = GridPos::new(20, 20);
        engine.tick(); // steady state: still 2
        assert_eq!(engine.player(Slot::ONE).unwrap().body.len(), 2);
    }

    #[test]
    fn test_self_collision_kills() {
        let mut engine = playing_engine();
        engine.food = GridPos::new(20, 20);
        // Head (5,5) moving up into its own tail loop.
        set_body(&mut engine, Slot::ONE, &[(5, 5), (4, 5), (4, 4), (5, 4)]);
        engine.players.get_mut(&Slot::ONE).unwrap().direction = Direction::Up;

        let events = engine.tick();
        assert!(!engine.player(Slot::ONE).unwrap().alive);
        assert!(events.contains(&GameEvent::Collision {
            slot: Slot::ONE,
            cause: CollisionCause::SelfHit,
        }));
    }

    #[test]
    fn test_opponent_collision_kills() {
        let mut engine = playing_engine();
        engine.food = GridPos::new(30, 20);
        set_body(&mut engine, Slot::ONE, &[(9, 10)]);
        engine.players.get_mut(&Slot::ONE).unwrap().direction = Direction::Right;
        // Player 2's body crosses (10,10); keep its own move harmless.
        set_body(&mut engine, Slot::TWO, &[(10, 11), (10, 10), (10, 9)]);
        engine.players.get_mut(&Slot::TWO).unwrap().direction = Direction::Down;

        let events = engine.tick();
        assert!(!engine.player(Slot::ONE).unwrap().alive);
        assert!(events.contains(&GameEvent::Collision {
            slot: Slot::ONE,
            cause: CollisionCause::Opponent,
        }));
    }

    #[test]
    fn test_dead_opponents_are_pass_through() {
        let mut engine = playing_engine();
        engine.food = GridPos::new(30, 20);
        set_body(&mut engine, Slot::ONE, &[(9, 10)]);
        engine.players.get_mut(&Slot::ONE).unwrap().direction = Direction::Right;
        set_body(&mut engine, Slot::TWO, &[(10, 11), (10, 10), (10, 9)]);
        engine.players.get_mut(&Slot::TWO).unwrap().alive = false;

        engine.tick();
        // Walked straight through the corpse.
        assert!(engine.player(Slot::ONE).unwrap().alive);
        assert_eq!(
            engine.player(Slot::ONE).unwrap().head(),
            Some(GridPos::new(10, 10))
        );
    }

    // ===== end conditions =====

    #[test]
    fn test_collision_ends_game_at_tick_evaluation_with_survivor_winning() {
        let mut engine = playing_engine();
        engine.food = GridPos::new(30, 20);
        set_body(&mut engine, Slot::ONE, &[(9, 10)]);
        engine.players.get_mut(&Slot::ONE).unwrap().direction = Direction::Right;
        set_body(&mut engine, Slot::TWO, &[(10, 11), (10, 10), (10, 9)]);
        engine.players.get_mut(&Slot::TWO).unwrap().direction = Direction::Down;

        engine.tick();
        assert_eq!(engine.phase(), GamePhase::Ended);
        assert_eq!(engine.winner(), Some(Slot::TWO));
    }

    #[test]
    fn test_target_score_ends_game() {
        let mut engine = playing_engine();
        set_body(&mut engine, Slot::ONE, &[(4, 5)]);
        engine.players.get_mut(&Slot::ONE).unwrap().direction = Direction::Right;
        engine.players.get_mut(&Slot::ONE).unwrap().score = 99;
        engine.food = GridPos::new(5, 5);

        engine.tick();
        assert_eq!(engine.phase(), GamePhase::Ended);
        assert_eq!(engine.winner(), Some(Slot::ONE));
        assert_eq!(engine.player(Slot::ONE).unwrap().score, 100);
    }

    #[test]
    fn test_exact_score_tie_has_no_winner() {
        let mut engine = playing_engine();
        engine.food = GridPos::new(20, 20);
        engine.players.get_mut(&Slot::ONE).unwrap().score = 100;
        engine.players.get_mut(&Slot::TWO).unwrap().score = 100;

        engine.tick();
        assert_eq!(engine.phase(), GamePhase::Ended);
        assert_eq!(engine.winner(), None);
    }

    #[test]
    fn test_force_end_declares_no_winner() {
        let mut engine = playing_engine();
        engine.force_end();
        assert_eq!(engine.phase(), GamePhase::Ended);
        assert_eq!(engine.winner(), None);
    }

    // ===== food placement =====

    #[test]
    fn test_food_lands_on_the_only_free_cell() {
        let config = GameConfig {
            board: Board::new(2, 2),
            ..GameConfig::default()
        };
        let mut engine = SnakeEngine::new(config);
        engine.add_player(Slot::ONE).unwrap();
        set_body(&mut engine, Slot::ONE, &[(0, 0), (0, 1), (1, 0)]);

        // (3/4)^100 odds of missing; effectively deterministic.
        assert_eq!(engine.place_food(), GridPos::new(1, 1));
    }

    #[test]
    fn test_food_placement_on_a_full_board_still_terminates() {
        let config = GameConfig {
            board: Board::new(2, 2),
            ..GameConfig::default()
        };
        let mut engine = SnakeEngine::new(config);
        engine.add_player(Slot::ONE).unwrap();
        set_body(&mut engine, Slot::ONE, &[(0, 0), (0, 1), (1, 0), (1, 1)]);

        let food = engine.place_food();
        assert!((0..2).contains(&food.x) && (0..2).contains(&food.y));
    }

    #[test]
    fn test_initial_food_is_not_on_a_snake() {
        for _ in 0..20 {
            let engine = engine_with_two();
            assert!(!engine.cell_occupied(engine.food()));
        }
    }

    // ===== rendering =====

    #[test]
    fn test_format_state_shape() {
        let mut engine = engine_with_two();
        engine.food = GridPos::new(5, 9);
        engine.players.get_mut(&Slot::ONE).unwrap().score = 1;
        engine.players.get_mut(&Slot::ONE).unwrap().length = 2;

        assert_eq!(
            engine.format_state(),
            "p1:len:2,alive:1;p2:len:1,alive:1;food:x:5,y:9;scores:1,0"
        );
    }

    #[test]
    fn test_format_state_with_absent_slot() {
        let mut engine = SnakeEngine::new(GameConfig::default());
        engine.add_player(Slot::ONE).unwrap();
        engine.food = GridPos::new(3, 4);

        assert_eq!(
            engine.format_state(),
            "p1:len:1,alive:1;p2:len:0,alive:0;food:x:3,y:4;scores:0"
        );
    }

    #[test]
    fn test_format_initial_state_appends_target() {
        let mut engine = engine_with_two();
        engine.food = GridPos::new(3, 4);
        assert!(engine
            .format_initial_state()
            .ends_with(";target_score: 100"));
    }
}
