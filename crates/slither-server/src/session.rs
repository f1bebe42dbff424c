//! Session actor: an isolated task that owns one engine and its tick loop.
//!
//! Each matched pair of clients gets its own actor, communicating with the
//! outside world through an mpsc channel. Joins, inputs, and the tick
//! cadence are therefore serialized per session without any shared locks;
//! broadcasts go straight to the members' outbound channels.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use slither_engine::{
    Direction, GameConfig, GameEvent, GamePhase, SnakeEngine, TICK_INTERVAL,
};
use slither_protocol::{
    AssignmentData, ClientId, CommandKind, DataKind, SessionId, Slot, StatusKind, WireMessage,
};
use slither_tick::Ticker;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::server::ServerState;

/// How long a session may sit without activity before the sweep reaps it.
pub(crate) const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Delay between game over and teardown, so clients can read the result.
const END_GRACE: Duration = Duration::from_secs(5);

/// Command channel size for session actors.
const CHANNEL_SIZE: usize = 64;

type Outbound = mpsc::UnboundedSender<WireMessage>;

/// Commands sent to a session actor through its channel.
pub(crate) enum SessionCommand {
    /// Seat a client. Replies with the assigned slot.
    Join {
        client: ClientId,
        outbound: Outbound,
        reply: oneshot::Sender<Result<Slot, SessionError>>,
    },

    /// Unseat a client (disconnect or teardown).
    Leave { client: ClientId },

    /// A direction change from a seated client.
    Input { client: ClientId, direction: Direction },

    /// Request the current session metadata.
    Info { reply: oneshot::Sender<SessionInfo> },

    /// The sweep flagged this session as idle. The actor re-checks before
    /// acting, in case activity arrived after the scan.
    Timeout,
}

/// A snapshot of session metadata (not the game state itself).
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionInfo {
    pub(crate) id: SessionId,
    pub(crate) phase: GamePhase,
    pub(crate) player_count: usize,
    pub(crate) idle_for: Duration,
}

/// Handle to a running session actor. Cheap to clone.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    /// Seats a client and returns its slot.
    pub(crate) async fn join(
        &self,
        client: ClientId,
        outbound: Outbound,
    ) -> Result<Slot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Join {
                client,
                outbound,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Closed(self.id))?;
        reply_rx.await.map_err(|_| SessionError::Closed(self.id))?
    }

    /// Unseats a client (fire-and-forget).
    pub(crate) async fn leave(&self, client: ClientId) {
        let _ = self.tx.send(SessionCommand::Leave { client }).await;
    }

    /// Forwards a direction change (fire-and-forget; the engine gates it).
    pub(crate) async fn input(&self, client: ClientId, direction: Direction) {
        let _ = self
            .tx
            .send(SessionCommand::Input { client, direction })
            .await;
    }

    pub(crate) async fn info(&self) -> Result<SessionInfo, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Info { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Closed(self.id))?;
        reply_rx.await.map_err(|_| SessionError::Closed(self.id))
    }

    /// Asks the actor to tear down if it is still idle.
    pub(crate) async fn timeout(&self) {
        let _ = self.tx.send(SessionCommand::Timeout).await;
    }
}

struct Member {
    client: ClientId,
    outbound: Outbound,
}

/// The internal session actor state. Runs inside its own task.
struct SessionActor {
    id: SessionId,
    engine: SnakeEngine,
    members: BTreeMap<Slot, Member>,
    ticker: Ticker,
    rx: mpsc::Receiver<SessionCommand>,
    last_activity: Instant,
    idle_timeout: Duration,
    /// Set once the game has ended; the actor stops when it elapses.
    grace_until: Option<TokioInstant>,
}

impl SessionActor {
    /// Runs the actor loop until the session dies: emptied, timed out,
    /// or the post-game grace elapsed. Returns the clients still seated
    /// so the caller can unlink them.
    async fn run(mut self) -> Vec<ClientId> {
        info!(session_id = %self.id, "session started");

        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Join { client, outbound, reply }) => {
                            let _ = reply.send(self.handle_join(client, outbound));
                        }
                        Some(SessionCommand::Leave { client }) => {
                            self.handle_leave(client);
                            if self.members.is_empty() {
                                debug!(session_id = %self.id, "session emptied");
                                break;
                            }
                        }
                        Some(SessionCommand::Input { client, direction }) => {
                            self.handle_input(client, direction);
                        }
                        Some(SessionCommand::Info { reply }) => {
                            let _ = reply.send(self.info());
                        }
                        Some(SessionCommand::Timeout) => {
                            if self.last_activity.elapsed() > self.idle_timeout {
                                self.notify_timeout();
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = self.ticker.tick() => {
                    self.handle_tick();
                }
                _ = wait_until(self.grace_until) => {
                    debug!(session_id = %self.id, "post-game grace elapsed");
                    break;
                }
            }
        }

        info!(session_id = %self.id, "session stopped");
        self.members.into_values().map(|m| m.client).collect()
    }

    /// Seats a client in the lowest free slot and runs the join
    /// choreography: assignment to the joiner, opponent notice to the
    /// rest, one initial snapshot, and game start when the session fills.
    fn handle_join(
        &mut self,
        client: ClientId,
        outbound: Outbound,
    ) -> Result<Slot, SessionError> {
        if self.engine.phase() != GamePhase::Waiting {
            return Err(SessionError::NotJoinable(self.id));
        }
        let slot = [Slot::ONE, Slot::TWO]
            .into_iter()
            .find(|s| !self.members.contains_key(s))
            .ok_or(SessionError::Full(self.id))?;
        self.engine
            .add_player(slot)
            .map_err(|_| SessionError::Full(self.id))?;

        self.members.insert(slot, Member { client, outbound });
        self.last_activity = Instant::now();
        let count = self.members.len();
        info!(session_id = %self.id, %client, %slot, players = count, "player joined");

        let data = assignment_data(slot, self.id, count);
        self.send_to(
            slot,
            status_message(
                StatusKind::PlayerAssignment,
                format!("You are Player {slot}"),
                data.clone(),
            ),
        );
        for &other in self.members.keys().filter(|&&s| s != slot) {
            self.send_to(
                other,
                status_message(
                    StatusKind::OpponentConnected,
                    format!("Player {slot} joined the game"),
                    data.clone(),
                ),
            );
        }
        self.send_to(
            slot,
            snapshot_message(self.id, self.engine.format_initial_state()),
        );

        if count == 2 {
            self.engine.start();
            self.ticker.start();
            self.broadcast(WireMessage::Command {
                command_kind: CommandKind::GameStart,
                parameters: None,
                data: None,
                session_id: Some(self.id),
            });
            info!(session_id = %self.id, "game started");
        }

        Ok(slot)
    }

    /// Removes a member. The engine resolves any resulting end condition
    /// at its own next tick, never synchronously with the leave.
    fn handle_leave(&mut self, client: ClientId) {
        let Some(slot) = self.slot_of(client) else {
            return;
        };
        self.members.remove(&slot);
        self.engine.remove_player(slot);
        info!(
            session_id = %self.id, %client, %slot,
            players = self.members.len(),
            "player left"
        );

        let data = assignment_data(slot, self.id, self.members.len());
        self.broadcast(status_message(
            StatusKind::OpponentDisconnected,
            format!("Player {slot} disconnected"),
            data,
        ));
    }

    fn handle_input(&mut self, client: ClientId, direction: Direction) {
        let Some(slot) = self.slot_of(client) else {
            warn!(session_id = %self.id, %client, "input from non-member, ignoring");
            return;
        };
        if let Some(event) = self.engine.apply_input(slot, direction, Instant::now()) {
            self.last_activity = Instant::now();
            self.broadcast(event_message(self.id, &event));
        }
    }

    /// One authoritative step: run the simulation, broadcast its events
    /// and the fresh snapshot, and arm the teardown grace on game over.
    fn handle_tick(&mut self) {
        if self.engine.phase() != GamePhase::Playing {
            return;
        }

        let events = self.engine.tick();
        for event in &events {
            self.broadcast(event_message(self.id, event));
        }
        self.broadcast(snapshot_message(self.id, self.engine.format_state()));
        self.last_activity = Instant::now();

        if self.engine.phase() == GamePhase::Ended && self.grace_until.is_none() {
            self.ticker.stop();
            let verdict = match self.engine.winner() {
                Some(slot) => format!("Player {slot} wins!"),
                None => "Game ended".to_string(),
            };
            info!(session_id = %self.id, %verdict, "game over");
            self.broadcast(WireMessage::Command {
                command_kind: CommandKind::GameEnd,
                parameters: None,
                data: Some(verdict),
                session_id: Some(self.id),
            });
            self.grace_until = Some(TokioInstant::now() + END_GRACE);
        }
    }

    fn notify_timeout(&self) {
        warn!(
            session_id = %self.id,
            idle = ?self.last_activity.elapsed(),
            "session timed out"
        );
        self.broadcast(WireMessage::Status {
            status_kind: StatusKind::SessionTimeout,
            message: "Session timed out due to inactivity".into(),
            data: json!({ "sessionId": self.id }),
        });
        self.broadcast(WireMessage::Command {
            command_kind: CommandKind::GameEnd,
            parameters: None,
            data: Some("Game end due to session inactivity".into()),
            session_id: Some(self.id),
        });
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            phase: self.engine.phase(),
            player_count: self.members.len(),
            idle_for: self.last_activity.elapsed(),
        }
    }

    fn slot_of(&self, client: ClientId) -> Option<Slot> {
        self.members
            .iter()
            .find(|(_, m)| m.client == client)
            .map(|(&slot, _)| slot)
    }

    /// Sends to one member. Silently drops if the member's writer is gone.
    fn send_to(&self, slot: Slot, msg: WireMessage) {
        if let Some(member) = self.members.get(&slot) {
            let _ = member.outbound.send(msg);
        }
    }

    fn broadcast(&self, msg: WireMessage) {
        for member in self.members.values() {
            let _ = member.outbound.send(msg.clone());
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn wait_until(deadline: Option<TokioInstant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn assignment_data(slot: Slot, session_id: SessionId, player_count: usize) -> Value {
    serde_json::to_value(AssignmentData {
        slot,
        session_id,
        player_count,
    })
    .unwrap_or_default()
}

fn status_message(status_kind: StatusKind, message: String, data: Value) -> WireMessage {
    WireMessage::Status {
        status_kind,
        message,
        data,
    }
}

fn snapshot_message(session_id: SessionId, fragment: String) -> WireMessage {
    WireMessage::GameData {
        data_kind: DataKind::GameData,
        payload: Value::String(fragment),
        player_id: None,
        metadata: None,
        client_id: None,
        session_id: Some(session_id),
    }
}

fn event_message(session_id: SessionId, event: &GameEvent) -> WireMessage {
    WireMessage::GameData {
        data_kind: DataKind::GameEvent,
        payload: serde_json::to_value(event).unwrap_or_default(),
        player_id: None,
        metadata: None,
        client_id: None,
        session_id: Some(session_id),
    }
}

/// Spawns a session actor and returns the handle to command it.
///
/// When the actor stops it unlinks itself: the manager forgets the
/// session and any still-seated clients lose their slot in the registry.
pub(crate) fn spawn_session(id: SessionId, state: Arc<ServerState>) -> SessionHandle {
    let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
    let actor = SessionActor {
        id,
        engine: SnakeEngine::new(GameConfig::default()),
        members: BTreeMap::new(),
        ticker: Ticker::new(TICK_INTERVAL),
        rx,
        last_activity: Instant::now(),
        idle_timeout: IDLE_TIMEOUT,
        grace_until: None,
    };

    tokio::spawn(async move {
        let leftover = actor.run().await;
        cleanup(&state, id, &leftover).await;
    });

    SessionHandle { id, tx }
}

/// Unlinks a stopped session from the manager and the registry.
async fn cleanup(state: &ServerState, id: SessionId, leftover: &[ClientId]) {
    state.sessions.lock().await.forget(id, leftover);
    let mut registry = state.registry.lock().await;
    for &client in leftover {
        if let Some(handle) = registry.get_mut(client) {
            handle.slot = None;
            handle.session = None;
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
