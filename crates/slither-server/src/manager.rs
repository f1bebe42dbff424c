//! Session bookkeeping: pairing clients into sessions and tracking
//! which client sits where.
//!
//! The manager is plain data behind the server's mutex; the sessions
//! themselves run as independent actors (see [`crate::session`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use slither_engine::GamePhase;
use slither_protocol::{ClientId, SessionId, Slot, WireMessage};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::server::ServerState;
use crate::session::{SessionHandle, spawn_session};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Aggregate counters over the live sessions.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SessionStats {
    pub(crate) total_sessions: usize,
    pub(crate) active_sessions: usize,
    pub(crate) waiting_sessions: usize,
    pub(crate) total_players: usize,
}

#[derive(Default)]
pub(crate) struct SessionManager {
    sessions: HashMap<SessionId, SessionHandle>,
    /// Which session each seated client belongs to.
    members: HashMap<ClientId, SessionId>,
}

impl SessionManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seats a client in the first session still waiting for players, or
    /// spawns a fresh one. A session may stop accepting between the scan
    /// and the join; such losses fall through to the next candidate.
    pub(crate) async fn join_or_create(
        &mut self,
        client: ClientId,
        outbound: mpsc::UnboundedSender<WireMessage>,
        state: &Arc<ServerState>,
    ) -> Result<(SessionId, Slot), SessionError> {
        if let Some(&seated) = self.members.get(&client) {
            return Err(SessionError::AlreadySeated(client, seated));
        }

        let candidates: Vec<SessionHandle> = self.sessions.values().cloned().collect();
        for handle in candidates {
            let Ok(info) = handle.info().await else {
                continue;
            };
            if info.phase != GamePhase::Waiting || info.player_count >= 2 {
                continue;
            }
            match handle.join(client, outbound.clone()).await {
                Ok(slot) => {
                    self.members.insert(client, handle.id());
                    debug!(session_id = %handle.id(), %client, "joined waiting session");
                    return Ok((handle.id(), slot));
                }
                // Lost the seat between scan and join; keep looking.
                Err(_) => continue,
            }
        }

        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        let handle = spawn_session(id, Arc::clone(state));
        let slot = handle.join(client, outbound).await?;
        self.sessions.insert(id, handle);
        self.members.insert(client, id);
        info!(session_id = %id, %client, "session created");
        Ok((id, slot))
    }

    /// Unseats a client from whatever session holds it.
    pub(crate) async fn leave(&mut self, client: ClientId) {
        let Some(id) = self.members.remove(&client) else {
            return;
        };
        if let Some(handle) = self.sessions.get(&id) {
            handle.leave(client).await;
        }
    }

    pub(crate) fn session_of(&self, client: ClientId) -> Option<&SessionHandle> {
        self.members
            .get(&client)
            .and_then(|id| self.sessions.get(id))
    }

    /// Drops a stopped session and its member links. A leftover client
    /// that already rejoined elsewhere keeps its new link.
    pub(crate) fn forget(&mut self, id: SessionId, leftover: &[ClientId]) {
        self.sessions.remove(&id);
        for &client in leftover {
            if self.members.get(&client) == Some(&id) {
                self.members.remove(&client);
            }
        }
        debug!(session_id = %id, "session forgotten");
    }

    pub(crate) fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.values().cloned().collect()
    }

    /// Polls every session for its phase and headcount. Sessions that
    /// die mid-poll are simply not counted.
    pub(crate) async fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for handle in self.sessions.values() {
            let Ok(info) = handle.info().await else {
                continue;
            };
            stats.total_sessions += 1;
            match info.phase {
                GamePhase::Playing => stats.active_sessions += 1,
                GamePhase::Waiting => stats.waiting_sessions += 1,
                GamePhase::Ended => {}
            }
            stats.total_players += info.player_count;
        }
        stats
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use slither_protocol::{CommandKind, DataKind, StatusKind};
    use tokio::sync::mpsc::UnboundedReceiver;

    type Rx = UnboundedReceiver<WireMessage>;

    async fn seat(
        state: &Arc<ServerState>,
        client: ClientId,
    ) -> ((SessionId, Slot), Rx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let placed = {
            let mut sessions = state.sessions.lock().await;
            sessions.join_or_create(client, tx, state).await.unwrap()
        };
        (placed, rx)
    }

    #[tokio::test]
    async fn test_pairing_fills_waiting_session_before_creating() {
        let state = Arc::new(ServerState::new());

        let ((id1, slot1), _rx1) = seat(&state, ClientId(1)).await;
        let ((id2, slot2), _rx2) = seat(&state, ClientId(2)).await;
        let ((id3, slot3), _rx3) = seat(&state, ClientId(3)).await;

        assert_eq!(id1, id2);
        assert_eq!(slot1, Slot::ONE);
        assert_eq!(slot2, Slot::TWO);
        assert_ne!(id3, id1, "full session must not be reused");
        assert_eq!(slot3, Slot::ONE);
    }

    #[tokio::test]
    async fn test_double_join_is_rejected() {
        let state = Arc::new(ServerState::new());
        let ((id, _), _rx) = seat(&state, ClientId(7)).await;

        let (tx, _rx2) = mpsc::unbounded_channel();
        let mut sessions = state.sessions.lock().await;
        let err = sessions
            .join_or_create(ClientId(7), tx, &state)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("client-7 is already seated in {id}"));
    }

    #[tokio::test]
    async fn test_leave_empties_and_forgets_session() {
        let state = Arc::new(ServerState::new());
        let ((id, _), _rx) = seat(&state, ClientId(1)).await;

        state.sessions.lock().await.leave(ClientId(1)).await;

        // The actor stops on its own and unlinks itself.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let sessions = state.sessions.lock().await;
        assert!(sessions.session_of(ClientId(1)).is_none());
        assert!(!sessions.handles().iter().any(|h| h.id() == id));
    }

    #[tokio::test]
    async fn test_stats_track_phases_and_headcount() {
        let state = Arc::new(ServerState::new());

        let (_placed, _rx1) = seat(&state, ClientId(1)).await;
        let stats = state.sessions.lock().await.stats().await;
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.waiting_sessions, 1);
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.total_players, 1);

        let (_placed, _rx2) = seat(&state, ClientId(2)).await;
        let stats = state.sessions.lock().await.stats().await;
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.waiting_sessions, 0);
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.total_players, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_leave_crowns_survivor_and_reaps_session() {
        let state = Arc::new(ServerState::new());
        let ((id, _), mut rx1) = seat(&state, ClientId(1)).await;
        let ((_, _), _rx2) = seat(&state, ClientId(2)).await;

        state.sessions.lock().await.leave(ClientId(2)).await;

        let mut saw_disconnect = false;
        let verdict = loop {
            let msg = rx1.recv().await.unwrap();
            match msg {
                WireMessage::Status {
                    status_kind: StatusKind::OpponentDisconnected,
                    message,
                    ..
                } => {
                    assert_eq!(message, "Player 2 disconnected");
                    saw_disconnect = true;
                }
                WireMessage::Command {
                    command_kind: CommandKind::GameEnd,
                    data,
                    ..
                } => break data,
                WireMessage::GameData {
                    data_kind: DataKind::GameData | DataKind::GameEvent,
                    ..
                } => {}
                other => panic!("unexpected message {other:?}"),
            }
        };
        assert!(saw_disconnect, "disconnect notice must precede the verdict");
        assert_eq!(verdict.as_deref(), Some("Player 1 wins!"));

        // After the post-game grace the session unlinks itself.
        tokio::time::sleep(Duration::from_secs(6)).await;
        let sessions = state.sessions.lock().await;
        assert!(!sessions.handles().iter().any(|h| h.id() == id));
        assert!(sessions.session_of(ClientId(1)).is_none());
    }
}
