//! Per-connection message handling.
//!
//! One [`ConnectionHandlers`] is created per socket and driven by the
//! protocol router. It owns no game state: everything flows through the
//! shared registry and the session actors.

use std::sync::Arc;

use serde_json::Value;
use slither_engine::Direction;
use slither_protocol::{
    ClientClass, ClientId, CommandKind, DataKind, HANDSHAKE_ACK, MessageHandlers, SessionId,
    Slot, StatusKind, TileSizeVerdict, WireMessage, validate_tile_size,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::server::ServerState;
use crate::session::SessionHandle;

pub(crate) struct ConnectionHandlers {
    client_id: ClientId,
    class: ClientClass,
    outbound: mpsc::UnboundedSender<WireMessage>,
    state: Arc<ServerState>,
}

impl ConnectionHandlers {
    pub(crate) fn new(
        client_id: ClientId,
        class: ClientClass,
        outbound: mpsc::UnboundedSender<WireMessage>,
        state: Arc<ServerState>,
    ) -> Self {
        Self {
            client_id,
            class,
            outbound,
            state,
        }
    }

    fn send(&self, msg: WireMessage) {
        let _ = self.outbound.send(msg);
    }

    /// Seats this client in a session unless it already sits in one, then
    /// records the placement in the registry.
    async fn matchmake(&self) {
        let placed = {
            let mut sessions = self.state.sessions.lock().await;
            if sessions.session_of(self.client_id).is_some() {
                return;
            }
            sessions
                .join_or_create(self.client_id, self.outbound.clone(), &self.state)
                .await
        };
        match placed {
            Ok((session_id, slot)) => {
                let mut registry = self.state.registry.lock().await;
                if let Some(handle) = registry.get_mut(self.client_id) {
                    handle.slot = Some(slot);
                    handle.session = Some(session_id);
                }
            }
            Err(e) => {
                warn!(client = %self.client_id, error = %e, "matchmaking failed");
            }
        }
    }

    /// Resolves this client's session handle, or logs why it cannot.
    async fn own_session(&self, action: &str) -> Option<SessionHandle> {
        let sessions = self.state.sessions.lock().await;
        match sessions.session_of(self.client_id) {
            Some(handle) => Some(handle.clone()),
            None => {
                warn!(client = %self.client_id, action, "not in a session, dropping");
                None
            }
        }
    }

    async fn report_game_state(&self) {
        let Some(handle) = self.own_session("game state request").await else {
            return;
        };
        let Ok(info) = handle.info().await else {
            return;
        };
        self.send(WireMessage::GameData {
            data_kind: DataKind::GameState,
            payload: Value::String(format!(
                "session:{},phase:{},players:{}",
                info.id.0, info.phase, info.player_count
            )),
            player_id: None,
            metadata: None,
            client_id: None,
            session_id: None,
        });
    }
}

impl MessageHandlers for ConnectionHandlers {
    /// Handshake acknowledgement. Web and mobile clients become validated
    /// and enter matchmaking here; embedded clients validate through the
    /// tile size negotiation instead.
    async fn on_connection(&mut self, identity: ClientId, text: String) {
        debug!(client = %self.client_id, %identity, %text, "connection ack");
        if text != HANDSHAKE_ACK {
            return;
        }
        if self.class == ClientClass::Embedded {
            return;
        }
        {
            let mut registry = self.state.registry.lock().await;
            if let Some(handle) = registry.get_mut(self.client_id) {
                handle.validated = true;
            }
        }
        self.matchmake().await;
    }

    async fn on_tile_size_proposal(&mut self, tile_size: i64) {
        match validate_tile_size(tile_size) {
            Ok(()) => {
                info!(client = %self.client_id, tile_size, "tile size accepted");
                {
                    let mut registry = self.state.registry.lock().await;
                    if let Some(handle) = registry.get_mut(self.client_id) {
                        handle.tile_size = Some(tile_size);
                        handle.validated = true;
                    }
                }
                self.send(WireMessage::Status {
                    status_kind: StatusKind::TileSizeResponse,
                    message: format!("TILE_SIZE {tile_size} accepted"),
                    data: verdict(TileSizeVerdict::Accepted),
                });
                self.matchmake().await;
            }
            Err(reason) => {
                warn!(client = %self.client_id, tile_size, %reason, "tile size rejected");
                self.send(WireMessage::Status {
                    status_kind: StatusKind::TileSizeResponse,
                    message: reason,
                    data: verdict(TileSizeVerdict::Rejected),
                });
            }
        }
    }

    async fn on_command(
        &mut self,
        command_kind: CommandKind,
        parameters: Option<Value>,
        data: Option<String>,
        session_id: Option<SessionId>,
    ) {
        match command_kind {
            CommandKind::GetClients => {
                let clients = self.state.registry.lock().await.client_list();
                self.send(WireMessage::ClientList { clients });
            }
            CommandKind::GetSessionStats => {
                let stats = self.state.sessions.lock().await.stats().await;
                self.send(WireMessage::SessionStats {
                    total_sessions: stats.total_sessions,
                    active_sessions: stats.active_sessions,
                    waiting_sessions: stats.waiting_sessions,
                    total_players: stats.total_players,
                });
            }
            // Firmware control verbs pass through to every embedded client.
            CommandKind::GameRestart | CommandKind::Sleep | CommandKind::Update => {
                debug!(client = %self.client_id, ?command_kind, "forwarding firmware command");
                let forward = WireMessage::Command {
                    command_kind,
                    parameters,
                    data,
                    session_id,
                };
                self.state
                    .registry
                    .lock()
                    .await
                    .broadcast_to_class(ClientClass::Embedded, &forward);
            }
            CommandKind::RequestGameState => {
                self.report_game_state().await;
            }
            CommandKind::GameStart | CommandKind::GameEnd => {
                warn!(
                    client = %self.client_id,
                    ?command_kind,
                    "server-only command from client, dropping"
                );
            }
        }
    }

    async fn on_game_data(
        &mut self,
        data_kind: DataKind,
        payload: Value,
        _player_id: Option<Slot>,
        _session_id: Option<SessionId>,
    ) {
        if data_kind != DataKind::PlayerAction {
            warn!(client = %self.client_id, ?data_kind, "unexpected game_data from client");
            return;
        }
        let Some(handle) = self.own_session("player action").await else {
            return;
        };
        let Some(direction) = parse_action(&payload) else {
            warn!(client = %self.client_id, %payload, "malformed player action");
            return;
        };
        // Phase and rate gating happen inside the engine.
        handle.input(self.client_id, direction).await;
    }

    /// Chat fan-out: the sender gets an acknowledgement, session peers a
    /// short `[P<slot>]` line, everyone else an annotated global line.
    async fn on_chat(&mut self, text: String) {
        info!(client = %self.client_id, %text, "chat");
        self.send(WireMessage::Chat {
            text: format!("Server received your message: \"{text}\""),
        });

        let registry = self.state.registry.lock().await;
        let (own_slot, own_session) = registry
            .get(self.client_id)
            .map(|h| (h.slot, h.session))
            .unwrap_or((None, None));
        let tag = self.class.as_str().to_uppercase();
        let global = match own_slot {
            Some(slot) => format!("[{tag}-P{slot}] {text}"),
            None => format!("[{tag}] {text}"),
        };
        for (&id, handle) in registry.iter() {
            if id == self.client_id {
                continue;
            }
            let line = match (own_session, handle.session, own_slot) {
                (Some(mine), Some(theirs), Some(slot)) if mine == theirs => {
                    format!("[P{slot}] {text}")
                }
                _ => global.clone(),
            };
            let _ = handle.outbound.send(WireMessage::Chat { text: line });
        }
    }

    async fn on_ping(&mut self) {
        trace!(client = %self.client_id, "ping");
    }
}

fn verdict(v: TileSizeVerdict) -> Value {
    serde_json::to_value(v).unwrap_or_default()
}

/// Parses a `direction:<code>` action payload.
fn parse_action(payload: &Value) -> Option<Direction> {
    let text = payload.as_str()?;
    let code: u8 = text.strip_prefix("direction:")?.trim().parse().ok()?;
    Direction::try_from(code).ok()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_action_accepts_direction_codes() {
        assert_eq!(parse_action(&json!("direction:0")), Some(Direction::Right));
        assert_eq!(parse_action(&json!("direction:1")), Some(Direction::Down));
        assert_eq!(parse_action(&json!("direction:3")), Some(Direction::Up));
    }

    #[test]
    fn test_parse_action_rejects_garbage() {
        assert_eq!(parse_action(&json!("direction:7")), None);
        assert_eq!(parse_action(&json!("direction:")), None);
        assert_eq!(parse_action(&json!("turn:1")), None);
        assert_eq!(parse_action(&json!(2)), None);
    }
}
