//! Envelope validation and dispatch.
//!
//! [`route`] checks the shape rules the type system cannot express, then
//! hands the message to exactly one method of [`MessageHandlers`]. Every
//! handler has a logged no-op default, so an implementor overrides only the
//! kinds it serves; an envelope hitting a default is a recognized kind with
//! nobody behind it, which is not an error.

use serde_json::Value;
use tracing::debug;

use crate::{
    ClientEntry, ClientId, CommandKind, DataKind, ProtocolError, SessionId, Slot, StatusKind,
    WireMessage,
};

/// Per-kind handlers for decoded envelopes.
pub trait MessageHandlers {
    async fn on_connection(&mut self, _identity: ClientId, _text: String) {
        debug!("connection envelope unhandled");
    }

    async fn on_tile_size_proposal(&mut self, _tile_size: i64) {
        debug!("tile_size_proposal envelope unhandled");
    }

    async fn on_status(&mut self, _status_kind: StatusKind, _message: String, _data: Value) {
        debug!("status envelope unhandled");
    }

    async fn on_command(
        &mut self,
        command_kind: CommandKind,
        _parameters: Option<Value>,
        _data: Option<String>,
        _session_id: Option<SessionId>,
    ) {
        debug!(?command_kind, "command envelope unhandled");
    }

    async fn on_game_data(
        &mut self,
        data_kind: DataKind,
        _payload: Value,
        _player_id: Option<Slot>,
        _session_id: Option<SessionId>,
    ) {
        debug!(?data_kind, "game_data envelope unhandled");
    }

    async fn on_chat(&mut self, _text: String) {
        debug!("chat envelope unhandled");
    }

    async fn on_client_list(&mut self, _clients: Vec<ClientEntry>) {
        debug!("client_list envelope unhandled");
    }

    async fn on_session_stats(
        &mut self,
        _total_sessions: usize,
        _active_sessions: usize,
        _waiting_sessions: usize,
        _total_players: usize,
    ) {
        debug!("session_stats envelope unhandled");
    }

    async fn on_error(&mut self, message: String) {
        debug!(%message, "error envelope unhandled");
    }

    async fn on_ping(&mut self) {
        debug!("ping envelope unhandled");
    }
}

/// Shape rules per kind, applied before dispatch.
///
/// Serde already enforces required fields and field types at decode; what
/// remains is the payload contract of `game_data`, which is `Value`-typed
/// on the envelope because its shape depends on `dataKind`.
pub fn validate(msg: &WireMessage) -> Result<(), ProtocolError> {
    let WireMessage::GameData {
        data_kind, payload, ..
    } = msg
    else {
        return Ok(());
    };
    match data_kind {
        DataKind::GameEvent if !payload.is_object() => Err(ProtocolError::InvalidMessage(
            "game_event payload must be an object".into(),
        )),
        DataKind::GameData | DataKind::PlayerAction | DataKind::GameState
            if !payload.is_string() =>
        {
            Err(ProtocolError::InvalidMessage(
                "payload must be a string for this dataKind".into(),
            ))
        }
        _ => Ok(()),
    }
}

/// Validates a decoded envelope and dispatches it.
pub async fn route<H: MessageHandlers>(
    handlers: &mut H,
    msg: WireMessage,
) -> Result<(), ProtocolError> {
    validate(&msg)?;
    match msg {
        WireMessage::Connection { identity, text } => {
            handlers.on_connection(identity, text).await;
        }
        WireMessage::TileSizeProposal { tile_size } => {
            handlers.on_tile_size_proposal(tile_size).await;
        }
        WireMessage::Status {
            status_kind,
            message,
            data,
        } => {
            handlers.on_status(status_kind, message, data).await;
        }
        WireMessage::Command {
            command_kind,
            parameters,
            data,
            session_id,
        } => {
            handlers
                .on_command(command_kind, parameters, data, session_id)
                .await;
        }
        WireMessage::GameData {
            data_kind,
            payload,
            player_id,
            session_id,
            ..
        } => {
            handlers
                .on_game_data(data_kind, payload, player_id, session_id)
                .await;
        }
        WireMessage::Chat { text } => {
            handlers.on_chat(text).await;
        }
        WireMessage::ClientList { clients } => {
            handlers.on_client_list(clients).await;
        }
        WireMessage::SessionStats {
            total_sessions,
            active_sessions,
            waiting_sessions,
            total_players,
        } => {
            handlers
                .on_session_stats(
                    total_sessions,
                    active_sessions,
                    waiting_sessions,
                    total_players,
                )
                .await;
        }
        WireMessage::Error { message } => {
            handlers.on_error(message).await;
        }
        WireMessage::Ping => {
            handlers.on_ping().await;
        }
    }
    Ok(())
}
