//! Wire types for the slither protocol.
//!
//! Every message on the wire is a [`WireMessage`], a union tagged by `kind`.
//! Multi-word field names travel in camelCase; kind tags and enum-valued
//! fields travel in snake_case (with three camelCase command legacies kept
//! for firmware compatibility).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exact `connection.text` a client sends to acknowledge the handshake.
/// Non-embedded clients become validated when the server sees it.
pub const HANDSHAKE_ACK: &str = "Acknowledge game server connection";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Unique per-connection identity, assigned by the gateway on accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Unique identifier for a matched game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A player's fixed position within a session: 1 or 2.
///
/// Slots are stable for the lifetime of a session; connection identities
/// are not. All game-facing state is keyed by slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Slot(pub u8);

impl Slot {
    pub const ONE: Slot = Slot(1);
    pub const TWO: Slot = Slot(2);

    /// The other slot of a two-player session.
    pub fn peer(self) -> Slot {
        if self == Slot::ONE { Slot::TWO } else { Slot::ONE }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Client classification
// ---------------------------------------------------------------------------

/// The connecting device family, fixed at handshake.
///
/// Selects the wire codec (embedded clients speak MessagePack, everything
/// else JSON) and whether tile-size negotiation is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientClass {
    Embedded,
    Mobile,
    Web,
}

impl ClientClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientClass::Embedded => "embedded",
            ClientClass::Mobile => "mobile",
            ClientClass::Web => "web",
        }
    }

    /// Parses an explicit classification tag (the `?client=` query value).
    pub fn from_tag(tag: &str) -> Option<ClientClass> {
        match tag {
            "embedded" => Some(ClientClass::Embedded),
            "mobile" => Some(ClientClass::Mobile),
            "web" => Some(ClientClass::Web),
            _ => None,
        }
    }
}

impl fmt::Display for ClientClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Kind discriminants
// ---------------------------------------------------------------------------

/// Sub-kind for `status` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    TileSizeResponse,
    PlayerAssignment,
    OpponentConnected,
    OpponentDisconnected,
    SessionTimeout,
}

/// Sub-kind for `command` envelopes.
///
/// The last three keep their historical camelCase spelling; embedded
/// firmware matches on the exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    GameStart,
    GameEnd,
    GameRestart,
    Sleep,
    Update,
    #[serde(rename = "getClients")]
    GetClients,
    #[serde(rename = "getSessionStats")]
    GetSessionStats,
    #[serde(rename = "requestGameState")]
    RequestGameState,
}

/// Sub-kind for `game_data` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// A structured engine event (direction change, food, collision).
    GameEvent,
    /// A per-tick compact state fragment (string payload).
    GameData,
    /// A client input, e.g. `direction:2` (string payload).
    PlayerAction,
    /// A session summary reply (string payload).
    GameState,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire envelope. One variant per message kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WireMessage {
    /// Handshake. Server → client on accept with the assigned identity;
    /// client → server to acknowledge (which marks non-embedded clients
    /// validated).
    Connection { identity: ClientId, text: String },

    /// Embedded client → server: proposed render tile size in pixels.
    /// Must be a positive multiple of 8 (see [`validate_tile_size`]).
    TileSizeProposal { tile_size: i64 },

    /// Server → client lifecycle notification.
    Status {
        status_kind: StatusKind,
        message: String,
        data: serde_json::Value,
    },

    /// Control-plane verb, either direction.
    Command {
        command_kind: CommandKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },

    /// Game-plane data, either direction. The payload shape depends on
    /// `data_kind`: structured object for `game_event`, string otherwise.
    GameData {
        data_kind: DataKind,
        payload: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<Slot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },

    /// Free-text chat, relayed by the server.
    Chat { text: String },

    /// Server → client reply to `getClients`.
    ClientList { clients: Vec<ClientEntry> },

    /// Server → client reply to `getSessionStats`.
    SessionStats {
        total_sessions: usize,
        active_sessions: usize,
        waiting_sessions: usize,
        total_players: usize,
    },

    /// Protocol-level failure report. The connection stays open.
    Error { message: String },

    /// Liveness probe. The server broadcasts it periodically; the client
    /// replies with another `ping` (there is no separate pong kind).
    Ping,
}

// ---------------------------------------------------------------------------
// Structured payloads
// ---------------------------------------------------------------------------

/// One row of a `client_list` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEntry {
    pub id: ClientId,
    #[serde(rename = "type")]
    pub class: ClientClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<Slot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// `status.data` for `player_assignment`, `opponent_connected` and
/// `opponent_disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentData {
    pub slot: Slot,
    pub session_id: SessionId,
    pub player_count: usize,
}

/// `status.data` for `tile_size_response`: a bare verdict string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileSizeVerdict {
    #[serde(rename = "tile_size_accepted")]
    Accepted,
    #[serde(rename = "tile_size_rejected")]
    Rejected,
}

/// Checks a proposed tile size against the negotiation rule.
///
/// Returns the rejection reason verbatim as it is sent to the client.
pub fn validate_tile_size(proposal: i64) -> Result<(), String> {
    if proposal <= 0 {
        return Err("TILE_SIZE must be a positive integer".into());
    }
    if proposal % 8 != 0 {
        return Err(format!("TILE_SIZE must be multiple of 8, got {proposal}"));
    }
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is consumed by TypeScript and C firmware; these
    //! tests pin the exact JSON shapes so a serde attribute change cannot
    //! silently break a peer.

    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&ClientId(42)).unwrap(), "42");
        assert_eq!(serde_json::to_string(&SessionId(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Slot(2)).unwrap(), "2");
    }

    #[test]
    fn test_slot_peer() {
        assert_eq!(Slot::ONE.peer(), Slot::TWO);
        assert_eq!(Slot::TWO.peer(), Slot::ONE);
    }

    #[test]
    fn test_client_class_wire_values() {
        assert_eq!(
            serde_json::to_string(&ClientClass::Embedded).unwrap(),
            "\"embedded\""
        );
        assert_eq!(ClientClass::from_tag("mobile"), Some(ClientClass::Mobile));
        assert_eq!(ClientClass::from_tag("desktop"), None);
    }

    #[test]
    fn test_connection_json_shape() {
        let msg = WireMessage::Connection {
            identity: ClientId(3),
            text: "Connected to game server".into(),
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["kind"], "connection");
        assert_eq!(v["identity"], 3);
        assert_eq!(v["text"], "Connected to game server");
    }

    #[test]
    fn test_tile_size_proposal_uses_camel_case_field() {
        let msg = WireMessage::TileSizeProposal { tile_size: 16 };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["kind"], "tile_size_proposal");
        assert_eq!(v["tileSize"], 16);
        assert!(v.get("tile_size").is_none());
    }

    #[test]
    fn test_status_json_shape() {
        let msg = WireMessage::Status {
            status_kind: StatusKind::PlayerAssignment,
            message: "You are Player 1".into(),
            data: json!({ "slot": 1 }),
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["kind"], "status");
        assert_eq!(v["statusKind"], "player_assignment");
        assert_eq!(v["data"]["slot"], 1);
    }

    #[test]
    fn test_command_kind_legacy_spellings() {
        for (kind, wire) in [
            (CommandKind::GetClients, "\"getClients\""),
            (CommandKind::GetSessionStats, "\"getSessionStats\""),
            (CommandKind::RequestGameState, "\"requestGameState\""),
            (CommandKind::GameStart, "\"game_start\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), wire);
        }
    }

    #[test]
    fn test_command_omits_absent_optionals() {
        let msg = WireMessage::Command {
            command_kind: CommandKind::GetClients,
            parameters: None,
            data: None,
            session_id: None,
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["commandKind"], "getClients");
        assert!(v.get("parameters").is_none());
        assert!(v.get("sessionId").is_none());
    }

    #[test]
    fn test_game_data_json_shape() {
        let msg = WireMessage::GameData {
            data_kind: DataKind::PlayerAction,
            payload: json!("direction:2"),
            player_id: Some(Slot(1)),
            metadata: None,
            client_id: None,
            session_id: Some(SessionId(9)),
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["kind"], "game_data");
        assert_eq!(v["dataKind"], "player_action");
        assert_eq!(v["payload"], "direction:2");
        assert_eq!(v["playerId"], 1);
        assert_eq!(v["sessionId"], 9);
    }

    #[test]
    fn test_session_stats_flattened_counters() {
        let msg = WireMessage::SessionStats {
            total_sessions: 3,
            active_sessions: 1,
            waiting_sessions: 2,
            total_players: 4,
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["kind"], "session_stats");
        assert_eq!(v["totalSessions"], 3);
        assert_eq!(v["activeSessions"], 1);
        assert_eq!(v["waitingSessions"], 2);
        assert_eq!(v["totalPlayers"], 4);
    }

    #[test]
    fn test_ping_is_bare_kind() {
        let v: serde_json::Value = serde_json::to_value(&WireMessage::Ping).unwrap();
        assert_eq!(v, json!({ "kind": "ping" }));
    }

    #[test]
    fn test_client_entry_uses_type_key() {
        let entry = ClientEntry {
            id: ClientId(5),
            class: ClientClass::Web,
            slot: Some(Slot(2)),
            session_id: Some(SessionId(1)),
        };
        let v: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["type"], "web");
        assert_eq!(v["sessionId"], 1);
    }

    #[test]
    fn test_tile_size_verdict_strings() {
        assert_eq!(
            serde_json::to_string(&TileSizeVerdict::Accepted).unwrap(),
            "\"tile_size_accepted\""
        );
        assert_eq!(
            serde_json::to_string(&TileSizeVerdict::Rejected).unwrap(),
            "\"tile_size_rejected\""
        );
    }

    #[test]
    fn test_validate_tile_size_rules() {
        assert!(validate_tile_size(16).is_ok());
        assert!(validate_tile_size(8).is_ok());
        assert_eq!(
            validate_tile_size(0).unwrap_err(),
            "TILE_SIZE must be a positive integer"
        );
        assert_eq!(
            validate_tile_size(-8).unwrap_err(),
            "TILE_SIZE must be a positive integer"
        );
        assert_eq!(
            validate_tile_size(10).unwrap_err(),
            "TILE_SIZE must be multiple of 8, got 10"
        );
    }

    #[test]
    fn test_decode_unknown_kind_fails() {
        let result: Result<WireMessage, _> =
            serde_json::from_str(r#"{ "kind": "teleport", "x": 1 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_missing_required_field_fails() {
        // `status` without its statusKind.
        let result: Result<WireMessage, _> =
            serde_json::from_str(r#"{ "kind": "status", "message": "hi", "data": null }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_tolerates_unknown_extra_fields() {
        let msg: WireMessage = serde_json::from_str(
            r#"{ "kind": "chat", "text": "hello", "timestamp": 123456 }"#,
        )
        .unwrap();
        assert_eq!(msg, WireMessage::Chat { text: "hello".into() });
    }

    #[test]
    fn test_envelope_round_trip() {
        let msg = WireMessage::Command {
            command_kind: CommandKind::GameEnd,
            parameters: None,
            data: Some("Player 2 wins!".into()),
            session_id: Some(SessionId(4)),
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: WireMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }
}
