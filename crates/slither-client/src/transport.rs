//! Reconnecting WebSocket transport.
//!
//! A [`GameClient`] is a handle to a transport actor that owns the socket.
//! The actor answers server pings, acknowledges the handshake, watches for
//! staleness, and runs the exponential-backoff reconnect cycle when the
//! link drops; everything it does not consume itself is surfaced on an
//! event channel. Callers talk to it through the handle; the actor stops
//! when the handle is destroyed or dropped.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use slither_engine::Direction;
use slither_protocol::{
    ClientClass, ClientId, Codec, CommandKind, DataKind, HANDSHAKE_ACK, WireFrame, WireMessage,
};
use slither_tick::Ticker;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::error::ClientError;

/// Cadence of the staleness probe on a live socket.
const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Server silence longer than this counts the connection as lost even
/// while the socket still looks open.
const STALE_AFTER: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sink = SplitSink<Socket, Message>;
type Waiter = oneshot::Sender<Result<(), ClientError>>;

// ---------------------------------------------------------------------------
// Configuration and health
// ---------------------------------------------------------------------------

/// Transport tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL without the classification query.
    pub url: String,
    /// Class advertised to the server; picks the wire codec on both ends.
    pub class: ClientClass,
    /// Reconnect attempts per cycle before giving up.
    pub max_reconnect_attempts: u32,
    /// Backoff base; attempt `n` waits `base * 2^n`.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".into(),
            class: ClientClass::Web,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Transport state as the application sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Connection health snapshot, published on a watch channel so readers
/// never block the actor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetHealth {
    pub status: ConnectionStatus,
    /// Gap between the last two server frames, sampled at each ping.
    pub latency: Duration,
    /// Attempts burned in the current reconnect cycle; 0 while healthy.
    pub reconnect_attempts: u32,
}

// ---------------------------------------------------------------------------
// Events and commands
// ---------------------------------------------------------------------------

/// What the transport surfaces to the application.
#[derive(Debug)]
pub enum ClientEvent {
    /// Handshake complete and acknowledged; the server assigned this
    /// identity.
    Connected { identity: ClientId },
    /// The link dropped, closed, or went stale.
    Disconnected,
    /// A reconnect cycle burned every attempt. The transport idles until
    /// [`GameClient::reconnect`].
    Exhausted { attempts: u32 },
    /// Every message the transport does not consume itself. Pings and the
    /// handshake welcome are handled internally.
    Message(WireMessage),
}

enum ClientCommand {
    Send(WireMessage, Waiter),
    Reconnect(Waiter),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to the transport actor.
#[derive(Debug)]
pub struct GameClient {
    tx: mpsc::UnboundedSender<ClientCommand>,
    health: watch::Receiver<NetHealth>,
    task: Option<JoinHandle<()>>,
}

impl GameClient {
    /// Connects and spawns the transport actor.
    ///
    /// The first connect is deliberate and not retried: an unreachable
    /// server fails fast here. Drops after this point go through the
    /// reconnect cycle.
    pub async fn connect(
        config: ClientConfig,
    ) -> Result<(GameClient, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let url = request_url(&config);
        let (ws, _) = connect_async(&url).await?;
        info!(%url, class = %config.class, "connected");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (health_tx, health_rx) = watch::channel(NetHealth {
            status: ConnectionStatus::Connected,
            ..NetHealth::default()
        });

        let transport = Transport {
            codec: Codec::for_class(config.class),
            config,
            rx: command_rx,
            events: event_tx,
            health: health_tx,
            last_update: Instant::now(),
        };
        let task = tokio::spawn(transport.run(ws));

        Ok((
            GameClient {
                tx: command_tx,
                health: health_rx,
                task: Some(task),
            },
            event_rx,
        ))
    }

    /// Latest health snapshot.
    pub fn health(&self) -> NetHealth {
        *self.health.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.health().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Sends one message. Fails with `NotConnected` while the link is
    /// down and with `Destroyed` after [`destroy`](Self::destroy).
    pub async fn send(&self, msg: WireMessage) -> Result<(), ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ClientCommand::Send(msg, reply_tx))
            .map_err(|_| ClientError::Destroyed)?;
        reply_rx.await.map_err(|_| ClientError::Destroyed)?
    }

    /// Sends a direction change as a `player_action`.
    pub async fn send_input(&self, direction: Direction) -> Result<(), ClientError> {
        self.send(WireMessage::GameData {
            data_kind: DataKind::PlayerAction,
            payload: serde_json::Value::String(format!("direction:{}", u8::from(direction))),
            player_id: None,
            metadata: None,
            client_id: None,
            session_id: None,
        })
        .await
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.send(WireMessage::Chat { text: text.into() }).await
    }

    /// Proposes the device tile size. The verdict comes back as a
    /// `tile_size_response` status event.
    pub async fn propose_tile_size(&self, tile_size: i64) -> Result<(), ClientError> {
        self.send(WireMessage::TileSizeProposal { tile_size }).await
    }

    /// Asks the server for an on-demand session state report.
    pub async fn request_game_state(&self) -> Result<(), ClientError> {
        self.send(WireMessage::Command {
            command_kind: CommandKind::RequestGameState,
            parameters: None,
            data: None,
            session_id: None,
        })
        .await
    }

    /// Starts a reconnect cycle if the transport idles after exhaustion
    /// and resolves once a connection is up again. While connected this
    /// returns immediately; during a running cycle it joins the waiters,
    /// so there is never more than one cycle in flight.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ClientCommand::Reconnect(reply_tx))
            .map_err(|_| ClientError::Destroyed)?;
        reply_rx.await.map_err(|_| ClientError::Destroyed)?
    }

    /// Tears the transport down. Idempotent; every call on the handle
    /// afterwards fails with `Destroyed`.
    pub fn destroy(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("client destroyed");
        }
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Why a live socket stopped being driven.
enum Link {
    /// Dropped, errored, or stale. The reconnect cycle should run.
    Lost,
    /// The server closed cleanly. Wait for an explicit reconnect.
    Stopped,
    /// The handle is gone. Shut the actor down.
    Detached,
}

struct Transport {
    config: ClientConfig,
    codec: Codec,
    rx: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedSender<ClientEvent>,
    health: watch::Sender<NetHealth>,
    /// Time of the last frame from the server. Staleness and ping latency
    /// both read from it.
    last_update: Instant,
}

impl Transport {
    async fn run(mut self, ws: Socket) {
        let mut waiters: Vec<Waiter> = Vec::new();
        let mut socket = Some(ws);
        loop {
            if let Some(ws) = socket.take() {
                match self.drive(ws).await {
                    Link::Detached => break,
                    Link::Stopped => {
                        self.set_status(ConnectionStatus::Disconnected);
                        let _ = self.events.send(ClientEvent::Disconnected);
                    }
                    Link::Lost => {
                        self.set_status(ConnectionStatus::Disconnected);
                        let _ = self.events.send(ClientEvent::Disconnected);
                        socket = self.reestablish(&mut waiters).await;
                    }
                }
            } else {
                // Idle: no socket and no cycle running. Only a command can
                // wake the transport back up.
                match self.rx.recv().await {
                    Some(ClientCommand::Send(_, reply)) => {
                        let _ = reply.send(Err(ClientError::NotConnected));
                    }
                    Some(ClientCommand::Reconnect(reply)) => {
                        waiters.push(reply);
                        socket = self.reestablish(&mut waiters).await;
                    }
                    None => break,
                }
            }
        }
        debug!("transport stopped");
    }

    /// Pumps one live socket until it drops, closes, goes stale, or the
    /// handle goes away.
    async fn drive(&mut self, ws: Socket) -> Link {
        let (mut sink, mut source) = ws.split();
        let mut probe = Ticker::new(HEALTH_INTERVAL);
        probe.start();

        loop {
            tokio::select! {
                incoming = source.next() => {
                    let Some(result) = incoming else {
                        debug!("server stream ended");
                        return Link::Lost;
                    };
                    let frame = match result {
                        Ok(Message::Text(text)) => WireFrame::Text(text.to_string()),
                        Ok(Message::Binary(bytes)) => WireFrame::Binary(bytes.to_vec()),
                        Ok(Message::Close(frame)) => {
                            let normal = frame
                                .as_ref()
                                .is_none_or(|f| f.code == CloseCode::Normal);
                            debug!(normal, "close frame");
                            return if normal { Link::Stopped } else { Link::Lost };
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            warn!(error = %e, "socket error");
                            return Link::Lost;
                        }
                    };
                    match self.codec.decode(&frame) {
                        Ok(msg) => {
                            if let Err(e) = self.handle_incoming(&mut sink, msg).await {
                                warn!(error = %e, "reply on live socket failed");
                                return Link::Lost;
                            }
                        }
                        Err(e) => debug!(error = %e, "undecodable frame dropped"),
                    }
                }
                command = self.rx.recv() => {
                    match command {
                        Some(ClientCommand::Send(msg, reply)) => {
                            let sent = self.transmit(&mut sink, &msg).await;
                            let failed = sent.is_err();
                            let _ = reply.send(sent);
                            if failed {
                                return Link::Lost;
                            }
                        }
                        Some(ClientCommand::Reconnect(reply)) => {
                            // Already connected.
                            let _ = reply.send(Ok(()));
                        }
                        None => return Link::Detached,
                    }
                }
                _ = probe.tick() => {
                    let silent = self.last_update.elapsed();
                    if silent > STALE_AFTER {
                        warn!(silent_ms = silent.as_millis() as u64, "connection stale");
                        return Link::Lost;
                    }
                }
            }
        }
    }

    /// Routes one decoded message. Pings and the handshake welcome are
    /// consumed here; everything else goes to the application.
    async fn handle_incoming(&mut self, sink: &mut Sink, msg: WireMessage) -> Result<(), ClientError> {
        match msg {
            WireMessage::Ping => {
                // Latency reads as the gap since the previous server
                // frame, sampled before the clock resets.
                let latency = self.last_update.elapsed();
                self.last_update = Instant::now();
                self.health.send_modify(|h| h.latency = latency);
                trace!(latency_ms = latency.as_millis() as u64, "ping answered");
                self.transmit(sink, &WireMessage::Ping).await
            }
            WireMessage::Connection { identity, text } => {
                self.last_update = Instant::now();
                debug!(%identity, text, "handshake welcome");
                self.transmit(
                    sink,
                    &WireMessage::Connection {
                        identity,
                        text: HANDSHAKE_ACK.into(),
                    },
                )
                .await?;
                let _ = self.events.send(ClientEvent::Connected { identity });
                Ok(())
            }
            other => {
                self.last_update = Instant::now();
                let _ = self.events.send(ClientEvent::Message(other));
                Ok(())
            }
        }
    }

    /// Runs one reconnect cycle: exponential backoff between attempts, up
    /// to the configured maximum. Commands arriving mid-cycle are served
    /// from here, so sends fail fast instead of queueing. Returns the new
    /// socket, or `None` once exhausted or detached.
    async fn reestablish(&mut self, waiters: &mut Vec<Waiter>) -> Option<Socket> {
        self.set_status(ConnectionStatus::Connecting);
        let url = request_url(&self.config);
        let mut attempt = 0;

        while attempt < self.config.max_reconnect_attempts {
            let delay = backoff_delay(self.config.reconnect_delay, attempt);
            self.health.send_modify(|h| h.reconnect_attempts = attempt + 1);
            info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "reconnecting");

            let deadline = Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    command = self.rx.recv() => match command {
                        Some(ClientCommand::Send(_, reply)) => {
                            let _ = reply.send(Err(ClientError::NotConnected));
                        }
                        Some(ClientCommand::Reconnect(reply)) => waiters.push(reply),
                        None => return None,
                    },
                }
            }

            match connect_async(&url).await {
                Ok((ws, _)) => {
                    info!(attempt = attempt + 1, "reconnected");
                    self.last_update = Instant::now();
                    self.health.send_modify(|h| {
                        h.status = ConnectionStatus::Connected;
                        h.reconnect_attempts = 0;
                    });
                    for waiter in waiters.drain(..) {
                        let _ = waiter.send(Ok(()));
                    }
                    return Some(ws);
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt + 1, "reconnect attempt failed");
                    attempt += 1;
                }
            }
        }

        warn!(attempts = attempt, "reconnect attempts exhausted");
        self.set_status(ConnectionStatus::Disconnected);
        let _ = self.events.send(ClientEvent::Exhausted { attempts: attempt });
        for waiter in waiters.drain(..) {
            let _ = waiter.send(Err(ClientError::ReconnectExhausted(attempt)));
        }
        None
    }

    async fn transmit(&self, sink: &mut Sink, msg: &WireMessage) -> Result<(), ClientError> {
        match self.codec.encode(msg)? {
            WireFrame::Text(text) => sink.send(Message::Text(text.into())).await?,
            WireFrame::Binary(bytes) => sink.send(Message::Binary(bytes.into())).await?,
        }
        Ok(())
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.health.send_modify(|h| h.status = status);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Connect URL with the class tag appended, so the server classifies the
/// connection without sniffing a user agent.
fn request_url(config: &ClientConfig) -> String {
    let tag = config.class.as_str();
    if config.url.contains('?') {
        format!("{}&client={tag}", config.url)
    } else {
        format!("{}/?client={tag}", config.url.trim_end_matches('/'))
    }
}

/// Delay before reconnect attempt `attempt` (0-based): `base * 2^attempt`,
/// saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    match 2u32.checked_pow(attempt) {
        Some(factor) => base.saturating_mul(factor),
        None => Duration::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        assert_eq!(backoff_delay(Duration::from_secs(2), 200), Duration::MAX);
        assert!(backoff_delay(Duration::MAX, 1) == Duration::MAX);
    }

    #[test]
    fn test_request_url_appends_class_tag() {
        let config = ClientConfig::default();
        assert_eq!(request_url(&config), "ws://127.0.0.1:8080/?client=web");

        let trailing = ClientConfig {
            url: "ws://game.local:9000/".into(),
            class: ClientClass::Embedded,
            ..ClientConfig::default()
        };
        assert_eq!(request_url(&trailing), "ws://game.local:9000/?client=embedded");

        let with_query = ClientConfig {
            url: "ws://game.local:9000/?room=4".into(),
            class: ClientClass::Mobile,
            ..ClientConfig::default()
        };
        assert_eq!(
            request_url(&with_query),
            "ws://game.local:9000/?room=4&client=mobile"
        );
    }

    #[test]
    fn test_default_config_matches_production_tuning() {
        let config = ClientConfig::default();
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.class, ClientClass::Web);
    }
}
