//! WebSocket gateway: accepts sockets, classifies clients, and pumps
//! frames between the wire and the per-connection handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use slither_protocol::{ClientClass, ClientId, Codec, ProtocolError, WireFrame, WireMessage, route};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tracing::{debug, info};

use crate::error::ServerError;
use crate::handlers::ConnectionHandlers;
use crate::registry::ClientHandle;
use crate::server::ServerState;

/// Greeting sent to every client right after the WebSocket handshake.
const WELCOME_TEXT: &str = "Connected to game server";

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Deregisters the client when its connection task ends, however it ends.
struct ClientGuard {
    client: ClientId,
    state: Arc<ServerState>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let client = self.client;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.registry.lock().await.remove(client);
            state.sessions.lock().await.leave(client).await;
            debug!(%client, "client deregistered");
        });
    }
}

/// Drives one connection from WebSocket accept to disconnect.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let mut query: Option<String> = None;
    let mut user_agent: Option<String> = None;
    let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
        query = req.uri().query().map(str::to_owned);
        user_agent = req
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Ok(resp)
    })
    .await?;

    let client_id = ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed));
    let class = classify(query.as_deref(), user_agent.as_deref());
    let codec = Codec::for_class(class);
    info!(client = %client_id, %class, "client connected");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    {
        let mut registry = state.registry.lock().await;
        registry.insert(
            client_id,
            ClientHandle {
                class,
                outbound: outbound_tx.clone(),
                validated: false,
                tile_size: None,
                slot: None,
                session: None,
            },
        );
    }
    let _guard = ClientGuard {
        client: client_id,
        state: Arc::clone(&state),
    };

    let (mut sink, mut source) = ws.split();
    let mut handlers = ConnectionHandlers::new(client_id, class, outbound_tx.clone(), state);

    // The welcome rides the outbound channel like every later message,
    // so ordering against broadcasts is preserved.
    let _ = outbound_tx.send(WireMessage::Connection {
        identity: client_id,
        text: WELCOME_TEXT.into(),
    });

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(msg) = outgoing else { break };
                match codec.encode(&msg)? {
                    WireFrame::Text(text) => sink.send(Message::Text(text.into())).await?,
                    WireFrame::Binary(bytes) => sink.send(Message::Binary(bytes.into())).await?,
                }
            }
            incoming = source.next() => {
                let Some(result) = incoming else { break };
                let frame = match result? {
                    Message::Text(text) => WireFrame::Text(text.to_string()),
                    Message::Binary(bytes) => WireFrame::Binary(bytes.to_vec()),
                    Message::Close(_) => break,
                    _ => continue,
                };
                // A malformed frame costs one error envelope, never the
                // connection.
                if let Err(e) = receive(&mut handlers, codec, frame).await {
                    debug!(client = %client_id, error = %e, "bad frame");
                    let _ = outbound_tx.send(WireMessage::Error {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    info!(client = %client_id, "client disconnected");
    Ok(())
}

async fn receive(
    handlers: &mut ConnectionHandlers,
    codec: Codec,
    frame: WireFrame,
) -> Result<(), ProtocolError> {
    let msg = codec.decode(&frame)?;
    route(handlers, msg).await
}

/// Classifies a connection from its URL query and user agent.
///
/// An explicit `client=` tag wins; otherwise the user agent decides:
/// firmware markers mean embedded, handset markers mean mobile, and
/// anything else (including no agent at all) is a browser.
pub(crate) fn classify(query: Option<&str>, user_agent: Option<&str>) -> ClientClass {
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(class) = pair.strip_prefix("client=").and_then(ClientClass::from_tag) {
                return class;
            }
        }
    }

    let Some(agent) = user_agent else {
        return ClientClass::Web;
    };
    if agent.contains("ESP32") || agent.contains("esp-websocket-client") {
        return ClientClass::Embedded;
    }
    let lower = agent.to_lowercase();
    let mobile = ["android", "iphone", "ipad", "ipod", "blackberry", "iemobile", "opera mini"];
    if mobile.iter().any(|mark| lower.contains(mark)) {
        return ClientClass::Mobile;
    }
    ClientClass::Web
}

// =========================================================================
// Tests
// =========================================================================
