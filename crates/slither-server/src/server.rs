//! Server assembly: the listener, the shared state, and the periodic
//! keepalive and idle-sweep jobs.

use std::sync::Arc;
use std::time::Duration;

use slither_protocol::WireMessage;
use slither_tick::Repeater;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::ServerError;
use crate::gateway;
use crate::manager::SessionManager;
use crate::registry::Registry;
use crate::session::IDLE_TIMEOUT;

/// Keepalive cadence towards all connected clients.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How often sessions are scanned for inactivity.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// State shared by connection tasks, session actors, and background jobs.
pub(crate) struct ServerState {
    pub(crate) registry: Mutex<Registry>,
    pub(crate) sessions: Mutex<SessionManager>,
}

impl ServerState {
    pub(crate) fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            sessions: Mutex::new(SessionManager::new()),
        }
    }
}

/// Configures and binds a [`SlitherServer`].
pub struct SlitherServerBuilder {
    bind_addr: String,
}

impl Default for SlitherServerBuilder {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
        }
    }
}

impl SlitherServerBuilder {
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub async fn build(self) -> Result<SlitherServer, ServerError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!(addr = %self.bind_addr, "listening");
        Ok(SlitherServer {
            listener,
            state: Arc::new(ServerState::new()),
        })
    }
}

/// The bound game server. [`run`](SlitherServer::run) consumes it.
pub struct SlitherServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl SlitherServer {
    pub fn builder() -> SlitherServerBuilder {
        SlitherServerBuilder::default()
    }

    /// The bound address, useful when binding port zero.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the process stops. Each connection runs
    /// in its own task; a failed accept is logged and survived.
    pub async fn run(self) -> Result<(), ServerError> {
        let _ping = spawn_ping(Arc::clone(&self.state));
        let _sweep = spawn_sweep(Arc::clone(&self.state));

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "inbound connection");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = gateway::handle_connection(stream, state).await {
                            debug!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            }
        }
    }
}

fn spawn_ping(state: Arc<ServerState>) -> Repeater {
    Repeater::spawn(PING_INTERVAL, move || {
        let state = Arc::clone(&state);
        async move {
            let registry = state.registry.lock().await;
            let count = registry.len();
            if count > 0 {
                debug!(clients = count, "keepalive ping");
                registry.broadcast(&WireMessage::Ping);
            }
        }
    })
}

/// Flags idle sessions for timeout. The actor re-checks its own clock
/// before stopping, so a stale flag is harmless.
fn spawn_sweep(state: Arc<ServerState>) -> Repeater {
    Repeater::spawn(SWEEP_INTERVAL, move || {
        let state = Arc::clone(&state);
        async move {
            let handles = state.sessions.lock().await.handles();
            for handle in handles {
                let Ok(info) = handle.info().await else {
                    continue;
                };
                if info.idle_for > IDLE_TIMEOUT {
                    info!(
                        session_id = %handle.id(),
                        idle = ?info.idle_for,
                        "sweeping idle session"
                    );
                    handle.timeout().await;
                }
            }
        }
    })
}
