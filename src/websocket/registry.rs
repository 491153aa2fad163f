use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::error::WebSocketError;
use crate::websocket::ServerMessage;

/// Identity of a live connection, derived from the remote endpoint.
/// The local address carries no discriminating information here, so it is
/// excluded on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    addr: IpAddr,
    port: u16,
}

impl From<SocketAddr> for ConnectionKey {
    fn from(addr: SocketAddr) -> Self {
        Self {
            addr: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Per-connection state. The sender is the socket handle: the connection's
/// writer task drains it into the WebSocket sink, so pushing a frame here
/// never blocks.
#[derive(Debug)]
pub struct Session {
    key: ConnectionKey,
    tx: mpsc::UnboundedSender<Message>,
    username: Option<String>,
}

impl Session {
    pub fn new(key: ConnectionKey, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            key,
            tx,
            username: None,
        }
    }

    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn into_username(self) -> Option<String> {
        self.username
    }
}

/// Sole source of truth for who is connected. A key is present exactly while
/// its connection is open and has been through the accept path.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionKey, Session>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, session: Session) {
        let key = session.key();
        if self.connections.write().await.insert(key, session).is_some() {
            // Distinct simultaneously-open connections can never share a
            // remote address and port.
            warn!("Replaced existing session for {}", key);
        } else {
            info!("Added connection {} to registry", key);
        }
    }

    /// Removing an absent key is a tolerated no-op: the connection may never
    /// have completed its handshake.
    pub async fn remove(&self, key: &ConnectionKey) -> Option<Session> {
        let removed = self.connections.write().await.remove(key);
        if removed.is_some() {
            info!("Removed connection {} from registry", key);
        }
        removed
    }

    pub async fn contains(&self, key: &ConnectionKey) -> bool {
        self.connections.read().await.contains_key(key)
    }

    pub async fn update_username(&self, key: &ConnectionKey, username: &str) {
        if let Some(session) = self.connections.write().await.get_mut(key) {
            session.username = Some(username.to_string());
        }
    }

    pub async fn username(&self, key: &ConnectionKey) -> Option<String> {
        self.connections
            .read()
            .await
            .get(key)
            .and_then(|s| s.username.clone())
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Deliver one message to every registered connection, including the
    /// originator. The payload is serialized once per call. Delivery is
    /// best-effort and per-recipient: a failed send is logged and the loop
    /// moves on to the remaining recipients.
    pub async fn broadcast(&self, msg: &ServerMessage) -> Result<usize, WebSocketError> {
        let text = serde_json::to_string(msg)
            .map_err(|e| WebSocketError::SerializeError(e.to_string()))?;
        let frame = Message::Text(text);

        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (key, session) in connections.iter() {
            if let Err(e) = session.tx.send(frame.clone()) {
                error!("Failed to broadcast to connection {}: {}", key, e);
            } else {
                delivered += 1;
            }
        }

        Ok(delivered)
    }
}
