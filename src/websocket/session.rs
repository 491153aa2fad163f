use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::websocket::{ClientMessage, ConnectionKey, ConnectionRegistry, ServerMessage};

/// What the connection's reader loop should do after a frame is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    Close,
}

/// Parses inbound frames for one connection and routes them. Username
/// refreshes and broadcasts go through the shared registry; the dispatcher
/// keeps its own sender only to answer transport-level pings.
pub struct MessageDispatcher {
    key: ConnectionKey,
    registry: Arc<ConnectionRegistry>,
    tx: mpsc::UnboundedSender<Message>,
}

impl MessageDispatcher {
    pub fn new(
        key: ConnectionKey,
        registry: Arc<ConnectionRegistry>,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self { key, registry, tx }
    }

    pub async fn handle_frame(&self, msg: Message) -> Dispatch {
        match msg {
            Message::Text(text) => {
                self.dispatch_text(&text).await;
                Dispatch::Continue
            }
            Message::Close(_) => {
                info!("Client initiated close for connection {}", self.key);
                Dispatch::Close
            }
            Message::Ping(data) => {
                if let Err(e) = self.tx.send(Message::Pong(data)) {
                    error!("Failed to send pong on connection {}: {}", self.key, e);
                    return Dispatch::Close;
                }
                Dispatch::Continue
            }
            Message::Pong(_) => Dispatch::Continue,
            _ => {
                warn!("Received unsupported frame type on connection {}", self.key);
                Dispatch::Continue
            }
        }
    }

    /// A frame that fails to parse (malformed JSON or an unrecognized type)
    /// is dropped and logged; the connection stays open.
    async fn dispatch_text(&self, text: &str) {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", self.key, e);
                return;
            }
        };

        // Every inbound message carrying a username refreshes the session's
        // stored one. There is no dedicated rename operation on the wire.
        if let Some(username) = msg.username() {
            self.registry
                .update_username(&self.key, username.trim())
                .await;
        }

        match msg {
            ClientMessage::Join { username } => {
                let username = trimmed(username);
                self.broadcast(ServerMessage::Join { username }).await;
            }
            ClientMessage::Chat { username, message } => {
                let message = message.trim();
                if message.is_empty() {
                    return;
                }
                let username = trimmed(username);
                self.broadcast(ServerMessage::Chat {
                    username,
                    message: message.to_string(),
                })
                .await;
            }
        }
    }

    async fn broadcast(&self, msg: ServerMessage) {
        if let Err(e) = self.registry.broadcast(&msg).await {
            error!("Broadcast from {} failed: {}", self.key, e);
        }
    }
}

fn trimmed(username: Option<String>) -> String {
    username
        .map(|u| u.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::Session;
    use std::net::SocketAddr;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn key(port: u16) -> ConnectionKey {
        ConnectionKey::from(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    async fn setup(
        peers: &[u16],
    ) -> (Arc<ConnectionRegistry>, Vec<UnboundedReceiver<Message>>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut receivers = Vec::new();
        for port in peers {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.insert(Session::new(key(*port), tx)).await;
            receivers.push(rx);
        }
        (registry, receivers)
    }

    fn recv_text(rx: &mut UnboundedReceiver<Message>) -> Option<String> {
        match rx.try_recv() {
            Ok(Message::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_join_broadcasts_trimmed_username() {
        let (registry, mut receivers) = setup(&[4001, 4002]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = MessageDispatcher::new(key(4001), registry.clone(), tx);

        let frame = Message::Text(
            r#"{"type":"chat-join","payload":{"username":"  Alice  "}}"#.to_string(),
        );
        assert_eq!(dispatcher.handle_frame(frame).await, Dispatch::Continue);

        for rx in receivers.iter_mut() {
            let text = recv_text(rx).expect("join should reach every connection");
            assert_eq!(
                text,
                r#"{"type":"chat-join","payload":{"username":"Alice"}}"#
            );
        }
        assert_eq!(registry.username(&key(4001)).await.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_chat_fans_out_to_all_including_sender() {
        let (registry, mut receivers) = setup(&[4001, 4002, 4003]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = MessageDispatcher::new(key(4002), registry, tx);

        let frame = Message::Text(
            r#"{"type":"chat-message","payload":{"username":"Bob","message":"  hi all  "}}"#
                .to_string(),
        );
        dispatcher.handle_frame(frame).await;

        let mut deliveries = 0;
        for rx in receivers.iter_mut() {
            let text = recv_text(rx).expect("chat should reach every connection");
            assert_eq!(
                text,
                r#"{"type":"chat-message","payload":{"username":"Bob","message":"hi all"}}"#
            );
            deliveries += 1;
        }
        assert_eq!(deliveries, 3);
    }

    #[tokio::test]
    async fn test_whitespace_only_chat_is_discarded() {
        let (registry, mut receivers) = setup(&[4001, 4002]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = MessageDispatcher::new(key(4001), registry.clone(), tx);

        let frame = Message::Text(
            r#"{"type":"chat-message","payload":{"username":"Bob","message":"   "}}"#.to_string(),
        );
        dispatcher.handle_frame(frame).await;

        for rx in receivers.iter_mut() {
            assert!(recv_text(rx).is_none());
        }
        // The username refresh still happened before the discard.
        assert_eq!(registry.username(&key(4001)).await.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_alive() {
        let (registry, mut receivers) = setup(&[4001, 4002]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = MessageDispatcher::new(key(4001), registry.clone(), tx);

        let outcome = dispatcher
            .handle_frame(Message::Text("{not json".to_string()))
            .await;
        assert_eq!(outcome, Dispatch::Continue);
        assert!(registry.contains(&key(4001)).await);
        for rx in receivers.iter_mut() {
            assert!(recv_text(rx).is_none());
        }

        // The session still works afterwards.
        let frame = Message::Text(
            r#"{"type":"chat-message","payload":{"username":"Bob","message":"still here"}}"#
                .to_string(),
        );
        dispatcher.handle_frame(frame).await;
        assert!(recv_text(&mut receivers[0]).is_some());
    }

    #[tokio::test]
    async fn test_unknown_type_and_client_leave_are_dropped() {
        let (registry, mut receivers) = setup(&[4001, 4002]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = MessageDispatcher::new(key(4001), registry, tx);

        for raw in [
            r#"{"type":"chat-shout","payload":{"username":"Bob"}}"#,
            r#"{"type":"chat-leave","payload":{"username":"Bob"}}"#,
        ] {
            let outcome = dispatcher
                .handle_frame(Message::Text(raw.to_string()))
                .await;
            assert_eq!(outcome, Dispatch::Continue);
        }
        for rx in receivers.iter_mut() {
            assert!(recv_text(rx).is_none());
        }
    }

    #[tokio::test]
    async fn test_every_inbound_message_refreshes_username() {
        let (registry, _receivers) = setup(&[4001]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = MessageDispatcher::new(key(4001), registry.clone(), tx);

        let frame = Message::Text(
            r#"{"type":"chat-message","payload":{"username":"Alice","message":"one"}}"#
                .to_string(),
        );
        dispatcher.handle_frame(frame).await;
        assert_eq!(registry.username(&key(4001)).await.as_deref(), Some("Alice"));

        let frame = Message::Text(
            r#"{"type":"chat-message","payload":{"username":"Carol","message":"two"}}"#
                .to_string(),
        );
        dispatcher.handle_frame(frame).await;
        assert_eq!(registry.username(&key(4001)).await.as_deref(), Some("Carol"));
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let (registry, _receivers) = setup(&[4001]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = MessageDispatcher::new(key(4001), registry, tx);

        let outcome = dispatcher.handle_frame(Message::Ping(vec![1, 2, 3])).await;
        assert_eq!(outcome, Dispatch::Continue);
        assert!(matches!(rx.try_recv(), Ok(Message::Pong(data)) if data == vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_close_frame_requests_teardown() {
        let (registry, _receivers) = setup(&[4001]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = MessageDispatcher::new(key(4001), registry, tx);

        let outcome = dispatcher.handle_frame(Message::Close(None)).await;
        assert_eq!(outcome, Dispatch::Close);
    }
}
