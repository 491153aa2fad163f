use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tracing::{error, info};

use crate::websocket::{
    ConnectionKey, ConnectionRegistry, Dispatch, MessageDispatcher, ProtocolGate, ServerMessage,
    Session,
};

/// Owns the registry and the admission gate; one instance per process.
pub struct ChatServer {
    registry: Arc<ConnectionRegistry>,
    gate: ProtocolGate,
}

impl ChatServer {
    pub fn new(gate: ProtocolGate) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            gate,
        }
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Accept loop. Each admitted connection runs in its own task; accept
    /// failures are logged and the loop keeps serving.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting TCP connection: {}", e);
                }
            }
        }
    }

    /// Full lifecycle of one connection: gate, register, pump frames both
    /// ways, tear down with a leave broadcast.
    pub async fn handle_connection(self: Arc<Self>, raw_stream: TcpStream, addr: SocketAddr) {
        info!("New WebSocket connection from: {}", addr);

        let gate = self.gate.clone();
        let ws_stream = match tokio_tungstenite::accept_hdr_async(
            raw_stream,
            move |request: &Request, response: Response| gate.screen(request, response, addr),
        )
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                // Rejections land here too; no session was ever created.
                error!("Error during WebSocket handshake with {}: {}", addr, e);
                return;
            }
        };

        let key = ConnectionKey::from(addr);
        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        self.registry.insert(Session::new(key, tx.clone())).await;
        let dispatcher = MessageDispatcher::new(key, self.registry.clone(), tx);

        // Forward queued outbound frames to the socket
        let send_task = tokio::spawn(async move {
            let mut ws_sink = ws_sink;
            let mut rx = rx;

            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_sink.send(message).await {
                    error!("Error sending WebSocket message: {}", e);
                    break;
                }
            }

            if let Err(e) = ws_sink.close().await {
                error!("Error closing WebSocket connection: {}", e);
            }
        });

        // Feed inbound frames to the dispatcher, in arrival order
        let recv_task = tokio::spawn(async move {
            let mut ws_stream = ws_stream;

            while let Some(frame) = ws_stream.next().await {
                match frame {
                    Ok(msg) => {
                        if dispatcher.handle_frame(msg).await == Dispatch::Close {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Transport error on connection {}: {}", key, e);
                        break;
                    }
                }
            }
        });

        // Whichever side finishes first drives teardown
        tokio::select! {
            _ = send_task => {
                info!("Send task completed for connection {}", key);
            }
            _ = recv_task => {
                info!("Receive task completed for connection {}", key);
            }
        }

        // Remove the session before announcing, so the leave notice is not
        // queued for the departing connection.
        let username = self
            .registry
            .remove(&key)
            .await
            .and_then(Session::into_username)
            .unwrap_or_default();
        if let Err(e) = self
            .registry
            .broadcast(&ServerMessage::Leave { username })
            .await
        {
            error!("Leave broadcast for {} failed: {}", key, e);
        }
        info!("Connection {} closed", key);
    }
}
