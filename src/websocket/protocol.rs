use serde::{Deserialize, Serialize};

/// Subprotocol identifier negotiated during the WebSocket handshake.
/// Requests that do not offer this protocol are rejected with 400.
pub const CHAT_PROTOCOL: &str = "beej-chat-protocol";

/// Messages clients are allowed to send. `chat-leave` is deliberately
/// absent: it is synthesized by the server on disconnect, and a client
/// attempting to send one is dropped on the parse-error path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "chat-join")]
    Join {
        #[serde(default)]
        username: Option<String>,
    },
    #[serde(rename = "chat-message")]
    Chat {
        #[serde(default)]
        username: Option<String>,
        message: String,
    },
}

impl ClientMessage {
    /// Username carried in the payload, if any. Every inbound message that
    /// carries one refreshes the session's stored username.
    pub fn username(&self) -> Option<&str> {
        match self {
            ClientMessage::Join { username } | ClientMessage::Chat { username, .. } => {
                username.as_deref()
            }
        }
    }
}

/// Messages the server fans out to every connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "chat-join")]
    Join { username: String },
    #[serde(rename = "chat-message")]
    Chat { username: String, message: String },
    #[serde(rename = "chat-leave")]
    Leave { username: String },
}
