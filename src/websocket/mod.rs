//! WebSocket chat core: admission control, session registry, message
//! dispatch, and fan-out broadcast.

mod handshake;
mod protocol;
mod registry;
mod server;
mod session;

pub use handshake::ProtocolGate;
pub use protocol::{ClientMessage, ServerMessage, CHAT_PROTOCOL};
pub use registry::{ConnectionKey, ConnectionRegistry, Session};
pub use server::ChatServer;
pub use session::{Dispatch, MessageDispatcher};
