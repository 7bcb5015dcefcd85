//! Real-time chat gateway: one WebSocket per device, commands in, pushed
//! events out. Message text is encrypted before it is stored and decrypted
//! before it is pushed.

pub mod chat;
pub mod connection;
pub mod dispatcher;
pub mod error;

pub use chat::{ChatGateway, ConnectionContext};
pub use connection::{ConnectionState, handle_connection};
pub use dispatcher::Dispatcher;
pub use error::GatewayError;
