// WebSocket module - transport creation
pub mod factory;

pub use factory::{Connector, TransportLink, WebSocketFactory, WsStream};
