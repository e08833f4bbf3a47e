//! # Storefront Chat
//!
//! Realtime chat connection layer for the storefront and seller console:
//! one shared STOMP-over-WebSocket session carrying every room and
//! user-event subscription, with automatic reconnect and backoff, an outbox
//! for publishes made while offline, and duplicate suppression for room
//! deliveries. [`ChatApi`] covers the REST side (room list, history,
//! mark-read).
//!
//! ## Example
//!
//! ```no_run
//! use storefront_chat_rs::{ChatClient, ChatClientOptions, ChatEvent, TokenStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokens = TokenStore::new(Some("access-token".to_string()));
//!     let client = ChatClient::builder(ChatClientOptions::from_env())?
//!         .credentials(tokens.clone())
//!         .build();
//!
//!     let _room = client.subscribe_room_messages(42, |event: &ChatEvent| {
//!         println!("{:?}", event.content);
//!     });
//!     client.connect().await;
//!     client.send_message(42, ChatEvent::text("hi"));
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod subscription;
pub mod types;
pub mod websocket;

pub use client::{ChatClient, ChatClientBuilder, ChatClientOptions, ConnectionState};
pub use infrastructure::{
    BackoffConfig, ChatApi, CredentialProvider, MessagePage, MessageView, NoCredentials,
    RoomRole, RoomSummary, TokenStore, ws_endpoint_from_api_base,
};
pub use messaging::{ChatEvent, EventType, ReadReceipt};
pub use subscription::{Subscription, TopicKey};
pub use types::{ChatError, Result};
pub use websocket::{Connector, TransportLink, WebSocketFactory};
