use std::sync::Arc;
use storefront_chat_rs::{
    ChatApi, ChatClient, ChatClientOptions, ChatEvent, MessagePage, RoomRole, TokenStore,
};
use tracing_subscriber::EnvFilter;

/// Opens a room against a running chat backend: history over REST, live
/// messages over the shared connection.
///
/// CHAT_API_BASE, CHAT_TOKEN and CHAT_ROOM_ID are read from the environment
/// (or a .env file).
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("storefront_chat_rs=debug,info")),
        )
        .init();

    let api_base =
        std::env::var("CHAT_API_BASE").unwrap_or_else(|_| "http://localhost:7777".to_string());
    let token = std::env::var("CHAT_TOKEN").ok();
    let room_id: u64 = std::env::var("CHAT_ROOM_ID")
        .ok()
        .and_then(|id| id.parse().ok())
        .unwrap_or(1);

    let tokens = TokenStore::new(token);
    let api = ChatApi::new(&api_base, Arc::new(tokens.clone()))?;

    println!("📋 Rooms:");
    for room in api.list_rooms(RoomRole::User).await? {
        println!(
            "  #{} {:?} ({} unread)",
            room.room_id, room.last_message_preview, room.unread_count
        );
    }

    let history = api.list_messages(room_id, MessagePage::default()).await?;
    println!("📜 {} message(s) in room {}", history.len(), room_id);

    let client = ChatClient::builder(ChatClientOptions::from_env())?
        .credentials(tokens.clone())
        .build();

    let _room = client.subscribe_room_messages(room_id, |event: &ChatEvent| {
        println!(
            "💬 [{:?}] {}: {}",
            event.event_type,
            event.sender_id.unwrap_or_default(),
            event.content.as_deref().unwrap_or("")
        );
    });

    let mut states = client.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow();
            println!("🔌 {:?}", state);
        }
    });

    client.connect().await;
    println!("✅ Connected, say hi from another client (Ctrl+C to quit)");

    client.send_message(room_id, ChatEvent::text("hello from the demo"));
    if let Some(last) = history.first() {
        client.send_read(room_id, last.id);
        api.mark_read(room_id, last.id).await?;
    }

    tokio::signal::ctrl_c().await?;
    client.shutdown().await;
    println!("👋 Bye");

    Ok(())
}
