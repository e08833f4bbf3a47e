use std::time::Duration;
use storefront_chat_rs::{ChatClient, ChatClientOptions, ChatEvent, TokenStore};

/// Publishes before the connection exists, then connects and watches the
/// outbox drain. Rotating the token in between shows that replays carry the
/// token current at send time.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let room_id: u64 = std::env::var("CHAT_ROOM_ID")
        .ok()
        .and_then(|id| id.parse().ok())
        .unwrap_or(1);
    let tokens = TokenStore::new(std::env::var("CHAT_TOKEN").ok());

    let client = ChatClient::builder(ChatClientOptions::from_env())?
        .credentials(tokens.clone())
        .build();
    let client = ChatClient::install_global(client);

    println!("📤 Queueing while offline...");
    for n in 1..=3 {
        client.send_message(room_id, ChatEvent::text(format!("queued #{}", n)));
    }
    client.send_read(room_id, 1);
    println!("   {} publish(es) pending", client.pending_publishes());

    if let Ok(fresh) = std::env::var("CHAT_TOKEN_ROTATED") {
        println!("🔑 Rotating token before connecting");
        tokens.set(fresh);
    }

    println!("📡 Connecting...");
    client
        .connect_with(|| println!("✅ Connected, outbox drained"))
        .await;
    println!("   {} publish(es) pending", client.pending_publishes());

    // `disconnect` leaves the shared connection up
    client.disconnect();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(client.is_connected());

    client.shutdown().await;
    Ok(())
}
