use super::*;
use crate::infrastructure::TokenStore;
use crate::messaging::{ChatEvent, Command, EventType, Frame, Inbound, frame};
use crate::subscription::TopicKey;
use crate::types::Result;
use crate::websocket::{Connector, TransportLink};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use url::Url;

const CONNECTED: &str = "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0";

/// Server side of one in-memory transport. Dropping it closes the link.
struct ServerEnd {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
    opened_at: Instant,
}

impl ServerEnd {
    async fn next_frame(&mut self) -> Frame {
        loop {
            let text = timeout(Duration::from_secs(120), self.from_client.recv())
                .await
                .expect("client frame in time")
                .expect("client link open");
            for item in frame::decode(&text).unwrap() {
                if let Inbound::Frame(frame) = item {
                    return frame;
                }
            }
        }
    }

    async fn accept(&mut self) -> Frame {
        self.accept_with(CONNECTED).await
    }

    async fn accept_with(&mut self, connected: &str) -> Frame {
        let connect = self.next_frame().await;
        assert_eq!(connect.command, Command::Connect);
        self.push(connected);
        connect
    }

    fn push(&self, text: &str) {
        self.to_client
            .as_ref()
            .expect("link not hung up")
            .send(text.to_string())
            .unwrap();
    }

    /// Ends the client's inbound stream and refuses further writes, the way
    /// the WebSocket bridge does once the socket is gone. Frames written
    /// before the hang-up stay readable.
    fn hang_up(&mut self) {
        self.to_client = None;
        self.from_client.close();
    }

    fn deliver(&self, subscription: &str, body: &str) {
        let message = Frame::new(Command::Message)
            .with_header("subscription", subscription)
            .with_header("message-id", "m-1")
            .with_body(body);
        self.push(&message.encode());
    }

    /// Frames the client has written so far, heart-beats skipped
    fn sent_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            for item in frame::decode(&text).unwrap() {
                if let Inbound::Frame(frame) = item {
                    frames.push(frame);
                }
            }
        }
        frames
    }
}

struct MemoryConnector {
    opened: mpsc::UnboundedSender<ServerEnd>,
}

impl Connector for MemoryConnector {
    fn connect(&self, _endpoint: &Url) -> BoxFuture<'static, Result<TransportLink>> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        let _ = self.opened.send(ServerEnd {
            to_client: Some(server_tx),
            from_client: server_rx,
            opened_at: Instant::now(),
        });
        Box::pin(async move {
            Ok(TransportLink {
                outbound: client_tx,
                inbound: client_rx,
            })
        })
    }
}

fn test_client() -> (ChatClient, mpsc::UnboundedReceiver<ServerEnd>, TokenStore) {
    let (opened_tx, opened_rx) = mpsc::unbounded_channel();
    let tokens = TokenStore::new(Some("t1".to_string()));
    let client = ChatClient::builder(ChatClientOptions::default())
        .unwrap()
        .credentials(tokens.clone())
        .connector(MemoryConnector { opened: opened_tx })
        .build();
    (client, opened_rx, tokens)
}

async fn next_server(opened: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    timeout(Duration::from_secs(120), opened.recv())
        .await
        .expect("connection attempt in time")
        .expect("connector alive")
}

/// Runs `connect()` against a server that accepts the handshake
async fn establish(
    client: &ChatClient,
    opened: &mut mpsc::UnboundedReceiver<ServerEnd>,
) -> ServerEnd {
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut server = next_server(opened).await;
    server.accept().await;
    timeout(Duration::from_secs(5), connecting)
        .await
        .expect("connect resolves")
        .unwrap();
    server
}

async fn wait_for_state(client: &ChatClient, wanted: ConnectionState) {
    let mut rx = client.watch_state();
    timeout(Duration::from_secs(120), rx.wait_for(|state| *state == wanted))
        .await
        .expect("state reached in time")
        .expect("state channel open");
}

fn recorder() -> (
    impl Fn(&ChatEvent) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<ChatEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |event: &ChatEvent| {
            let _ = tx.send(event.clone());
        },
        rx,
    )
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> ChatEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event in time")
        .expect("handler alive")
}

fn subscribes(frames: &[Frame]) -> Vec<&Frame> {
    frames
        .iter()
        .filter(|f| f.command == Command::Subscribe)
        .collect()
}

fn exploding(_: &ChatEvent) {
    panic!("handler failure");
}

#[tokio::test(start_paused = true)]
async fn test_shared_room_topic_subscribes_once() {
    let (client, mut opened, _) = test_client();
    let (a, mut a_rx) = recorder();
    let (b, mut b_rx) = recorder();
    let _a = client.subscribe_room_messages(42, a);
    let _b = client.subscribe_room_messages(42, b);

    let mut server = establish(&client, &mut opened).await;
    let frames = server.sent_frames();
    let subs = subscribes(&frames);
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].header("destination"), Some("/sub/chat/rooms/42"));

    server.deliver(subs[0].header("id").unwrap(), r#"{"id":1,"roomId":42,"content":"hi"}"#);
    assert_eq!(next_event(&mut a_rx).await.content.as_deref(), Some("hi"));
    assert_eq!(next_event(&mut b_rx).await.id, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_racing_connect_is_established() {
    let (client, mut opened, _) = test_client();
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut server = next_server(&mut opened).await;
    assert_eq!(server.next_frame().await.command, Command::Connect);
    assert_eq!(client.connection_state(), ConnectionState::Connecting);

    let (handler, _rx) = recorder();
    let _sub = client.subscribe_room_messages(7, handler);
    assert!(server.sent_frames().is_empty());

    server.push(CONNECTED);
    connecting.await.unwrap();
    let frames = server.sent_frames();
    let subs = subscribes(&frames);
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].header("destination"), Some("/sub/chat/rooms/7"));
}

#[tokio::test(start_paused = true)]
async fn test_offline_publishes_replay_once_in_order() {
    let (client, mut opened, _) = test_client();
    client.send_message(42, ChatEvent::text("hi").with_client_msg_id("abc"));
    client.send_read(42, 10);
    assert_eq!(client.pending_publishes(), 2);

    let mut server = establish(&client, &mut opened).await;
    let frames = server.sent_frames();
    let sends: Vec<&Frame> = frames.iter().filter(|f| f.command == Command::Send).collect();
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].header("destination"), Some("/pub/chat/send/42"));
    let message: ChatEvent = serde_json::from_str(&sends[0].body).unwrap();
    assert_eq!(message.client_msg_id.as_deref(), Some("abc"));
    assert_eq!(message.event_type, EventType::Text);
    assert_eq!(sends[1].header("destination"), Some("/pub/chat/read/42"));
    assert_eq!(sends[1].body, r#"{"lastReadMessageId":10}"#);
    assert_eq!(client.pending_publishes(), 0);

    // a later reconnect does not send them again
    drop(server);
    let mut server = next_server(&mut opened).await;
    server.accept().await;
    wait_for_state(&client, ConnectionState::Connected).await;
    assert!(
        server
            .sent_frames()
            .iter()
            .all(|f| f.command != Command::Send)
    );
}

#[tokio::test(start_paused = true)]
async fn test_redelivery_dispatched_once_until_ttl_expires() {
    let (client, mut opened, _) = test_client();
    let (handler, mut rx) = recorder();
    let _sub = client.subscribe_room_messages(42, handler);
    let mut server = establish(&client, &mut opened).await;
    let frames = server.sent_frames();
    let sub_id = subscribes(&frames)[0].header("id").unwrap().to_string();

    let body = r#"{"id":501,"roomId":42,"content":"hi"}"#;
    server.deliver(&sub_id, body);
    server.deliver(&sub_id, body);
    server.deliver(&sub_id, r#"{"id":502,"roomId":42,"content":"next"}"#);
    assert_eq!(next_event(&mut rx).await.id, Some(501));
    assert_eq!(next_event(&mut rx).await.id, Some(502));

    tokio::time::advance(Duration::from_secs(31)).await;
    server.deliver(&sub_id, body);
    assert_eq!(next_event(&mut rx).await.id, Some(501));
}

#[tokio::test(start_paused = true)]
async fn test_failed_handshakes_back_off_then_reset() {
    let (client, mut opened, _) = test_client();
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut attempts = Vec::new();
    for _ in 0..3 {
        let mut server = next_server(&mut opened).await;
        attempts.push(server.opened_at);
        assert_eq!(server.next_frame().await.command, Command::Connect);
        server.push("ERROR\nmessage:invalid token\n\n\0");
    }
    let mut server = next_server(&mut opened).await;
    attempts.push(server.opened_at);
    server.accept().await;
    connecting.await.unwrap();

    let gaps: Vec<u128> = attempts
        .windows(2)
        .map(|w| (w[1] - w[0]).as_millis())
        .collect();
    assert_eq!(gaps, vec![2000, 3400, 5780]);

    let dropped_at = Instant::now();
    drop(server);
    let server = next_server(&mut opened).await;
    assert_eq!((server.opened_at - dropped_at).as_millis(), 2000);
}

#[tokio::test(start_paused = true)]
async fn test_user_switch_tears_down_previous_user() {
    let (client, mut opened, _) = test_client();
    let mut server = establish(&client, &mut opened).await;
    let (h1, mut rx1) = recorder();
    let (h2, mut rx2) = recorder();

    let _first = client.subscribe_user_room_events(7, h1);
    let frames = server.sent_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].header("destination"),
        Some("/sub/chat/users/7/room-events")
    );
    let old_id = frames[0].header("id").unwrap().to_string();

    let _second = client.subscribe_user_room_events(9, h2);
    let frames = server.sent_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].command, Command::Unsubscribe);
    assert_eq!(frames[0].header("id"), Some(old_id.as_str()));
    assert_eq!(frames[1].command, Command::Subscribe);
    assert_eq!(
        frames[1].header("destination"),
        Some("/sub/chat/users/9/room-events")
    );
    let new_id = frames[1].header("id").unwrap().to_string();

    server.deliver(&old_id, r#"{"type":"ROOM_UPDATED","roomId":3}"#);
    server.deliver(&new_id, r#"{"type":"ROOM_UPDATED","roomId":4}"#);
    let event = next_event(&mut rx2).await;
    assert_eq!(event.event_type, EventType::RoomUpdated);
    assert_eq!(event.room_id, Some(4));
    assert!(rx1.try_recv().is_err());
    assert_eq!(client.active_topics(), vec![TopicKey::UserEvents(9)]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resubscribes_every_topic_once() {
    let (client, mut opened, _) = test_client();
    let (a, mut a_rx) = recorder();
    let (b, _b_rx) = recorder();
    let (c, _c_rx) = recorder();
    let (d, _d_rx) = recorder();
    let _a = client.subscribe_room_messages(1, a);
    let _b = client.subscribe_room_messages(1, b);
    let _c = client.subscribe_room_messages(2, c);
    let _d = client.subscribe_user_room_events(7, d);

    let mut server = establish(&client, &mut opened).await;
    assert_eq!(subscribes(&server.sent_frames()).len(), 3);

    drop(server);
    let mut server = next_server(&mut opened).await;
    server.accept().await;
    wait_for_state(&client, ConnectionState::Connected).await;

    let frames = server.sent_frames();
    let destinations: Vec<&str> = subscribes(&frames)
        .iter()
        .filter_map(|f| f.header("destination"))
        .collect();
    assert_eq!(
        destinations,
        vec![
            "/sub/chat/rooms/1",
            "/sub/chat/rooms/2",
            "/sub/chat/users/7/room-events"
        ]
    );

    // handlers survived the reconnect
    let room_one = subscribes(&frames)[0].header("id").unwrap().to_string();
    server.deliver(&room_one, r#"{"id":9,"content":"back"}"#);
    assert_eq!(next_event(&mut a_rx).await.content.as_deref(), Some("back"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_when_connected_resolves_immediately() {
    let (client, mut opened, _) = test_client();
    let _server = establish(&client, &mut opened).await;

    let ready = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ready);
    let result = timeout(
        Duration::from_millis(1),
        client.connect_with(move || flag.store(true, Ordering::SeqCst)),
    )
    .await;
    assert!(result.is_ok());
    assert!(ready.load(Ordering::SeqCst));
    assert!(opened.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_attempt() {
    let (client, mut opened, _) = test_client();
    let ready = Arc::new(AtomicBool::new(false));
    let also_ready = Arc::new(AtomicBool::new(false));

    let first = tokio::spawn({
        let client = client.clone();
        let ready = Arc::clone(&ready);
        async move {
            client
                .connect_with(move || ready.store(true, Ordering::SeqCst))
                .await
        }
    });
    let second = tokio::spawn({
        let client = client.clone();
        let ready = Arc::clone(&also_ready);
        async move {
            client
                .connect_with(move || ready.store(true, Ordering::SeqCst))
                .await
        }
    });

    let mut server = next_server(&mut opened).await;
    server.accept().await;
    first.await.unwrap();
    second.await.unwrap();

    assert!(ready.load(Ordering::SeqCst));
    assert!(also_ready.load(Ordering::SeqCst));
    assert!(opened.try_recv().is_err());
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_last_unsubscribe_tears_topic_down() {
    let (client, mut opened, _) = test_client();
    let mut server = establish(&client, &mut opened).await;
    let (a, _a_rx) = recorder();
    let (b, _b_rx) = recorder();

    let sub_a = client.subscribe_room_messages(42, a);
    let sub_b = client.subscribe_room_messages(42, b);
    let frames = server.sent_frames();
    assert_eq!(frames.len(), 1);
    let id = frames[0].header("id").unwrap().to_string();

    sub_a.unsubscribe();
    assert!(server.sent_frames().is_empty());
    assert_eq!(client.active_topics(), vec![TopicKey::Room(42)]);

    sub_b.unsubscribe();
    assert_eq!(server.sent_frames(), vec![Frame::unsubscribe(&id)]);
    assert!(client.active_topics().is_empty());

    sub_b.unsubscribe();
    assert!(server.sent_frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_offline_unsubscribe_is_not_resubscribed() {
    let (client, mut opened, _) = test_client();
    let (a, _a_rx) = recorder();
    let (b, _b_rx) = recorder();
    let gone = client.subscribe_room_messages(5, a);
    let _kept = client.subscribe_room_messages(6, b);
    gone.unsubscribe();

    let mut server = establish(&client, &mut opened).await;
    let frames = server.sent_frames();
    let destinations: Vec<&str> = subscribes(&frames)
        .iter()
        .filter_map(|f| f.header("destination"))
        .collect();
    assert_eq!(destinations, vec!["/sub/chat/rooms/6"]);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_is_isolated() {
    let (client, mut opened, _) = test_client();
    let (handler, mut rx) = recorder();
    let _bad = client.subscribe_room_messages(3, exploding);
    let _good = client.subscribe_room_messages(3, handler);
    let mut server = establish(&client, &mut opened).await;
    let frames = server.sent_frames();
    let sub_id = subscribes(&frames)[0].header("id").unwrap().to_string();

    server.deliver(&sub_id, r#"{"id":1}"#);
    server.deliver(&sub_id, r#"{"id":2}"#);
    assert_eq!(next_event(&mut rx).await.id, Some(1));
    assert_eq!(next_event(&mut rx).await.id, Some(2));
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_token_is_read_per_connect_and_publish() {
    let (client, mut opened, tokens) = test_client();
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut server = next_server(&mut opened).await;
    let connect = server.accept().await;
    connecting.await.unwrap();
    assert_eq!(connect.header("Authorization"), Some("Bearer t1"));

    tokens.set("t2");
    client.send_message(42, ChatEvent::text("live"));
    let frames = server.sent_frames();
    assert_eq!(frames[0].command, Command::Send);
    assert_eq!(frames[0].header("Authorization"), Some("Bearer t2"));

    drop(server);
    wait_for_state(&client, ConnectionState::Disconnected).await;
    client.send_message(42, ChatEvent::text("queued"));
    assert_eq!(client.pending_publishes(), 1);
    tokens.set("t3");

    let mut server = next_server(&mut opened).await;
    let connect = server.accept().await;
    assert_eq!(connect.header("Authorization"), Some("Bearer t3"));
    wait_for_state(&client, ConnectionState::Connected).await;
    let frames = server.sent_frames();
    let replay = frames.iter().find(|f| f.command == Command::Send).unwrap();
    assert_eq!(replay.header("Authorization"), Some("Bearer t3"));
    assert_eq!(
        replay.headers.iter().filter(|(k, _)| k == "Authorization").count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_publish_racing_transport_close_is_replayed() {
    let (client, mut opened, _) = test_client();
    let mut server = establish(&client, &mut opened).await;

    server.hang_up();
    // nothing has yielded, so the session still believes it is connected
    assert!(client.is_connected());
    client.send_message(42, ChatEvent::text("racing").with_client_msg_id("race-1"));
    assert_eq!(client.pending_publishes(), 1);
    assert!(server.sent_frames().is_empty());

    let mut next = next_server(&mut opened).await;
    next.accept().await;
    wait_for_state(&client, ConnectionState::Connected).await;
    let frames = next.sent_frames();
    let sends: Vec<&Frame> = frames.iter().filter(|f| f.command == Command::Send).collect();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].header("destination"), Some("/pub/chat/send/42"));
    let message: ChatEvent = serde_json::from_str(&sends[0].body).unwrap();
    assert_eq!(message.client_msg_id.as_deref(), Some("race-1"));
    assert_eq!(client.pending_publishes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_skips_backoff() {
    let (client, mut opened, _) = test_client();
    let server = establish(&client, &mut opened).await;

    client.resume();
    assert!(opened.try_recv().is_err());

    drop(server);
    wait_for_state(&client, ConnectionState::Disconnected).await;
    let resumed_at = Instant::now();
    client.resume();
    let server = next_server(&mut opened).await;
    assert_eq!(server.opened_at, resumed_at);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_frame_forces_reconnect() {
    let (client, mut opened, _) = test_client();
    let (handler, _rx) = recorder();
    let _sub = client.subscribe_room_messages(1, handler);
    let server = establish(&client, &mut opened).await;

    server.push("ERROR\nmessage:session expired\n\nbye\0");
    let mut server = next_server(&mut opened).await;
    server.accept().await;
    wait_for_state(&client, ConnectionState::Connected).await;
    assert_eq!(subscribes(&server.sent_frames()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_is_dropped_after_two_heartbeat_intervals() {
    let (client, mut opened, _) = test_client();
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut server = next_server(&mut opened).await;
    server
        .accept_with("CONNECTED\nversion:1.2\nheart-beat:1000,1000\n\n\0")
        .await;
    connecting.await.unwrap();
    let connected_at = Instant::now();

    // incoming max(10000, 1000) doubled, then the 2s backoff
    let next = next_server(&mut opened).await;
    assert_eq!((next.opened_at - connected_at).as_millis(), 22000);

    // outgoing beats were written meanwhile
    let mut beats = 0;
    while let Ok(text) = server.from_client.try_recv() {
        if text == "\n" {
            beats += 1;
        }
    }
    assert!(beats >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_ids_are_ignored() {
    let (client, _opened, _) = test_client();
    let (handler, _rx) = recorder();
    let sub = client.subscribe_room_messages(0, handler);
    assert_eq!(sub.topic(), None);
    sub.unsubscribe();

    let (handler, _rx) = recorder();
    assert_eq!(client.subscribe_user_room_events(0, handler).topic(), None);

    client.send_message(0, ChatEvent::text("nowhere"));
    client.send_read(0, 1);
    assert!(client.active_topics().is_empty());
    assert_eq!(client.pending_publishes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_keeps_the_shared_connection() {
    let (client, mut opened, _) = test_client();
    let mut server = establish(&client, &mut opened).await;
    client.disconnect();
    assert!(client.is_connected());
    assert!(server.sent_frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_reconnecting() {
    let (client, mut opened, _) = test_client();
    let mut server = establish(&client, &mut opened).await;

    client.shutdown().await;
    assert!(!client.is_connected());
    assert_eq!(server.sent_frames(), vec![Frame::disconnect()]);

    drop(server);
    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(opened.try_recv().is_err());

    // connect after shutdown returns without connecting
    timeout(Duration::from_millis(1), client.connect())
        .await
        .unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn test_global_instance_first_install_wins() {
    let first = ChatClient::new(ChatClientOptions::default()).unwrap();
    let second = ChatClient::new(ChatClientOptions::default()).unwrap();

    let installed = ChatClient::install_global(first.clone());
    assert!(Arc::ptr_eq(&installed.state, &first.state));
    let again = ChatClient::install_global(second);
    assert!(Arc::ptr_eq(&again.state, &first.state));
    assert!(ChatClient::global().is_some());
}
