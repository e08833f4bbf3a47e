/// STOMP command strings (magic strings layer)
pub mod stomp_commands {
    pub const CONNECT: &str = "CONNECT";
    pub const STOMP: &str = "STOMP";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SEND: &str = "SEND";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const MESSAGE: &str = "MESSAGE";
    pub const RECEIPT: &str = "RECEIPT";
    pub const ERROR: &str = "ERROR";
    pub const DISCONNECT: &str = "DISCONNECT";
}

/// STOMP header names
pub mod stomp_headers {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const HOST: &str = "host";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const DESTINATION: &str = "destination";
    pub const ID: &str = "id";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const MESSAGE: &str = "message";
    pub const VERSION: &str = "version";
}

/// Server-side destination prefixes
pub mod destinations {
    pub const ROOM_TOPIC: &str = "/sub/chat/rooms";
    pub const USER_TOPIC: &str = "/sub/chat/users";
    pub const USER_ROOM_EVENTS_SUFFIX: &str = "room-events";
    pub const SEND: &str = "/pub/chat/send";
    pub const READ: &str = "/pub/chat/read";
}

/// Protocol version
pub const STOMP_VERSION: &str = "1.2";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Path of the raw WebSocket endpoint below the API base
pub const WS_ENDPOINT_PATH: &str = "/ws-stomp/websocket";

pub const DEFAULT_API_BASE: &str = "http://localhost:7777";

/// Environment variable holding the API base URL
pub const API_BASE_ENV: &str = "CHAT_API_BASE";

/// Default handshake timeout (milliseconds)
pub const DEFAULT_TIMEOUT: u64 = 10000;

/// Default heart-beat interval (milliseconds)
pub const HEARTBEAT_INTERVAL: u64 = 10000;

/// Reconnect backoff policy (milliseconds)
pub const BACKOFF_MIN: u64 = 2000;
pub const BACKOFF_MAX: u64 = 30000;
pub const BACKOFF_MULTIPLIER: f64 = 1.7;

/// Dedup cache window (milliseconds) and capacity
pub const DEDUP_TTL: u64 = 30000;
pub const DEDUP_CAPACITY: usize = 1000;

/// Max outbox size
pub const MAX_OUTBOX_SIZE: usize = 1000;

/// Message history page size (REST)
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;
