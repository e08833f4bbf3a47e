use super::{ChatClient, ClientState};
use crate::infrastructure::{BackoffConfig, CredentialProvider, NoCredentials, ws_endpoint_from_api_base};
use crate::types::constants::{
    API_BASE_ENV, DEDUP_CAPACITY, DEDUP_TTL, DEFAULT_API_BASE, DEFAULT_TIMEOUT,
    HEARTBEAT_INTERVAL, MAX_OUTBOX_SIZE,
};
use crate::types::{ChatError, Result};
use crate::websocket::{Connector, WebSocketFactory};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

#[derive(Debug, Clone)]
pub struct ChatClientOptions {
    /// STOMP-over-WebSocket endpoint, e.g. `ws://localhost:7777/ws-stomp/websocket`
    pub endpoint: String,
    /// Value of the CONNECT `host` header; defaults to the endpoint host
    pub host: Option<String>,
    /// Bound on opening the transport plus the STOMP handshake
    pub connect_timeout: Duration,
    /// Heart-beat we offer in both directions; zero disables
    pub heartbeat_interval: Duration,
    pub backoff: BackoffConfig,
    pub dedup_ttl: Duration,
    pub dedup_capacity: usize,
    pub outbox_capacity: usize,
}

impl Default for ChatClientOptions {
    fn default() -> Self {
        Self {
            endpoint: ws_endpoint_from_api_base(DEFAULT_API_BASE),
            host: None,
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT),
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL),
            backoff: BackoffConfig::default(),
            dedup_ttl: Duration::from_millis(DEDUP_TTL),
            dedup_capacity: DEDUP_CAPACITY,
            outbox_capacity: MAX_OUTBOX_SIZE,
        }
    }
}

impl ChatClientOptions {
    /// Defaults with the endpoint derived from `CHAT_API_BASE` when set
    pub fn from_env() -> Self {
        match std::env::var(API_BASE_ENV) {
            Ok(api_base) if !api_base.trim().is_empty() => Self {
                endpoint: ws_endpoint_from_api_base(api_base.trim()),
                ..Default::default()
            },
            _ => Self::default(),
        }
    }

    fn validate(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChatError::Config(format!(
                "endpoint must be ws:// or wss://, got '{}'",
                self.endpoint
            )));
        }
        if self.backoff.min.is_zero() {
            return Err(ChatError::Config(
                "backoff min must be positive".to_string(),
            ));
        }
        if self.backoff.min > self.backoff.max {
            return Err(ChatError::Config(
                "backoff min must not exceed backoff max".to_string(),
            ));
        }
        if self.backoff.multiplier.is_nan() || self.backoff.multiplier < 1.0 {
            return Err(ChatError::Config(format!(
                "backoff multiplier must be >= 1, got {}",
                self.backoff.multiplier
            )));
        }
        if self.dedup_capacity == 0 || self.outbox_capacity == 0 {
            return Err(ChatError::Config(
                "dedup and outbox capacities must be positive".to_string(),
            ));
        }
        Ok(url)
    }
}

/// Builder for ChatClient that handles validation and collaborators
pub struct ChatClientBuilder {
    endpoint: Url,
    host: String,
    options: ChatClientOptions,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
}

impl ChatClientBuilder {
    pub fn new(options: ChatClientOptions) -> Result<Self> {
        let endpoint = options.validate()?;
        let host = match &options.host {
            Some(host) => host.clone(),
            None => endpoint
                .host_str()
                .ok_or_else(|| ChatError::Config(format!("endpoint '{}' has no host", endpoint)))?
                .to_string(),
        };

        Ok(Self {
            endpoint,
            host,
            options,
            credentials: Arc::new(NoCredentials),
            connector: Arc::new(WebSocketFactory),
        })
    }

    /// Token source consulted on every connect attempt and publish
    pub fn credentials(mut self, provider: impl CredentialProvider) -> Self {
        self.credentials = Arc::new(provider);
        self
    }

    /// Replaces the WebSocket transport
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Build the client. Nothing connects until `connect` or `resume`.
    pub fn build(self) -> ChatClient {
        let state = ClientState::new(&self.options);
        ChatClient {
            endpoint: Arc::new(self.endpoint),
            host: Arc::from(self.host),
            options: Arc::new(self.options),
            credentials: self.credentials,
            connector: self.connector,
            state: Arc::new(Mutex::new(state)),
            wake: Arc::new(Notify::new()),
        }
    }
}
