use crate::infrastructure::credentials::CredentialProvider;
use crate::messaging::EventType;
use crate::types::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, WS_ENDPOINT_PATH};
use crate::types::{ChatError, Result};
use reqwest::{Method, Request, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

/// Which side of the conversation the room list is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomRole {
    #[default]
    User,
    Seller,
}

impl RoomRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Seller => "seller",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: u64,
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
}

/// Row of the room list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: u64,
    pub room_uid: Option<String>,
    #[serde(rename = "type")]
    pub room_type: Option<String>,
    pub other: Option<Participant>,
    pub last_message_preview: Option<String>,
    pub last_message_time: Option<String>,
    #[serde(default)]
    pub unread_count: u64,
}

/// Persisted message as returned by the history endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: u64,
    pub room_id: u64,
    pub sender_id: Option<u64>,
    #[serde(rename = "type", default)]
    pub message_type: EventType,
    pub content: Option<String>,
    pub client_msg_id: Option<String>,
    pub created_at: Option<String>,
}

/// History paging: messages older than `before`, at most `size` (capped at 100)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub before: Option<u64>,
    pub size: Option<u32>,
}

/// REST side of chat: room list, history, mark-read, room creation.
///
/// Independent of the realtime connection; the UI merges both.
pub struct ChatApi {
    base: String,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl ChatApi {
    pub fn new(api_base: &str, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let parsed = Url::parse(api_base)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ChatError::Config(format!(
                "API base must be http(s), got '{}'",
                api_base
            )));
        }

        Ok(Self {
            base: format!("{}/api/chat", api_base.trim_end_matches('/')),
            http: reqwest::Client::new(),
            credentials,
        })
    }

    pub async fn list_rooms(&self, role: RoomRole) -> Result<Vec<RoomSummary>> {
        let request = self.list_rooms_request(role)?;
        self.execute_json(request).await
    }

    pub async fn list_messages(&self, room_id: u64, page: MessagePage) -> Result<Vec<MessageView>> {
        let request = self.list_messages_request(room_id, page)?;
        self.execute_json(request).await
    }

    /// No-op for room id 0
    pub async fn mark_read(&self, room_id: u64, last_read_message_id: u64) -> Result<()> {
        let Some(request) = self.mark_read_request(room_id, last_read_message_id)? else {
            return Ok(());
        };
        self.execute(request).await?;
        Ok(())
    }

    pub async fn open_user_seller_room(&self, seller_id: u64) -> Result<RoomSummary> {
        let request = self
            .request(Method::POST, "/rooms/user-seller")
            .json(&serde_json::json!({ "sellerId": seller_id }))
            .build()?;
        self.execute_json(request).await
    }

    pub async fn open_room_by_product(&self, product_id: u64) -> Result<RoomSummary> {
        let request = self
            .request(Method::POST, &format!("/rooms/by-product/{}", product_id))
            .build()?;
        self.execute_json(request).await
    }

    fn list_rooms_request(&self, role: RoomRole) -> Result<Request> {
        Ok(self
            .request(Method::GET, "/rooms")
            .query(&[("as", role.as_str())])
            .build()?)
    }

    fn list_messages_request(&self, room_id: u64, page: MessagePage) -> Result<Request> {
        let size = page.size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let mut builder = self
            .request(Method::GET, &format!("/rooms/{}/messages", room_id))
            .query(&[("size", size)]);
        if let Some(before) = page.before {
            builder = builder.query(&[("before", before)]);
        }
        Ok(builder.build()?)
    }

    fn mark_read_request(&self, room_id: u64, last_read_message_id: u64) -> Result<Option<Request>> {
        if room_id == 0 {
            tracing::warn!("Ignoring mark-read for invalid room id 0");
            return Ok(None);
        }
        let request = self
            .request(Method::POST, &format!("/rooms/{}/read", room_id))
            .json(&serde_json::json!({ "lastReadMessageId": last_read_message_id }))
            .build()?;
        Ok(Some(request))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base, path);
        let mut request = self.http.request(method, url);
        if let Some(token) = self.credentials.access_token() {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ChatError::Connection(format!("{} {} failed: {}", method, url, e)))?;

        if !response.status().is_success() {
            return Err(ChatError::Connection(format!(
                "{} {} failed with status: {}",
                method,
                url.path(),
                response.status()
            )));
        }

        tracing::debug!("{} {} -> {}", method, url.path(), response.status());
        Ok(response)
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let response = self.execute(request).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Converts an HTTP API base into the STOMP WebSocket endpoint
pub fn ws_endpoint_from_api_base(api_base: &str) -> String {
    let base = api_base
        .trim_end_matches('/')
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!("{}{}", base, WS_ENDPOINT_PATH)
}
