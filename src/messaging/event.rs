use serde::{Deserialize, Serialize};

/// Kind of a chat event carried on a room or user topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Plain text message
    #[default]
    Text,

    /// Image message; `content` holds the image URL
    Image,

    /// Read receipt: `userId` has read up to `lastReadMessageId`
    Read,

    /// Something changed in a room (new message, member update)
    RoomUpdated,

    /// Any type this client does not know about
    #[serde(other)]
    Other,
}

/// The JSON envelope exchanged on chat topics.
///
/// Inbound events may carry any subset of these fields; outbound messages only
/// set `type`, `content` and `clientMsgId`. Decoding is field-lenient: a field
/// of an unexpected JSON type reads as absent (ids also accept numeric
/// strings) instead of rejecting the whole object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(rename = "type", default, deserialize_with = "lenient::event_type")]
    pub event_type: EventType,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::id", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient::id", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient::id", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::id", skip_serializing_if = "Option::is_none")]
    pub last_read_message_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient::id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

mod lenient {
    use super::EventType;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Unsigned numbers, or strings holding one
    pub fn id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn event_type<'de, D>(deserializer: D) -> Result<EventType, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => EventType::default(),
            value @ Value::String(_) => EventType::deserialize(value).unwrap_or(EventType::Other),
            _ => EventType::Other,
        })
    }
}

impl ChatEvent {
    /// Outbound text message with a fresh client correlation id
    pub fn text(content: impl Into<String>) -> Self {
        Self::outbound(EventType::Text, content.into())
    }

    /// Outbound image message; `url` points at an already uploaded image
    pub fn image(url: impl Into<String>) -> Self {
        Self::outbound(EventType::Image, url.into())
    }

    fn outbound(event_type: EventType, content: String) -> Self {
        Self {
            event_type,
            content: Some(content),
            client_msg_id: Some(uuid::Uuid::new_v4().to_string()),
            ..Default::default()
        }
    }

    pub fn with_client_msg_id(mut self, client_msg_id: impl Into<String>) -> Self {
        self.client_msg_id = Some(client_msg_id.into());
        self
    }

    /// Identity used to recognise a redelivery: the server id when present,
    /// otherwise the sender's correlation id.
    pub fn dedup_token(&self) -> Option<String> {
        self.id
            .map(|id| id.to_string())
            .or_else(|| self.client_msg_id.clone())
    }
}

/// Body of an outbound read receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub last_read_message_id: u64,
}

/// Result of decoding an inbound MESSAGE body
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    Parsed(ChatEvent),
    Raw(String),
}

impl InboundPayload {
    /// Never fails: bodies that are not a chat envelope are kept verbatim
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str::<ChatEvent>(body) {
            Ok(event) => Self::Parsed(event),
            Err(e) => {
                tracing::debug!("Inbound body is not a chat envelope ({}), passing raw", e);
                Self::Raw(body.to_string())
            }
        }
    }

    /// Normalizes to the envelope shape handlers receive
    pub fn into_event(self) -> ChatEvent {
        match self {
            Self::Parsed(event) => event,
            Self::Raw(text) => ChatEvent {
                event_type: EventType::Text,
                content: Some(text),
                ..Default::default()
            },
        }
    }
}
