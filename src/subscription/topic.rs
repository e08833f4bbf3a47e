use crate::messaging::ChatEvent;
use crate::types::constants::destinations;
use std::fmt;
use std::sync::Arc;

/// Callback invoked for every event delivered on a topic
pub type Handler = Arc<dyn Fn(&ChatEvent) + Send + Sync + 'static>;

/// Identifies one registration within a topic
pub type HandlerId = u64;

/// A server destination the client can listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicKey {
    /// Messages posted in one room
    Room(u64),
    /// Room lifecycle events (read receipts, room updates) addressed to one user
    UserEvents(u64),
}

impl TopicKey {
    pub fn destination(&self) -> String {
        match self {
            Self::Room(room_id) => format!("{}/{}", destinations::ROOM_TOPIC, room_id),
            Self::UserEvents(user_id) => format!(
                "{}/{}/{}",
                destinations::USER_TOPIC,
                user_id,
                destinations::USER_ROOM_EVENTS_SUFFIX
            ),
        }
    }

    /// Room id for room topics; dedup only applies to these
    pub fn room_id(&self) -> Option<u64> {
        match self {
            Self::Room(room_id) => Some(*room_id),
            Self::UserEvents(_) => None,
        }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination())
    }
}

/// Registry bookkeeping for one topic
pub struct TopicEntry {
    pub(crate) handlers: Vec<(HandlerId, Handler)>,
    /// STOMP subscription id while the topic is live on the current transport
    pub(crate) subscription: Option<String>,
}

impl TopicEntry {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Vec::new(),
            subscription: None,
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn subscription(&self) -> Option<&str> {
        self.subscription.as_deref()
    }
}

impl fmt::Debug for TopicEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicEntry")
            .field("handlers", &self.handlers.len())
            .field("subscription", &self.subscription)
            .finish()
    }
}
