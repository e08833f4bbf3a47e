use super::event::{ChatEvent, InboundPayload};
use super::frame::{Command, Frame};
use crate::client::ClientState;
use crate::subscription::{Handler, TopicKey};
use crate::types::constants::stomp_headers;
use crate::types::{ChatError, Result};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::time::Instant;

/// Routes inbound STOMP frames of a live session to topic handlers
pub struct MessageRouter {
    state: Arc<Mutex<ClientState>>,
}

impl MessageRouter {
    pub fn new_with_state(state: Arc<Mutex<ClientState>>) -> Self {
        Self { state }
    }

    /// Routes one frame. An `Err` means the session must be dropped.
    pub fn route(&self, frame: Frame) -> Result<()> {
        match frame.command {
            Command::Message => {
                self.route_message(frame);
                Ok(())
            }
            Command::Error => {
                let reason = frame
                    .header(stomp_headers::MESSAGE)
                    .unwrap_or(frame.body.as_str());
                Err(ChatError::Connection(format!("server sent ERROR: {}", reason)))
            }
            Command::Receipt => {
                tracing::debug!("Received receipt {:?}", frame.header("receipt-id"));
                Ok(())
            }
            other => {
                tracing::warn!("Ignoring unexpected {} frame", other);
                Ok(())
            }
        }
    }

    fn route_message(&self, frame: Frame) {
        let Some(subscription_id) = frame.header(stomp_headers::SUBSCRIPTION) else {
            tracing::warn!("MESSAGE without subscription header dropped");
            return;
        };

        // resolve under the lock, dispatch after releasing it
        let delivery = {
            let mut state = self.state.lock();
            let Some(route) = state.registry.route(subscription_id) else {
                tracing::debug!(
                    "Dropping MESSAGE for inactive subscription {}",
                    subscription_id
                );
                return;
            };
            let event = InboundPayload::parse(&frame.body).into_event();
            if let Some(room_id) = route.topic.room_id()
                && !state.dedup.admit(room_id, &event, Instant::now())
            {
                return;
            }
            (route.topic, event, route.handlers)
        };

        let (topic, event, handlers) = delivery;
        dispatch(topic, &event, &handlers);
    }
}

/// Invokes every handler; a panicking handler is logged and does not stop
/// the others
pub fn dispatch(topic: TopicKey, event: &ChatEvent, handlers: &[Handler]) {
    tracing::trace!(
        "Dispatching {:?} on {} to {} handler(s)",
        event.event_type,
        topic,
        handlers.len()
    );
    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            tracing::error!("Handler for {} panicked", topic);
        }
    }
}
