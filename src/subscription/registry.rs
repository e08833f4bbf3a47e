use super::topic::{Handler, HandlerId, TopicEntry, TopicKey};
use crate::messaging::Frame;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Handlers snapshotted for one inbound delivery
pub struct Route {
    pub topic: TopicKey,
    pub handlers: Vec<Handler>,
}

/// Topic -> handler-set bookkeeping with one transport subscription per topic.
///
/// The registry never touches the transport. Mutations return the STOMP
/// frames the caller must write, in order. A topic exists exactly while it
/// has at least one handler; at most one user-events topic is held at a time.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: BTreeMap<TopicKey, TopicEntry>,
    by_subscription: HashMap<String, TopicKey>,
    user_topic: Option<TopicKey>,
    next_handler_id: HandlerId,
    next_subscription_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler, creating the topic on first use.
    ///
    /// Registering for a different user's events first tears the previous
    /// user topic down together with its handlers. A SUBSCRIBE is produced
    /// only when `connected` and the topic has no live subscription yet.
    pub fn add(&mut self, key: TopicKey, handler: Handler, connected: bool) -> (HandlerId, Vec<Frame>) {
        let mut frames = Vec::new();

        if let TopicKey::UserEvents(_) = key {
            if let Some(previous) = self.user_topic
                && previous != key
            {
                tracing::debug!("Switching user events from {} to {}", previous, key);
                frames.extend(self.teardown(previous));
            }
            self.user_topic = Some(key);
        }

        self.next_handler_id += 1;
        let handler_id = self.next_handler_id;
        let entry = self.topics.entry(key).or_insert_with(TopicEntry::new);
        entry.handlers.push((handler_id, handler));
        let needs_subscribe = connected && entry.subscription.is_none();

        if needs_subscribe {
            frames.push(self.establish(key));
        }
        (handler_id, frames)
    }

    /// Removes one handler. Idempotent; removing the last handler drops the
    /// topic and yields its UNSUBSCRIBE when it was live.
    pub fn remove(&mut self, key: TopicKey, handler_id: HandlerId) -> Vec<Frame> {
        let Some(entry) = self.topics.get_mut(&key) else {
            return Vec::new();
        };
        entry.handlers.retain(|(id, _)| *id != handler_id);
        if !entry.handlers.is_empty() {
            return Vec::new();
        }
        self.teardown(key).into_iter().collect()
    }

    /// SUBSCRIBE frames for every topic without a live subscription
    pub fn resubscribe_all(&mut self) -> Vec<Frame> {
        let pending: Vec<TopicKey> = self
            .topics
            .iter()
            .filter(|(_, entry)| entry.subscription.is_none())
            .map(|(key, _)| *key)
            .collect();
        pending.into_iter().map(|key| self.establish(key)).collect()
    }

    /// Forgets every transport subscription; handlers stay registered
    pub fn detach_all(&mut self) {
        for entry in self.topics.values_mut() {
            entry.subscription = None;
        }
        self.by_subscription.clear();
    }

    /// Resolves a STOMP subscription id to its topic and a handler snapshot
    pub fn route(&self, subscription_id: &str) -> Option<Route> {
        let topic = *self.by_subscription.get(subscription_id)?;
        let entry = self.topics.get(&topic)?;
        Some(Route {
            topic,
            handlers: entry.handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
        })
    }

    pub fn get(&self, key: &TopicKey) -> Option<&TopicEntry> {
        self.topics.get(key)
    }

    pub fn contains(&self, key: &TopicKey) -> bool {
        self.topics.contains_key(key)
    }

    pub fn topics(&self) -> impl Iterator<Item = &TopicKey> {
        self.topics.keys()
    }

    pub fn user_topic(&self) -> Option<TopicKey> {
        self.user_topic
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    fn establish(&mut self, key: TopicKey) -> Frame {
        self.next_subscription_id += 1;
        let id = format!("sub-{}", self.next_subscription_id);
        if let Some(entry) = self.topics.get_mut(&key) {
            entry.subscription = Some(id.clone());
        }
        self.by_subscription.insert(id.clone(), key);
        tracing::debug!("Subscribing {} to {}", id, key);
        Frame::subscribe(&id, &key.destination())
    }

    fn teardown(&mut self, key: TopicKey) -> Option<Frame> {
        let entry = self.topics.remove(&key)?;
        if self.user_topic == Some(key) {
            self.user_topic = None;
        }
        let id = entry.subscription?;
        self.by_subscription.remove(&id);
        tracing::debug!("Unsubscribing {} from {}", id, key);
        Some(Frame::unsubscribe(&id))
    }
}
