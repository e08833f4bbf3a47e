use crate::messaging::ChatEvent;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Suppresses redelivered room events.
///
/// Keys are `roomId:(id ?? clientMsgId)`. Entries expire `ttl` after they were
/// first recorded; a dropped duplicate does not extend the window. When more
/// than `capacity` keys are live the oldest are evicted first.
#[derive(Debug)]
pub struct DedupFilter {
    ttl: Duration,
    capacity: usize,
    seen: HashMap<String, Instant>,
    order: VecDeque<(String, Instant)>,
}

impl DedupFilter {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn key(room_id: u64, event: &ChatEvent) -> Option<String> {
        event
            .dedup_token()
            .map(|token| format!("{}:{}", room_id, token))
    }

    /// Returns `true` when the event should be dispatched
    pub fn admit(&mut self, room_id: u64, event: &ChatEvent, now: Instant) -> bool {
        match Self::key(room_id, event) {
            Some(key) => self.admit_key(key, now),
            None => true,
        }
    }

    pub fn admit_key(&mut self, key: String, now: Instant) -> bool {
        self.expire(now);

        if let Some(seen_at) = self.seen.get(&key)
            && now.duration_since(*seen_at) < self.ttl
        {
            tracing::debug!("Dropping duplicate delivery {}", key);
            return false;
        }

        self.seen.insert(key.clone(), now);
        self.order.push_back((key, now));
        self.evict_over_capacity();
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn expire(&mut self, now: Instant) {
        while let Some((key, seen_at)) = self.order.front() {
            if now.duration_since(*seen_at) < self.ttl {
                break;
            }
            if self.seen.get(key) == Some(seen_at) {
                self.seen.remove(key);
            }
            self.order.pop_front();
        }
    }

    fn evict_over_capacity(&mut self) {
        while self.seen.len() > self.capacity {
            let Some((key, seen_at)) = self.order.pop_front() else {
                break;
            };
            if self.seen.get(&key) == Some(&seen_at) {
                self.seen.remove(&key);
            }
        }
    }
}
