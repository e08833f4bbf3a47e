use crate::types::Result;
use std::collections::VecDeque;
use tokio::time::Instant;

/// An outbound publish that has not reached the transport yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub destination: String,
    pub payload: String,
    pub headers: Vec<(String, String)>,
    pub enqueued_at: Instant,
}

impl OutboxEntry {
    pub fn new(destination: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            payload: payload.into(),
            headers: Vec::new(),
            enqueued_at: Instant::now(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What happened to a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// FIFO buffer of publishes made while the transport was unavailable.
///
/// Delivery is at-least-once and in enqueue order; there is no dedup here,
/// callers attach a `clientMsgId` when they need idempotency.
#[derive(Debug)]
pub struct Outbox {
    entries: VecDeque<OutboxEntry>,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Sends immediately when connected, otherwise (or on a failed send) queues.
    ///
    /// A backlog left by an interrupted drain goes out first so nothing
    /// overtakes an older entry.
    pub fn enqueue_or_send<F>(&mut self, entry: OutboxEntry, connected: bool, mut send: F) -> Delivery
    where
        F: FnMut(&OutboxEntry) -> Result<()>,
    {
        if !connected {
            self.enqueue(entry);
            return Delivery::Queued;
        }

        self.drain(&mut send);
        if !self.entries.is_empty() {
            self.enqueue(entry);
            return Delivery::Queued;
        }

        match send(&entry) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                tracing::warn!("Send to {} failed ({}), queueing", entry.destination, e);
                self.enqueue(entry);
                Delivery::Queued
            }
        }
    }

    pub fn enqueue(&mut self, entry: OutboxEntry) {
        if self.entries.len() >= self.capacity
            && let Some(dropped) = self.entries.pop_front()
        {
            tracing::warn!(
                "Outbox full ({} entries), dropping oldest publish to {}",
                self.capacity,
                dropped.destination
            );
        }
        tracing::debug!("Queued publish to {}", entry.destination);
        self.entries.push_back(entry);
    }

    /// Sends from the head until empty or until a send fails; the failed entry
    /// goes back to the head. Returns how many entries were sent.
    pub fn drain<F>(&mut self, mut send: F) -> usize
    where
        F: FnMut(&OutboxEntry) -> Result<()>,
    {
        let mut sent = 0;
        while let Some(entry) = self.entries.pop_front() {
            if let Err(e) = send(&entry) {
                tracing::warn!(
                    "Outbox replay to {} failed ({}), {} entries kept",
                    entry.destination,
                    e,
                    self.entries.len() + 1
                );
                self.entries.push_front(entry);
                break;
            }
            sent += 1;
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboxEntry> {
        self.entries.iter()
    }
}
