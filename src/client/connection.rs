use crate::infrastructure::OutboxEntry;
use crate::messaging::Frame;
use crate::types::constants::stomp_headers;
use crate::types::{ChatError, Result};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Holds the writer of the current STOMP session.
///
/// Writes are synchronous channel sends; the transport's writer task owns
/// the socket. A send only fails once that task has gone away.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    writer: Option<mpsc::UnboundedSender<String>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self { writer: None }
    }

    /// Installs the writer of a freshly negotiated session
    pub fn attach(&mut self, writer: mpsc::UnboundedSender<String>) {
        self.writer = Some(writer);
    }

    /// Drops the writer; once every clone is gone the socket closes
    pub fn detach(&mut self) {
        self.writer = None;
    }

    pub fn is_attached(&self) -> bool {
        self.writer.as_ref().is_some_and(|w| !w.is_closed())
    }

    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        let writer = self.writer.as_ref().ok_or(ChatError::NotConnected)?;
        writer
            .send(frame.encode())
            .map_err(|_| ChatError::Connection(format!("transport closed, {} not sent", frame.command)))?;
        tracing::trace!("Sent {} frame", frame.command);
        Ok(())
    }

    /// Sends a publish with the caller's current bearer token
    pub fn publish(&self, entry: &OutboxEntry, token: Option<&str>) -> Result<()> {
        self.send_frame(&publish_frame(entry, token))
    }
}

/// Builds the SEND for an outbox entry with the bearer token current at
/// send time; any `Authorization` stored on the entry is replaced.
pub fn publish_frame(entry: &OutboxEntry, token: Option<&str>) -> Frame {
    let headers: Vec<(String, String)> = entry
        .headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(stomp_headers::AUTHORIZATION))
        .cloned()
        .collect();
    Frame::send(&entry.destination, &headers, entry.payload.clone()).with_bearer(token)
}
