use super::{ChatClient, ClientState, ConnectionState};
use crate::infrastructure::{HeartbeatManager, HeartbeatPlan};
use crate::messaging::{Command, Frame, Inbound, MessageRouter, frame};
use crate::types::constants::stomp_headers;
use crate::types::{ChatError, Result};
use crate::websocket::TransportLink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

/// A transport that completed the STOMP handshake
struct Session {
    link: TransportLink,
    plan: HeartbeatPlan,
}

impl ChatClient {
    /// DISCONNECTED -> CONNECTING; starts the reconnect loop on first use,
    /// otherwise cuts its backoff sleep short
    pub(crate) fn begin_connect(&self, state: &mut ClientState) {
        state.set_status(ConnectionState::Connecting);
        if state.supervisor.is_some() {
            self.wake.notify_one();
            return;
        }
        let client = self.clone();
        state.supervisor = Some(tokio::spawn(client.run_supervisor()));
    }

    /// Connection lifecycle loop: attempt, serve the session until it drops,
    /// back off, repeat. Runs until shutdown.
    async fn run_supervisor(self) {
        loop {
            {
                let mut state = self.state.lock();
                if state.shut_down {
                    return;
                }
                state.set_status(ConnectionState::Connecting);
            }

            match self.open_session().await {
                Ok(session) => self.run_session(session).await,
                Err(e) => tracing::error!("Connection attempt failed: {}", e),
            }

            let Some(delay) = self.on_transport_down() else {
                return;
            };
            tracing::info!("Reconnecting in {}ms", delay.as_millis());
            self.backoff_sleep(delay).await;
        }
    }

    async fn open_session(&self) -> Result<Session> {
        let token = self.credentials.access_token();
        let heartbeat_ms = self.options.heartbeat_interval.as_millis() as u64;
        let offer = (heartbeat_ms, heartbeat_ms);
        tracing::info!("Connecting to {}", self.endpoint);

        let handshake = async {
            let mut link = self.connector.connect(&self.endpoint).await?;
            let connect = Frame::connect(&self.host, offer, token.as_deref());
            link.outbound.send(connect.encode()).map_err(|_| {
                ChatError::Connection("transport closed before CONNECT".to_string())
            })?;
            let connected = await_connected(&mut link.inbound).await?;
            Ok::<_, ChatError>((link, connected))
        };
        let (link, connected) = time::timeout(self.options.connect_timeout, handshake)
            .await
            .map_err(|_| ChatError::Timeout)??;

        let plan = HeartbeatPlan::negotiate(offer, connected.header(stomp_headers::HEART_BEAT));
        tracing::debug!(
            "STOMP session established (version {}, heart-beat out {:?} in {:?})",
            connected.header(stomp_headers::VERSION).unwrap_or("1.0"),
            plan.outgoing,
            plan.incoming
        );
        Ok(Session { link, plan })
    }

    async fn run_session(&self, session: Session) {
        let Session { link, plan } = session;
        let TransportLink {
            outbound,
            mut inbound,
        } = link;
        let token = self.credentials.access_token();

        {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            if !plan.outgoing.is_zero() {
                let heartbeat = HeartbeatManager::new(outbound.clone(), plan.outgoing).spawn();
                state.task_manager.track("heartbeat", heartbeat);
            }
            on_connected(&mut state, outbound, token.as_deref());
        }
        tracing::info!("Connected to {}", self.endpoint);

        let router = MessageRouter::new_with_state(Arc::clone(&self.state));
        let read_deadline = plan.read_deadline();

        'read: loop {
            let next = match read_deadline {
                Some(deadline) => match time::timeout(deadline, inbound.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(
                            "No data from server for {}ms, dropping connection",
                            deadline.as_millis()
                        );
                        break;
                    }
                },
                None => inbound.recv().await,
            };
            let Some(text) = next else {
                tracing::info!("Connection closed");
                break;
            };

            let items = match frame::decode(&text) {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("Dropping undecodable data: {}", e);
                    continue;
                }
            };
            for item in items {
                match item {
                    Inbound::Heartbeat => tracing::trace!("Received heartbeat"),
                    Inbound::Frame(frame) => {
                        if let Err(e) = router.route(frame) {
                            tracing::warn!("{}", e);
                            break 'read;
                        }
                    }
                }
            }
        }
    }

    /// Close/error handling. Returns the delay before the next attempt, or
    /// `None` once shut down.
    fn on_transport_down(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        state.connection.detach();
        state.task_manager.abort_all();
        state.registry.detach_all();
        state.set_status(ConnectionState::Disconnected);
        if state.shut_down {
            return None;
        }
        let delay = state.backoff.current_delay();
        state.backoff.on_failure();
        Some(delay)
    }

    /// Sleeps out `delay` unless `connect`/`resume` asks for an immediate attempt
    async fn backoff_sleep(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => return,
                _ = self.wake.notified() => {
                    // a permit left over from an earlier attempt is ignored
                    if self.state.lock().status == ConnectionState::Connecting {
                        tracing::debug!("Reconnect requested before backoff elapsed");
                        return;
                    }
                }
            }
        }
    }
}

/// Handshake success: the order matters (resubscribe, then replay, then
/// wake callers)
fn on_connected(state: &mut ClientState, writer: mpsc::UnboundedSender<String>, token: Option<&str>) {
    state.connection.attach(writer);
    state.set_status(ConnectionState::Connected);
    state.backoff.on_success();

    for frame in state.registry.resubscribe_all() {
        if let Err(e) = state.connection.send_frame(&frame) {
            tracing::warn!("Resubscribe not sent: {}", e);
        }
    }

    let ClientState {
        outbox, connection, ..
    } = &mut *state;
    let replayed = outbox.drain(|entry| connection.publish(entry, token));
    if replayed > 0 {
        tracing::info!("Replayed {} queued publish(es)", replayed);
    }

    state.release_waiters();
}

async fn await_connected(inbound: &mut mpsc::UnboundedReceiver<String>) -> Result<Frame> {
    while let Some(text) = inbound.recv().await {
        for item in frame::decode(&text)? {
            let Inbound::Frame(frame) = item else {
                continue;
            };
            match frame.command {
                Command::Connected => return Ok(frame),
                Command::Error => {
                    let reason = frame
                        .header(stomp_headers::MESSAGE)
                        .unwrap_or(&frame.body)
                        .to_string();
                    return Err(ChatError::Handshake(reason));
                }
                other => tracing::warn!("Ignoring {} frame before CONNECTED", other),
            }
        }
    }
    Err(ChatError::Connection(
        "transport closed during handshake".to_string(),
    ))
}
