use super::builder::ChatClientOptions;
use super::connection::{ConnectionManager, ConnectionState};
use crate::infrastructure::{BackoffController, DedupFilter, Outbox, TaskManager};
use crate::subscription::SubscriptionRegistry;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Consolidated mutable state for ChatClient.
///
/// Guarded by one synchronous mutex that is never held across an await or
/// while user handlers run.
pub struct ClientState {
    pub status: ConnectionState,

    /// Writer of the current session
    pub connection: ConnectionManager,

    pub registry: SubscriptionRegistry,
    pub outbox: Outbox,
    pub dedup: DedupFilter,
    pub backoff: BackoffController,

    /// Callers of `connect` waiting for the next CONNECTED
    pub waiters: Vec<oneshot::Sender<()>>,

    /// Per-session background tasks (heart-beat)
    pub task_manager: TaskManager,

    /// Reconnect loop; spawned on the first connect
    pub supervisor: Option<JoinHandle<()>>,

    pub shut_down: bool,

    state_change_tx: watch::Sender<ConnectionState>,
}

impl ClientState {
    pub fn new(options: &ChatClientOptions) -> Self {
        let (state_change_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            status: ConnectionState::Disconnected,
            connection: ConnectionManager::new(),
            registry: SubscriptionRegistry::new(),
            outbox: Outbox::new(options.outbox_capacity),
            dedup: DedupFilter::new(options.dedup_ttl, options.dedup_capacity),
            backoff: BackoffController::new(options.backoff),
            waiters: Vec::new(),
            task_manager: TaskManager::new(),
            supervisor: None,
            shut_down: false,
            state_change_tx,
        }
    }

    /// Set connection state and notify watchers
    pub fn set_status(&mut self, status: ConnectionState) {
        if self.status == status {
            return;
        }
        tracing::debug!("Connection state {:?} -> {:?}", self.status, status);
        self.status = status;
        self.state_change_tx.send_replace(status);
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionState::Connected
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.state_change_tx.subscribe()
    }

    /// Resolves every pending `connect` caller
    pub fn release_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
