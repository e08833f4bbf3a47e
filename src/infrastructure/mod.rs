// Infrastructure module - Core background services and utilities
pub mod backoff;
pub mod credentials;
pub mod dedup;
pub mod heartbeat;
pub mod http;
pub mod outbox;
pub mod task_manager;

pub use backoff::{BackoffConfig, BackoffController};
pub use credentials::{CredentialProvider, NoCredentials, TokenStore};
pub use dedup::DedupFilter;
pub use heartbeat::{HeartbeatManager, HeartbeatPlan};
pub use http::{ChatApi, MessagePage, MessageView, Participant, RoomRole, RoomSummary, ws_endpoint_from_api_base};
pub use outbox::{Delivery, Outbox, OutboxEntry};
pub use task_manager::TaskManager;
