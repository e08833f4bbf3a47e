// Subscription module - topic registry and caller handles
mod handle;
mod registry;
mod topic;

pub use handle::Subscription;
pub use registry::{Route, SubscriptionRegistry};
pub use topic::{Handler, HandlerId, TopicEntry, TopicKey};
