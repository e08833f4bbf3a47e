use super::topic::TopicKey;
use parking_lot::Mutex;
use std::fmt;

type Release = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by the subscribe calls.
///
/// Dropping it does not unsubscribe; call [`unsubscribe`](Self::unsubscribe),
/// which is synchronous and safe to call more than once.
#[must_use = "keep the Subscription to be able to unsubscribe later"]
pub struct Subscription {
    topic: Option<TopicKey>,
    release: Mutex<Option<Release>>,
}

impl Subscription {
    pub(crate) fn new<F>(topic: TopicKey, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            topic: Some(topic),
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A handle that was never registered (e.g. invalid id)
    pub fn inert() -> Self {
        Self {
            topic: None,
            release: Mutex::new(None),
        }
    }

    pub fn topic(&self) -> Option<TopicKey> {
        self.topic
    }

    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("released", &self.release.lock().is_none())
            .finish()
    }
}
