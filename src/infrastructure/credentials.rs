use parking_lot::RwLock;
use std::sync::Arc;

/// Source of the bearer token attached to CONNECT, SEND and REST calls.
///
/// Queried at the moment of every connect attempt and publish, never cached,
/// so a rotated token takes effect without reconnecting.
pub trait CredentialProvider: Send + Sync + 'static {
    fn access_token(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// Anonymous access
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn access_token(&self) -> Option<String> {
        None
    }
}

/// Shared, rotatable token holder (the auth state of the embedding app)
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl CredentialProvider for TokenStore {
    fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_store_rotation_is_visible_through_clones() {
        let store = TokenStore::new(Some("old".to_string()));
        let provider: Arc<dyn CredentialProvider> = Arc::new(store.clone());
        assert_eq!(provider.access_token().as_deref(), Some("old"));

        store.set("new");
        assert_eq!(provider.access_token().as_deref(), Some("new"));

        store.clear();
        assert_eq!(provider.access_token(), None);
    }

    #[test]
    fn test_closure_provider() {
        let provider = || Some("abc".to_string());
        assert_eq!(provider.access_token().as_deref(), Some("abc"));
        assert_eq!(NoCredentials.access_token(), None);
    }
}
