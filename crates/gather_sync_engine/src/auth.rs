//! Auth credential interface.
//!
//! Token lifecycle (refresh, storage) belongs to the app's auth layer; the
//! engine only asks for the current token at the start of a pass. A missing
//! token short-circuits the pass as a guard failure, not a retryable error.

use parking_lot::RwLock;

/// Supplies the current auth credential.
pub trait TokenProvider: Send + Sync {
    /// Returns the current token, or `None` when unauthenticated.
    fn current_token(&self) -> Option<String>;
}

/// A token provider backed by a settable cell.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    /// Creates a provider holding the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Creates a provider with no token.
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Replaces the stored token.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Clears the stored token.
    pub fn clear_token(&self) {
        *self.token.write() = None;
    }
}

impl TokenProvider for StaticTokenProvider {
    fn current_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifecycle() {
        let provider = StaticTokenProvider::unauthenticated();
        assert!(provider.current_token().is_none());

        provider.set_token("bearer-abc");
        assert_eq!(provider.current_token().as_deref(), Some("bearer-abc"));

        provider.clear_token();
        assert!(provider.current_token().is_none());
    }
}
