use std::collections::HashMap;

/// External auth collaborator: maps a signed bearer credential to a user id
///
/// Token issuance and user registration live outside this crate; the sync
/// engine only ever asks "who is this credential?". Implementations must be
/// cheap to call per connection attempt.
pub trait Authenticator: Send + Sync {
    /// Resolve a credential to a user id, or `None` if it is invalid
    fn authenticate(&self, token: &str) -> Option<String>;
}

/// Fixed token-to-user mapping
///
/// Useful for tests and demos; real deployments plug in their own verifier.
#[derive(Default)]
pub struct StaticTokenAuth {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuth {
    /// Create an empty mapping (every credential is rejected)
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user_id`
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

impl Authenticator for StaticTokenAuth {
    fn authenticate(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_token_resolves() {
        let auth = StaticTokenAuth::new().with_token("t-1", "user-a");
        assert_eq!(auth.authenticate("t-1").as_deref(), Some("user-a"));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let auth = StaticTokenAuth::new().with_token("t-1", "user-a");
        assert_eq!(auth.authenticate("t-2"), None);
        assert_eq!(auth.authenticate(""), None);
    }
}
