//! Authentication collaborator
//!
//! Credential issuance and verification are external; the relay only
//! consumes an opaque `authenticate(token) -> Identity | failure` capability
//! to attach a verified user id to a participant. The core works fully
//! anonymously when no authenticator is wired in.

use std::collections::HashMap;

use crate::error::{RelayError, Result};

/// Verified identity attached to a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id from the credential backend
    pub user_id: String,
}

/// Opaque token verification capability
pub trait Authenticator: Send + Sync {
    /// Verify a credential token
    fn authenticate(&self, token: &str) -> Result<Identity>;
}

/// Fixed token table, for tests and single-process deployments
pub struct StaticAuthenticator {
    tokens: HashMap<String, Identity>,
}

impl StaticAuthenticator {
    pub fn new(tokens: HashMap<String, Identity>) -> Self {
        Self { tokens }
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, token: &str) -> Result<Identity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| RelayError::auth("Invalid credential token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> StaticAuthenticator {
        let mut tokens = HashMap::new();
        tokens.insert(
            "tok-alice".to_string(),
            Identity {
                user_id: "user-1".to_string(),
            },
        );
        StaticAuthenticator::new(tokens)
    }

    #[test]
    fn test_valid_token() {
        let auth = authenticator();
        let identity = auth.authenticate("tok-alice").unwrap();
        assert_eq!(identity.user_id, "user-1");
    }

    #[test]
    fn test_invalid_token() {
        let auth = authenticator();
        let err = auth.authenticate("nope").unwrap_err();
        assert_eq!(err.code(), "AUTH_FAILED");
    }
}
