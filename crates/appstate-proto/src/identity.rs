//! Caller identities and credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resolved identity of a caller.
///
/// Equality is the only operation the protocol relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identity {
    /// Caller presented no credentials.
    Anonymous,
    /// Authenticated user.
    User(String),
}

impl Identity {
    /// Authenticated user with the given name.
    pub fn user(name: impl Into<String>) -> Self {
        Self::User(name.into())
    }

    /// Whether the caller presented valid credentials.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("<anonymous>"),
            Self::User(name) => f.write_str(name),
        }
    }
}

/// Opaque credential attached to a request.
///
/// # Security
///
/// - **Debug Redaction**: The `Debug` impl never prints the token, so
///   request envelopes can be logged safely.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for identity providers only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(<redacted {} bytes>)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_is_not_authenticated() {
        assert!(!Identity::Anonymous.is_authenticated());
        assert!(Identity::user("U1").is_authenticated());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::new("hunter2");
        let debug = format!("{token:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted 7 bytes"));
    }
}
