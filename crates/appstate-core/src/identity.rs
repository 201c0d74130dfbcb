//! Caller authentication.

use std::collections::HashMap;

use appstate_proto::{AuthToken, Identity, ProtocolError};

/// Turns request credentials into a caller identity.
pub trait IdentityProvider: Send + Sync {
    /// Resolve credentials.
    ///
    /// No credentials resolve to [`Identity::Anonymous`]; credentials that
    /// are presented but not recognized fail with
    /// [`ProtocolError::AuthenticationFailure`].
    fn resolve(&self, token: Option<&AuthToken>) -> Result<Identity, ProtocolError>;
}

/// Identity provider backed by a fixed token table.
#[derive(Default)]
pub struct StaticIdentityProvider {
    users: HashMap<String, String>,
}

impl StaticIdentityProvider {
    /// Empty table: every caller is anonymous or rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as authenticating `user`.
    #[must_use]
    pub fn with_user(mut self, token: impl Into<String>, user: impl Into<String>) -> Self {
        self.users.insert(token.into(), user.into());
        self
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no tokens are known.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl<T, U> FromIterator<(T, U)> for StaticIdentityProvider
where
    T: Into<String>,
    U: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (T, U)>>(iter: I) -> Self {
        Self { users: iter.into_iter().map(|(t, u)| (t.into(), u.into())).collect() }
    }
}

impl std::fmt::Debug for StaticIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticIdentityProvider").field("users", &self.users.len()).finish()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(&self, token: Option<&AuthToken>) -> Result<Identity, ProtocolError> {
        match token {
            None => Ok(Identity::Anonymous),
            Some(token) => self
                .users
                .get(token.expose())
                .map(|user| Identity::User(user.clone()))
                .ok_or(ProtocolError::AuthenticationFailure),
        }
    }
}
