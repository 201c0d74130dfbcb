//! Request/response envelopes.

use serde::{Deserialize, Serialize};

use crate::{AuthToken, Command, ProtocolError, Reply};

/// Client request: a command plus the caller's credentials.
///
/// `auth` is `None` for anonymous callers. The token is opaque to the
/// protocol; the server's identity provider turns it into an `Identity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Caller credentials.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth: Option<AuthToken>,
    /// Command to execute.
    pub command: Command,
}

impl Request {
    /// Anonymous request.
    pub fn anonymous(command: Command) -> Self {
        Self { auth: None, command }
    }

    /// Request carrying credentials.
    pub fn authenticated(auth: AuthToken, command: Command) -> Self {
        Self { auth: Some(auth), command }
    }
}

/// Server response: either a reply or a tagged protocol error.
pub type Response = Result<Reply, ProtocolError>;
