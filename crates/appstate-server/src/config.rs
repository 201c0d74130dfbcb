//! Server configuration.

use appstate_core::{CoreConfig, StaticIdentityProvider};
use appstate_proto::DEFAULT_MAX_FRAME_SIZE;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:4455";

/// Frame bytes reserved beyond the value limit for the request envelope
/// (token, command tag, app handle, key, hashes).
pub const ENVELOPE_HEADROOM: usize = 1024;

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `--user` value is not `TOKEN=NAME`.
    #[error("invalid user entry {0:?}: expected TOKEN=NAME")]
    InvalidUser(String),

    /// Frames could not carry a maximum-size value and its envelope.
    #[error(
        "max frame size {frame} cannot carry values of {value} bytes plus {} bytes of envelope",
        ENVELOPE_HEADROOM
    )]
    FrameTooSmall {
        /// Configured frame limit.
        frame: usize,
        /// Configured value limit.
        value: usize,
    },
}

/// A known user: bearer token and the identity it authenticates.
#[derive(Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Bearer token presented by the client.
    pub token: String,
    /// User name the token resolves to.
    pub name: String,
}

impl std::fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEntry").field("name", &self.name).finish_non_exhaustive()
    }
}

impl std::str::FromStr for UserEntry {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((token, name)) if !token.is_empty() && !name.is_empty() => {
                Ok(Self { token: token.to_string(), name: name.to_string() })
            },
            _ => Err(ConfigError::InvalidUser(s.to_string())),
        }
    }
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:4455")
    pub bind_address: String,
    /// Largest accepted request frame
    pub max_frame_size: usize,
    /// Protocol limits
    pub core: CoreConfig,
    /// Token table for the identity provider
    pub users: Vec<UserEntry>,
}

impl ServerConfig {
    /// Check that the limits are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A value travels inside a request envelope, so the frame needs room
        // for the value plus the command around it.
        if self.max_frame_size < self.core.max_value_size.saturating_add(ENVELOPE_HEADROOM) {
            return Err(ConfigError::FrameTooSmall {
                frame: self.max_frame_size,
                value: self.core.max_value_size,
            });
        }
        Ok(())
    }

    /// Identity provider for the configured token table.
    pub fn identity_provider(&self) -> StaticIdentityProvider {
        self.users.iter().map(|u| (u.token.clone(), u.name.clone())).collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            core: CoreConfig::default(),
            users: Vec::new(),
        }
    }
}
