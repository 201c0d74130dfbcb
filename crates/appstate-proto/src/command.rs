//! Protocol commands and successful replies.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{AccessMode, AppKey, ContentHash};

/// A single protocol command.
///
/// Data commands address state by `(app, key)`; `app` is the handle obtained
/// from `LookupApp` or `RegisterApp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Report the server's protocol version.
    Version,

    /// Register a new application with the caller as admin.
    RegisterApp {
        /// Unique human-chosen name.
        app_id: String,
        /// Who may read state.
        read_mode: AccessMode,
        /// Who may write state.
        write_mode: AccessMode,
    },

    /// Delete an application and everything it owns. Admin only.
    DeleteApp {
        /// Application handle.
        app: AppKey,
    },

    /// Resolve an `app_id` to its handle.
    LookupApp {
        /// Name to resolve.
        app_id: String,
    },

    /// Add a user to the authorized list. Admin only.
    Authorize {
        /// Application handle.
        app: AppKey,
        /// Target user.
        user: String,
    },

    /// Remove a user from the authorized list. Admin only.
    Unauthorize {
        /// Application handle.
        app: AppKey,
        /// Target user.
        user: String,
    },

    /// Add a user to the banned list. Admin only.
    Ban {
        /// Application handle.
        app: AppKey,
        /// Target user.
        user: String,
    },

    /// Remove a user from the banned list. Admin only.
    Unban {
        /// Application handle.
        app: AppKey,
        /// Target user.
        user: String,
    },

    /// Read a value.
    Get {
        /// Application handle.
        app: AppKey,
        /// State key.
        key: String,
    },

    /// Read a value unless its content hash equals `known`.
    GetIfChanged {
        /// Application handle.
        app: AppKey,
        /// State key.
        key: String,
        /// Hash of the value the caller already holds.
        known: ContentHash,
    },

    /// Unconditionally create or overwrite a value.
    Set {
        /// Application handle.
        app: AppKey,
        /// State key.
        key: String,
        /// Serialized value.
        value: Bytes,
    },

    /// Remove a value.
    Delete {
        /// Application handle.
        app: AppKey,
        /// State key.
        key: String,
    },

    /// Compare-and-swap: replace the value iff its hash equals `expected`.
    Update {
        /// Application handle.
        app: AppKey,
        /// State key.
        key: String,
        /// Hash of the value the caller read.
        expected: ContentHash,
        /// Serialized replacement value.
        value: Bytes,
    },

    /// Permission cache statistics.
    Stats,
}

impl Command {
    /// Command name as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::RegisterApp { .. } => "registerApp",
            Self::DeleteApp { .. } => "deleteApp",
            Self::LookupApp { .. } => "lookupApp",
            Self::Authorize { .. } => "authorize",
            Self::Unauthorize { .. } => "unauthorize",
            Self::Ban { .. } => "ban",
            Self::Unban { .. } => "unban",
            Self::Get { .. } => "get",
            Self::GetIfChanged { .. } => "getIfChanged",
            Self::Set { .. } => "set",
            Self::Delete { .. } => "delete",
            Self::Update { .. } => "update",
            Self::Stats => "stats",
        }
    }

    /// Application the command targets, if it addresses one by handle.
    pub fn app(&self) -> Option<AppKey> {
        match self {
            Self::DeleteApp { app }
            | Self::Authorize { app, .. }
            | Self::Unauthorize { app, .. }
            | Self::Ban { app, .. }
            | Self::Unban { app, .. }
            | Self::Get { app, .. }
            | Self::GetIfChanged { app, .. }
            | Self::Set { app, .. }
            | Self::Delete { app, .. }
            | Self::Update { app, .. } => Some(*app),
            Self::Version | Self::RegisterApp { .. } | Self::LookupApp { .. } | Self::Stats => {
                None
            },
        }
    }
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Command completed with nothing to return.
    Ok,
    /// Server protocol version.
    Version(String),
    /// Resolved or newly registered application handle.
    AppKey(AppKey),
    /// Stored value.
    Value(Bytes),
    /// `GetIfChanged` matched the caller's hash; no payload.
    Unchanged,
    /// Permission cache statistics.
    Stats(CacheStats),
}

/// Permission decision cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Decisions served from the cache.
    pub hits: u64,
    /// Decisions computed from membership state.
    pub misses: u64,
    /// Entries currently cached.
    pub entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names() {
        let app = AppKey::new(1);
        assert_eq!(Command::Version.name(), "version");
        assert_eq!(
            Command::GetIfChanged { app, key: "k".into(), known: ContentHash::of(b"") }.name(),
            "getIfChanged"
        );
    }

    #[test]
    fn command_app_handle() {
        let app = AppKey::new(7);
        assert_eq!(Command::Delete { app, key: "k".into() }.app(), Some(app));
        assert_eq!(Command::LookupApp { app_id: "demo".into() }.app(), None);
    }

    #[test]
    fn update_command_serde() {
        let command = Command::Update {
            app: AppKey::new(0xdead_beef),
            key: "score".into(),
            expected: ContentHash::of(b"10"),
            value: Bytes::from_static(b"11"),
        };

        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&command, &mut bytes).expect("encode");
        let decoded: Command = ciborium::de::from_reader(&bytes[..]).expect("decode");

        assert_eq!(decoded, command);
    }
}
