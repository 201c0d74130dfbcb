//! Protocol outcome errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of access a permission check guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    /// Reading state values.
    Read,
    /// Writing or deleting state values.
    Write,
    /// Deleting the application or managing its membership lists.
    Administer,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Administer => "administer",
        })
    }
}

/// Per-application membership list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberList {
    /// Users consulted by `AUTHORIZED_ONLY`.
    Authorized,
    /// Users consulted by `UNBANNED_ONLY`.
    Banned,
}

impl fmt::Display for MemberList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authorized => "authorized",
            Self::Banned => "banned",
        })
    }
}

/// Failure outcome of a protocol command.
///
/// Every kind is distinct and inspectable; only [`Self::VersionMismatch`] is
/// ever recovered automatically (by the client's `apply_op` loop).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ProtocolError {
    /// No application with this id or handle.
    #[error("unknown application: {app}")]
    UnknownApplication {
        /// The `app_id` or handle that failed to resolve.
        app: String,
    },

    /// `app_id` is already registered.
    #[error("application already exists: {app_id}")]
    DuplicateApplication {
        /// The conflicting `app_id`.
        app_id: String,
    },

    /// Caller is not allowed to perform the operation.
    #[error("permission denied: cannot {access}")]
    PermissionDenied {
        /// What the caller tried to do.
        access: Access,
    },

    /// No value is stored under the key.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// Stored value's content hash differs from the expected one.
    #[error("version mismatch on key {key}")]
    VersionMismatch {
        /// The contended key.
        key: String,
    },

    /// Serialized value exceeds the configured per-entry limit.
    #[error("value too large: {size} bytes exceeds limit of {limit}")]
    SizeLimitExceeded {
        /// Size of the rejected value.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// User is already on the list.
    #[error("{user} is already {list}")]
    DuplicateMembership {
        /// Target user.
        user: String,
        /// List that was mutated.
        list: MemberList,
    },

    /// User is not on the list.
    #[error("{user} is not {list}")]
    NotAMember {
        /// Target user.
        user: String,
        /// List that was mutated.
        list: MemberList,
    },

    /// Credentials were rejected, or the operation needs an authenticated
    /// caller and none was presented.
    #[error("authentication failure")]
    AuthenticationFailure,

    /// Server-side fault (storage unavailable, poisoned lock).
    #[error("internal server error: {reason}")]
    Internal {
        /// Description for logs.
        reason: String,
    },
}

impl ProtocolError {
    /// Returns true if re-reading and retrying can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_version_mismatch_is_retryable() {
        assert!(ProtocolError::VersionMismatch { key: "k".into() }.is_retryable());
        assert!(!ProtocolError::KeyNotFound { key: "k".into() }.is_retryable());
        assert!(!ProtocolError::PermissionDenied { access: Access::Write }.is_retryable());
        assert!(!ProtocolError::SizeLimitExceeded { size: 2, limit: 1 }.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ProtocolError::SizeLimitExceeded { size: 32_001, limit: 32_000 };
        assert_eq!(err.to_string(), "value too large: 32001 bytes exceeds limit of 32000");

        let err = ProtocolError::NotAMember { user: "U2".into(), list: MemberList::Banned };
        assert_eq!(err.to_string(), "U2 is not banned");
    }
}
