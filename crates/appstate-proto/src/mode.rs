//! Permission modes.

use std::{fmt, str::FromStr};

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Who may perform an operation on an application's state.
///
/// Fixed for the lifetime of an application: both the read and the write
/// mode are chosen at registration and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum AccessMode {
    /// Anyone, including anonymous callers.
    Any = 0,
    /// Only the identity that registered the application.
    AdminOnly = 1,
    /// Only users the admin has explicitly authorized.
    AuthorizedOnly = 2,
    /// Any authenticated user the admin has not banned.
    UnbannedOnly = 3,
}

impl AccessMode {
    /// All modes, in wire order.
    pub const ALL: [Self; 4] = [Self::Any, Self::AdminOnly, Self::AuthorizedOnly, Self::UnbannedOnly];

    /// Canonical upper-case name (`ANY`, `ADMIN_ONLY`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::AdminOnly => "ADMIN_ONLY",
            Self::AuthorizedOnly => "AUTHORIZED_ONLY",
            Self::UnbannedOnly => "UNBANNED_ONLY",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for AccessMode {
    type Error = ParseModeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|mode| *mode as u8 == value)
            .ok_or_else(|| ParseModeError(value.to_string()))
    }
}

/// Accepts either the canonical name (case-insensitive, `-` or `_`) or the
/// numeric wire value.
impl FromStr for AccessMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u8>() {
            return Self::try_from(n);
        }

        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| ParseModeError(s.to_string()))
    }
}

/// Unrecognized access mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown access mode: {0}")]
pub struct ParseModeError(pub String);
