//! Application handle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle to a registered application.
///
/// Returned by `LookupApp`/`RegisterApp` and used by joined clients in place
/// of the human-chosen `app_id`. Handles are minted randomly by the server,
/// so re-registering a deleted `app_id` yields a different handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[u8; 16]", into = "[u8; 16]")]
pub struct AppKey(u128);

impl AppKey {
    /// Wrap a raw 128-bit handle.
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw 128-bit value.
    pub const fn get(self) -> u128 {
        self.0
    }
}

impl From<[u8; 16]> for AppKey {
    fn from(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl From<AppKey> for [u8; 16] {
    fn from(key: AppKey) -> Self {
        key.0.to_be_bytes()
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppKey({:032x})", self.0)
    }
}
