//! Operations for model-based testing.
//!
//! Operations represent every command a caller can issue. They are generated
//! randomly by proptest and applied to both the model and the real
//! dispatcher. Identifier spaces are tiny on purpose so that sequences hit
//! duplicates, stale hashes, and deleted applications often.

use appstate_proto::{AccessMode, ProtocolError};
use arbitrary::Arbitrary;

/// Caller index. Values at or beyond the user count act anonymously.
pub type Caller = u8;

/// Application slot (mapped to `app-{n}`).
pub type AppSlot = u8;

/// Key slot (mapped to `key-{n}`).
pub type KeySlot = u8;

/// Number of distinct application slots.
pub const APP_SLOTS: u8 = 3;

/// Number of distinct key slots.
pub const KEY_SLOTS: u8 = 3;

/// Access mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct ModelMode(pub u8);

impl ModelMode {
    /// Mode this selector stands for.
    pub fn mode(self) -> AccessMode {
        AccessMode::ALL[usize::from(self.0) % AccessMode::ALL.len()]
    }
}

/// Value from a small space, so equal values (and matching hashes) recur.
///
/// Classes 0..=4 are `n` bytes of `n`; class 5 is one byte over the model's
/// size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallValue(pub u8);

impl SmallValue {
    /// Expand to stored bytes.
    pub fn to_bytes(self) -> Vec<u8> {
        match self.0 % 6 {
            5 => vec![5; super::MODEL_MAX_VALUE_SIZE + 1],
            n => vec![n; usize::from(n)],
        }
    }
}

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Register an application.
    Register {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Read mode
        read_mode: ModelMode,
        /// Write mode
        write_mode: ModelMode,
    },

    /// Delete an application.
    DeleteApp {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
    },

    /// Add to the authorized list.
    Authorize {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Target user index
        target: u8,
    },

    /// Remove from the authorized list.
    Unauthorize {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Target user index
        target: u8,
    },

    /// Add to the banned list.
    Ban {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Target user index
        target: u8,
    },

    /// Remove from the banned list.
    Unban {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Target user index
        target: u8,
    },

    /// Read a value.
    Get {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Key slot
        key: KeySlot,
    },

    /// Read a value unless it equals `known`.
    GetIfChanged {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Key slot
        key: KeySlot,
        /// Value whose hash is sent as the caller's copy
        known: SmallValue,
    },

    /// Unconditional write.
    Set {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Key slot
        key: KeySlot,
        /// New value
        value: SmallValue,
    },

    /// Remove a value.
    Delete {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Key slot
        key: KeySlot,
    },

    /// Compare-and-swap.
    Update {
        /// Caller
        caller: Caller,
        /// Application slot
        app: AppSlot,
        /// Key slot
        key: KeySlot,
        /// Value whose hash is sent as the expected version
        expected: SmallValue,
        /// Replacement value
        value: SmallValue,
    },
}

impl Operation {
    /// Application slot the operation targets, reduced to the slot range.
    pub fn app(&self) -> AppSlot {
        let app = match self {
            Self::Register { app, .. }
            | Self::DeleteApp { app, .. }
            | Self::Authorize { app, .. }
            | Self::Unauthorize { app, .. }
            | Self::Ban { app, .. }
            | Self::Unban { app, .. }
            | Self::Get { app, .. }
            | Self::GetIfChanged { app, .. }
            | Self::Set { app, .. }
            | Self::Delete { app, .. }
            | Self::Update { app, .. } => *app,
        };
        app % APP_SLOTS
    }

    /// Caller index.
    pub fn caller(&self) -> Caller {
        match self {
            Self::Register { caller, .. }
            | Self::DeleteApp { caller, .. }
            | Self::Authorize { caller, .. }
            | Self::Unauthorize { caller, .. }
            | Self::Ban { caller, .. }
            | Self::Unban { caller, .. }
            | Self::Get { caller, .. }
            | Self::GetIfChanged { caller, .. }
            | Self::Set { caller, .. }
            | Self::Delete { caller, .. }
            | Self::Update { caller, .. } => *caller,
        }
    }
}

/// Name of an application slot.
pub fn app_name(slot: AppSlot) -> String {
    format!("app-{}", slot % APP_SLOTS)
}

/// Name of a key slot.
pub fn key_name(slot: KeySlot) -> String {
    format!("key-{}", slot % KEY_SLOTS)
}

/// Result of applying an operation.
///
/// Used to compare model and real system behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded with nothing to return.
    Ok,

    /// Read returned a value.
    Value(Vec<u8>),

    /// Conditional read matched.
    Unchanged,

    /// Operation failed.
    Error(OperationError),
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

/// Error kinds, without payloads that depend on random handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Application does not exist.
    UnknownApplication,
    /// `app_id` already registered.
    DuplicateApplication,
    /// Access check failed.
    PermissionDenied,
    /// No value under the key.
    KeyNotFound,
    /// Compare-and-swap lost.
    VersionMismatch,
    /// Value over the limit.
    SizeLimitExceeded,
    /// Already on the list.
    DuplicateMembership,
    /// Not on the list.
    NotAMember,
    /// Caller must be authenticated.
    AuthenticationFailure,
    /// Server fault.
    Internal,
}

impl From<&ProtocolError> for OperationError {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownApplication { .. } => Self::UnknownApplication,
            ProtocolError::DuplicateApplication { .. } => Self::DuplicateApplication,
            ProtocolError::PermissionDenied { .. } => Self::PermissionDenied,
            ProtocolError::KeyNotFound { .. } => Self::KeyNotFound,
            ProtocolError::VersionMismatch { .. } => Self::VersionMismatch,
            ProtocolError::SizeLimitExceeded { .. } => Self::SizeLimitExceeded,
            ProtocolError::DuplicateMembership { .. } => Self::DuplicateMembership,
            ProtocolError::NotAMember { .. } => Self::NotAMember,
            ProtocolError::AuthenticationFailure => Self::AuthenticationFailure,
            ProtocolError::Internal { .. } => Self::Internal,
        }
    }
}
