//! AppState wire protocol.
//!
//! Types shared by the server and every client instance: the permission
//! modes an application is registered with, caller identities, the opaque
//! application handle, the content hash used as an optimistic-concurrency
//! version stamp, and the request/response envelopes that travel over the
//! channel.
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────────┬─────────────────────────────────────┐
//! │ length (u32) │ CBOR payload (Request or Response)  │
//! │  big-endian  │                                     │
//! └──────────────┴─────────────────────────────────────┘
//! ```
//!
//! Outcomes are tagged values ([`Reply`] or [`ProtocolError`]), never
//! sentinel strings, so callers can branch on `KeyNotFound` vs
//! `PermissionDenied` vs `VersionMismatch` directly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod app;
mod command;
mod envelope;
mod error;
pub mod frame;
mod hash;
mod identity;
mod mode;

pub use app::AppKey;
pub use command::{CacheStats, Command, Reply};
pub use envelope::{Request, Response};
pub use error::{Access, MemberList, ProtocolError};
pub use frame::{DEFAULT_MAX_FRAME_SIZE, FrameError, LENGTH_PREFIX_SIZE};
pub use hash::{ContentHash, HASH_SIZE};
pub use identity::{AuthToken, Identity};
pub use mode::{AccessMode, ParseModeError};

/// Protocol version reported by the `Version` command.
pub const PROTOCOL_VERSION: &str = "appstate/1";
