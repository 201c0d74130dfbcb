//! AppState client.
//!
//! Session handling and the `apply_op` compare-and-swap loop on top of a
//! request/response [`Channel`]. The client is transport agnostic:
//! [`TcpChannel`] talks to a running server, and tests plug in an
//! in-process channel.
//!
//! ```text
//! StateClient ──Request──▶ Channel ──▶ server Dispatcher
//!             ◀─Response──
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod client;
mod config;
mod error;
mod retry;

pub use channel::{Channel, ChannelError, TcpChannel};
pub use client::{Fetched, Session, StateClient};
pub use config::ClientConfig;
pub use error::ClientError;
pub use retry::RetryPolicy;
