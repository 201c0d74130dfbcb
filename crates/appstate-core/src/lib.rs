//! AppState core protocol logic.
//!
//! Server-side handlers for the shared-state protocol, independent of any
//! transport:
//!
//! ```text
//! Request
//!   └─ Dispatcher          (identity resolution, routing)
//!        ├─ AccessControl  (permission gate, LRU decision cache)
//!        ├─ ApplicationRegistry
//!        └─ StateStore     (get / getIfChanged / set / delete / update)
//!             └─ Store     (applications, membership, entries, CAS)
//! ```
//!
//! Time and randomness come from an [`Environment`], so the same handlers
//! run under the production runtime ([`SystemEnv`]) and under deterministic
//! simulation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod access;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod env;
pub mod identity;
pub mod registry;
pub mod state;
pub mod storage;
mod system_env;
pub mod wire;

pub use access::AccessControl;
pub use codec::{CborCodec, Codec, CodecError};
pub use config::{CoreConfig, DEFAULT_MAX_VALUE_SIZE, DEFAULT_PERMISSION_CACHE_CAPACITY};
pub use dispatcher::Dispatcher;
pub use env::Environment;
pub use identity::{IdentityProvider, StaticIdentityProvider};
pub use registry::ApplicationRegistry;
pub use state::StateStore;
pub use storage::{
    Application, CasOutcome, InsertOutcome, MemoryStore, StorageError, Store, StoredEntry,
};
pub use system_env::SystemEnv;
pub use wire::{WireError, read_frame, write_frame};
