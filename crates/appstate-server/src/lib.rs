//! AppState production server.
//!
//! This crate provides the production server implementation using:
//! - Tokio TCP with length-prefixed CBOR frames
//! - An in-memory sharded store
//! - System time and cryptographic RNG
//!
//! ## Architecture
//!
//! ```text
//! appstate-server
//!   ├─ TcpTransport           (accept loop, one task per connection)
//!   └─ Dispatcher             (from appstate-core)
//!        ├─ AccessControl
//!        ├─ ApplicationRegistry
//!        └─ StateStore → MemoryStore
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod transport;

use std::sync::Arc;

use appstate_core::{Dispatcher, MemoryStore, SystemEnv};
pub use config::{ConfigError, DEFAULT_BIND_ADDRESS, ENVELOPE_HEADROOM, ServerConfig, UserEntry};
pub use error::ServerError;
pub use transport::{TcpTransport, handle_connection};

/// Production AppState server.
///
/// Wraps the core `Dispatcher` with a TCP listener and the system
/// environment.
pub struct Server {
    dispatcher: Arc<Dispatcher<MemoryStore, SystemEnv>>,
    transport: TcpTransport,
    max_frame_size: usize,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration is inconsistent
    /// - Binding to the address fails
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let identity = Arc::new(config.identity_provider());
        tracing::info!(users = identity.len(), "loaded identity table");

        let dispatcher = Dispatcher::new(
            Arc::new(MemoryStore::new()),
            config.core,
            identity,
            SystemEnv::new(),
        );
        let transport = TcpTransport::bind(&config.bind_address).await?;

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            transport,
            max_frame_size: config.max_frame_size,
        })
    }

    /// Run the server, accepting connections and serving requests.
    ///
    /// This method runs until the task is cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        loop {
            match self.transport.accept().await {
                Ok((stream, _peer)) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let max_frame_size = self.max_frame_size;

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, dispatcher, max_frame_size).await {
                            tracing::warn!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}
