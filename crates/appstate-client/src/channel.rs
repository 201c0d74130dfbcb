//! Request/response channel to the server.
//!
//! The client never touches sockets directly; it issues one [`Request`] at a
//! time through a [`Channel`] and interprets the [`Response`]. Transport
//! retries and timeouts belong to the channel implementation.

use std::sync::Arc;

use appstate_core::{WireError, read_frame};
use appstate_proto::{DEFAULT_MAX_FRAME_SIZE, Request, Response, frame};
use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::Mutex};

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Connection could not be established or broke mid-call.
    #[error("I/O error: {0}")]
    Io(String),

    /// Frame could not be encoded or decoded.
    #[error("framing error: {0}")]
    Frame(String),

    /// Connection is closed.
    #[error("connection closed")]
    Closed,
}

impl From<WireError> for ChannelError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(e) => Self::Io(e.to_string()),
            WireError::Frame(e) => Self::Frame(e.to_string()),
        }
    }
}

/// Synchronous point-to-point RPC to an AppState server.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send `request` and wait for its response.
    async fn call(&self, request: Request) -> Result<Response, ChannelError>;
}

#[async_trait]
impl<C: Channel + ?Sized> Channel for Arc<C> {
    async fn call(&self, request: Request) -> Result<Response, ChannelError> {
        (**self).call(request).await
    }
}

/// Channel over one TCP connection.
///
/// Calls are serialized on the connection. A request that cannot be framed
/// (for example one over `max_frame_size`) fails with
/// [`ChannelError::Frame`] before anything is written and leaves the
/// connection usable. After a failure on the stream itself the stream may be
/// mid-frame, so the channel closes and every later call fails with
/// [`ChannelError::Closed`].
pub struct TcpChannel {
    stream: Mutex<Option<TcpStream>>,
    max_frame_size: usize,
}

impl TcpChannel {
    /// Connect to `address`.
    pub async fn connect(address: &str) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(address).await.map_err(|e| ChannelError::Io(e.to_string()))?;
        stream.set_nodelay(true).map_err(|e| ChannelError::Io(e.to_string()))?;
        tracing::debug!(%address, "connected");

        Ok(Self { stream: Mutex::new(Some(stream)), max_frame_size: DEFAULT_MAX_FRAME_SIZE })
    }

    /// Override the frame size limit.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

impl std::fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpChannel").field("max_frame_size", &self.max_frame_size).finish()
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn call(&self, request: Request) -> Result<Response, ChannelError> {
        let bytes = frame::encode(&request, self.max_frame_size)
            .map_err(|e| ChannelError::Frame(e.to_string()))?;

        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ChannelError::Closed)?;

        let result = async {
            stream.write_all(&bytes).await?;
            stream.flush().await?;
            read_frame::<_, Response>(stream, self.max_frame_size).await
        }
        .await;

        match result {
            Ok(Some(response)) => Ok(response),
            Ok(None) => {
                *guard = None;
                Err(ChannelError::Closed)
            },
            Err(e) => {
                tracing::warn!(error = %e, "closing channel after transport failure");
                *guard = None;
                Err(e.into())
            },
        }
    }
}
