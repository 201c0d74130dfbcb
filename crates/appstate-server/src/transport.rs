//! TCP transport.
//!
//! One task per connection. Each connection carries a strict
//! request/response sequence: read a request frame, dispatch it, write the
//! response frame. A malformed frame closes the connection; protocol errors
//! travel back as tagged responses and leave the connection open.

use std::{net::SocketAddr, sync::Arc};

use appstate_core::{Dispatcher, Environment, Store, read_frame, write_frame};
use appstate_proto::{Request, Response};
use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;

/// Listening TCP endpoint.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `address`.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        Ok(self.listener.accept().await?)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}

/// Serve requests on one connection until the peer disconnects.
pub async fn handle_connection<S, E>(
    mut stream: TcpStream,
    dispatcher: Arc<Dispatcher<S, E>>,
    max_frame_size: usize,
) -> Result<(), ServerError>
where
    S: Store + 'static,
    E: Environment,
{
    let conn_id = {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf).map_err(|e| ServerError::Internal(e.to_string()))?;
        u64::from_le_bytes(buf)
    };
    let peer = stream.peer_addr()?;
    tracing::debug!(conn_id, %peer, "connection opened");

    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.split();

    let mut served = 0u64;
    while let Some(request) = read_frame::<_, Request>(&mut reader, max_frame_size).await? {
        let response: Response = dispatcher.handle(request);
        write_frame(&mut writer, &response, max_frame_size).await?;
        served += 1;
    }

    tracing::debug!(conn_id, served, "connection closed");
    Ok(())
}
