//! Async frame I/O.
//!
//! Reads and writes length-prefixed CBOR frames over any tokio byte stream.
//! Used by both the TCP server and the TCP client channel.

use appstate_proto::{FrameError, LENGTH_PREFIX_SIZE, frame};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Stream I/O failures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded or decoded.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Read one frame.
///
/// Returns `Ok(None)` if the peer closed the stream cleanly between frames.
/// A stream that ends mid-frame is an error.
pub async fn read_frame<R, T>(reader: &mut R, max_size: usize) -> Result<Option<T>, WireError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated { expected: LENGTH_PREFIX_SIZE, actual: filled }.into());
        }
        filled += n;
    }

    let size = frame::payload_len(prefix, max_size)?;
    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            WireError::Frame(FrameError::Truncated { expected: size, actual: 0 })
        },
        _ => WireError::Io(e),
    })?;

    Ok(Some(frame::decode_payload(&payload)?))
}

/// Encode and write one frame, then flush.
pub async fn write_frame<W, T>(writer: &mut W, message: &T, max_size: usize) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = frame::encode(message, max_size)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use appstate_proto::{AppKey, Command, DEFAULT_MAX_FRAME_SIZE, Request};

    use super::*;

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let request = Request::anonymous(Command::Get { app: AppKey::new(3), key: "k".into() });

        write_frame(&mut a, &request, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        drop(a);

        let read: Option<Request> = read_frame(&mut b, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(read, Some(request));

        let eof: Option<Request> = read_frame(&mut b, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(eof, None);
    }

    #[tokio::test]
    async fn oversized_prefix_rejected_before_read() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let result: Result<Option<Request>, _> = read_frame(&mut b, 1024).await;
        assert!(matches!(result, Err(WireError::Frame(FrameError::TooLarge { .. }))));
    }

    #[tokio::test]
    async fn eof_mid_prefix_is_truncated() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 0]).await.unwrap();
        drop(a);

        let result: Result<Option<Request>, _> = read_frame(&mut b, 1024).await;
        assert!(matches!(
            result,
            Err(WireError::Frame(FrameError::Truncated { expected: 4, actual: 2 }))
        ));
    }
}
