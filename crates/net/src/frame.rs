//! Length-prefixed frame encoding/decoding
//!
//! Wire format: [4-byte big-endian length][JSON payload]
//! Maximum frame size: 1MB (sanity limit)

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Maximum allowed frame size (1MB)
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

fn eof_as_closed(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

/// Read a length-prefixed frame from a stream
///
/// A bad length is `Protocol` and leaves the stream unusable; a payload that
/// is not a valid `T` is `Malformed` and the next frame can still be read.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    // Read 4-byte length prefix
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(eof_as_closed)?;

    let len = u32::from_be_bytes(len_buf);

    // Sanity check
    if len == 0 {
        return Err(Error::Protocol("Empty frame".into()));
    }
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            len, MAX_FRAME_SIZE
        )));
    }

    // Read payload
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;

    // Deserialize
    serde_json::from_slice(&payload).map_err(|e| Error::Malformed(format!("Invalid JSON: {}", e)))
}

/// Write a length-prefixed frame to a stream
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(msg)
        .map_err(|e| Error::Protocol(format!("Serialization failed: {}", e)))?;

    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(Error::Protocol(format!(
            "Message too large: {} bytes (max {})",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }
    let len = payload.len() as u32;

    // Write length prefix
    writer.write_all(&len.to_be_bytes()).await?;

    // Write payload
    writer.write_all(&payload).await?;

    // Flush to ensure delivery
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, RequestBody};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let msg = Request {
            id: 3,
            token: None,
            body: RequestBody::Ping,
        };

        // Write to buffer
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).await.unwrap();
        assert_eq!(&buf[..4], &((buf.len() - 4) as u32).to_be_bytes());

        // Read back
        let mut cursor = Cursor::new(buf);
        let decoded: Request = read_frame(&mut cursor).await.unwrap();

        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_empty_frame_rejected() {
        // 4 zero bytes = length 0
        let mut cursor = Cursor::new(vec![0, 0, 0, 0]);
        let result: Result<Request> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        // Length = MAX_FRAME_SIZE + 1
        let len = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(len.to_vec());
        let result: Result<Request> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_bad_json_is_malformed_and_stream_continues() {
        let mut buf = Vec::new();
        let junk = b"{not json";
        buf.extend_from_slice(&(junk.len() as u32).to_be_bytes());
        buf.extend_from_slice(junk);
        write_frame(
            &mut buf,
            &Request {
                id: 9,
                token: None,
                body: RequestBody::Ping,
            },
        )
        .await
        .unwrap();

        let mut cursor = Cursor::new(buf);
        let first: Result<Request> = read_frame(&mut cursor).await;
        assert!(matches!(first, Err(Error::Malformed(_))));
        let second: Request = read_frame(&mut cursor).await.unwrap();
        assert_eq!(second.id, 9);
    }

    #[tokio::test]
    async fn test_truncated_stream_is_closed() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 10, b'{']);
        let result: Result<Request> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
}
