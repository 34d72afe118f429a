//! JSON document codec for unary stream exchanges.
//!
//! One newline-free JSON object per logical message. Reading parses
//! incrementally: bytes accumulate until a complete document
//! deserializes, bounded by a size cap.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::HandshakeError;

/// Upper bound on a single wire document.
pub const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// Serialize one message and flush it to the stream.
pub async fn write_document<S, T>(stream: &mut S, message: &T) -> Result<(), HandshakeError>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(message).map_err(HandshakeError::Encode)?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one JSON document from the stream.
pub async fn read_document<S, T>(stream: &mut S) -> Result<T, HandshakeError>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    loop {
        if !buf.is_empty() {
            let mut de = serde_json::Deserializer::from_slice(&buf);
            match T::deserialize(&mut de) {
                Ok(message) => return Ok(message),
                Err(e) if e.is_eof() => {} // document incomplete, keep reading
                Err(e) => return Err(HandshakeError::Decode(e)),
            }
        }
        if buf.len() > MAX_DOCUMENT_BYTES {
            return Err(HandshakeError::DocumentTooLarge(buf.len()));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::StreamClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
