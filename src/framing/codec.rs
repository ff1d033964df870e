//! Length-prefix codec for the framed stream protocol.
//!
//! Wire format: every frame starts with an 8-byte little-endian unsigned
//! length, followed by exactly that many payload bytes. Frames repeat
//! back-to-back on a connection with no separator, so sender and receiver
//! must agree on the prefix exactly or the stream desynchronizes for good.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::framing::error::FrameError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Encode a frame length as the 8-byte little-endian wire prefix.
pub fn encode_length(n: u64) -> [u8; LENGTH_PREFIX_LEN] {
    n.to_le_bytes()
}

/// Decode a frame length from the wire prefix.
///
/// Fails if fewer than 8 bytes are available.
pub fn decode_length(bytes: &[u8]) -> Result<u64, FrameError> {
    if bytes.len() < LENGTH_PREFIX_LEN {
        return Err(FrameError::MalformedFrame { got: bytes.len() });
    }
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(&bytes[..LENGTH_PREFIX_LEN]);
    Ok(u64::from_le_bytes(prefix))
}

/// Read the next frame's length prefix from the stream.
///
/// Returns `Ok(None)` when the stream ends before any prefix byte arrives:
/// a clean close at a frame boundary is the normal end of a session. A
/// stream that ends after 1-7 prefix bytes is a malformed frame.
pub async fn read_length<R>(reader: &mut R) -> Result<Option<u64>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let mut filled = 0;

    while filled < LENGTH_PREFIX_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::MalformedFrame { got: filled });
        }
        filled += n;
    }

    Ok(Some(u64::from_le_bytes(prefix)))
}

/// Write a frame length prefix to the stream.
pub async fn write_length<W>(writer: &mut W, n: u64) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_length(n)).await
}
