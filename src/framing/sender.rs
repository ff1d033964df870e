//! Send side of the framed stream protocol.
//!
//! A sender is connection-agnostic: give it any open writer and a source
//! for the declared number of bytes. One call sends one frame. The body is
//! pulled from the source through a bounded scratch buffer, so the source
//! never has to be materialized in memory up front.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::framing::codec;
use crate::framing::error::FrameError;
use crate::framing::receiver::DEFAULT_CHUNK_SIZE;

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Size of the scratch buffer the body is pumped through.
    pub chunk_size: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Writes length-prefixed frames to a connection.
pub struct StreamSender {
    config: SenderConfig,
}

impl StreamSender {
    pub fn new(config: SenderConfig) -> Self {
        Self { config }
    }

    /// Send one frame: the 8-byte prefix, then exactly `length` bytes read
    /// from `source`.
    ///
    /// Returns the body byte count written, always equal to `length` on
    /// success. The source running dry early, or the connection failing
    /// mid-frame, is a `ShortWrite` carrying the count sent so far; the
    /// frame cannot be resumed, only resent in full on a fresh connection.
    /// A read failure from the source itself surfaces as `Io`.
    pub async fn send<W, R>(
        &self,
        conn: &mut W,
        length: u64,
        source: &mut R,
    ) -> Result<u64, FrameError>
    where
        W: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
    {
        codec::write_length(conn, length)
            .await
            .map_err(|e| FrameError::ShortWrite {
                declared: length,
                sent: 0,
                source: Some(e),
            })?;

        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let mut sent = 0u64;

        while sent < length {
            let want = (length - sent).min(buf.len() as u64) as usize;
            let n = source.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(FrameError::ShortWrite {
                    declared: length,
                    sent,
                    source: None,
                });
            }

            conn.write_all(&buf[..n])
                .await
                .map_err(|e| FrameError::ShortWrite {
                    declared: length,
                    sent,
                    source: Some(e),
                })?;
            sent += n as u64;
        }

        conn.flush().await?;
        Ok(sent)
    }

    /// Send one frame from an in-memory payload.
    pub async fn send_bytes<W>(&self, conn: &mut W, payload: &[u8]) -> Result<u64, FrameError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut source = payload;
        self.send(conn, payload.len() as u64, &mut source).await
    }
}
