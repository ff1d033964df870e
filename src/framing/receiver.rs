//! Receive side of the framed stream protocol.
//!
//! One receiver owns one connection for the connection's lifetime and
//! drives the per-session state machine: read an 8-byte length prefix,
//! stream exactly that many body bytes to the sink in bounded chunks,
//! return to awaiting the next prefix. The peer closing the connection at a
//! frame boundary ends the session cleanly.
//!
//! The body is never accumulated: each chunk goes straight to the sink
//! through a working buffer sized independently of the frame length, so
//! per-connection memory stays O(chunk size) no matter how large a frame
//! is declared.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::framing::codec;
use crate::framing::error::FrameError;
use crate::framing::sink::FrameSink;

/// Default size of the per-connection working buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Size of the working buffer frame bodies are streamed through.
    ///
    /// Fixed for the session; independent of frame length.
    pub chunk_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Totals for one connection's session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames fully delivered to the sink.
    pub frames: u64,

    /// Body bytes delivered across all complete frames.
    pub bytes: u64,
}

/// Per-connection receive state machine.
pub struct StreamReceiver<S> {
    sink: S,
    buf: Vec<u8>,
    stats: SessionStats,
}

impl<S: FrameSink> StreamReceiver<S> {
    pub fn new(config: ReceiverConfig, sink: S) -> Self {
        Self {
            sink,
            buf: vec![0u8; config.chunk_size.max(1)],
            stats: SessionStats::default(),
        }
    }

    /// Consume frames from `reader` until the peer closes the connection.
    ///
    /// Returns the session totals on a clean close (connection ended at a
    /// frame boundary). Any error terminates the session; truncation and
    /// sink failures report how many bytes of the current frame reached the
    /// sink.
    pub async fn run<R>(&mut self, reader: &mut R) -> Result<SessionStats, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        while self.next_frame(reader).await?.is_some() {}
        Ok(self.stats)
    }

    /// Receive a single frame, returning its body length.
    ///
    /// `Ok(None)` means the peer closed the connection at a frame boundary:
    /// no more frames are coming.
    pub async fn next_frame<R>(&mut self, reader: &mut R) -> Result<Option<u64>, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let Some(length) = codec::read_length(reader).await? else {
            return Ok(None);
        };

        let mut remaining = length;
        while remaining > 0 {
            let want = remaining.min(self.buf.len() as u64) as usize;
            let n = match reader.read(&mut self.buf[..want]).await {
                Ok(0) => {
                    return Err(FrameError::TruncatedFrame {
                        expected: length,
                        delivered: length - remaining,
                        source: None,
                    })
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(FrameError::TruncatedFrame {
                        expected: length,
                        delivered: length - remaining,
                        source: Some(e),
                    })
                }
            };

            self.sink
                .write(&self.buf[..n])
                .await
                .map_err(|e| FrameError::Sink {
                    delivered: length - remaining,
                    source: e,
                })?;
            remaining -= n as u64;
        }

        self.stats.frames += 1;
        self.stats.bytes += length;
        debug!(
            frame_len = length,
            frames = self.stats.frames,
            "frame delivered"
        );

        Ok(Some(length))
    }

    /// Totals accumulated so far.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Release the sink once the session is over.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
