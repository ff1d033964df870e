//! Frame body consumers.
//!
//! A sink receives each frame body incrementally, one bounded chunk at a
//! time, in arrival order. Sinks are per-connection: the acceptor creates a
//! fresh instance for every session, so implementations never need to be
//! shareable across tasks.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Incremental consumer of streamed frame bodies.
#[async_trait]
pub trait FrameSink: Send {
    /// Consume the next chunk of the current frame body.
    ///
    /// Chunks arrive in the exact byte order read from the connection.
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Called once when the session ends, after the final chunk.
    ///
    /// Default is a no-op; file-backed sinks flush here. Runs on clean and
    /// failed sessions alike, so partially delivered frames can still be
    /// persisted or discarded by the implementation.
    async fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl FrameSink for Box<dyn FrameSink> {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        (**self).write(chunk).await
    }

    async fn finish(&mut self) -> io::Result<()> {
        (**self).finish().await
    }
}

/// Sink that drops every chunk, keeping only a byte count.
#[derive(Debug, Default)]
pub struct DiscardSink {
    received: u64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes consumed so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

#[async_trait]
impl FrameSink for DiscardSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.received += chunk.len() as u64;
        Ok(())
    }
}

/// Sink that accumulates chunks in memory.
///
/// Grows with the data it is fed, unlike the receiver's own working buffer;
/// meant for small payloads and tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: BytesMut,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All bytes consumed so far.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

#[async_trait]
impl FrameSink for BufferSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }
}

/// Sink that appends chunks to a file.
pub struct FileSink {
    file: File,
    written: u64,
}

impl FileSink {
    /// Create the file, truncating any existing content.
    pub async fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path).await?;
        Ok(Self { file, written: 0 })
    }

    /// Total bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl FrameSink for FileSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await
    }
}
