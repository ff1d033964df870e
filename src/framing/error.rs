//! Error types for the framed stream protocol.
//!
//! Connection-scoped errors (malformed prefix, truncated body, sink failure)
//! terminate one session and never propagate to the acceptor or to other
//! connections. Acceptor-scoped errors (bind, fatal accept) are returned to
//! whoever started the server.

use std::io;

use thiserror::Error;

/// Errors produced by the framing codec, receiver, sender, and acceptor.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The listener could not be bound to the requested address.
    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The listener failed in a way the accept loop cannot recover from.
    #[error("accept failed")]
    Accept(#[source] io::Error),

    /// The connection ended partway through a length prefix.
    #[error("malformed frame: stream ended after {got} of 8 length-prefix bytes")]
    MalformedFrame { got: usize },

    /// The connection ended before the declared frame body was delivered.
    ///
    /// `delivered` counts the bytes of this frame that already reached the
    /// sink, so the caller can decide whether to keep or discard them.
    #[error("truncated frame: {delivered} of {expected} body bytes delivered")]
    TruncatedFrame {
        expected: u64,
        delivered: u64,
        #[source]
        source: Option<io::Error>,
    },

    /// The sender could not deliver the declared number of body bytes.
    ///
    /// Either the connection failed mid-frame or the source ran dry before
    /// `declared` bytes were produced. A frame cannot be resumed from the
    /// middle; the caller must resend it in full on a fresh connection.
    #[error("short write: {sent} of {declared} body bytes sent")]
    ShortWrite {
        declared: u64,
        sent: u64,
        #[source]
        source: Option<io::Error>,
    },

    /// The sink rejected a chunk of the current frame body.
    #[error("sink write failed after {delivered} bytes")]
    Sink {
        delivered: u64,
        #[source]
        source: io::Error,
    },

    /// Transport failure outside of a frame body.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Bytes of the current frame that reached the sink before the failure.
    ///
    /// `None` for errors that occur outside a frame body.
    pub fn delivered(&self) -> Option<u64> {
        match self {
            FrameError::TruncatedFrame { delivered, .. } | FrameError::Sink { delivered, .. } => {
                Some(*delivered)
            }
            _ => None,
        }
    }
}
