//! byteflow: length-prefixed framed byte streaming over TCP.
//!
//! Each frame on a connection is an 8-byte little-endian length followed by
//! exactly that many opaque payload bytes. The receive side never buffers a
//! whole frame: bodies stream to a [`FrameSink`] in bounded chunks, so any
//! number of connections can carry arbitrarily large frames in constant
//! memory each.

pub mod config;
pub mod framing;
pub mod server;

pub use framing::{
    BufferSink, DiscardSink, FileSink, FrameError, FrameSink, ReceiverConfig, SenderConfig,
    SessionStats, StreamReceiver, StreamSender, DEFAULT_CHUNK_SIZE,
};
pub use server::{Acceptor, AcceptorConfig, DirectorySinkFactory, DiscardFactory, SinkFactory};
