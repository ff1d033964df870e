//! Framed byte streaming protocol core.
//!
//! Wire format, repeated back-to-back for the lifetime of a connection:
//!
//! ```text
//! +---------------------------+------------------------+
//! | length: u64 LE (8 bytes)  | payload: length bytes  |
//! +---------------------------+------------------------+
//! ```
//!
//! No handshake, magic, version, or checksum; the payload is opaque. The
//! connection closing at a frame boundary ends the session. The receive
//! side streams each body to a [`FrameSink`] in bounded chunks, so
//! per-connection memory stays constant no matter how large a frame is.

pub mod codec;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod sink;

pub use codec::{decode_length, encode_length, read_length, write_length, LENGTH_PREFIX_LEN};
pub use error::FrameError;
pub use receiver::{ReceiverConfig, SessionStats, StreamReceiver, DEFAULT_CHUNK_SIZE};
pub use sender::{SenderConfig, StreamSender};
pub use sink::{BufferSink, DiscardSink, FileSink, FrameSink};
