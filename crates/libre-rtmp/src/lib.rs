#![deny(unreachable_pub, unsafe_code)]

//! RTMP engine: handshake state machine, a stateless chunker paired with a
//! stateful per-chunk-id dechunker, the AMF0 value codec, and a connection
//! that routes chunk-stream messages to logical streams (§4.6).
//!
//! Like every other engine crate in this workspace this one never touches a
//! socket: [`connection::Connection`] consumes bytes handed to it (typically
//! read out of a [`libre_transport::ConnectionCache`] connection's
//! reassembly buffer) and emits [`connection::Event`]s for the caller to act
//! on, mirroring `libre_ice::IceAgent::poll`'s socket-free design.

pub mod amf0;
pub mod chunk;
pub mod command;
pub mod connection;
pub mod handshake;
pub mod stream;

pub use amf0::{OrderedDict, Value as Amf0Value};
pub use chunk::{BasicHeader, Chunker, Dechunker, MessageHeader};
pub use command::CommandTable;
pub use connection::{Connection, Event, Role};
pub use handshake::{Handshake, HandshakeState};
pub use stream::Stream;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("bad message: {0}")]
    BadMessage(&'static str),
    #[error("needs more data")]
    NeedsMoreData,
    #[error("overflow")]
    Overflow,
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    #[error("not connected")]
    NotConnected,
    #[error("timed out")]
    Timeout,
    #[error("connection reset")]
    ConnectionReset,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl From<libre_buf::Error> for Error {
    fn from(err: libre_buf::Error) -> Self {
        match err {
            libre_buf::Error::Underrun { .. } => Error::NeedsMoreData,
            libre_buf::Error::Overflow { .. } => Error::Overflow,
        }
    }
}

/// Max bytes a single RTMP message body may hold before the connection is
/// failed; per spec.md §4.6.
pub const MAX_MESSAGE_LEN: usize = 524_288;

/// Max simultaneously tracked chunk-id dechunker slots; per spec.md §3.
pub const MAX_CHUNK_SLOTS: usize = 64;
