#![deny(unreachable_pub, unsafe_code)]

//! BFCP (RFC 4582) message/attribute TLV codec, a monotonic client
//! transaction table and a socket that ties both to a stream-oriented
//! [`libre_transport::ConnectionCache`] connection. BFCP always runs over a
//! reliable transport (TCP or a reliable DTLS/TLS channel), so unlike STUN
//! there is no retransmission here: a transaction either completes within its
//! timeout or fails once.

pub mod attribute;
pub mod header;
pub mod message;
pub mod socket;
pub mod transaction;

pub use attribute::{Attribute, Kind as AttributeKind};
pub use header::Header;
pub use message::Message;
pub use socket::BfcpSocket;
pub use transaction::ClientTransactions;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
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
