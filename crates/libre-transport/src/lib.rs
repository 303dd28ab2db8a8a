#![deny(unreachable_pub, unsafe_code)]

//! Reactor, stream-transport connection cache, datagram helper pipeline and
//! TLS/DTLS capability surface shared by every engine crate in the
//! workspace (§4.1, §5). Nothing here touches an OS socket: callers drive
//! the reactor/cache with events and perform the actual I/O themselves.

pub mod cache;
pub mod connection;
pub mod datagram;
pub mod reactor;

pub use cache::{ConnectionCache, ConnectionHandle, TransportEvent};
pub use connection::{Connection, ConnectionConfig, ConnectionState, Flavor};
pub use datagram::{DatagramHelper, DatagramPipeline, Inbound};
pub use reactor::{Reactor, ReactorEvent, TimerData, TimerId, WakeEntry};
pub use secure::SecureTransport;

mod secure;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("bad message: {0}")]
    BadMessage(&'static str),
    #[error("needs more data")]
    NeedsMoreData,
    #[error("reassembly buffer overflow")]
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
