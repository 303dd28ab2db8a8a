#![deny(unreachable_pub, unsafe_code)]

//! SIP event subscribe/notify engine (§4.4): a dialog-scoped subscription
//! state machine with refresh scheduling, HTTP-Digest retry on challenge,
//! fork-tolerant NOTIFY dispatch and exponential-jitter retry backoff.
//!
//! The SIP core — transaction layer, message parsing, transport — is an
//! external collaborator (spec.md §1 Non-goals); this crate only consumes
//! the header values a real SIP stack would hand it ([`message::Response`],
//! [`message::Notify`]) and produces header sets for the caller's SIP core
//! to serialize into an actual request ([`message::OutgoingRequest`]).

pub mod backoff;
pub mod dialog;
pub mod message;
pub mod subscription;

pub use dialog::Dialog;
pub use message::{Notify, OutgoingRequest, Response};
pub use subscription::{Action, Subscription, SubscriptionConfig};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    #[error("not connected")]
    NotConnected,
    #[error("timed out")]
    Timeout,
    #[error("connection reset")]
    ConnectionReset,
    #[error("authentication failed")]
    AuthFailed,
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}
