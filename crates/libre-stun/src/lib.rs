#![deny(unreachable_pub, unsafe_code)]

//! STUN (RFC 5389) message codec and client transaction state machine,
//! shared by the ICE agent's connectivity checks and by any bare STUN
//! binding discovery a caller performs before gathering candidates.

mod attributes;
mod builder;
mod message;
mod transaction;

pub use attributes::*;
pub use builder::MessageBuilder;
pub use message::{Message, RawAttribute};
pub use transaction::{ClientTransactions, TransactionEvent, TransactionConfig};

use rand::RngCore;
use std::fmt;

/// Magic cookie fixed by RFC 5389, XORed into XOR-MAPPED-ADDRESS and used to
/// tell a STUN message apart from other protocols sharing the socket.
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// FINGERPRINT attributes XOR the raw CRC32 with this constant ("STUN" in ASCII).
pub const FINGERPRINT_XOR: u32 = 0x5354_554e;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed STUN message: {0}")]
    BadMessage(&'static str),
    #[error("attribute not supported in this context")]
    NotSupported,
    #[error("message failed authentication")]
    Unauthenticated,
    #[error("transaction timed out")]
    Timeout,
    #[error("stale nonce, retry with the server-supplied value")]
    StaleNonce,
}

/// 96-bit STUN transaction id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId([u8; 12]);

impl TransactionId {
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Draw a cryptographically random transaction id.
    ///
    /// Must be unpredictable: it is the only thing that keeps client
    /// transactions on a shared socket from matching each other's responses.
    pub fn random() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", hex_string(&self.0))
    }
}

fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Class field of the STUN message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Request,
    Indication,
    Success,
    Error,
}

impl Class {
    pub(crate) fn bits(self) -> u16 {
        match self {
            Class::Request => 0b00,
            Class::Indication => 0b01,
            Class::Success => 0b10,
            Class::Error => 0b11,
        }
    }

    pub(crate) fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => Class::Request,
            0b01 => Class::Indication,
            0b10 => Class::Success,
            _ => Class::Error,
        }
    }
}

/// Method field of the STUN message header.
///
/// Only Binding is used by the ICE-facing surface this crate covers; other
/// methods (TURN Allocate/Refresh/...) round-trip as [`Method::Other`] so a
/// caller layering TURN on top can still read/write them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Binding,
    Other(u16),
}

impl Method {
    const BINDING: u16 = 0x0001;

    fn bits(self) -> u16 {
        match self {
            Method::Binding => Self::BINDING,
            Method::Other(m) => m,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits {
            Self::BINDING => Method::Binding,
            other => Method::Other(other),
        }
    }
}
