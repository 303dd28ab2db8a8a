#![deny(unreachable_pub, unsafe_code)]

//! Symmetric crypto primitives shared by the STUN, DTLS-facing transport and
//! HTTP-Digest layers: AEAD AES (CTR, GCM), HMAC-SHA1, MD5 and a
//! constant-time comparison.

mod aesctr;
mod aesgcm;
mod ctcmp;
pub mod digest;
mod hmac_sha1;

pub use aesctr::AesCtr;
pub use aesgcm::AesGcm;
pub use ctcmp::constant_time_eq;
pub use hmac_sha1::HmacSha1;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid key length {0}")]
    InvalidKeyLength(usize),
    #[error("invalid iv/nonce length {0}")]
    InvalidIvLength(usize),
    #[error("authentication failed")]
    AuthFailed,
    #[error("operation not supported in this mode/direction")]
    NotSupported,
    #[error("malformed digest header: {0}")]
    BadMessage(&'static str),
}

/// Direction an [`AesCtr`] or [`AesGcm`] instance is currently configured for.
///
/// Source ciphers share one key schedule across both directions and must
/// support switching without re-deriving it; these types mirror that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Compute `MD5(data)`.
pub fn md5(data: &[u8]) -> [u8; 16] {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}
