use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Stateful HMAC-SHA1 instance.
///
/// [`HmacSha1::digest`] resets to a fresh state derived from the stored key on every
/// call rather than accumulating across calls, matching the one-shot `hmac_create`
/// + `hmac_digest` calling convention STUN's MESSAGE-INTEGRITY and ICE use.
pub struct HmacSha1 {
    key: Vec<u8>,
}

impl HmacSha1 {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    /// Compute the HMAC-SHA1 of `data`, writing up to `out.len()` bytes (max 20) into `out`.
    pub fn digest(&self, data: &[u8], out: &mut [u8]) {
        let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(data);
        let result = mac.finalize().into_bytes();

        let n = out.len().min(result.len());
        out[..n].copy_from_slice(&result[..n]);
    }

    /// Convenience wrapper returning the full 20-byte digest.
    pub fn digest_full(&self, data: &[u8]) -> [u8; 20] {
        let mut out = [0u8; 20];
        self.digest(data, &mut out);
        out
    }
}
