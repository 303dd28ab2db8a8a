/// Capability surface a TLS/DTLS record-layer implementation exposes to the
/// transport: handshake progress and plaintext in/out. The record layer
/// itself is an external collaborator and is not reimplemented here.
pub trait SecureTransport {
    fn is_handshake_complete(&self) -> bool;

    /// Feed ciphertext read off the wire; returns any plaintext it yielded.
    fn on_ciphertext(&mut self, bytes: &[u8]) -> crate::Result<Vec<u8>>;

    /// Wrap plaintext the caller wants to send; returns the ciphertext to write.
    fn wrap_plaintext(&mut self, bytes: &[u8]) -> crate::Result<Vec<u8>>;
}
