use crate::attributes::{encode_xor_mapped_address, padded_attribute_len, FINGERPRINT_TYPE, MESSAGE_INTEGRITY_TYPE, XOR_MAPPED_ADDRESS_TYPE};
use crate::message::{encode_type, pad4, HEADER_LEN};
use crate::{Attribute, Class, Method, TransactionId, FINGERPRINT_XOR, MAGIC_COOKIE};
use libre_crypto::HmacSha1;
use std::net::SocketAddr;

/// Incrementally encodes a STUN message, keeping the header's length field
/// correct after every attribute so MESSAGE-INTEGRITY and FINGERPRINT can be
/// computed over the exact bytes that will ship.
pub struct MessageBuilder {
    buf: Vec<u8>,
    transaction_id: TransactionId,
}

impl MessageBuilder {
    pub fn new(class: Class, method: Method, transaction_id: TransactionId) -> Self {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&encode_type(class, method).to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // length, patched as we go
        buf.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buf.extend_from_slice(transaction_id.as_bytes());

        Self { buf, transaction_id }
    }

    fn patch_length(&mut self) {
        let length = (self.buf.len() - HEADER_LEN) as u16;
        self.buf[2..4].copy_from_slice(&length.to_be_bytes());
    }

    fn push_tlv(&mut self, typ: u16, value: &[u8]) {
        self.buf.extend_from_slice(&typ.to_be_bytes());
        self.buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(value);
        let padding = pad4(value.len()) - value.len();
        self.buf.extend(std::iter::repeat(0u8).take(padding));
        self.patch_length();
    }

    pub fn add_attr<A: Attribute>(&mut self, attr: &A) {
        let mut value = Vec::new();
        attr.encode_value(&mut value);
        self.push_tlv(A::TYPE, &value);
    }

    pub fn add_xor_mapped_address(&mut self, addr: SocketAddr) {
        let mut value = Vec::new();
        encode_xor_mapped_address(addr, self.transaction_id, &mut value);
        self.push_tlv(XOR_MAPPED_ADDRESS_TYPE, &value);
    }

    /// Append MESSAGE-INTEGRITY, computed with the length field pre-adjusted
    /// to include this attribute's own bytes, as RFC 5389 section 15.4 requires.
    pub fn add_message_integrity(&mut self, key: &[u8]) {
        let prospective_len = (self.buf.len() - HEADER_LEN) + padded_attribute_len(20);
        self.buf[2..4].copy_from_slice(&(prospective_len as u16).to_be_bytes());

        let mac = HmacSha1::new(key);
        let digest = mac.digest_full(&self.buf);

        self.push_tlv(MESSAGE_INTEGRITY_TYPE, &digest);
    }

    /// Append FINGERPRINT. Must be the last attribute added.
    pub fn add_fingerprint(&mut self) {
        let prospective_len = (self.buf.len() - HEADER_LEN) + padded_attribute_len(4);
        self.buf[2..4].copy_from_slice(&(prospective_len as u16).to_be_bytes());

        let crc = crc32fast::hash(&self.buf) ^ FINGERPRINT_XOR;

        self.push_tlv(FINGERPRINT_TYPE, &crc.to_be_bytes());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, Priority, UseCandidate, Username};

    #[test]
    fn builder_roundtrips_through_decode() {
        let tid = TransactionId::random();
        let mut builder = MessageBuilder::new(Class::Request, Method::Binding, tid);
        builder.add_attr(&Username("bbbb:aaaa".to_string()));
        builder.add_attr(&Priority(12345));
        builder.add_attr(&UseCandidate);
        builder.add_message_integrity(b"aaaaaaaaaaaaaaaaaaaa");
        builder.add_fingerprint();

        let bytes = builder.finish();
        let msg = Message::decode(&bytes).unwrap();

        assert_eq!(msg.class(), Class::Request);
        assert_eq!(msg.method(), Method::Binding);
        assert_eq!(msg.transaction_id(), tid);
        assert_eq!(msg.attribute::<Username>().unwrap().unwrap().0, "bbbb:aaaa");
        assert_eq!(msg.attribute::<Priority>().unwrap().unwrap().0, 12345);
        assert!(msg.attribute::<UseCandidate>().is_some());
        msg.verify_message_integrity(b"aaaaaaaaaaaaaaaaaaaa").unwrap();
        msg.verify_fingerprint().unwrap();
    }

    #[test]
    fn tampered_body_fails_integrity() {
        let tid = TransactionId::random();
        let mut builder = MessageBuilder::new(Class::Request, Method::Binding, tid);
        builder.add_attr(&Username("x:y".to_string()));
        builder.add_message_integrity(b"password12345678");
        builder.add_fingerprint();

        let mut bytes = builder.finish();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        // Fingerprint covers the corrupted byte too, so it should fail first.
        let msg = Message::decode(&bytes).unwrap();
        assert!(msg.verify_fingerprint().is_err());
    }
}
