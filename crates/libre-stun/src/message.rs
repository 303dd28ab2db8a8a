use crate::{Class, Error, Method, Result, TransactionId, MAGIC_COOKIE};
use libre_buf::Buffer;

pub(crate) const HEADER_LEN: usize = 20;

pub(crate) fn encode_type(class: Class, method: Method) -> u16 {
    let m = method.bits();
    let (c1, c0) = match class.bits() {
        0b00 => (0, 0),
        0b01 => (0, 1),
        0b10 => (1, 0),
        _ => (1, 1),
    };

    (m & 0x000F) | ((m & 0x0070) << 1) | ((m & 0x0F80) << 2) | (c0 << 4) | (c1 << 8)
}

fn decode_type(ty: u16) -> (Class, Method) {
    let m = (ty & 0x000F) | ((ty & 0x00E0) >> 1) | ((ty & 0x3E00) >> 2);
    let c0 = (ty >> 4) & 1;
    let c1 = (ty >> 8) & 1;
    (Class::from_bits((c1 << 1) | c0), Method::from_bits(m))
}

/// A single decoded `(type, value)` pair, still opaque — typed access goes
/// through [`crate::Attribute::decode`] on the bytes returned by
/// [`Message::find_raw`].
#[derive(Debug, Clone)]
pub struct RawAttribute {
    pub typ: u16,
    pub value: Vec<u8>,
}

/// A decoded STUN message. Holds the original bytes so integrity/fingerprint
/// verification can be re-run against the exact wire representation.
pub struct Message {
    class: Class,
    method: Method,
    transaction_id: TransactionId,
    attributes: Vec<RawAttribute>,
    raw: Vec<u8>,
    /// Comprehension-required attribute types (< 0x8000) this crate does not
    /// have a typed decoder for.
    unknown_required: Vec<u16>,
}

/// Attribute type numbers this crate knows how to interpret. Anything below
/// 0x8000 that isn't in this list is comprehension-required-but-unknown.
const KNOWN_ATTR_TYPES: &[u16] = &[
    0x0001, // MAPPED-ADDRESS
    0x0006, // USERNAME
    0x0008, // MESSAGE-INTEGRITY
    0x0009, // ERROR-CODE
    0x000A, // UNKNOWN-ATTRIBUTES
    0x0014, // REALM
    0x0015, // NONCE
    0x0020, // XOR-MAPPED-ADDRESS
    0x0024, // PRIORITY
    0x0025, // USE-CANDIDATE
    0x8022, // SOFTWARE
    0x8028, // FINGERPRINT
    0x8029, // ICE-CONTROLLED
    0x802A, // ICE-CONTROLLING
];

impl Message {
    pub fn class(&self) -> Class {
        self.class
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Raw bytes of the full message as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Comprehension-required attributes present on the wire that this crate
    /// has no typed decoder for. A non-empty list on a Request should produce
    /// a 420 Unknown Attribute error response carrying UNKNOWN-ATTRIBUTES.
    pub fn unknown_comprehension_required(&self) -> &[u16] {
        &self.unknown_required
    }

    /// Offset into `raw` immediately before the attribute with type `typ`
    /// first occurring, i.e. how many bytes of the message precede it.
    /// Used by [`crate::MessageIntegrity`]/[`crate::Fingerprint`] verification,
    /// which must hash only the bytes that preceded the attribute being checked.
    pub(crate) fn offset_before(&self, typ: u16) -> Option<usize> {
        let mut offset = HEADER_LEN;
        for attr in &self.attributes {
            if attr.typ == typ {
                return Some(offset);
            }
            offset += 4 + pad4(attr.value.len());
        }
        None
    }

    pub fn find_raw(&self, typ: u16) -> Option<&RawAttribute> {
        self.attributes.iter().find(|a| a.typ == typ)
    }

    pub fn find_all_raw(&self, typ: u16) -> impl Iterator<Item = &RawAttribute> {
        self.attributes.iter().filter(move |a| a.typ == typ)
    }

    /// Decode the first attribute of type `A::TYPE`, if present.
    pub fn attribute<A: crate::Attribute>(&self) -> Option<Result<A>> {
        self.find_raw(A::TYPE).map(|attr| A::decode(&attr.value))
    }

    /// XOR-MAPPED-ADDRESS needs this message's own transaction id to unmask
    /// an IPv6 address, so it is read through a dedicated accessor instead of
    /// the generic [`Attribute`](crate::Attribute) path.
    pub fn xor_mapped_address(&self) -> Option<Result<std::net::SocketAddr>> {
        self.find_raw(crate::attributes::XOR_MAPPED_ADDRESS_TYPE)
            .map(|attr| crate::attributes::decode_xor_mapped_address(&attr.value, self.transaction_id))
    }

    /// Verify this message's MESSAGE-INTEGRITY attribute against `key`.
    pub fn verify_message_integrity(&self, key: &[u8]) -> Result<()> {
        crate::attributes::verify_message_integrity(self, key)
    }

    /// Verify this message's trailing FINGERPRINT attribute.
    pub fn verify_fingerprint(&self) -> Result<()> {
        crate::attributes::verify_fingerprint(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::BadMessage("shorter than the 20-byte header"));
        }

        let mut buf = Buffer::from_slice(bytes);

        let ty = buf.read_u16().map_err(|_| Error::BadMessage("truncated header"))?;
        let length = buf.read_u16().map_err(|_| Error::BadMessage("truncated header"))? as usize;
        let cookie = buf.read_u32().map_err(|_| Error::BadMessage("truncated header"))?;
        if cookie != MAGIC_COOKIE {
            return Err(Error::BadMessage("bad magic cookie"));
        }

        let mut tid = [0u8; 12];
        tid.copy_from_slice(
            buf.read_bytes(12)
                .map_err(|_| Error::BadMessage("truncated header"))?,
        );

        if ty & 0xC000 != 0 {
            return Err(Error::BadMessage("reserved type bits set"));
        }

        if HEADER_LEN + length > bytes.len() {
            return Err(Error::BadMessage("length field overruns buffer"));
        }

        let (class, method) = decode_type(ty);

        let mut attributes = Vec::new();
        let mut unknown_required = Vec::new();
        let end = HEADER_LEN + length;

        while buf.pos() < end {
            let typ = buf.read_u16().map_err(|_| Error::BadMessage("truncated attribute header"))?;
            let len = buf.read_u16().map_err(|_| Error::BadMessage("truncated attribute header"))? as usize;

            if buf.pos() + len > end {
                return Err(Error::BadMessage("attribute value overruns message"));
            }

            let value = buf
                .read_bytes(len)
                .map_err(|_| Error::BadMessage("truncated attribute value"))?
                .to_vec();

            let padding = pad4(len) - len;
            if padding > 0 {
                buf.read_bytes(padding)
                    .map_err(|_| Error::BadMessage("truncated attribute padding"))?;
            }

            if typ < 0x8000 && !KNOWN_ATTR_TYPES.contains(&typ) {
                unknown_required.push(typ);
            }

            attributes.push(RawAttribute { typ, value });
        }

        Ok(Self {
            class,
            method,
            transaction_id: TransactionId::from_bytes(tid),
            attributes,
            raw: bytes[..end].to_vec(),
            unknown_required,
        })
    }
}

pub(crate) fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_roundtrip_for_binding_combinations() {
        for class in [Class::Request, Class::Indication, Class::Success, Class::Error] {
            let ty = encode_type(class, Method::Binding);
            let (dc, dm) = decode_type(ty);
            assert_eq!(dc, class);
            assert_eq!(dm, Method::Binding);
        }
    }

    #[test]
    fn known_binding_type_constants() {
        assert_eq!(encode_type(Class::Request, Method::Binding), 0x0001);
        assert_eq!(encode_type(Class::Success, Method::Binding), 0x0101);
        assert_eq!(encode_type(Class::Error, Method::Binding), 0x0111);
        assert_eq!(encode_type(Class::Indication, Method::Binding), 0x0011);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(Message::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn decode_rejects_bad_cookie() {
        let mut bytes = vec![0u8; 20];
        bytes[0..2].copy_from_slice(&0x0001u16.to_be_bytes());
        assert!(Message::decode(&bytes).is_err());
    }
}
