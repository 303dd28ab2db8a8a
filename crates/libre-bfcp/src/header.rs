use libre_buf::Buffer;
use crate::Error;

pub const HEADER_LEN: usize = 12;
pub const ATTR_HDR_SIZE: usize = 2;

/// 12-byte BFCP message header (RFC 4582 §5): version, primitive, the
/// attribute-region length in 32-bit words, and the transaction triad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub primitive: u8,
    pub conference_id: u32,
    pub transaction_id: u16,
    pub user_id: u16,
}

impl Header {
    /// Encode with a placeholder length; callers patch it once the attribute
    /// region's byte count is known (see [`crate::message::Message::encode`]).
    pub fn encode(&self, buf: &mut Buffer, length_words: u16) {
        buf.write_u8(1 << 5); // version=1, reserved bits, R=0
        buf.write_u8(self.primitive);
        buf.write_u16(length_words);
        buf.write_u32(self.conference_id);
        buf.write_u16(self.transaction_id);
        buf.write_u16(self.user_id);
    }

    /// Returns the header and the declared attribute-region length in words.
    pub fn decode(buf: &mut Buffer) -> Result<(Self, u16), Error> {
        if buf.remaining() < HEADER_LEN {
            return Err(Error::NeedsMoreData);
        }
        let ver_flags = buf.read_u8()?;
        let version = ver_flags >> 5;
        if version != 1 {
            return Err(Error::BadMessage("reserved BFCP version"));
        }
        let primitive = buf.read_u8()?;
        let length_words = buf.read_u16()?;
        let conference_id = buf.read_u32()?;
        let transaction_id = buf.read_u16()?;
        let user_id = buf.read_u16()?;
        Ok((
            Self {
                primitive,
                conference_id,
                transaction_id,
                user_id,
            },
            length_words,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = Header {
            primitive: 1,
            conference_id: 0xcafebabe,
            transaction_id: 1,
            user_id: 2,
        };
        let mut buf = Buffer::with_capacity(HEADER_LEN);
        header.encode(&mut buf, 1);

        let mut reader = Buffer::from_vec(buf.into_vec());
        let (decoded, length_words) = Header::decode(&mut reader).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(length_words, 1);
    }

    #[test]
    fn reserved_version_is_bad_message() {
        let mut buf = Buffer::with_capacity(HEADER_LEN);
        buf.write_u8(2 << 5);
        buf.write_bytes(&[0u8; HEADER_LEN - 1]);
        let mut reader = Buffer::from_vec(buf.into_vec());
        assert!(matches!(Header::decode(&mut reader), Err(Error::BadMessage(_))));
    }

    #[test]
    fn short_header_needs_more_data() {
        let mut reader = Buffer::from_vec(vec![1u8 << 5, 1, 0]);
        assert!(matches!(Header::decode(&mut reader), Err(Error::NeedsMoreData)));
    }
}
