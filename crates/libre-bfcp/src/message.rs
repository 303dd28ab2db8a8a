use crate::attribute::{Attribute, Kind};
use crate::header::{Header, ATTR_HDR_SIZE, HEADER_LEN};
use crate::Error;
use libre_buf::Buffer;

/// BFCP primitive (message type), RFC 4582 §5.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    FloorRequest,
    FloorRelease,
    FloorRequestQuery,
    FloorRequestStatus,
    UserQuery,
    UserStatus,
    FloorQuery,
    FloorStatus,
    ChairAction,
    ChairActionAck,
    Hello,
    HelloAck,
    Error,
    FloorRequestStatusAck,
    ErrorAck,
    FloorStatusAck,
    Goodbye,
    GoodbyeAck,
}

impl Primitive {
    pub fn as_u8(self) -> u8 {
        match self {
            Primitive::FloorRequest => 1,
            Primitive::FloorRelease => 2,
            Primitive::FloorRequestQuery => 3,
            Primitive::FloorRequestStatus => 4,
            Primitive::UserQuery => 5,
            Primitive::UserStatus => 6,
            Primitive::FloorQuery => 7,
            Primitive::FloorStatus => 8,
            Primitive::ChairAction => 9,
            Primitive::ChairActionAck => 10,
            Primitive::Hello => 11,
            Primitive::HelloAck => 12,
            Primitive::Error => 13,
            Primitive::FloorRequestStatusAck => 14,
            Primitive::ErrorAck => 15,
            Primitive::FloorStatusAck => 16,
            Primitive::Goodbye => 17,
            Primitive::GoodbyeAck => 18,
        }
    }

    pub fn from_u8(v: u8) -> Result<Self, Error> {
        Ok(match v {
            1 => Primitive::FloorRequest,
            2 => Primitive::FloorRelease,
            3 => Primitive::FloorRequestQuery,
            4 => Primitive::FloorRequestStatus,
            5 => Primitive::UserQuery,
            6 => Primitive::UserStatus,
            7 => Primitive::FloorQuery,
            8 => Primitive::FloorStatus,
            9 => Primitive::ChairAction,
            10 => Primitive::ChairActionAck,
            11 => Primitive::Hello,
            12 => Primitive::HelloAck,
            13 => Primitive::Error,
            14 => Primitive::FloorRequestStatusAck,
            15 => Primitive::ErrorAck,
            16 => Primitive::FloorStatusAck,
            17 => Primitive::Goodbye,
            18 => Primitive::GoodbyeAck,
            _ => return Err(Error::BadMessage("unknown BFCP primitive")),
        })
    }

    /// Whether this primitive acknowledges or rejects a request and therefore
    /// closes out a client transaction (RFC 4582 §8.2's reply set).
    pub fn is_reply(self) -> bool {
        matches!(
            self,
            Primitive::FloorRequestStatus
                | Primitive::UserStatus
                | Primitive::FloorStatus
                | Primitive::ChairActionAck
                | Primitive::HelloAck
                | Primitive::Error
                | Primitive::FloorRequestStatusAck
                | Primitive::ErrorAck
                | Primitive::FloorStatusAck
                | Primitive::GoodbyeAck
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub primitive: Primitive,
    pub conference_id: u32,
    pub transaction_id: u16,
    pub user_id: u16,
    pub attributes: Vec<Attribute>,
}

impl Message {
    pub fn new(primitive: Primitive, conference_id: u32, transaction_id: u16, user_id: u16) -> Self {
        Self { primitive, conference_id, transaction_id, user_id, attributes: Vec::new() }
    }

    pub fn with_attribute(mut self, kind: Kind) -> Self {
        self.attributes.push(Attribute::new(kind));
        self
    }

    pub fn attribute(&self, pick: impl Fn(&Kind) -> bool) -> Option<&Attribute> {
        self.attributes.iter().find(|a| pick(&a.kind))
    }

    /// Build an ERROR reply echoing this request's transaction triad, per
    /// RFC 4582 §8.3: conferences/users the agent rejects outright still get
    /// a well-formed reply rather than silence.
    pub fn error_reply(&self, code: u8, details: Vec<u8>) -> Message {
        Message::new(Primitive::Error, self.conference_id, self.transaction_id, self.user_id)
            .with_attribute(Kind::ErrorCode { code, details })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Buffer::with_capacity(HEADER_LEN + 32);
        let header = Header {
            primitive: self.primitive.as_u8(),
            conference_id: self.conference_id,
            transaction_id: self.transaction_id,
            user_id: self.user_id,
        };
        header.encode(&mut buf, 0);
        let attrs_start = buf.end();
        for attr in &self.attributes {
            // encode() never fails on the path used here; attribute sizes
            // are bounded well under 256 bytes by callers of this crate.
            attr.encode(&mut buf).expect("attribute too large to encode");
        }
        let attrs_len = buf.end() - attrs_start;
        debug_assert_eq!(attrs_len % 4, 0, "attributes must be 4-byte aligned");
        let length_words = (attrs_len / 4) as u16;
        buf.patch(2, &length_words.to_be_bytes());
        buf.into_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut buf = Buffer::from_slice(bytes);
        let (header, length_words) = Header::decode(&mut buf)?;
        let attrs_len = length_words as usize * 4;
        if buf.remaining() < attrs_len {
            return Err(Error::NeedsMoreData);
        }
        let attrs_end = buf.pos() + attrs_len;
        let mut attributes = Vec::new();
        while buf.pos() < attrs_end {
            attributes.push(Attribute::decode(&mut buf)?);
        }
        if buf.pos() != attrs_end {
            return Err(Error::BadMessage("attribute region length mismatch"));
        }
        Ok(Message {
            primitive: Primitive::from_u8(header.primitive)?,
            conference_id: header.conference_id,
            transaction_id: header.transaction_id,
            user_id: header.user_id,
            attributes,
        })
    }

    /// How many bytes a full message occupies at the front of `bytes`, if
    /// enough has arrived; used by [`crate::socket::BfcpSocket`] to frame a
    /// reliable byte stream.
    pub fn framed_len(bytes: &[u8]) -> Result<usize, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::NeedsMoreData);
        }
        let length_words = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        let total = HEADER_LEN + length_words * 4;
        if bytes.len() < total {
            return Err(Error::NeedsMoreData);
        }
        Ok(total)
    }
}

const _: () = assert!(ATTR_HDR_SIZE == 2);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_request_round_trips() {
        let msg = Message::new(Primitive::FloorRequest, 1, 1, 7)
            .with_attribute(Kind::FloorId(1))
            .with_attribute(Kind::FloorRequestStatus { floor_id: 1, children: Vec::new() });

        let bytes = msg.encode();
        assert_eq!(Message::framed_len(&bytes).unwrap(), bytes.len());

        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn framed_len_reports_needs_more_data_on_partial_header() {
        assert!(matches!(Message::framed_len(&[1, 2, 3]), Err(Error::NeedsMoreData)));
    }

    #[test]
    fn framed_len_reports_needs_more_data_on_partial_body() {
        let msg = Message::new(Primitive::Hello, 1, 1, 1);
        let bytes = msg.encode();
        assert!(matches!(Message::framed_len(&bytes[..bytes.len() - 1]), Err(Error::NeedsMoreData)));
    }

    #[test]
    fn error_reply_echoes_transaction_triad() {
        let request = Message::new(Primitive::FloorRequest, 9, 3, 4);
        let reply = request.error_reply(1, Vec::new());
        assert_eq!(reply.primitive, Primitive::Error);
        assert_eq!(reply.conference_id, 9);
        assert_eq!(reply.transaction_id, 3);
        assert_eq!(reply.user_id, 4);
    }
}
