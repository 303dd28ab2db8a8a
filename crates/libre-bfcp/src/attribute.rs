use crate::Error;
use libre_buf::Buffer;

/// BFCP attribute type numbers (RFC 4582 §5.2).
mod ty {
    pub const BENEFICIARY_ID: u8 = 1;
    pub const FLOOR_ID: u8 = 2;
    pub const FLOOR_REQUEST_ID: u8 = 3;
    pub const PRIORITY: u8 = 4;
    pub const REQUEST_STATUS: u8 = 5;
    pub const ERROR_CODE: u8 = 6;
    pub const ERROR_INFO: u8 = 7;
    pub const PARTICIPANT_PROV_INFO: u8 = 8;
    pub const STATUS_INFO: u8 = 9;
    pub const SUPPORTED_ATTRIBUTES: u8 = 10;
    pub const SUPPORTED_PRIMITIVES: u8 = 11;
    pub const USER_DISPLAY_NAME: u8 = 12;
    pub const USER_URI: u8 = 13;
    pub const BENEFICIARY_INFO: u8 = 14;
    pub const FLOOR_REQUEST_INFO: u8 = 15;
    pub const REQUESTED_BY_INFO: u8 = 16;
    pub const FLOOR_REQUEST_STATUS: u8 = 17;
    pub const OVERALL_REQUEST_STATUS: u8 = 18;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    BeneficiaryId(u16),
    FloorId(u16),
    FloorRequestId(u16),
    Priority(u8),
    RequestStatus { status: u8, queue_position: u8 },
    ErrorCode { code: u8, details: Vec<u8> },
    ErrorInfo(String),
    ParticipantProvInfo(String),
    StatusInfo(String),
    SupportedAttributes(Vec<u8>),
    SupportedPrimitives(Vec<u8>),
    UserDisplayName(String),
    UserUri(String),
    BeneficiaryInfo { beneficiary_id: u16, children: Vec<Attribute> },
    FloorRequestInfo { floor_request_id: u16, children: Vec<Attribute> },
    RequestedByInfo { requested_by_id: u16, children: Vec<Attribute> },
    FloorRequestStatus { floor_id: u16, children: Vec<Attribute> },
    OverallRequestStatus { floor_request_id: u16, children: Vec<Attribute> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub mandatory: bool,
    pub kind: Kind,
}

impl Attribute {
    pub fn new(kind: Kind) -> Self {
        Self { mandatory: true, kind }
    }

    fn type_number(&self) -> u8 {
        match &self.kind {
            Kind::BeneficiaryId(_) => ty::BENEFICIARY_ID,
            Kind::FloorId(_) => ty::FLOOR_ID,
            Kind::FloorRequestId(_) => ty::FLOOR_REQUEST_ID,
            Kind::Priority(_) => ty::PRIORITY,
            Kind::RequestStatus { .. } => ty::REQUEST_STATUS,
            Kind::ErrorCode { .. } => ty::ERROR_CODE,
            Kind::ErrorInfo(_) => ty::ERROR_INFO,
            Kind::ParticipantProvInfo(_) => ty::PARTICIPANT_PROV_INFO,
            Kind::StatusInfo(_) => ty::STATUS_INFO,
            Kind::SupportedAttributes(_) => ty::SUPPORTED_ATTRIBUTES,
            Kind::SupportedPrimitives(_) => ty::SUPPORTED_PRIMITIVES,
            Kind::UserDisplayName(_) => ty::USER_DISPLAY_NAME,
            Kind::UserUri(_) => ty::USER_URI,
            Kind::BeneficiaryInfo { .. } => ty::BENEFICIARY_INFO,
            Kind::FloorRequestInfo { .. } => ty::FLOOR_REQUEST_INFO,
            Kind::RequestedByInfo { .. } => ty::REQUESTED_BY_INFO,
            Kind::FloorRequestStatus { .. } => ty::FLOOR_REQUEST_STATUS,
            Kind::OverallRequestStatus { .. } => ty::OVERALL_REQUEST_STATUS,
        }
    }

    fn is_grouped(type_num: u8) -> bool {
        matches!(
            type_num,
            ty::BENEFICIARY_INFO | ty::FLOOR_REQUEST_INFO | ty::REQUESTED_BY_INFO | ty::FLOOR_REQUEST_STATUS | ty::OVERALL_REQUEST_STATUS
        )
    }

    /// Write the 2-byte header, the value, then pad the whole attribute to a
    /// 4-byte boundary. The header's `total_length` byte records header+value
    /// *before* padding, per RFC 4582 §5.2.
    pub fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        let start = buf.end();
        buf.write_u8(0); // placeholder type/M
        buf.write_u8(0); // placeholder length

        match &self.kind {
            Kind::BeneficiaryId(id) | Kind::FloorId(id) | Kind::FloorRequestId(id) => buf.write_u16(*id),
            Kind::Priority(p) => buf.write_u8(*p),
            Kind::RequestStatus { status, queue_position } => {
                buf.write_u8(*status);
                buf.write_u8(*queue_position);
            }
            Kind::ErrorCode { code, details } => {
                buf.write_u8(*code);
                buf.write_bytes(details);
            }
            Kind::ErrorInfo(s) | Kind::ParticipantProvInfo(s) | Kind::StatusInfo(s) | Kind::UserDisplayName(s) | Kind::UserUri(s) => {
                buf.write_bytes(s.as_bytes());
            }
            Kind::SupportedAttributes(v) | Kind::SupportedPrimitives(v) => buf.write_bytes(v),
            Kind::BeneficiaryInfo { beneficiary_id, children } => {
                buf.write_u16(*beneficiary_id);
                for child in children {
                    child.encode(buf)?;
                }
            }
            Kind::FloorRequestInfo { floor_request_id, children } => {
                buf.write_u16(*floor_request_id);
                for child in children {
                    child.encode(buf)?;
                }
            }
            Kind::RequestedByInfo { requested_by_id, children } => {
                buf.write_u16(*requested_by_id);
                for child in children {
                    child.encode(buf)?;
                }
            }
            Kind::FloorRequestStatus { floor_id, children } => {
                buf.write_u16(*floor_id);
                for child in children {
                    child.encode(buf)?;
                }
            }
            Kind::OverallRequestStatus { floor_request_id, children } => {
                buf.write_u16(*floor_request_id);
                for child in children {
                    child.encode(buf)?;
                }
            }
        }

        let total_length = buf.end() - start;
        if total_length > u8::MAX as usize {
            return Err(Error::InvalidArgument("BFCP attribute value too long for a 1-byte length field"));
        }
        let type_num = self.type_number();
        buf.patch(start, &[(type_num << 1) | u8::from(self.mandatory), total_length as u8]);
        buf.pad_to(4);
        Ok(())
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        if buf.remaining() < ATTR_HDR_SIZE {
            return Err(Error::NeedsMoreData);
        }
        let start = buf.pos();
        let type_byte = buf.read_u8()?;
        let total_length = buf.read_u8()? as usize;
        if total_length < ATTR_HDR_SIZE {
            return Err(Error::BadMessage("attribute total_length shorter than its own header"));
        }
        let value_len = total_length - ATTR_HDR_SIZE;
        if buf.remaining() < value_len {
            return Err(Error::NeedsMoreData);
        }

        let type_num = type_byte >> 1;
        let mandatory = type_byte & 1 == 1;

        let kind = if Self::is_grouped(type_num) {
            let preamble = buf.read_u16()?;
            let mut children = Vec::new();
            let children_end = buf.pos() + (value_len - 2);
            while buf.pos() < children_end {
                children.push(Attribute::decode(buf)?);
            }
            if buf.pos() != children_end {
                return Err(Error::BadMessage("grouped attribute children overran declared length"));
            }
            match type_num {
                ty::BENEFICIARY_INFO => Kind::BeneficiaryInfo { beneficiary_id: preamble, children },
                ty::FLOOR_REQUEST_INFO => Kind::FloorRequestInfo { floor_request_id: preamble, children },
                ty::REQUESTED_BY_INFO => Kind::RequestedByInfo { requested_by_id: preamble, children },
                ty::FLOOR_REQUEST_STATUS => Kind::FloorRequestStatus { floor_id: preamble, children },
                ty::OVERALL_REQUEST_STATUS => Kind::OverallRequestStatus { floor_request_id: preamble, children },
                _ => unreachable!("is_grouped only returns true for the variants above"),
            }
        } else {
            let value = buf.read_bytes(value_len)?;
            match type_num {
                ty::BENEFICIARY_ID => Kind::BeneficiaryId(u16_from(value)?),
                ty::FLOOR_ID => Kind::FloorId(u16_from(value)?),
                ty::FLOOR_REQUEST_ID => Kind::FloorRequestId(u16_from(value)?),
                ty::PRIORITY => Kind::Priority(*value.first().ok_or(Error::BadMessage("empty PRIORITY value"))?),
                ty::REQUEST_STATUS => {
                    if value.len() < 2 {
                        return Err(Error::BadMessage("REQUEST-STATUS value too short"));
                    }
                    Kind::RequestStatus { status: value[0], queue_position: value[1] }
                }
                ty::ERROR_CODE => {
                    let code = *value.first().ok_or(Error::BadMessage("empty ERROR-CODE value"))?;
                    Kind::ErrorCode { code, details: value[1..].to_vec() }
                }
                ty::ERROR_INFO => Kind::ErrorInfo(string_from(value)?),
                ty::PARTICIPANT_PROV_INFO => Kind::ParticipantProvInfo(string_from(value)?),
                ty::STATUS_INFO => Kind::StatusInfo(string_from(value)?),
                ty::SUPPORTED_ATTRIBUTES => Kind::SupportedAttributes(value.to_vec()),
                ty::SUPPORTED_PRIMITIVES => Kind::SupportedPrimitives(value.to_vec()),
                ty::USER_DISPLAY_NAME => Kind::UserDisplayName(string_from(value)?),
                ty::USER_URI => Kind::UserUri(string_from(value)?),
                other => return Err(Error::BadMessage(unknown_type_name(other))),
            }
        };

        // skip padding up to the next 4-byte boundary relative to the
        // attribute's own start, matching how `encode` padded it.
        let consumed = buf.pos() - start;
        let pad = (4 - consumed % 4) % 4;
        buf.advance(pad)?;

        Ok(Self { mandatory, kind })
    }
}

fn u16_from(value: &[u8]) -> Result<u16, Error> {
    value.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]])).ok_or(Error::BadMessage("attribute value too short for u16"))
}

fn string_from(value: &[u8]) -> Result<String, Error> {
    String::from_utf8(value.to_vec()).map_err(|_| Error::BadMessage("attribute value is not valid UTF-8"))
}

fn unknown_type_name(_type_num: u8) -> &'static str {
    "unknown mandatory attribute type"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_id_round_trips_to_four_bytes() {
        let attr = Attribute::new(Kind::FloorId(1));
        let mut buf = Buffer::with_capacity(8);
        attr.encode(&mut buf).unwrap();
        let bytes = buf.into_vec();
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes, vec![(ty::FLOOR_ID << 1) | 1, 4, 0, 1]);

        let mut reader = Buffer::from_vec(bytes);
        let decoded = Attribute::decode(&mut reader).unwrap();
        assert_eq!(decoded, attr);
    }

    #[test]
    fn string_attribute_is_padded_to_four_bytes() {
        let attr = Attribute::new(Kind::UserDisplayName("ab".to_string()));
        let mut buf = Buffer::with_capacity(8);
        attr.encode(&mut buf).unwrap();
        let bytes = buf.into_vec();
        // header(2) + "ab"(2) = 4, already aligned.
        assert_eq!(bytes.len(), 4);

        let attr3 = Attribute::new(Kind::UserDisplayName("abc".to_string()));
        let mut buf3 = Buffer::with_capacity(8);
        attr3.encode(&mut buf3).unwrap();
        let bytes3 = buf3.into_vec();
        // header(2) + "abc"(3) = 5, padded up to 8.
        assert_eq!(bytes3.len(), 8);
        assert_eq!(bytes3[5..], [0, 0, 0]);
    }

    #[test]
    fn grouped_attribute_round_trips_with_children() {
        let attr = Attribute::new(Kind::FloorRequestInfo {
            floor_request_id: 7,
            children: vec![
                Attribute::new(Kind::OverallRequestStatus {
                    floor_request_id: 7,
                    children: vec![Attribute::new(Kind::RequestStatus { status: 2, queue_position: 0 })],
                }),
                Attribute::new(Kind::Priority(3)),
            ],
        });

        let mut buf = Buffer::with_capacity(64);
        attr.encode(&mut buf).unwrap();
        let mut reader = Buffer::from_vec(buf.into_vec());
        let decoded = Attribute::decode(&mut reader).unwrap();
        assert_eq!(decoded, attr);
    }

    #[test]
    fn total_length_below_header_size_is_bad_message() {
        let mut reader = Buffer::from_vec(vec![(ty::FLOOR_ID << 1) | 1, 1]);
        assert!(matches!(Attribute::decode(&mut reader), Err(Error::BadMessage(_))));
    }
}
