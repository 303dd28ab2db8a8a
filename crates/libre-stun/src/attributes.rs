use crate::message::{pad4, Message};
use crate::{Error, Result, TransactionId, FINGERPRINT_XOR, MAGIC_COOKIE};
use libre_crypto::HmacSha1;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A STUN attribute whose value can be decoded/encoded without any outside
/// context (no message bytes, no transaction id, no key).
pub trait Attribute: Sized {
    const TYPE: u16;

    fn decode(value: &[u8]) -> Result<Self>;
    fn encode_value(&self, out: &mut Vec<u8>);
}

macro_rules! string_attribute {
    ($name:ident, $type:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(pub String);

        impl Attribute for $name {
            const TYPE: u16 = $type;

            fn decode(value: &[u8]) -> Result<Self> {
                std::str::from_utf8(value)
                    .map(|s| Self(s.to_owned()))
                    .map_err(|_| Error::BadMessage("attribute value is not valid UTF-8"))
            }

            fn encode_value(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(self.0.as_bytes());
            }
        }
    };
}

string_attribute!(Username, 0x0006);
string_attribute!(Software, 0x8022);
string_attribute!(Realm, 0x0014);
string_attribute!(Nonce, 0x0015);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority(pub u32);

impl Attribute for Priority {
    const TYPE: u16 = 0x0024;

    fn decode(value: &[u8]) -> Result<Self> {
        if value.len() != 4 {
            return Err(Error::BadMessage("PRIORITY must be 4 bytes"));
        }
        Ok(Self(u32::from_be_bytes(value.try_into().unwrap())))
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0.to_be_bytes());
    }
}

macro_rules! u64_attribute {
    ($name:ident, $type:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub u64);

        impl Attribute for $name {
            const TYPE: u16 = $type;

            fn decode(value: &[u8]) -> Result<Self> {
                if value.len() != 8 {
                    return Err(Error::BadMessage("tiebreaker attribute must be 8 bytes"));
                }
                Ok(Self(u64::from_be_bytes(value.try_into().unwrap())))
            }

            fn encode_value(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.0.to_be_bytes());
            }
        }
    };
}

u64_attribute!(IceControlling, 0x802A);
u64_attribute!(IceControlled, 0x8029);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseCandidate;

impl Attribute for UseCandidate {
    const TYPE: u16 = 0x0025;

    fn decode(value: &[u8]) -> Result<Self> {
        if !value.is_empty() {
            return Err(Error::BadMessage("USE-CANDIDATE carries no value"));
        }
        Ok(Self)
    }

    fn encode_value(&self, _out: &mut Vec<u8>) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: u16,
    pub reason: String,
}

impl Attribute for ErrorCode {
    const TYPE: u16 = 0x0009;

    fn decode(value: &[u8]) -> Result<Self> {
        if value.len() < 4 {
            return Err(Error::BadMessage("ERROR-CODE shorter than its fixed header"));
        }
        let class = value[2] as u16 & 0x07;
        let number = value[3] as u16;
        if !(3..=6).contains(&class) {
            return Err(Error::BadMessage("ERROR-CODE class out of range"));
        }
        let reason = std::str::from_utf8(&value[4..])
            .map_err(|_| Error::BadMessage("ERROR-CODE reason is not valid UTF-8"))?
            .to_owned();
        Ok(Self {
            code: class * 100 + number,
            reason,
        })
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[0, 0]);
        out.push((self.code / 100) as u8);
        out.push((self.code % 100) as u8);
        out.extend_from_slice(self.reason.as_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAttributes(pub Vec<u16>);

impl Attribute for UnknownAttributes {
    const TYPE: u16 = 0x000A;

    fn decode(value: &[u8]) -> Result<Self> {
        if value.len() % 2 != 0 {
            return Err(Error::BadMessage("UNKNOWN-ATTRIBUTES must hold 16-bit entries"));
        }
        Ok(Self(
            value
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect(),
        ))
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        for typ in &self.0 {
            out.extend_from_slice(&typ.to_be_bytes());
        }
    }
}

fn decode_sockaddr(value: &[u8]) -> Result<(u8, u16, Vec<u8>)> {
    if value.len() < 4 {
        return Err(Error::BadMessage("address attribute shorter than its fixed header"));
    }
    let family = value[1];
    let port = u16::from_be_bytes([value[2], value[3]]);
    let addr_bytes = &value[4..];
    match family {
        0x01 if addr_bytes.len() == 4 => Ok((family, port, addr_bytes.to_vec())),
        0x02 if addr_bytes.len() == 16 => Ok((family, port, addr_bytes.to_vec())),
        _ => Err(Error::BadMessage("unsupported or truncated address family")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddress(pub SocketAddr);

impl Attribute for MappedAddress {
    const TYPE: u16 = 0x0001;

    fn decode(value: &[u8]) -> Result<Self> {
        let (family, port, addr_bytes) = decode_sockaddr(value)?;
        let ip = match family {
            0x01 => IpAddr::V4(Ipv4Addr::new(addr_bytes[0], addr_bytes[1], addr_bytes[2], addr_bytes[3])),
            _ => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&addr_bytes);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
        };
        Ok(Self(SocketAddr::new(ip, port)))
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        out.push(0);
        match self.0.ip() {
            IpAddr::V4(ip) => {
                out.push(0x01);
                out.extend_from_slice(&self.0.port().to_be_bytes());
                out.extend_from_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                out.push(0x02);
                out.extend_from_slice(&self.0.port().to_be_bytes());
                out.extend_from_slice(&ip.octets());
            }
        }
    }
}

/// XOR-MAPPED-ADDRESS needs the transaction id to unmask an IPv6 address, so
/// it cannot implement [`Attribute`] (whose `decode` only sees the raw
/// value); [`Message::xor_mapped_address`] and
/// [`crate::MessageBuilder::add_xor_mapped_address`] call these directly.
pub const XOR_MAPPED_ADDRESS_TYPE: u16 = 0x0020;

pub fn decode_xor_mapped_address(value: &[u8], tid: TransactionId) -> Result<SocketAddr> {
    let (family, xport, xaddr) = decode_sockaddr(value)?;
    let port = xport ^ (MAGIC_COOKIE >> 16) as u16;

    let ip = match family {
        0x01 => {
            let cookie = MAGIC_COOKIE.to_be_bytes();
            let mut octets = [0u8; 4];
            for i in 0..4 {
                octets[i] = xaddr[i] ^ cookie[i];
            }
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        _ => {
            let mut mask = [0u8; 16];
            mask[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            mask[4..16].copy_from_slice(tid.as_bytes());
            let mut octets = [0u8; 16];
            for i in 0..16 {
                octets[i] = xaddr[i] ^ mask[i];
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    };

    Ok(SocketAddr::new(ip, port))
}

pub fn encode_xor_mapped_address(addr: SocketAddr, tid: TransactionId, out: &mut Vec<u8>) {
    out.push(0);
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;

    match addr.ip() {
        IpAddr::V4(ip) => {
            out.push(0x01);
            out.extend_from_slice(&port.to_be_bytes());
            let cookie = MAGIC_COOKIE.to_be_bytes();
            for (b, c) in ip.octets().iter().zip(cookie.iter()) {
                out.push(b ^ c);
            }
        }
        IpAddr::V6(ip) => {
            out.push(0x02);
            out.extend_from_slice(&port.to_be_bytes());
            let mut mask = [0u8; 16];
            mask[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            mask[4..16].copy_from_slice(tid.as_bytes());
            for (b, m) in ip.octets().iter().zip(mask.iter()) {
                out.push(b ^ m);
            }
        }
    }
}

pub const MESSAGE_INTEGRITY_TYPE: u16 = 0x0008;
pub const FINGERPRINT_TYPE: u16 = 0x8028;

/// Verify MESSAGE-INTEGRITY against `key`, hashing exactly the bytes that
/// preceded the attribute on the wire with the length field it shipped with
/// (not the length after any later attributes, e.g. FINGERPRINT, were added).
pub fn verify_message_integrity(msg: &Message, key: &[u8]) -> Result<()> {
    let attr = msg
        .find_raw(MESSAGE_INTEGRITY_TYPE)
        .ok_or(Error::BadMessage("missing MESSAGE-INTEGRITY"))?;
    if attr.value.len() != 20 {
        return Err(Error::BadMessage("MESSAGE-INTEGRITY must be 20 bytes"));
    }

    let offset = msg
        .offset_before(MESSAGE_INTEGRITY_TYPE)
        .expect("attribute located by find_raw must have an offset");

    let mut covered = msg.as_bytes()[..offset].to_vec();
    patch_length_for(&mut covered, offset + 4 + 20 - crate::message::HEADER_LEN);

    let mac = HmacSha1::new(key);
    let computed = mac.digest_full(&covered);

    if libre_crypto::constant_time_eq(&computed, &attr.value) {
        Ok(())
    } else {
        Err(Error::Unauthenticated)
    }
}

/// Verify the trailing FINGERPRINT attribute, which must be the last
/// attribute in the message and covers everything before it.
pub fn verify_fingerprint(msg: &Message) -> Result<()> {
    let attr = msg
        .find_raw(FINGERPRINT_TYPE)
        .ok_or(Error::BadMessage("missing FINGERPRINT"))?;
    if attr.value.len() != 4 {
        return Err(Error::BadMessage("FINGERPRINT must be 4 bytes"));
    }

    let offset = msg
        .offset_before(FINGERPRINT_TYPE)
        .expect("attribute located by find_raw must have an offset");

    let mut covered = msg.as_bytes()[..offset].to_vec();
    patch_length_for(&mut covered, offset + 4 + 4 - crate::message::HEADER_LEN);

    let crc = crc32fast::hash(&covered) ^ FINGERPRINT_XOR;
    let received = u32::from_be_bytes(attr.value[..4].try_into().unwrap());

    if crc == received {
        Ok(())
    } else {
        Err(Error::BadMessage("FINGERPRINT mismatch"))
    }
}

fn patch_length_for(covered: &mut [u8], length: usize) {
    covered[2..4].copy_from_slice(&(length as u16).to_be_bytes());
}

pub(crate) fn padded_attribute_len(value_len: usize) -> usize {
    4 + pad4(value_len)
}
