use crate::Error;
use libre_buf::Buffer;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_REFERENCE: u8 = 0x07;
const OBJECT_END_MARKER: [u8; 3] = [0x00, 0x00, MARKER_OBJECT_END];

/// AMF0 value, per spec.md §4.6 plus the decode-only `Reference`/`Date`
/// markers the distillation dropped (supplemented from `amf_dec.c`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(OrderedDict),
    Null,
    EcmaArray(OrderedDict),
    StrictArray(Vec<Value>),
    /// Decode-only: `amf_dec.c`'s `date` marker (milliseconds since epoch,
    /// plus the timezone-offset field AMF0 carries but every encoder ignores).
    Date { millis: f64, tz: i16 },
}

/// Insertion-ordered `(key, value)` sequence with a side index for O(1)
/// lookup, per spec.md §3/§9 ("Dynamic type in AMF/ordered-dictionary").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedDict {
    entries: Vec<(String, Value)>,
}

impl OrderedDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns `None` on missing key or a type mismatch; never diagnoses
    /// which (spec.md §9 Open Questions: the source's two conflicting
    /// `odict_string` definitions resolve to silent `None`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(Value::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Value {
    pub fn encode(&self, buf: &mut Buffer) {
        match self {
            Value::Number(n) => {
                buf.write_u8(MARKER_NUMBER);
                buf.write_f64(*n);
            }
            Value::Boolean(b) => {
                buf.write_u8(MARKER_BOOLEAN);
                buf.write_u8(*b as u8);
            }
            Value::String(s) => {
                buf.write_u8(MARKER_STRING);
                encode_utf8(buf, s);
            }
            Value::Object(dict) => {
                buf.write_u8(MARKER_OBJECT);
                encode_pairs(buf, dict);
                buf.write_bytes(&OBJECT_END_MARKER);
            }
            Value::Null => buf.write_u8(MARKER_NULL),
            Value::EcmaArray(dict) => {
                buf.write_u8(MARKER_ECMA_ARRAY);
                buf.write_u32(dict.len() as u32);
                encode_pairs(buf, dict);
                buf.write_bytes(&OBJECT_END_MARKER);
            }
            Value::StrictArray(values) => {
                buf.write_u8(MARKER_STRICT_ARRAY);
                buf.write_u32(values.len() as u32);
                for v in values {
                    v.encode(buf);
                }
            }
            // Never constructed by an encoder in the original, matching
            // here: Date/Reference round-trip on decode only.
            Value::Date { millis, tz } => {
                buf.write_u8(MARKER_DATE);
                buf.write_f64(*millis);
                buf.write_u16(*tz as u16);
            }
        }
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        if buf.remaining() < 1 {
            return Err(Error::NeedsMoreData);
        }
        let marker = buf.read_u8()?;
        Self::decode_body(marker, buf)
    }

    fn decode_body(marker: u8, buf: &mut Buffer) -> Result<Self, Error> {
        match marker {
            MARKER_NUMBER => Ok(Value::Number(buf.read_f64()?)),
            MARKER_BOOLEAN => Ok(Value::Boolean(buf.read_u8()? != 0)),
            MARKER_STRING => Ok(Value::String(decode_utf8(buf)?)),
            MARKER_OBJECT => Ok(Value::Object(decode_pairs(buf)?)),
            MARKER_NULL => Ok(Value::Null),
            0x06 => Ok(Value::Null), // undefined, treated as null by every caller in this workspace
            MARKER_REFERENCE => {
                // AMF0 references an earlier-encoded complex value by its
                // encode-order index; this crate has no encode-order object
                // table to resolve against at decode time, so a reference
                // decodes to Null rather than panicking (spec.md §9 doesn't
                // name this type; decoding it at all is the supplement).
                let _index = buf.read_u16()?;
                Ok(Value::Null)
            }
            MARKER_ECMA_ARRAY => {
                let _count = buf.read_u32()?;
                Ok(Value::EcmaArray(decode_pairs(buf)?))
            }
            MARKER_STRICT_ARRAY => {
                let count = buf.read_u32()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(Value::decode(buf)?);
                }
                Ok(Value::StrictArray(values))
            }
            MARKER_DATE => {
                let millis = buf.read_f64()?;
                let tz = buf.read_u16()? as i16;
                Ok(Value::Date { millis, tz })
            }
            MARKER_OBJECT_END => Err(Error::BadMessage("unexpected object-end marker")),
            _ => Err(Error::BadMessage("unknown AMF0 type marker")),
        }
    }
}

fn encode_utf8(buf: &mut Buffer, s: &str) {
    let bytes = s.as_bytes();
    assert!(bytes.len() <= u16::MAX as usize, "AMF0 string exceeds 65535 bytes");
    buf.write_u16(bytes.len() as u16);
    buf.write_bytes(bytes);
}

fn decode_utf8(buf: &mut Buffer) -> Result<String, Error> {
    let len = buf.read_u16()? as usize;
    let bytes = buf.read_bytes(len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::BadMessage("AMF0 string is not valid UTF-8"))
}

fn encode_pairs(buf: &mut Buffer, dict: &OrderedDict) {
    for (key, value) in dict.iter() {
        encode_utf8(buf, key);
        value.encode(buf);
    }
}

fn decode_pairs(buf: &mut Buffer) -> Result<OrderedDict, Error> {
    let mut dict = OrderedDict::new();
    loop {
        // a zero-length key followed by the object-end marker terminates
        // the pair list; peek both without consuming on the happy path.
        if buf.remaining() >= 3 && &buf.unread()[..2] == [0x00, 0x00] && buf.unread()[2] == MARKER_OBJECT_END {
            buf.advance(3)?;
            return Ok(dict);
        }
        let key = decode_utf8(buf)?;
        let value = Value::decode(buf)?;
        dict.insert(key, value);
    }
}

/// Decode consecutive top-level AMF0 values out of `bytes` (a command's
/// argument list, or an RTMP message body in general) until exhausted.
pub fn decode_root(bytes: &[u8]) -> Result<Vec<Value>, Error> {
    let mut buf = Buffer::from_slice(bytes);
    let mut values = Vec::new();
    while buf.remaining() > 0 {
        values.push(Value::decode(&mut buf)?);
    }
    Ok(values)
}

pub fn encode_root(values: &[Value]) -> Vec<u8> {
    let mut buf = Buffer::with_capacity(64);
    for v in values {
        v.encode(&mut buf);
    }
    buf.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_round_trips_in_insertion_order() {
        let dict = OrderedDict::new()
            .with("app", Value::String("live".into()))
            .with("fpad", Value::Boolean(false))
            .with("capabilities", Value::Number(15.0));
        let value = Value::Object(dict.clone());

        let mut buf = Buffer::with_capacity(64);
        value.encode(&mut buf);

        let expected: &[u8] = &[
            0x03, 0x00, 0x03, b'a', b'p', b'p', 0x02, 0x00, 0x04, b'l', b'i', b'v', b'e', 0x00, 0x04, b'f', b'p',
            b'a', b'd', 0x01, 0x00, 0x00, 0x0c, b'c', b'a', b'p', b'a', b'b', b'i', b'l', b'i', b't', b'i', b'e',
            b's', 0x00, 0x40, 0x2E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09,
        ];
        assert_eq!(buf.written(), expected);

        let mut reader = Buffer::from_vec(buf.into_vec());
        let decoded = Value::decode(&mut reader).unwrap();
        assert_eq!(decoded, value);
        match decoded {
            Value::Object(d) => {
                let keys: Vec<&str> = d.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["app", "fpad", "capabilities"]);
            }
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn number_bool_string_null_round_trip() {
        for value in [Value::Number(42.5), Value::Boolean(true), Value::String("x".into()), Value::Null] {
            let mut buf = Buffer::with_capacity(32);
            value.encode(&mut buf);
            let mut reader = Buffer::from_vec(buf.into_vec());
            assert_eq!(Value::decode(&mut reader).unwrap(), value);
        }
    }

    #[test]
    fn ecma_array_and_strict_array_round_trip() {
        let ecma = Value::EcmaArray(OrderedDict::new().with("0", Value::Number(1.0)));
        let strict = Value::StrictArray(vec![Value::Number(1.0), Value::String("a".into())]);
        for value in [ecma, strict] {
            let mut buf = Buffer::with_capacity(32);
            value.encode(&mut buf);
            let mut reader = Buffer::from_vec(buf.into_vec());
            assert_eq!(Value::decode(&mut reader).unwrap(), value);
        }
    }

    #[test]
    fn date_decodes_without_an_encoder_path() {
        let mut buf = Buffer::with_capacity(16);
        buf.write_u8(MARKER_DATE);
        buf.write_f64(12345.0);
        buf.write_u16(0);
        let mut reader = Buffer::from_vec(buf.into_vec());
        assert_eq!(Value::decode(&mut reader).unwrap(), Value::Date { millis: 12345.0, tz: 0 });
    }

    #[test]
    fn decode_root_enumerates_consecutive_top_level_values() {
        let values = vec![Value::String("onStatus".into()), Value::Number(0.0), Value::Null];
        let bytes = encode_root(&values);
        assert_eq!(decode_root(&bytes).unwrap(), values);
    }

    #[test]
    fn get_returns_none_on_missing_key_or_type_mismatch() {
        let dict = OrderedDict::new().with("n", Value::Number(1.0));
        assert!(dict.get_string("missing").is_none());
        assert!(dict.get_string("n").is_none());
    }
}
