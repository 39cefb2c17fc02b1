//! The typed payload an item may carry alongside its operands.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;

use crate::error::DecodeError;
use crate::leb128;

/// A primitive value attached to a syntactic item.
///
/// Payloads are totally ordered: first by [`DataKind`]
/// (`Boolean < Integer < Text < Bytes`), then within a kind. Byte sequences
/// order by length first and then byte by byte, treating each byte as a
/// signed value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Data {
    /// A boolean literal.
    Boolean(bool),
    /// An arbitrary-precision integer.
    Integer(BigInt),
    /// A text value (identifier, string literal, ...).
    Text(String),
    /// An opaque byte sequence.
    Bytes(Vec<u8>),
}

/// The kind of a [`Data`] payload, with its fixed numeric tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataKind {
    /// Tag 0.
    Boolean = 0,
    /// Tag 1.
    Integer = 1,
    /// Tag 2.
    Text = 2,
    /// Tag 3.
    Bytes = 3,
}

impl DataKind {
    /// Returns the numeric tag used for ordering and on the wire.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Looks up the kind for a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Boolean),
            1 => Some(Self::Integer),
            2 => Some(Self::Text),
            3 => Some(Self::Bytes),
            _ => None,
        }
    }
}

impl Data {
    /// Returns the kind of this payload.
    pub fn kind(&self) -> DataKind {
        match self {
            Self::Boolean(_) => DataKind::Boolean,
            Self::Integer(_) => DataKind::Integer,
            Self::Text(_) => DataKind::Text,
            Self::Bytes(_) => DataKind::Bytes,
        }
    }

    /// Returns the text if this is a [`Data::Text`] payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.push(self.kind().tag());
        match self {
            Self::Boolean(b) => out.push(u8::from(*b)),
            Self::Integer(i) => leb128::write_bytes(out, &i.to_signed_bytes_le()),
            Self::Text(s) => leb128::write_str(out, s),
            Self::Bytes(b) => leb128::write_bytes(out, b),
        }
    }

    pub(crate) fn read(bytes: &[u8], offset: &mut usize) -> Result<Self, DecodeError> {
        let tag = leb128::read_byte(bytes, offset)?;
        let kind = DataKind::from_tag(tag).ok_or(DecodeError::UnknownDataKind { tag })?;
        Ok(match kind {
            DataKind::Boolean => match leb128::read_byte(bytes, offset)? {
                0 => Self::Boolean(false),
                1 => Self::Boolean(true),
                byte => return Err(DecodeError::InvalidBoolean { byte }),
            },
            DataKind::Integer => {
                Self::Integer(BigInt::from_signed_bytes_le(leb128::read_bytes(bytes, offset)?))
            }
            DataKind::Text => Self::Text(leb128::read_str(bytes, offset)?),
            DataKind::Bytes => Self::Bytes(leb128::read_bytes(bytes, offset)?.to_vec()),
        })
    }
}

impl Ord for Data {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .map(|&x| x as i8)
                    .cmp(b.iter().map(|&x| x as i8))
            }),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl PartialOrd for Data {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Data {
    fn from(i: i64) -> Self {
        Self::Integer(BigInt::from(i))
    }
}

impl From<BigInt> for Data {
    fn from(i: BigInt) -> Self {
        Self::Integer(i)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Data {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_order_independent_of_value() {
        let t = Data::from(true);
        let i = Data::from(-1_000_000);
        let s = Data::from("");
        let b = Data::from(Vec::new());
        assert!(t < i);
        assert!(i < s);
        assert!(s < b);
        assert!(Data::from(false) < Data::from(i64::MIN));
        assert!(Data::from(i64::MAX) < Data::from("a"));
    }

    #[test]
    fn absent_payload_sorts_first() {
        let none: Option<Data> = None;
        assert!(none < Some(Data::from(false)));
        assert_eq!(none.cmp(&None), Ordering::Equal);
    }

    #[test]
    fn integers_order_by_magnitude() {
        let big: BigInt = "123456789012345678901234567890".parse().unwrap();
        assert!(Data::from(5) < Data::from(big.clone()));
        assert!(Data::from(-big) < Data::from(-5));
    }

    #[test]
    fn bytes_order_by_length_first() {
        assert!(Data::from(vec![0x7f; 2]) < Data::from(vec![0x00; 3]));
    }

    #[test]
    fn bytes_compare_as_signed() {
        // 0x80 is -128 as a signed byte, so it orders below 0x01.
        assert!(Data::from(vec![0x80]) < Data::from(vec![0x01]));
    }

    #[test]
    fn text_orders_lexically() {
        assert!(Data::from("abc") < Data::from("abd"));
        assert!(Data::from("ab") < Data::from("abc"));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Data::from(true).to_string(), "true");
        assert_eq!(Data::from(-42).to_string(), "-42");
        assert_eq!(Data::from("x").to_string(), "\"x\"");
        assert_eq!(Data::from(vec![0xde, 0xad]).to_string(), "0xdead");
    }

    #[test]
    fn wire_encoding_of_each_kind() {
        let values = [
            Data::from(false),
            Data::from(true),
            Data::from(-129),
            Data::from("name"),
            Data::from(vec![1, 2, 3]),
        ];
        let mut buf = Vec::new();
        for v in &values {
            v.write(&mut buf);
        }
        let mut off = 0;
        for v in &values {
            assert_eq!(&Data::read(&buf, &mut off).unwrap(), v);
        }
        assert_eq!(off, buf.len());
    }

    #[test]
    fn unknown_kind_tag_rejected() {
        let mut off = 0;
        assert_eq!(
            Data::read(&[9], &mut off),
            Err(DecodeError::UnknownDataKind { tag: 9 })
        );
    }

    #[test]
    fn invalid_boolean_rejected() {
        let mut off = 0;
        assert_eq!(
            Data::read(&[0, 2], &mut off),
            Err(DecodeError::InvalidBoolean { byte: 2 })
        );
    }
}
