//! Unsigned LEB128 varints and the length-prefixed primitives built on them.
//!
//! Every integer in the record stream (opcodes, operand indices, pool indices,
//! lengths) is written as an unsigned LEB128 varint. Readers take the input
//! slice and a cursor which they advance past whatever they consume.

use crate::error::DecodeError;

/// Longest encoding of a `u64`: ten groups of seven bits.
const MAX_VARINT_LEN: usize = 10;

/// Reads an unsigned LEB128 integer as `u64`, advancing `offset`.
///
/// `offset` is left untouched on error.
pub fn read_u64(bytes: &[u8], offset: &mut usize) -> Result<u64, DecodeError> {
    let rest = bytes.get(*offset..).unwrap_or_default();
    let Some(last) = rest
        .iter()
        .take(MAX_VARINT_LEN)
        .position(|b| b & 0x80 == 0)
    else {
        return Err(if rest.len() < MAX_VARINT_LEN {
            DecodeError::UnexpectedEof
        } else {
            DecodeError::InvalidVarint
        });
    };
    // Most significant group first, so overflow shows up before the shift.
    let value = rest[..=last].iter().rev().try_fold(0u64, |acc, b| {
        if acc > u64::MAX >> 7 {
            return Err(DecodeError::InvalidVarint);
        }
        Ok((acc << 7) | u64::from(b & 0x7f))
    })?;
    *offset += last + 1;
    Ok(value)
}

/// Reads a varint that must fit in a `u32`.
pub fn read_u32(bytes: &[u8], offset: &mut usize, field: &'static str) -> Result<u32, DecodeError> {
    let value = read_u64(bytes, offset)?;
    u32::try_from(value).map_err(|_| DecodeError::OutOfRange { value, field })
}

/// Reads a varint that must fit in a `u16`.
pub fn read_u16(bytes: &[u8], offset: &mut usize, field: &'static str) -> Result<u16, DecodeError> {
    let value = read_u64(bytes, offset)?;
    u16::try_from(value).map_err(|_| DecodeError::OutOfRange { value, field })
}

/// Reads a length prefix and checks that at least `len * min_item_size`
/// bytes remain, so a corrupt length cannot trigger a huge allocation.
pub fn read_len(bytes: &[u8], offset: &mut usize, min_item_size: usize) -> Result<usize, DecodeError> {
    let value = read_u64(bytes, offset)?;
    let len = usize::try_from(value).map_err(|_| DecodeError::OutOfRange {
        value,
        field: "length",
    })?;
    let remaining = bytes.len().saturating_sub(*offset);
    if len.saturating_mul(min_item_size) > remaining {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(len)
}

/// Reads a length-prefixed byte string.
pub fn read_bytes<'a>(bytes: &'a [u8], offset: &mut usize) -> Result<&'a [u8], DecodeError> {
    let len = read_len(bytes, offset, 1)?;
    let slice = &bytes[*offset..*offset + len];
    *offset += len;
    Ok(slice)
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_str(bytes: &[u8], offset: &mut usize) -> Result<String, DecodeError> {
    let raw = read_bytes(bytes, offset)?;
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8)
}

/// Reads a single raw byte.
pub fn read_byte(bytes: &[u8], offset: &mut usize) -> Result<u8, DecodeError> {
    let b = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
    *offset += 1;
    Ok(b)
}

/// Writes an unsigned LEB128 integer.
pub fn write_u64(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push(value as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Writes a `usize` (a length or count) as a varint.
pub fn write_len(out: &mut Vec<u8>, len: usize) {
    write_u64(out, len as u64);
}

/// Writes a length-prefixed byte string.
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_len(out, data.len());
    out.extend_from_slice(data);
}

/// Writes a length-prefixed UTF-8 string.
pub fn write_str(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}
