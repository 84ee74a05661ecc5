//! Compressed integer codec.
//!
//! Integers are stored in one, two, four or five bytes. The two high bits of
//! the first byte select the width:
//!
//! ```text
//! 00xxxxxx                              0 ..= 0x3F
//! 01xxxxxx xxxxxxxx                  0x40 ..= 0x3FFF
//! 10xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx 0x4000 ..= 0x3FFFFFFF
//! 11000000 + 4 bytes big-endian        anything else (incl. negatives)
//! ```
//!
//! The same encoding is used for byte store entry lengths and for the
//! persisted table directory.

use bytes::{Buf, BufMut};

use crate::common::{Error, Result};

/// Marker byte of the five-byte form.
pub const NUM_MARKER: u8 = 0xC0;

/// Number of bytes needed to encode `v`.
#[inline]
pub fn num_len(v: i32) -> usize {
    match v {
        0..=0x3F => 1,
        0x40..=0x3FFF => 2,
        0x4000..=0x3FFF_FFFF => 4,
        _ => 5,
    }
}

/// Append the encoding of `v` to `buf`.
pub fn put_num(buf: &mut impl BufMut, v: i32) {
    match v {
        0..=0x3F => buf.put_u8(v as u8),
        0x40..=0x3FFF => buf.put_u16(v as u16 | 0x4000),
        0x4000..=0x3FFF_FFFF => buf.put_u32(v as u32 | 0x8000_0000),
        _ => {
            buf.put_u8(NUM_MARKER);
            buf.put_i32(v);
        }
    }
}

/// Encode `v` into a fresh vector.
pub fn encode_num(v: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(num_len(v));
    put_num(&mut buf, v);
    buf
}

/// Width of the value whose first encoded byte is `first`.
#[inline]
pub fn width_of(first: u8) -> usize {
    match first & 0xC0 {
        0x00 => 1,
        0x40 => 2,
        0x80 => 4,
        _ => 5,
    }
}

/// Decode a value from the start of `buf`, advancing it.
///
/// # Errors
/// Returns `Error::CorruptDirectory` if `buf` ends inside the value.
pub fn get_num(buf: &mut impl Buf) -> Result<i32> {
    if !buf.has_remaining() {
        return Err(truncated());
    }
    let first = buf.chunk()[0];
    if buf.remaining() < width_of(first) {
        return Err(truncated());
    }
    let v = buf.get_u8();
    Ok(match v & 0xC0 {
        0x00 => v as i32,
        0x40 => ((v as i32 - 0x40) << 8) + buf.get_u8() as i32,
        0x80 => {
            let hi = (v as i32 - 0x80) << 24;
            let lo = ((buf.get_u8() as i32) << 16) + buf.get_u16() as i32;
            hi + lo
        }
        _ => buf.get_i32(),
    })
}

/// Append a length-prefixed array of numbers.
pub fn put_nums(buf: &mut impl BufMut, values: &[i32]) {
    put_num(buf, values.len() as i32);
    for &v in values {
        put_num(buf, v);
    }
}

/// Decode a length-prefixed array of numbers.
pub fn get_nums(buf: &mut impl Buf) -> Result<Vec<i32>> {
    let len = get_num(buf)?;
    let len = usize::try_from(len)
        .map_err(|_| Error::CorruptDirectory(format!("negative array length {}", len)))?;
    // every entry takes at least one byte
    if len > buf.remaining() {
        return Err(truncated());
    }
    (0..len).map(|_| get_num(buf)).collect()
}

fn truncated() -> Error {
    Error::CorruptDirectory("unexpected end of compressed number".to_string())
}
