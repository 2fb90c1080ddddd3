//! Key + BER length header coding.
//!
//! Wire format of a KLV header:
//! ```text
//! ┌──────────────┬────────────┬──────────────────────────┐
//! │ Key (16B)    │ BER head   │ Tail (0-8B, big-endian)  │
//! │ univ. label  │ 0xxxxxxx   │ absent (short form)      │
//! │              │ 1ttttttt   │ t bytes of length        │
//! └──────────────┴────────────┴──────────────────────────┘
//! ```
//! The width of the length field (head + tail, 1 to 9 bytes) is kept with
//! every record because several encodings are valid for the same length.

use bytes::{BufMut, BytesMut};

use crate::error::LengthEncodingError;
use crate::ul::{Label, LABEL_SIZE};

/// Minimum lookahead for any header: key plus the BER head byte.
pub const MIN_HEADER_SIZE: usize = LABEL_SIZE + 1;

/// Largest header: key, head byte and eight tail bytes.
pub const MAX_HEADER_SIZE: usize = LABEL_SIZE + 9;

/// Largest number of tail bytes a BER head may declare.
pub const MAX_TAIL: u8 = 8;

/// A decoded key and length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyAndLength {
    pub key: Label,
    pub length: u64,
    /// Bytes used on the wire for the length (1 to 9).
    pub length_field_width: u8,
    /// Position just past the header, where the value starts.
    pub next_pos: usize,
}

/// Outcome of inspecting a BER head byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSize {
    /// Total header size in bytes, key included.
    Known(usize),
    /// The head byte declares more tail bytes than MXF allows.
    Corrupt(u8),
}

/// Header size implied by the bytes at `buf[pos..]`.
///
/// Returns `None` while fewer than [`MIN_HEADER_SIZE`] bytes are available.
pub fn header_size(buf: &[u8], pos: usize) -> Option<HeaderSize> {
    let head = *buf.get(pos + LABEL_SIZE)?;
    if head & 0x80 == 0 {
        return Some(HeaderSize::Known(MIN_HEADER_SIZE));
    }
    let tail = head & 0x7f;
    if tail > MAX_TAIL {
        return Some(HeaderSize::Corrupt(tail));
    }
    Some(HeaderSize::Known(MIN_HEADER_SIZE + tail as usize))
}

/// Read a key and BER length starting at `buf[pos]`.
///
/// Returns `Ok(None)` when the buffer does not yet hold the complete header;
/// nothing is consumed and the caller should retry with more data.
///
/// A long-form head with no tail bytes (`0x80`) reads as length 0 with a
/// width of 1. Writing that record back produces the short form `0x00`.
pub fn read_key_and_length(
    buf: &[u8],
    pos: usize,
) -> std::result::Result<Option<KeyAndLength>, HeaderSize> {
    let size = match header_size(buf, pos) {
        None => return Ok(None),
        Some(HeaderSize::Known(size)) => size,
        Some(corrupt) => return Err(corrupt),
    };
    if buf.len() < pos + size {
        return Ok(None);
    }

    let Some(key) = Label::from_slice(&buf[pos..]) else {
        return Ok(None);
    };
    let head = buf[pos + LABEL_SIZE];
    let (length, width) = if head & 0x80 == 0 {
        (u64::from(head), 1u8)
    } else {
        let tail = &buf[pos + MIN_HEADER_SIZE..pos + size];
        let length = tail
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        (length, (size - LABEL_SIZE) as u8)
    };

    Ok(Some(KeyAndLength {
        key,
        length,
        length_field_width: width,
        next_pos: pos + size,
    }))
}

/// Check that `length` can be written with a `width` byte length field.
pub fn check_width(length: u64, width: u8) -> std::result::Result<(), LengthEncodingError> {
    match width {
        1 if length >= 0x80 => Err(LengthEncodingError::WidthTooSmall(length)),
        1 | 9 => Ok(()),
        2..=8 => {
            let capacity_bits = 8 * u32::from(width - 1);
            if length >> capacity_bits != 0 {
                Err(LengthEncodingError::LengthExceedsWidth { length, width })
            } else {
                Ok(())
            }
        }
        _ => Err(LengthEncodingError::InvalidWidth(width)),
    }
}

/// Smallest length-field width able to hold `length`.
pub fn min_width(length: u64) -> u8 {
    if length < 0x80 {
        return 1;
    }
    let significant = (64 - length.leading_zeros()).div_ceil(8);
    1 + significant as u8
}

/// Append a key and a `width` byte BER length to `dst`.
pub fn encode_key_and_length(
    key: &Label,
    length: u64,
    width: u8,
    dst: &mut BytesMut,
) -> std::result::Result<(), LengthEncodingError> {
    check_width(length, width)?;
    dst.reserve(LABEL_SIZE + width as usize);
    dst.put_slice(key.as_bytes());
    if width == 1 {
        dst.put_u8(length as u8);
        return Ok(());
    }

    let tail = width - 1;
    dst.put_u8(0x80 | tail);
    let be = length.to_be_bytes();
    let tail = tail as usize;
    if tail > be.len() {
        dst.put_bytes(0, tail - be.len());
        dst.put_slice(&be);
    } else {
        dst.put_slice(&be[be.len() - tail..]);
    }
    Ok(())
}

/// Key and BER length as a standalone byte buffer.
pub fn write_key_and_length(
    key: &Label,
    length: u64,
    width: u8,
) -> std::result::Result<BytesMut, LengthEncodingError> {
    let mut dst = BytesMut::with_capacity(LABEL_SIZE + width as usize);
    encode_key_and_length(key, length, width, &mut dst)?;
    Ok(dst)
}
