//! Wire codecs for compiled type definitions.
//!
//! Each [`TypeKind`] provides four operations:
//! - `read`: bytes to value
//! - `write`: value to bytes, returning the count written
//! - `size`: bytes an encoded value occupies at the start of a buffer
//! - `length`: bytes `write` will produce for a value

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use mxfkit_dict::{Dictionary, Elements};
use mxfkit_klv::{Label, LABEL_SIZE};

use crate::error::{Result, TypeError};
use crate::value::{Fields, Value};

/// Count and element-size header of a counted array.
pub const ARRAY_HEADER_SIZE: usize = 8;

pub const TIMESTAMP_SIZE: usize = 8;

/// Significant bits of an 8-byte integer.
const WIDE_INTEGER_BITS: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLayout {
    /// 4-byte element count and 4-byte element size, then elements.
    Counted,
    /// Elements only; the count follows from the remaining bytes.
    Headerless,
}

/// A type definition compiled into its wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Big-endian integer of 1, 2, 4 or 8 bytes.
    Integer { size: u8, signed: bool },
    Boolean,
    /// Named values over an integer.
    Enumeration {
        size: u8,
        signed: bool,
        elements: Elements,
    },
    /// 16-byte identifier, decoded as a label.
    Auid,
    /// Calendar fields, 8 bytes.
    TimeStamp,
    /// Fixed-size members in declaration order.
    Record {
        members: Vec<(String, Arc<TypeKind>)>,
        size: usize,
    },
    /// Sets and variable arrays.
    Array {
        element: Arc<TypeKind>,
        element_size: usize,
        layout: ArrayLayout,
    },
    FixedArray { element: Arc<TypeKind>, count: usize },
    String { utf16: bool },
    /// One UTF-16 code unit.
    Character,
    /// Extendible enumerations and object references. With `resolve`,
    /// registered labels decode to their symbol.
    Label { resolve: bool },
    /// Indirect, opaque and stream data.
    Opaque,
}

impl TypeKind {
    /// Encoded size when it does not depend on the value.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            TypeKind::Integer { size, .. } | TypeKind::Enumeration { size, .. } => {
                Some(usize::from(*size))
            }
            TypeKind::Boolean => Some(1),
            TypeKind::Character => Some(2),
            TypeKind::Auid | TypeKind::Label { .. } => Some(LABEL_SIZE),
            TypeKind::TimeStamp => Some(TIMESTAMP_SIZE),
            TypeKind::Record { size, .. } => Some(*size),
            TypeKind::FixedArray { element, count } => {
                element.fixed_size().and_then(|size| size.checked_mul(*count))
            }
            TypeKind::Array { .. } | TypeKind::String { .. } | TypeKind::Opaque => None,
        }
    }

    fn is_byte(&self) -> bool {
        matches!(
            self,
            TypeKind::Integer {
                size: 1,
                signed: false
            }
        )
    }

    /// Bytes the value encoded at the start of `buf` occupies.
    ///
    /// Strings and opaque data extend to the end of the buffer.
    pub fn size(&self, buf: &[u8]) -> Result<usize> {
        let needed = match self {
            TypeKind::Array {
                layout: ArrayLayout::Counted,
                ..
            } => {
                let (count, wire_size) = array_header(buf)?;
                count
                    .checked_mul(wire_size)
                    .and_then(|body| body.checked_add(ARRAY_HEADER_SIZE))
                    .ok_or(TypeError::InsufficientData {
                        needed: usize::MAX,
                        available: buf.len(),
                    })?
            }
            TypeKind::Array {
                element_size,
                layout: ArrayLayout::Headerless,
                ..
            } => {
                let count = buf.len().checked_div(*element_size).unwrap_or(0);
                return Ok(count * element_size);
            }
            TypeKind::String { .. } | TypeKind::Opaque => return Ok(buf.len()),
            _ => self
                .fixed_size()
                .ok_or_else(|| TypeError::inconsistent("FixedArray", "element has no fixed size"))?,
        };
        take(buf, needed)?;
        Ok(needed)
    }

    /// Decode the value at the start of `buf`.
    pub fn read(&self, buf: &[u8], dict: &Dictionary) -> Result<Value> {
        match self {
            TypeKind::Integer { size, signed } => read_int(buf, *size, *signed).map(Value::Int),
            TypeKind::Boolean => Ok(Value::Bool(take(buf, 1)?[0] != 0)),
            TypeKind::Enumeration {
                size,
                signed,
                elements,
            } => {
                let value = read_int(buf, *size, *signed)?;
                Ok(match elements.name_of(value) {
                    Some(name) => Value::Str(name.to_string()),
                    None => Value::Int(value),
                })
            }
            TypeKind::Auid => read_label(buf).map(Value::Label),
            TypeKind::Label { resolve } => {
                let label = read_label(buf)?;
                let symbol = if *resolve {
                    dict.resolve_label_symbol(&label)
                } else {
                    None
                };
                Ok(symbol.map_or(Value::Label(label), Value::Str))
            }
            TypeKind::TimeStamp => read_timestamp(buf),
            TypeKind::Record { members, size } => {
                let buf = take(buf, *size)?;
                let mut fields = Fields::new();
                let mut offset = 0;
                for (name, member) in members {
                    let rest = &buf[offset..];
                    offset += member.size(rest)?;
                    fields.insert(name.clone(), member.read(rest, dict)?);
                }
                Ok(Value::Record(fields))
            }
            TypeKind::Array {
                element,
                element_size,
                layout,
            } => {
                let (count, wire_size, body) = match layout {
                    ArrayLayout::Counted => {
                        let (count, wire_size) = array_header(buf)?;
                        (count, wire_size, &buf[ARRAY_HEADER_SIZE..])
                    }
                    ArrayLayout::Headerless => (
                        buf.len().checked_div(*element_size).unwrap_or(0),
                        *element_size,
                        buf,
                    ),
                };
                if count == 0 {
                    return Ok(Value::List(Vec::new()));
                }
                if wire_size < *element_size {
                    return Err(TypeError::InsufficientData {
                        needed: *element_size,
                        available: wire_size,
                    });
                }
                let body = take(body, count.saturating_mul(wire_size))?;
                body.chunks_exact(wire_size)
                    .map(|slot| element.read(slot, dict))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
            TypeKind::FixedArray { element, count } => {
                if element.is_byte() {
                    return Ok(Value::Bytes(Bytes::copy_from_slice(take(buf, *count)?)));
                }
                let element_size = element
                    .fixed_size()
                    .ok_or_else(|| TypeError::inconsistent("FixedArray", "element has no fixed size"))?;
                let body = take(buf, element_size * count)?;
                body.chunks_exact(element_size.max(1))
                    .take(*count)
                    .map(|slot| element.read(slot, dict))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
            TypeKind::String { utf16 } => decode_string(buf, *utf16).map(Value::Str),
            TypeKind::Character => {
                let bytes = take(buf, 2)?;
                let unit = u16::from_be_bytes([bytes[0], bytes[1]]);
                char::from_u32(u32::from(unit))
                    .map(|c| Value::Str(c.to_string()))
                    .ok_or_else(|| TypeError::InvalidString(format!("lone surrogate {unit:#06x}")))
            }
            TypeKind::Opaque => Ok(Value::Bytes(Bytes::copy_from_slice(buf))),
        }
    }

    /// Bytes `write` produces for `value`.
    pub fn length(&self, value: &Value) -> Result<usize> {
        if let Some(size) = self.fixed_size() {
            return Ok(size);
        }
        match (self, value) {
            (
                TypeKind::Array {
                    element_size,
                    layout,
                    ..
                },
                Value::List(items),
            ) => {
                let body = items.len() * element_size;
                Ok(match layout {
                    ArrayLayout::Counted => ARRAY_HEADER_SIZE + body,
                    ArrayLayout::Headerless => body,
                })
            }
            (TypeKind::String { utf16: true }, Value::Str(s)) => Ok(s.encode_utf16().count() * 2),
            (TypeKind::String { utf16: false }, Value::Str(s)) => Ok(s.len()),
            (TypeKind::Opaque, Value::Bytes(bytes)) => Ok(bytes.len()),
            (TypeKind::Array { .. }, _) => Err(TypeError::mismatch("list", value)),
            (TypeKind::String { .. }, _) => Err(TypeError::mismatch("string", value)),
            (TypeKind::Opaque, _) => Err(TypeError::mismatch("bytes", value)),
            _ => Err(TypeError::inconsistent("FixedArray", "element has no fixed size")),
        }
    }

    /// Encode `value` onto `dst`, returning the bytes written. Nothing is
    /// left on `dst` when encoding fails.
    pub fn write(&self, value: &Value, dict: &Dictionary, dst: &mut BytesMut) -> Result<usize> {
        let start = dst.len();
        match self.write_into(value, dict, dst) {
            Ok(()) => Ok(dst.len() - start),
            Err(err) => {
                dst.truncate(start);
                Err(err)
            }
        }
    }

    fn write_into(&self, value: &Value, dict: &Dictionary, dst: &mut BytesMut) -> Result<()> {
        match self {
            TypeKind::Integer { size, signed } => match value {
                Value::Int(v) => write_int(*v, *size, *signed, dst),
                _ => Err(TypeError::mismatch("integer", value)),
            },
            TypeKind::Boolean => {
                let flag = match value {
                    Value::Bool(flag) => *flag,
                    Value::Int(0) => false,
                    Value::Int(1) => true,
                    _ => return Err(TypeError::mismatch("bool", value)),
                };
                dst.put_u8(u8::from(flag));
                Ok(())
            }
            TypeKind::Enumeration {
                size,
                signed,
                elements,
            } => {
                let raw = match value {
                    Value::Str(name) => elements
                        .value_of(name)
                        .ok_or_else(|| TypeError::UnknownEnumeration(name.clone()))?,
                    Value::Int(v) => *v,
                    _ => return Err(TypeError::mismatch("enumeration element", value)),
                };
                write_int(raw, *size, *signed, dst)
            }
            TypeKind::Auid | TypeKind::Label { .. } => {
                dst.put_slice(to_label(value, dict)?.as_bytes());
                Ok(())
            }
            TypeKind::TimeStamp => {
                let timestamp = match value {
                    Value::Null => {
                        dst.put_bytes(0, TIMESTAMP_SIZE);
                        return Ok(());
                    }
                    Value::Timestamp(ts) => *ts,
                    Value::Str(text) => DateTime::parse_from_rfc3339(text)
                        .map_err(|err| TypeError::InvalidTimestamp(format!("{text}: {err}")))?
                        .with_timezone(&Utc),
                    _ => return Err(TypeError::mismatch("timestamp", value)),
                };
                write_timestamp(&timestamp, dst)
            }
            TypeKind::Record { members, .. } => {
                let Value::Record(fields) = value else {
                    return Err(TypeError::mismatch("record", value));
                };
                for (name, member) in members {
                    let field = fields
                        .get(name)
                        .ok_or_else(|| TypeError::ValueMismatch {
                            expected: format!("record member {name}"),
                            found: "nothing",
                        })?;
                    member.write_into(field, dict, dst)?;
                }
                Ok(())
            }
            TypeKind::Array {
                element,
                element_size,
                layout,
            } => {
                let Value::List(items) = value else {
                    return Err(TypeError::mismatch("list", value));
                };
                if *layout == ArrayLayout::Counted {
                    dst.put_u32(header_field(items.len())?);
                    dst.put_u32(header_field(*element_size)?);
                }
                for item in items {
                    let before = dst.len();
                    element.write_into(item, dict, dst)?;
                    let written = dst.len() - before;
                    if written != *element_size {
                        return Err(TypeError::inconsistent(
                            "Array",
                            format!("element wrote {written} bytes, expected {element_size}"),
                        ));
                    }
                }
                Ok(())
            }
            TypeKind::FixedArray { element, count } => match value {
                Value::Bytes(bytes) if element.is_byte() => {
                    if bytes.len() != *count {
                        return Err(TypeError::ValueMismatch {
                            expected: format!("{count} bytes"),
                            found: "bytes of another length",
                        });
                    }
                    dst.put_slice(bytes);
                    Ok(())
                }
                Value::List(items) => {
                    if items.len() != *count {
                        return Err(TypeError::ValueMismatch {
                            expected: format!("{count} elements"),
                            found: "list of another length",
                        });
                    }
                    items
                        .iter()
                        .try_for_each(|item| element.write_into(item, dict, dst))
                }
                _ => Err(TypeError::mismatch("fixed array", value)),
            },
            TypeKind::String { utf16 } => {
                let Value::Str(text) = value else {
                    return Err(TypeError::mismatch("string", value));
                };
                if *utf16 {
                    text.encode_utf16().for_each(|unit| dst.put_u16(unit));
                } else {
                    dst.put_slice(text.as_bytes());
                }
                Ok(())
            }
            TypeKind::Character => {
                let Value::Str(text) = value else {
                    return Err(TypeError::mismatch("character", value));
                };
                let mut units = text.encode_utf16();
                match (units.next(), units.next()) {
                    (Some(unit), None) => {
                        dst.put_u16(unit);
                        Ok(())
                    }
                    _ => Err(TypeError::InvalidString(format!(
                        "{text:?} is not a single UTF-16 code unit"
                    ))),
                }
            }
            TypeKind::Opaque => match value {
                Value::Bytes(bytes) => {
                    dst.put_slice(bytes);
                    Ok(())
                }
                _ => Err(TypeError::mismatch("bytes", value)),
            },
        }
    }
}

fn take(buf: &[u8], needed: usize) -> Result<&[u8]> {
    buf.get(..needed).ok_or(TypeError::InsufficientData {
        needed,
        available: buf.len(),
    })
}

fn array_header(buf: &[u8]) -> Result<(usize, usize)> {
    let header = take(buf, ARRAY_HEADER_SIZE)?;
    let count = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Ok((count as usize, size as usize))
}

fn header_field(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| TypeError::IntegerOutOfRange {
        value: n as i128,
        size: 4,
        signed: false,
    })
}

/// Inclusive value range of an integer field. 8-byte fields carry at most
/// 48 significant bits.
pub fn integer_range(size: u8, signed: bool) -> (i64, i64) {
    let bits = if size >= 8 {
        WIDE_INTEGER_BITS
    } else {
        8 * u32::from(size)
    };
    if signed {
        (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
    } else {
        (0, (1i64 << bits) - 1)
    }
}

fn check_integer_size(size: u8) -> Result<usize> {
    if (1..=8).contains(&size) {
        Ok(usize::from(size))
    } else {
        Err(TypeError::inconsistent(
            "Integer",
            format!("unsupported size {size}"),
        ))
    }
}

fn read_int(buf: &[u8], size: u8, signed: bool) -> Result<i64> {
    let width = check_integer_size(size)?;
    let raw = take(buf, width)?
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));

    if width == 8 {
        let (min, max) = integer_range(size, signed);
        let value = if signed { i128::from(raw as i64) } else { i128::from(raw) };
        if value < i128::from(min) || value > i128::from(max) {
            return Err(TypeError::IntegerOutOfRange {
                value,
                size,
                signed,
            });
        }
        return Ok(value as i64);
    }

    let bits = 8 * width as u32;
    if signed && ((raw >> (bits - 1)) & 1) == 1 {
        Ok((raw | (u64::MAX << bits)) as i64)
    } else {
        Ok(raw as i64)
    }
}

fn write_int(value: i64, size: u8, signed: bool, dst: &mut BytesMut) -> Result<()> {
    let width = check_integer_size(size)?;
    let (min, max) = integer_range(size, signed);
    if !(min..=max).contains(&value) {
        return Err(TypeError::IntegerOutOfRange {
            value: i128::from(value),
            size,
            signed,
        });
    }
    dst.put_slice(&value.to_be_bytes()[8 - width..]);
    Ok(())
}

fn read_label(buf: &[u8]) -> Result<Label> {
    let bytes = take(buf, LABEL_SIZE)?;
    Label::from_slice(bytes).ok_or(TypeError::InsufficientData {
        needed: LABEL_SIZE,
        available: bytes.len(),
    })
}

/// Labels may be given directly, by registered symbol, or as label text.
fn to_label(value: &Value, dict: &Dictionary) -> Result<Label> {
    match value {
        Value::Label(label) => Ok(*label),
        Value::Str(text) => dict
            .resolve_symbol_label(text)
            .or_else(|| text.parse().ok())
            .ok_or_else(|| TypeError::UnresolvedLabel(text.clone())),
        _ => Err(TypeError::mismatch("label", value)),
    }
}

/// An all-zero timestamp means "unknown" and reads as [`Value::Null`].
fn read_timestamp(buf: &[u8]) -> Result<Value> {
    let b = take(buf, TIMESTAMP_SIZE)?;
    if b.iter().all(|byte| *byte == 0) {
        return Ok(Value::Null);
    }
    let year = u16::from_be_bytes([b[0], b[1]]);
    let (month, day, hour, minute, second, quarter_ms) = (b[2], b[3], b[4], b[5], b[6], b[7]);
    let invalid = || {
        TypeError::InvalidTimestamp(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02} +{quarter_ms}/250"
        ))
    };
    if quarter_ms >= 250 {
        return Err(invalid());
    }
    let naive = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .and_then(|date| {
            date.and_hms_milli_opt(
                u32::from(hour),
                u32::from(minute),
                u32::from(second),
                u32::from(quarter_ms) * 4,
            )
        })
        .ok_or_else(invalid)?;
    Ok(Value::Timestamp(Utc.from_utc_datetime(&naive)))
}

fn write_timestamp(timestamp: &DateTime<Utc>, dst: &mut BytesMut) -> Result<()> {
    let year = u16::try_from(timestamp.year())
        .map_err(|_| TypeError::InvalidTimestamp(format!("year {} out of range", timestamp.year())))?;
    let millis = timestamp.timestamp_subsec_millis().min(999);
    dst.put_u16(year);
    dst.put_u8(timestamp.month() as u8);
    dst.put_u8(timestamp.day() as u8);
    dst.put_u8(timestamp.hour() as u8);
    dst.put_u8(timestamp.minute() as u8);
    dst.put_u8(timestamp.second().min(59) as u8);
    dst.put_u8((millis / 4) as u8);
    Ok(())
}

fn decode_string(buf: &[u8], utf16: bool) -> Result<String> {
    let text = if utf16 {
        if buf.len() % 2 != 0 {
            return Err(TypeError::InvalidString(format!(
                "odd UTF-16 byte count {}",
                buf.len()
            )));
        }
        let units: Vec<u16> = buf
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|err| TypeError::InvalidString(err.to_string()))?
    } else {
        std::str::from_utf8(buf)
            .map_err(|err| TypeError::InvalidString(err.to_string()))?
            .to_string()
    };
    Ok(text.trim_end_matches('\0').to_string())
}
