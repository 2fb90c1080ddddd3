//! Essence element keys.
//!
//! The last four key bytes address a track: item type, element count,
//! element type and element number.

use std::borrow::Cow;

use mxfkit_klv::{Label, ESSENCE_ELEMENT_PREFIX, LABEL_SIZE};
use mxfkit_types::{Fields, Value};

use crate::error::{ObjectError, Result};

pub const TRACK_FIELD: &str = "Track";
pub const ITEM_TYPE_FIELD: &str = "ItemType";
pub const ELEMENT_COUNT_FIELD: &str = "ElementCount";
pub const ELEMENT_TYPE_FIELD: &str = "ElementType";
pub const ELEMENT_NUMBER_FIELD: &str = "ElementNumber";
pub const DATA_FIELD: &str = "Data";

/// Values at or above this use an 8-byte length field.
pub const WIDE_ESSENCE_THRESHOLD: usize = 16 * 1024 * 1024;

const ITEM_TYPES: [(u8, &str); 7] = [
    (0x05, "SDTI-CP Picture (SMPTE 326M)"),
    (0x06, "SDTI-CP Sound (SMPTE 326M)"),
    (0x07, "SDTI-CP Data (SMPTE 326M)"),
    (0x15, "GC Picture"),
    (0x16, "GC Sound"),
    (0x17, "GC Data"),
    (0x18, "GC Compound"),
];

/// Registered name of an item type, or `0xNN`.
pub fn item_type_name(item_type: u8) -> Cow<'static, str> {
    ITEM_TYPES
        .iter()
        .find(|(code, _)| *code == item_type)
        .map(|(_, name)| Cow::Borrowed(*name))
        .unwrap_or_else(|| Cow::Owned(format!("0x{item_type:02x}")))
}

/// Inverse of [`item_type_name`].
pub fn parse_item_type(text: &str) -> Option<u8> {
    ITEM_TYPES
        .iter()
        .find(|(_, name)| *name == text)
        .map(|(code, _)| *code)
        .or_else(|| parse_hex_byte(text))
}

fn parse_hex_byte(text: &str) -> Option<u8> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))?;
    u8::from_str_radix(digits, 16).ok()
}

/// Track address carried in an essence element key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EssenceTrack {
    pub item_type: u8,
    pub element_count: u8,
    pub element_type: u8,
    pub element_number: u8,
}

impl EssenceTrack {
    pub fn from_key(key: &Label) -> Option<Self> {
        if !key.is_essence_element() {
            return None;
        }
        let [item_type, element_count, element_type, element_number] =
            [key.0[12], key.0[13], key.0[14], key.0[15]];
        Some(Self {
            item_type,
            element_count,
            element_type,
            element_number,
        })
    }

    pub fn to_key(&self) -> Label {
        let mut bytes = [0u8; LABEL_SIZE];
        bytes[..12].copy_from_slice(&ESSENCE_ELEMENT_PREFIX);
        bytes[12..].copy_from_slice(&self.track_number().to_be_bytes());
        Label(bytes)
    }

    pub fn track_number(&self) -> u32 {
        u32::from_be_bytes([
            self.item_type,
            self.element_count,
            self.element_type,
            self.element_number,
        ])
    }

    /// Eight lowercase hex digits, as they appear at the end of the key.
    pub fn track_hex(&self) -> String {
        format!("{:08x}", self.track_number())
    }

    pub fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(TRACK_FIELD.into(), Value::Str(self.track_hex()));
        fields.insert(
            ITEM_TYPE_FIELD.into(),
            Value::Str(item_type_name(self.item_type).into_owned()),
        );
        fields.insert(ELEMENT_COUNT_FIELD.into(), Value::from(self.element_count));
        fields.insert(
            ELEMENT_TYPE_FIELD.into(),
            Value::Str(format!("0x{:02x}", self.element_type)),
        );
        fields.insert(ELEMENT_NUMBER_FIELD.into(), Value::from(self.element_number));
        fields
    }

    /// Track address from decoded fields, using the individual fields when
    /// present and `Track` otherwise.
    pub fn from_fields(fields: &Fields) -> Result<Self> {
        if fields.contains_key(ITEM_TYPE_FIELD) {
            return Ok(Self {
                item_type: byte_field(fields, ITEM_TYPE_FIELD, parse_item_type)?,
                element_count: byte_field(fields, ELEMENT_COUNT_FIELD, parse_hex_byte)?,
                element_type: byte_field(fields, ELEMENT_TYPE_FIELD, parse_hex_byte)?,
                element_number: byte_field(fields, ELEMENT_NUMBER_FIELD, parse_hex_byte)?,
            });
        }
        let track = fields
            .get(TRACK_FIELD)
            .and_then(|value| match value {
                Value::Str(text) => u32::from_str_radix(text, 16).ok(),
                Value::Int(n) => u32::try_from(*n).ok(),
                _ => None,
            })
            .ok_or_else(|| missing(TRACK_FIELD))?;
        let [item_type, element_count, element_type, element_number] = track.to_be_bytes();
        Ok(Self {
            item_type,
            element_count,
            element_type,
            element_number,
        })
    }
}

fn missing(field: &str) -> ObjectError {
    ObjectError::MissingField {
        class: mxfkit_dict::ESSENCE_ELEMENT.to_string(),
        field: field.to_string(),
    }
}

fn byte_field(fields: &Fields, name: &str, parse: fn(&str) -> Option<u8>) -> Result<u8> {
    match fields.get(name) {
        Some(Value::Int(n)) => u8::try_from(*n).ok(),
        Some(Value::Str(text)) => parse(text),
        _ => None,
    }
    .ok_or_else(|| missing(name))
}

/// Length field width for an essence value of `length` bytes.
pub fn essence_length_width(length: usize) -> u8 {
    if length < WIDE_ESSENCE_THRESHOLD {
        4
    } else {
        8
    }
}
