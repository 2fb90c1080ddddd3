//! SMPTE universal labels.
//!
//! Every KLV key, and every class, property, type and label definition in
//! the metadata dictionary, is identified by a 16-byte universal label.
//! Byte 5 (the registry designator) tells a reader how the value of a KLV
//! record is laid out.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a universal label in bytes.
pub const LABEL_SIZE: usize = 16;

/// The SMPTE registry prefix `06 0E 2B 34`.
pub const SMPTE_PREFIX: [u8; 4] = [0x06, 0x0e, 0x2b, 0x34];

/// Registry designator of an essence element key.
pub const ESSENCE: u8 = 0x02;

/// Registry designator of a fixed-length pack.
pub const FIXED_PACK: u8 = 0x05;

/// Registry designator used by dictionaries for groups (sets).
pub const GROUP: u8 = 0x06;

/// Registry designator of a local set with BER-coded item lengths.
pub const BER_LOCAL_SET: u8 = 0x13;

/// Registry designator of a local set with 2-byte tags and 2-byte lengths.
pub const LOCAL_SET: u8 = 0x53;

/// Leading 12 bytes shared by all generic container essence element keys.
/// The trailing four bytes address the track.
pub const ESSENCE_ELEMENT_PREFIX: [u8; 12] = [
    0x06, 0x0e, 0x2b, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0d, 0x01, 0x03, 0x01,
];

const URN_PREFIX: &str = "urn:smpte:ul:";

/// A 16-byte universal label.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Label(pub [u8; LABEL_SIZE]);

impl Label {
    /// Create a label from raw bytes.
    pub const fn new(bytes: [u8; LABEL_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy a label out of the first 16 bytes of `src`.
    ///
    /// Returns `None` when fewer than 16 bytes are available.
    pub fn from_slice(src: &[u8]) -> Option<Self> {
        let bytes: [u8; LABEL_SIZE] = src.get(..LABEL_SIZE)?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; LABEL_SIZE] {
        &self.0
    }

    /// Whether the label starts with the SMPTE registry prefix.
    pub fn is_smpte(&self) -> bool {
        self.0[..4] == SMPTE_PREFIX
    }

    /// Byte 5: selects fixed pack, local set, essence element, ...
    pub fn registry_designator(&self) -> u8 {
        self.0[5]
    }

    /// Copy of this label with byte 5 replaced.
    pub fn with_designator(&self, designator: u8) -> Self {
        let mut bytes = self.0;
        bytes[5] = designator;
        Self(bytes)
    }

    /// Whether this is an essence element key, ignoring the version byte.
    pub fn is_essence_element(&self) -> bool {
        self.0[..7] == ESSENCE_ELEMENT_PREFIX[..7] && self.0[8..12] == ESSENCE_ELEMENT_PREFIX[8..]
    }

    /// Compare two labels ignoring the version byte (byte 7).
    pub fn matches_ignoring_version(&self, other: &Label) -> bool {
        self.0[..7] == other.0[..7] && self.0[8..] == other.0[8..]
    }

    /// Dotted URN form, e.g. `urn:smpte:ul:060e2b34.02050101.0d010201.01050100`.
    pub fn to_urn(&self) -> String {
        let b = &self.0;
        format!(
            "{URN_PREFIX}{:02x}{:02x}{:02x}{:02x}.{:02x}{:02x}{:02x}{:02x}.\
             {:02x}{:02x}{:02x}{:02x}.{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12],
            b[13], b[14], b[15]
        )
    }
}

impl fmt::Display for Label {
    /// Hyphenated form: `060e2b34-0205-0101-0d01-020101050100`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({self})")
    }
}

impl From<[u8; LABEL_SIZE]> for Label {
    fn from(bytes: [u8; LABEL_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Error returned when a string is not a universal label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid universal label: {0:?}")]
pub struct ParseLabelError(pub String);

impl FromStr for Label {
    type Err = ParseLabelError;

    /// Accepts the URN dotted form, the hyphenated form and bare hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix(URN_PREFIX)
            .or_else(|| trimmed.strip_prefix("urn:uuid:"))
            .unwrap_or(trimmed);

        let mut bytes = [0u8; LABEL_SIZE];
        let mut count = 0usize;
        let mut high: Option<u8> = None;
        for ch in body.chars() {
            if matches!(ch, '.' | '-') {
                continue;
            }
            let nibble = ch
                .to_digit(16)
                .ok_or_else(|| ParseLabelError(s.to_string()))? as u8;
            match high.take() {
                None => high = Some(nibble),
                Some(h) => {
                    if count == LABEL_SIZE {
                        return Err(ParseLabelError(s.to_string()));
                    }
                    bytes[count] = (h << 4) | nibble;
                    count += 1;
                }
            }
        }

        if count != LABEL_SIZE || high.is_some() {
            return Err(ParseLabelError(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
