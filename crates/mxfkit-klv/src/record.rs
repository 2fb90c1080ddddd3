use bytes::{Bytes, BytesMut};

use crate::ul::{Label, LABEL_SIZE};

/// A value that may still be split across the chunks it arrived in.
///
/// A single fragment is handed out without copying; several are concatenated
/// once, on demand.
#[derive(Debug, Clone, Default)]
pub struct Fragments {
    parts: Vec<Bytes>,
    len: usize,
}

impl Fragments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Empty fragments are dropped.
    pub fn push(&mut self, part: Bytes) {
        if part.is_empty() {
            return;
        }
        self.len += part.len();
        self.parts.push(part);
    }

    /// Total byte count across all fragments.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The fragments in arrival order.
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    pub fn is_contiguous(&self) -> bool {
        self.parts.len() <= 1
    }

    /// The value as one contiguous buffer.
    pub fn flatten(&self) -> Bytes {
        match self.parts.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            parts => {
                let mut out = BytesMut::with_capacity(self.len);
                for part in parts {
                    out.extend_from_slice(part);
                }
                out.freeze()
            }
        }
    }

    /// Collapse into a single fragment, returning it.
    pub fn into_bytes(mut self) -> Bytes {
        if self.parts.len() == 1 {
            return self.parts.pop().unwrap_or_default();
        }
        self.flatten()
    }
}

/// Equality is on content; chunk boundaries are ignored.
impl PartialEq for Fragments {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.flatten() == other.flatten()
    }
}

impl Eq for Fragments {}

impl From<Bytes> for Fragments {
    fn from(value: Bytes) -> Self {
        let mut fragments = Fragments::new();
        fragments.push(value);
        fragments
    }
}

impl From<Vec<u8>> for Fragments {
    fn from(value: Vec<u8>) -> Self {
        Bytes::from(value).into()
    }
}

impl From<&'static [u8]> for Fragments {
    fn from(value: &'static [u8]) -> Self {
        Bytes::from_static(value).into()
    }
}

/// A complete KLV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlvRecord {
    pub key: Label,
    /// Declared value length; always equals `value.len()` once framed.
    pub length: u64,
    pub value: Fragments,
    /// Bytes the length occupied on the wire (1 to 9).
    pub length_field_width: u8,
    /// Absolute stream position of the first value byte.
    pub stream_offset: u64,
}

impl KlvRecord {
    /// Build a record for writing. The stream offset is unknown and left at 0.
    pub fn new(key: Label, value: impl Into<Fragments>, length_field_width: u8) -> Self {
        let value = value.into();
        Self {
            key,
            length: value.len() as u64,
            value,
            length_field_width,
            stream_offset: 0,
        }
    }

    /// Absolute stream position of the first key byte.
    pub fn key_offset(&self) -> u64 {
        self.stream_offset
            .saturating_sub((LABEL_SIZE + self.length_field_width as usize) as u64)
    }

    /// Size of the record on the wire: key, length field and value.
    pub fn wire_size(&self) -> u64 {
        (LABEL_SIZE + self.length_field_width as usize) as u64 + self.length
    }

    /// The value as one contiguous buffer.
    pub fn flatten(&self) -> Bytes {
        self.value.flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fragment_is_not_copied() {
        let data = Bytes::from_static(b"essence");
        let fragments = Fragments::from(data.clone());
        assert!(fragments.is_contiguous());
        assert_eq!(fragments.flatten().as_ptr(), data.as_ptr());
    }

    #[test]
    fn several_fragments_flatten_in_order() {
        let mut fragments = Fragments::new();
        fragments.push(Bytes::from_static(b"ab"));
        fragments.push(Bytes::new());
        fragments.push(Bytes::from_static(b"cde"));
        assert_eq!(fragments.len(), 5);
        assert_eq!(fragments.parts().len(), 2);
        assert_eq!(fragments.flatten().as_ref(), b"abcde");
        assert_eq!(fragments.clone().into_bytes().as_ref(), b"abcde");
        assert_eq!(fragments, Fragments::from(b"abcde".to_vec()));
    }

    #[test]
    fn record_offsets_and_size() {
        let mut record = KlvRecord::new(Label::default(), b"12345".to_vec(), 4);
        record.stream_offset = 100;
        assert_eq!(record.length, 5);
        assert_eq!(record.key_offset(), 80);
        assert_eq!(record.wire_size(), 25);
    }
}
