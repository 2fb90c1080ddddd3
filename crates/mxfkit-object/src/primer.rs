use std::collections::{BTreeMap, HashMap};

use mxfkit_dict::{Definition, Dictionary};
use mxfkit_klv::Label;
use mxfkit_types::{Fields, Value};
use tracing::{debug, warn};

/// Field names of a primer pack entry.
pub const LOCAL_TAG_FIELD: &str = "LocalTag";
pub const UID_FIELD: &str = "UID";

/// Lowest tag handed out by dynamic assignment.
pub const DYNAMIC_TAG_FLOOR: u16 = 0x8000;

/// Tags every primer starts with: the instance identifier and the index
/// table segment properties, which files do not always declare.
pub const SEEDED_TAGS: [(u16, Label); 13] = [
    (0x3c0a, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x15, 0x02, 0, 0, 0, 0])),
    (0x3f05, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x04, 0x04, 0x06, 0x02, 0x01, 0, 0, 0, 0])),
    (0x3f06, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x04, 0x01, 0x03, 0x04, 0x05, 0, 0, 0, 0])),
    (0x3f07, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x04, 0x01, 0x03, 0x04, 0x04, 0, 0, 0, 0])),
    (0x3f08, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x04, 0x04, 0x04, 0x04, 0x01, 0x01, 0, 0, 0])),
    (0x3f09, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x05, 0x04, 0x04, 0x04, 0x01, 0x06, 0, 0, 0])),
    (0x3f0a, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x05, 0x04, 0x04, 0x04, 0x02, 0x05, 0, 0, 0])),
    (0x3f0b, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x05, 0x05, 0x30, 0x04, 0x06, 0, 0, 0, 0])),
    (0x3f0c, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x05, 0x07, 0x02, 0x01, 0x03, 0x01, 0x0a, 0, 0])),
    (0x3f0d, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x05, 0x07, 0x02, 0x02, 0x01, 0x01, 0x02, 0, 0])),
    (0x3f0e, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x05, 0x04, 0x04, 0x04, 0x01, 0x07, 0, 0, 0])),
    (0x3f0f, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x0a, 0x04, 0x06, 0x02, 0x04, 0, 0, 0, 0])),
    (0x3f10, Label::new([0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x0a, 0x04, 0x06, 0x02, 0x05, 0, 0, 0, 0])),
];

/// Local tag table for one header metadata scope.
///
/// Not shared between streams: each reader and writer owns its primer and
/// resets it when a new header begins.
#[derive(Debug, Clone)]
pub struct Primer {
    by_tag: BTreeMap<u16, Label>,
    by_id: HashMap<Label, u16>,
    next_dynamic: u16,
}

impl Default for Primer {
    fn default() -> Self {
        Self::new()
    }
}

impl Primer {
    /// A primer holding only the seeded tags.
    pub fn new() -> Self {
        let mut primer = Self {
            by_tag: BTreeMap::new(),
            by_id: HashMap::new(),
            next_dynamic: u16::MAX,
        };
        for (tag, id) in SEEDED_TAGS {
            primer.add(tag, id);
        }
        primer
    }

    /// A seeded primer extended with explicit entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (u16, Label)>) -> Self {
        let mut primer = Self::new();
        for (tag, id) in entries {
            primer.add(tag, id);
        }
        primer
    }

    /// Start a new header scope, optionally from a primer pack's entries.
    pub fn reset(&mut self, entries: impl IntoIterator<Item = (u16, Label)>) {
        *self = Self::from_entries(entries);
        debug!(tags = self.len(), "primer reset");
    }

    /// Map `tag` and `id` to each other, replacing earlier mappings of either.
    pub fn add(&mut self, tag: u16, id: Label) {
        if let Some(previous) = self.by_tag.insert(tag, id) {
            if previous != id && self.by_id.get(&previous) == Some(&tag) {
                self.by_id.remove(&previous);
            }
        }
        if let Some(previous) = self.by_id.insert(id, tag) {
            if previous != tag && self.by_tag.get(&previous) == Some(&id) {
                self.by_tag.remove(&previous);
            }
        }
    }

    pub fn get_id(&self, tag: u16) -> Option<Label> {
        self.by_tag.get(&tag).copied()
    }

    pub fn get_tag(&self, id: &Label) -> Option<u16> {
        self.by_id.get(id).copied()
    }

    /// Identifier for a tag read from a local set, falling back to the
    /// dictionary's registered tags.
    pub fn resolve_id(&self, tag: u16, dict: &Dictionary) -> Option<Label> {
        self.get_id(tag)
            .or_else(|| dict.local_tag_index().id_for_tag(tag))
    }

    /// Tag to write for a property, adding it to the primer when new.
    ///
    /// Tries the primer, the property's registered tag, the dictionary-wide
    /// tag index, then dynamic assignment when enabled. A property no step
    /// resolves is written with tag 0.
    pub fn resolve_tag_for_property(
        &mut self,
        property: &Definition,
        dict: &Dictionary,
        assign_dynamic: bool,
    ) -> u16 {
        let id = property.identification;
        if let Some(tag) = self.get_tag(&id) {
            return tag;
        }

        let registered = property
            .as_property()
            .map(|p| p.local_identification)
            .filter(|tag| *tag != 0)
            .or_else(|| dict.local_tag_index().tag_for_id(&id));
        if let Some(tag) = registered {
            if self.get_id(tag).is_none() {
                self.add(tag, id);
                return tag;
            }
        }

        if assign_dynamic {
            if let Some(tag) = self.next_dynamic_tag() {
                debug!(
                    property = property.symbol.as_str(),
                    tag = format_args!("{tag:#06x}"),
                    "assigned dynamic local tag"
                );
                self.add(tag, id);
                return tag;
            }
        }

        warn!(
            property = property.symbol.as_str(),
            id = %id,
            "no local tag for property, writing tag 0"
        );
        0
    }

    fn next_dynamic_tag(&mut self) -> Option<u16> {
        while self.next_dynamic >= DYNAMIC_TAG_FLOOR {
            let tag = self.next_dynamic;
            self.next_dynamic = self.next_dynamic.wrapping_sub(1);
            if !self.by_tag.contains_key(&tag) {
                return Some(tag);
            }
            if tag == DYNAMIC_TAG_FLOOR {
                break;
            }
        }
        None
    }

    /// Entries in tag order.
    pub fn entries(&self) -> impl Iterator<Item = (u16, Label)> + '_ {
        self.by_tag.iter().map(|(tag, id)| (*tag, *id))
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Entries as a primer pack's `LocalTagEntryBatch` value.
    pub fn to_value(&self) -> Value {
        Value::List(
            self.entries()
                .map(|(tag, id)| {
                    let mut entry = Fields::new();
                    entry.insert(LOCAL_TAG_FIELD.to_string(), Value::from(tag));
                    entry.insert(UID_FIELD.to_string(), Value::Label(id));
                    Value::Record(entry)
                })
                .collect(),
        )
    }
}

/// Entries of a decoded `LocalTagEntryBatch` value. Malformed entries are
/// skipped.
pub fn entries_from_value(value: &Value) -> Vec<(u16, Label)> {
    let Some(items) = value.as_list() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let entry = item.as_record()?;
            let tag = u16::try_from(entry.get(LOCAL_TAG_FIELD)?.as_i64()?).ok()?;
            let id = *entry.get(UID_FIELD)?.as_label()?;
            Some((tag, id))
        })
        .collect()
}
