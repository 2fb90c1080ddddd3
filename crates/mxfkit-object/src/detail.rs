//! Record to object decoding.
//!
//! The key's registry designator selects the strategy:
//! - `0x05` fixed pack: fields in class pack order
//! - `0x53` local set: 2-byte tag, 2-byte length items via the primer
//! - `0x02` essence: payload untouched, plus the track address for
//!   generic container element keys
//! - `0x13` BER local set: rejected as unsupported
//! - anything else passes through undecoded

use std::sync::Arc;

use bytes::Bytes;
use mxfkit_dict::Definition;
use mxfkit_klv::ul::{BER_LOCAL_SET, ESSENCE, FIXED_PACK, LOCAL_SET};
use mxfkit_klv::KlvRecord;
use mxfkit_types::{ArrayLayout, Fields, TypeKind, TypeRegistry, Value};
use tracing::{debug, warn};

use crate::error::{ObjectError, Result};
use crate::essence::{EssenceTrack, DATA_FIELD};
use crate::object::{Decoded, DecodedObject, PropertyInfo};
use crate::primer::{entries_from_value, Primer};

/// Class whose decoding resets the primer.
pub const PRIMER_PACK: &str = "PrimerPack";
/// Field of the primer pack holding its entries.
pub const PRIMER_ENTRIES: &str = "LocalTagEntryBatch";

const LOCAL_ITEM_HEADER: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct DetailerConfig {
    /// Fail the whole record on an unresolved local set property instead of
    /// recording it as an issue.
    pub fail_on_unresolved_property: bool,
}

/// How a key's value is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    FixedPack,
    LocalSet,
    BerLocalSet,
    Essence,
    Unknown,
}

impl Category {
    pub fn of(key: &mxfkit_klv::Label) -> Self {
        if key.is_essence_element() {
            return Category::Essence;
        }
        if !key.is_smpte() {
            return Category::Unknown;
        }
        match key.registry_designator() {
            FIXED_PACK => Category::FixedPack,
            LOCAL_SET => Category::LocalSet,
            BER_LOCAL_SET => Category::BerLocalSet,
            ESSENCE => Category::Essence,
            _ => Category::Unknown,
        }
    }
}

/// Decodes framed records into objects for one stream.
#[derive(Debug)]
pub struct Detailer {
    registry: Arc<TypeRegistry>,
    primer: Primer,
    config: DetailerConfig,
}

impl Detailer {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(registry, DetailerConfig::default())
    }

    pub fn with_config(registry: Arc<TypeRegistry>, config: DetailerConfig) -> Self {
        Self {
            registry,
            primer: Primer::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn primer(&self) -> &Primer {
        &self.primer
    }

    pub fn primer_mut(&mut self) -> &mut Primer {
        &mut self.primer
    }

    pub fn config(&self) -> &DetailerConfig {
        &self.config
    }

    /// Decode one record.
    pub fn detail(&mut self, record: KlvRecord) -> Result<Decoded> {
        let category = Category::of(&record.key);
        match category {
            Category::Unknown => return Ok(Decoded::Passthrough(record)),
            Category::BerLocalSet => {
                return Err(ObjectError::UnsupportedEncoding {
                    key: record.key.to_string(),
                    designator: record.key.registry_designator(),
                })
            }
            Category::Essence => return Ok(Decoded::Object(self.decode_essence(&record))),
            Category::FixedPack | Category::LocalSet => {}
        }

        let dict = self.registry.dictionary();
        let definition = dict
            .resolve_by_id(&record.key)
            .filter(|definition| definition.as_class().is_some())
            .ok_or_else(|| ObjectError::UnresolvedClass(record.key.to_string()))?;

        let value = record.flatten();
        let mut object = DecodedObject {
            key: record.key,
            object_class: definition.symbol.clone(),
            fields: Fields::new(),
            properties: Vec::new(),
            issues: Vec::new(),
            stream_offset: record.stream_offset,
            length_field_width: record.length_field_width,
        };

        if category == Category::FixedPack {
            object.fields = self.decode_fixed_pack(&definition, &value)?;
            if definition.symbol == PRIMER_PACK {
                let entries = object
                    .fields
                    .get(PRIMER_ENTRIES)
                    .map(entries_from_value)
                    .unwrap_or_default();
                self.primer.reset(entries);
            }
        } else {
            self.decode_local_set(&mut object, &value)?;
        }
        Ok(Decoded::Object(object))
    }

    fn decode_essence(&self, record: &KlvRecord) -> DecodedObject {
        let mut fields = EssenceTrack::from_key(&record.key)
            .map(|track| track.fields())
            .unwrap_or_default();
        fields.insert(DATA_FIELD.into(), Value::Bytes(record.flatten()));
        DecodedObject {
            key: record.key,
            object_class: mxfkit_dict::ESSENCE_ELEMENT.to_string(),
            fields,
            properties: Vec::new(),
            issues: Vec::new(),
            stream_offset: record.stream_offset,
            length_field_width: record.length_field_width,
        }
    }

    fn decode_fixed_pack(&self, class: &Definition, value: &Bytes) -> Result<Fields> {
        let dict = self.registry.dictionary();
        let order = dict.get_pack_order(&class.symbol).ok_or_else(|| {
            ObjectError::UnresolvedClass(format!("{} has no pack order", class.symbol))
        })?;

        let mut kinds = Vec::with_capacity(order.len());
        for property in &order {
            kinds.push(property_kind(&self.registry, &class.symbol, property)?);
        }

        let mut fields = Fields::new();
        let mut offset = 0usize;
        for (i, (property, kind)) in order.iter().zip(&kinds).enumerate() {
            let mut end = value.len();
            if matches!(
                **kind,
                TypeKind::Array {
                    layout: ArrayLayout::Headerless,
                    ..
                }
            ) {
                // Reserve room for the fixed fields that follow.
                let trailing: usize = kinds[i + 1..]
                    .iter()
                    .filter_map(|kind| kind.fixed_size())
                    .sum();
                end = end.saturating_sub(trailing).max(offset);
            }
            let slice = value.get(offset..end).unwrap_or_default();
            let decoded = kind
                .size(slice)
                .and_then(|size| {
                    offset += size;
                    kind.read(&slice[..size], dict)
                })
                .map_err(|source| ObjectError::InvalidProperty {
                    property: property.clone(),
                    source,
                })?;
            fields.insert(property.clone(), decoded);
        }
        if offset < value.len() {
            debug!(
                class = class.symbol.as_str(),
                trailing = value.len() - offset,
                "fixed pack has trailing bytes"
            );
        }
        Ok(fields)
    }

    fn decode_local_set(&self, object: &mut DecodedObject, value: &Bytes) -> Result<()> {
        let dict = Arc::clone(self.registry.dictionary());
        let mut pos = 0usize;
        while pos < value.len() {
            let header = value
                .get(pos..pos + LOCAL_ITEM_HEADER)
                .ok_or_else(|| ObjectError::MalformedLocalSet {
                    offset: pos,
                    reason: format!("{} bytes left for a 4-byte item header", value.len() - pos),
                })?;
            let tag = u16::from_be_bytes([header[0], header[1]]);
            let length = usize::from(u16::from_be_bytes([header[2], header[3]]));
            let start = pos + LOCAL_ITEM_HEADER;
            let item = value
                .get(start..start + length)
                .ok_or_else(|| ObjectError::MalformedLocalSet {
                    offset: pos,
                    reason: format!("item {tag:#06x} declares {length} bytes past the end"),
                })?;
            pos = start + length;

            let property = self
                .primer
                .resolve_id(tag, &dict)
                .and_then(|id| dict.property_by_id(&id));
            let Some((definition, property)) = property else {
                let issue = ObjectError::UnresolvedProperty {
                    class: object.object_class.clone(),
                    property: format!("{tag:#06x}"),
                };
                if self.config.fail_on_unresolved_property {
                    return Err(issue);
                }
                warn!(
                    class = object.object_class.as_str(),
                    tag = format_args!("{tag:#06x}"),
                    "unresolved local tag"
                );
                object.properties.push(PropertyInfo {
                    tag,
                    length,
                    name: None,
                });
                object.issues.push(issue);
                continue;
            };

            object.properties.push(PropertyInfo {
                tag,
                length,
                name: Some(definition.symbol.clone()),
            });
            match self
                .registry
                .resolve(&property.type_name)
                .and_then(|kind| kind.read(item, &dict))
            {
                Ok(decoded) => {
                    object.fields.insert(definition.symbol.clone(), decoded);
                }
                Err(source) => {
                    warn!(
                        class = object.object_class.as_str(),
                        property = definition.symbol.as_str(),
                        error = %source,
                        "property failed to decode"
                    );
                    object.issues.push(ObjectError::InvalidProperty {
                        property: definition.symbol.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Codec of a property named in a class's pack order or fields.
pub(crate) fn property_kind(
    registry: &TypeRegistry,
    class: &str,
    property: &str,
) -> Result<Arc<TypeKind>> {
    let definition = registry
        .dictionary()
        .property(property)
        .ok_or_else(|| ObjectError::UnresolvedProperty {
            class: class.to_string(),
            property: property.to_string(),
        })?;
    let type_name = definition
        .as_property()
        .map(|p| p.type_name.as_str())
        .unwrap_or_default();
    registry
        .resolve(type_name)
        .map_err(|source| ObjectError::InvalidProperty {
            property: property.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};
    use mxfkit_dict::Dictionary;
    use mxfkit_klv::Label;

    use super::*;

    fn detailer() -> Detailer {
        let dict = Arc::new(Dictionary::baseline().unwrap());
        Detailer::new(Arc::new(TypeRegistry::new(dict)))
    }

    fn label(text: &str) -> Label {
        text.parse().unwrap()
    }

    fn identification_key() -> Label {
        label("060e2b34.02530101.0d010101.01013000")
    }

    fn item(out: &mut BytesMut, tag: u16, value: &[u8]) {
        out.put_u16(tag);
        out.put_u16(value.len() as u16);
        out.put_slice(value);
    }

    fn utf16(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect()
    }

    fn object(decoded: Decoded) -> DecodedObject {
        decoded.into_object().expect("decoded object")
    }

    #[test]
    fn categories_follow_the_designator() {
        assert_eq!(Category::of(&identification_key()), Category::LocalSet);
        assert_eq!(
            Category::of(&label("060e2b34.02050101.0d010201.01020400")),
            Category::FixedPack
        );
        assert_eq!(
            Category::of(&label("060e2b34.02130101.0d010101.01013000")),
            Category::BerLocalSet
        );
        assert_eq!(
            Category::of(&label("060e2b34.01020101.0d010301.15010501")),
            Category::Essence
        );
        assert_eq!(
            Category::of(&label("060e2b34.01020101.0e090502.17010101")),
            Category::Essence
        );
        assert_eq!(
            Category::of(&label("060e2b34.027f0101.0d010101.01013000")),
            Category::Unknown
        );
        assert_eq!(
            Category::of(&label("060e2b34.01010102.03010210.01000000")),
            Category::Unknown
        );
    }

    #[test]
    fn local_set_decodes_through_dictionary_tags() {
        let mut value = BytesMut::new();
        item(&mut value, 0x3c01, &utf16("Acme"));
        item(&mut value, 0x3c08, &utf16("Linux"));
        item(&mut value, 0x3c0a, &[0x42; 16]);
        let record = KlvRecord::new(identification_key(), value.freeze(), 4);

        let decoded = object(detailer().detail(record).unwrap());
        assert_eq!(decoded.object_class, "Identification");
        assert_eq!(decoded.get("CompanyName"), Some(&Value::from("Acme")));
        assert_eq!(decoded.get("Platform"), Some(&Value::from("Linux")));
        assert_eq!(
            decoded.get("InstanceUID"),
            Some(&Value::Label(Label([0x42; 16])))
        );
        assert_eq!(decoded.properties.len(), 3);
        assert_eq!(decoded.properties[0].length, 8);
        assert_eq!(decoded.length_field_width, 4);
        assert!(decoded.is_complete());
    }

    #[test]
    fn unresolved_tags_are_issues_unless_strict() {
        let mut value = BytesMut::new();
        item(&mut value, 0x7777, &[1, 2]);
        item(&mut value, 0x3c01, &utf16("Acme"));
        let record = KlvRecord::new(identification_key(), value.freeze(), 4);

        let decoded = object(detailer().detail(record.clone()).unwrap());
        assert_eq!(decoded.fields.len(), 1);
        assert_eq!(decoded.properties.len(), 2);
        assert_eq!(decoded.properties[0].name, None);
        assert_eq!(decoded.issues.len(), 1);
        assert!(decoded.issues[0].is_coverage_gap());

        let dict = Arc::new(Dictionary::baseline().unwrap());
        let mut strict = Detailer::with_config(
            Arc::new(TypeRegistry::new(dict)),
            DetailerConfig {
                fail_on_unresolved_property: true,
            },
        );
        assert!(matches!(
            strict.detail(record),
            Err(ObjectError::UnresolvedProperty { .. })
        ));
    }

    #[test]
    fn bad_property_values_do_not_fail_the_record() {
        let mut value = BytesMut::new();
        // February 30th
        item(&mut value, 0x3c06, &[0x07, 0xe5, 2, 30, 0, 0, 0, 0]);
        item(&mut value, 0x3c01, &utf16("Acme"));
        let record = KlvRecord::new(identification_key(), value.freeze(), 4);

        let decoded = object(detailer().detail(record).unwrap());
        assert_eq!(decoded.get("CompanyName"), Some(&Value::from("Acme")));
        assert!(matches!(
            &decoded.issues[..],
            [ObjectError::InvalidProperty { property, .. }] if property == "ModificationDate"
        ));
    }

    #[test]
    fn truncated_items_are_malformed() {
        let mut value = BytesMut::new();
        value.put_u16(0x3c01);
        value.put_u16(10);
        value.put_slice(&[0, 1]);
        let record = KlvRecord::new(identification_key(), value.freeze(), 4);
        assert!(matches!(
            detailer().detail(record),
            Err(ObjectError::MalformedLocalSet { offset: 0, .. })
        ));

        let record = KlvRecord::new(identification_key(), vec![0x3c, 0x01, 0x00], 4);
        assert!(matches!(
            detailer().detail(record),
            Err(ObjectError::MalformedLocalSet { offset: 0, .. })
        ));
    }

    #[test]
    fn primer_pack_resets_the_primer() {
        let custom = label("060e2b34.01010102.05200701.02010000");
        let mut value = BytesMut::new();
        value.put_u32(1);
        value.put_u32(18);
        value.put_u16(0x8123);
        value.put_slice(custom.as_bytes());
        let key = label("060e2b34.02050101.0d010201.01050100");

        let mut detailer = detailer();
        let decoded = object(detailer.detail(KlvRecord::new(key, value.freeze(), 4)).unwrap());
        assert_eq!(decoded.object_class, PRIMER_PACK);
        assert_eq!(detailer.primer().get_id(0x8123), Some(custom));

        // CompanyName now arrives under the primer's tag.
        let mut set = BytesMut::new();
        item(&mut set, 0x8123, &utf16("Acme"));
        let decoded = object(
            detailer
                .detail(KlvRecord::new(identification_key(), set.freeze(), 4))
                .unwrap(),
        );
        assert_eq!(decoded.get("CompanyName"), Some(&Value::from("Acme")));
    }

    #[test]
    fn random_index_pack_reserves_its_length_field() {
        let mut value = BytesMut::new();
        for (sid, offset) in [(0u32, 0u64), (1, 1024)] {
            value.put_u32(sid);
            value.put_u64(offset);
        }
        value.put_u32(24 + 4 + 20);
        let key = label("060e2b34.02050101.0d010201.01110100");

        let decoded = object(detailer().detail(KlvRecord::new(key, value.freeze(), 4)).unwrap());
        assert_eq!(decoded.get("Length"), Some(&Value::Int(48)));
        let index = decoded.get("PartitionIndex").unwrap().as_list().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(
            index[1].as_record().unwrap().get("ByteOffset"),
            Some(&Value::Int(1024))
        );
    }

    #[test]
    fn essence_payload_passes_through() {
        let key = label("060e2b34.01020101.0d010301.16020301");
        let decoded = object(
            detailer()
                .detail(KlvRecord::new(key, vec![9u8; 32], 8))
                .unwrap(),
        );
        assert_eq!(decoded.object_class, "EssenceElement");
        assert_eq!(decoded.get("Track"), Some(&Value::from("16020301")));
        assert_eq!(decoded.get("ItemType"), Some(&Value::from("GC Sound")));
        assert_eq!(decoded.get("ElementType"), Some(&Value::from("0x03")));
        assert_eq!(decoded.get("ElementNumber"), Some(&Value::Int(1)));
        assert_eq!(decoded.get("Data").unwrap().as_bytes().unwrap().len(), 32);
    }

    #[test]
    fn other_essence_keys_keep_only_their_payload() {
        let key = label("060e2b34.01020101.0e090502.17010101");
        let decoded = object(
            detailer()
                .detail(KlvRecord::new(key, vec![7u8; 12], 4))
                .unwrap(),
        );
        assert_eq!(decoded.object_class, "EssenceElement");
        assert_eq!(decoded.get("Track"), None);
        assert_eq!(decoded.fields.len(), 1);
        assert_eq!(decoded.get("Data").unwrap().as_bytes().unwrap().len(), 12);
    }

    #[test]
    fn unknown_and_unsupported_keys() {
        let fill = label("060e2b34.01010102.03010210.01000000");
        let decoded = detailer()
            .detail(KlvRecord::new(fill, vec![0u8; 5], 4))
            .unwrap();
        assert!(matches!(decoded, Decoded::Passthrough(record) if record.length == 5));

        let ber_set = label("060e2b34.02130101.0d010101.01013000");
        let err = detailer()
            .detail(KlvRecord::new(ber_set, vec![0u8; 5], 4))
            .unwrap_err();
        assert!(matches!(err, ObjectError::UnsupportedEncoding { designator: 0x13, .. }));
        assert!(err.is_coverage_gap());

        let unknown_set = label("060e2b34.02530101.0d017f7f.7f7f7f7f");
        assert!(matches!(
            detailer().detail(KlvRecord::new(unknown_set, Vec::new(), 4)),
            Err(ObjectError::UnresolvedClass(_))
        ));
    }
}
