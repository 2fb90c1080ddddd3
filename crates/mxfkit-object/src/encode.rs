use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use mxfkit_dict::{Definition, ESSENCE_ELEMENT};
use mxfkit_klv::ber::check_width;
use mxfkit_klv::ul::{BER_LOCAL_SET, FIXED_PACK, GROUP, LOCAL_SET};
use mxfkit_klv::{min_width, KlvError, KlvRecord, Label};
use mxfkit_types::{TypeRegistry, Value};

use crate::detail::{property_kind, PRIMER_ENTRIES, PRIMER_PACK};
use crate::error::{ObjectError, Result};
use crate::essence::{essence_length_width, EssenceTrack, DATA_FIELD};
use crate::object::MxfObject;
use crate::primer::{entries_from_value, Primer};

/// BER width used for header metadata unless an object carries its own.
pub const DEFAULT_LENGTH_FIELD_WIDTH: u8 = 4;

/// Class every partition pack derives from.
const PARTITION_PACK: &str = "PartitionPack";

#[derive(Debug, Clone, Copy)]
pub struct EncoderConfig {
    /// Minimum BER width for records whose object carries none.
    pub length_field_width: u8,
    /// Hand out tags from `0xFFFF` downward for properties without a
    /// registered local tag.
    pub assign_dynamic_tags: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            length_field_width: DEFAULT_LENGTH_FIELD_WIDTH,
            assign_dynamic_tags: false,
        }
    }
}

/// Encodes objects into KLV records for one stream.
#[derive(Debug)]
pub struct Encoder {
    registry: Arc<TypeRegistry>,
    primer: Primer,
    config: EncoderConfig,
}

impl Encoder {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(registry, EncoderConfig::default())
    }

    pub fn with_config(registry: Arc<TypeRegistry>, config: EncoderConfig) -> Self {
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

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode one object. Local set tags the primer lacks are added to it.
    pub fn encode(&mut self, object: &MxfObject) -> Result<KlvRecord> {
        if object.object_class == ESSENCE_ELEMENT {
            return self.encode_essence(object);
        }

        let class = self
            .registry
            .dictionary()
            .class(&object.object_class)
            .ok_or_else(|| ObjectError::UnresolvedClass(object.object_class.clone()))?;
        let key = class.identification;

        match key.registry_designator() {
            FIXED_PACK => {
                let value = self.encode_fixed_pack(&class, object)?;
                if class.symbol == PRIMER_PACK {
                    let entries = object
                        .get(PRIMER_ENTRIES)
                        .map(entries_from_value)
                        .unwrap_or_default();
                    self.primer.reset(entries);
                }
                self.record(key, value, object.length_field_width)
            }
            GROUP | LOCAL_SET => {
                let value = self.encode_local_set(&class, object)?;
                self.record(
                    key.with_designator(LOCAL_SET),
                    value,
                    object.length_field_width,
                )
            }
            BER_LOCAL_SET => Err(ObjectError::UnsupportedEncoding {
                key: key.to_string(),
                designator: BER_LOCAL_SET,
            }),
            // Fill and other opaque records carry their bytes as-is.
            _ => {
                let value = object
                    .get(DATA_FIELD)
                    .and_then(Value::as_bytes)
                    .cloned()
                    .unwrap_or_default();
                self.record(key, value, object.length_field_width)
            }
        }
    }

    /// A primer pack listing every tag of the current primer.
    pub fn primer_pack(&self) -> Result<KlvRecord> {
        let class = self
            .registry
            .dictionary()
            .class(PRIMER_PACK)
            .ok_or_else(|| ObjectError::UnresolvedClass(PRIMER_PACK.to_string()))?;
        let object = MxfObject::new(PRIMER_PACK).with_field(PRIMER_ENTRIES, self.primer.to_value());
        let value = self.encode_fixed_pack(&class, &object)?;
        self.record(class.identification, value, None)
    }

    /// Encode a header metadata batch with its primer pack.
    ///
    /// The primer starts fresh for every batch, seeded with the entries of
    /// any primer pack object in it. The generated primer pack follows any
    /// leading partition pack, precedes the sets and replaces the supplied
    /// one.
    pub fn encode_header(&mut self, objects: &[MxfObject]) -> Result<Vec<KlvRecord>> {
        let dict = Arc::clone(self.registry.dictionary());
        let explicit = objects
            .iter()
            .filter(|object| object.object_class == PRIMER_PACK)
            .filter_map(|object| object.get(PRIMER_ENTRIES))
            .flat_map(entries_from_value)
            .collect::<Vec<_>>();
        self.primer.reset(explicit);

        let mut records = Vec::with_capacity(objects.len() + 1);
        let mut primer_at = 0;
        for object in objects {
            if object.object_class == PRIMER_PACK {
                continue;
            }
            let leading = records.len() == primer_at;
            records.push(self.encode(object)?);
            if leading && dict.is_kind_of(&object.object_class, PARTITION_PACK) {
                primer_at = records.len();
            }
        }
        records.insert(primer_at, self.primer_pack()?);
        Ok(records)
    }

    fn encode_fixed_pack(&self, class: &Definition, object: &MxfObject) -> Result<Bytes> {
        let dict = self.registry.dictionary();
        let order = dict.get_pack_order(&class.symbol).ok_or_else(|| {
            ObjectError::UnresolvedClass(format!("{} has no pack order", class.symbol))
        })?;

        let mut planned = Vec::with_capacity(order.len());
        let mut total = 0usize;
        for property in &order {
            let value = object
                .get(property)
                .ok_or_else(|| ObjectError::MissingField {
                    class: class.symbol.clone(),
                    field: property.clone(),
                })?;
            let kind = property_kind(&self.registry, &class.symbol, property)?;
            total += kind.length(value).map_err(|source| ObjectError::InvalidProperty {
                property: property.clone(),
                source,
            })?;
            planned.push((property, kind, value));
        }

        let mut out = BytesMut::with_capacity(total);
        for (property, kind, value) in planned {
            kind.write(value, dict, &mut out)
                .map_err(|source| ObjectError::InvalidProperty {
                    property: property.clone(),
                    source,
                })?;
        }
        Ok(out.freeze())
    }

    fn encode_local_set(&mut self, class: &Definition, object: &MxfObject) -> Result<Bytes> {
        let dict = Arc::clone(self.registry.dictionary());
        let mut out = BytesMut::new();
        for (name, value) in &object.fields {
            let property = dict
                .property(name)
                .ok_or_else(|| ObjectError::UnresolvedProperty {
                    class: class.symbol.clone(),
                    property: name.clone(),
                })?;
            let kind = property_kind(&self.registry, &class.symbol, name)?;
            let invalid = |source| ObjectError::InvalidProperty {
                property: name.clone(),
                source,
            };
            let length = kind.length(value).map_err(invalid)?;
            let item_length = u16::try_from(length).map_err(|_| ObjectError::ValueTooLong {
                property: name.clone(),
                length,
            })?;
            let tag = self.primer.resolve_tag_for_property(
                &property,
                &dict,
                self.config.assign_dynamic_tags,
            );
            out.put_u16(tag);
            out.put_u16(item_length);
            kind.write(value, &dict, &mut out).map_err(invalid)?;
        }
        Ok(out.freeze())
    }

    fn encode_essence(&self, object: &MxfObject) -> Result<KlvRecord> {
        let track = EssenceTrack::from_fields(&object.fields)?;
        let data = match object.get(DATA_FIELD) {
            Some(Value::Bytes(bytes)) => bytes.clone(),
            Some(other) => {
                return Err(ObjectError::InvalidProperty {
                    property: DATA_FIELD.to_string(),
                    source: mxfkit_types::TypeError::ValueMismatch {
                        expected: "bytes".to_string(),
                        found: other.kind_name(),
                    },
                })
            }
            None => Bytes::new(),
        };
        let width = object
            .length_field_width
            .unwrap_or_else(|| essence_length_width(data.len()));
        self.record(track.to_key(), data, Some(width))
    }

    fn record(&self, key: Label, value: Bytes, width: Option<u8>) -> Result<KlvRecord> {
        let length = value.len() as u64;
        let width =
            width.unwrap_or_else(|| self.config.length_field_width.max(min_width(length)));
        check_width(length, width).map_err(KlvError::from)?;
        Ok(KlvRecord::new(key, value, width))
    }
}
