use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::BytesMut;
use mxfkit_dict::{DefinitionKind, Dictionary, MetaCategory};
use tracing::trace;

use crate::error::{Result, TypeError};
use crate::kind::{ArrayLayout, TypeKind};
use crate::value::Value;

/// The one array type whose element count is implied by the buffer length.
pub const HEADERLESS_ARRAY: &str = "RandomIndexItemArray";

const MAX_TYPE_DEPTH: usize = 32;

/// Compiles dictionary type definitions into [`TypeKind`] codecs and caches
/// them by type symbol.
///
/// Shareable across threads; the cache fills on first use of each type.
#[derive(Debug)]
pub struct TypeRegistry {
    dictionary: Arc<Dictionary>,
    cache: RwLock<HashMap<String, Arc<TypeKind>>>,
}

impl TypeRegistry {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            dictionary,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Compiled codec for a type symbol.
    pub fn resolve(&self, type_name: &str) -> Result<Arc<TypeKind>> {
        self.compile(type_name, 0)
    }

    pub fn read(&self, type_name: &str, buf: &[u8]) -> Result<Value> {
        self.resolve(type_name)?.read(buf, &self.dictionary)
    }

    pub fn write(&self, type_name: &str, value: &Value, dst: &mut BytesMut) -> Result<usize> {
        self.resolve(type_name)?.write(value, &self.dictionary, dst)
    }

    pub fn size(&self, type_name: &str, buf: &[u8]) -> Result<usize> {
        self.resolve(type_name)?.size(buf)
    }

    pub fn length(&self, type_name: &str, value: &Value) -> Result<usize> {
        self.resolve(type_name)?.length(value)
    }

    fn cached(&self, type_name: &str) -> Option<Arc<TypeKind>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
    }

    fn compile(&self, type_name: &str, depth: usize) -> Result<Arc<TypeKind>> {
        if let Some(kind) = self.cached(type_name) {
            return Ok(kind);
        }
        if depth > MAX_TYPE_DEPTH {
            return Err(TypeError::inconsistent(type_name, "type nesting too deep"));
        }

        let definition = self
            .dictionary
            .resolve_by_name(MetaCategory::Type, type_name)
            .ok_or_else(|| TypeError::UnresolvedType(type_name.to_string()))?;
        let symbol = definition.symbol.as_str();

        let kind = match symbol {
            "AUID" | "UUID" => Arc::new(TypeKind::Auid),
            "TimeStamp" => Arc::new(TypeKind::TimeStamp),
            "Boolean" => Arc::new(TypeKind::Boolean),
            _ => match &definition.kind {
                DefinitionKind::Rename(rename) => self.compile(&rename.renamed_type, depth + 1)?,
                DefinitionKind::Integer(integer) => {
                    if !matches!(integer.size, 1 | 2 | 4 | 8) {
                        return Err(TypeError::inconsistent(
                            symbol,
                            format!("unsupported integer size {}", integer.size),
                        ));
                    }
                    Arc::new(TypeKind::Integer {
                        size: integer.size,
                        signed: integer.is_signed,
                    })
                }
                DefinitionKind::Character(_) => Arc::new(TypeKind::Character),
                DefinitionKind::String(string) => {
                    let element = self.compile(&string.element_type, depth + 1)?;
                    let utf16 = match *element {
                        TypeKind::Character => true,
                        TypeKind::Integer { size: 1, .. } => false,
                        _ => {
                            return Err(TypeError::inconsistent(
                                symbol,
                                format!("unsupported character type {}", string.element_type),
                            ))
                        }
                    };
                    Arc::new(TypeKind::String { utf16 })
                }
                DefinitionKind::Record(record) => {
                    if record.members.is_empty() {
                        return Err(TypeError::inconsistent(symbol, "record has no members"));
                    }
                    let mut members = Vec::with_capacity(record.members.len());
                    let mut size = 0usize;
                    for (name, member_type) in record.members.iter() {
                        let member = self.compile(member_type, depth + 1)?;
                        size += member.fixed_size().ok_or_else(|| {
                            TypeError::inconsistent(
                                symbol,
                                format!("member {name} has no fixed size"),
                            )
                        })?;
                        members.push((name.to_string(), member));
                    }
                    Arc::new(TypeKind::Record { members, size })
                }
                DefinitionKind::Enumeration(enumeration) => {
                    let base = self.compile(&enumeration.element_type, depth + 1)?;
                    match *base {
                        TypeKind::Integer { size, signed } => Arc::new(TypeKind::Enumeration {
                            size,
                            signed,
                            elements: enumeration.elements.clone(),
                        }),
                        TypeKind::Auid | TypeKind::Label { .. } => {
                            Arc::new(TypeKind::Label { resolve: true })
                        }
                        _ => {
                            return Err(TypeError::inconsistent(
                                symbol,
                                format!("enumeration over {}", enumeration.element_type),
                            ))
                        }
                    }
                }
                DefinitionKind::ExtendibleEnumeration(_)
                | DefinitionKind::StrongReference(_)
                | DefinitionKind::WeakReference(_) => Arc::new(TypeKind::Label { resolve: true }),
                DefinitionKind::Set(array) | DefinitionKind::VariableArray(array) => {
                    let element = self.compile(&array.element_type, depth + 1)?;
                    let element_size = element_size(symbol, &element)?;
                    let layout = if symbol == HEADERLESS_ARRAY {
                        ArrayLayout::Headerless
                    } else {
                        ArrayLayout::Counted
                    };
                    Arc::new(TypeKind::Array {
                        element,
                        element_size,
                        layout,
                    })
                }
                DefinitionKind::FixedArray(array) => {
                    let element = self.compile(&array.element_type, depth + 1)?;
                    element_size(symbol, &element)?;
                    Arc::new(TypeKind::FixedArray {
                        element,
                        count: array.element_count,
                    })
                }
                DefinitionKind::Indirect(_)
                | DefinitionKind::Opaque(_)
                | DefinitionKind::Stream(_) => Arc::new(TypeKind::Opaque),
                DefinitionKind::Class(_)
                | DefinitionKind::Property(_)
                | DefinitionKind::Label(_) => {
                    return Err(TypeError::inconsistent(symbol, "not a type definition"))
                }
            },
        };

        trace!(type_name, symbol, "compiled type");
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(type_name.to_string(), Arc::clone(&kind));
        if symbol != type_name {
            cache.insert(symbol.to_string(), Arc::clone(&kind));
        }
        Ok(kind)
    }
}

fn element_size(symbol: &str, element: &TypeKind) -> Result<usize> {
    match element.fixed_size() {
        Some(size) if size > 0 => Ok(size),
        _ => Err(TypeError::inconsistent(
            symbol,
            "array element has no fixed size",
        )),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use mxfkit_dict::{Definition, ElementDef, IntegerDef, RenameDef};
    use mxfkit_klv::Label;

    use super::*;
    use crate::value::Fields;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(Arc::new(Dictionary::baseline().unwrap()))
    }

    fn record(fields: &[(&str, Value)]) -> Value {
        Value::Record(
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    fn label(text: &str) -> Label {
        text.parse().unwrap()
    }

    /// length, write, size and read agree for one value.
    fn assert_roundtrip(registry: &TypeRegistry, type_name: &str, value: Value) {
        let length = registry.length(type_name, &value).unwrap();
        let mut dst = BytesMut::new();
        let written = registry.write(type_name, &value, &mut dst).unwrap();
        assert_eq!(written, length, "{type_name}: write vs length");
        assert_eq!(dst.len(), length, "{type_name}: buffer size");
        assert_eq!(
            registry.size(type_name, &dst).unwrap(),
            length,
            "{type_name}: size"
        );
        assert_eq!(
            registry.read(type_name, &dst).unwrap(),
            value,
            "{type_name}: read"
        );
    }

    #[test]
    fn every_category_roundtrips() {
        let registry = registry();
        let cases = vec![
            ("UInt8", Value::Int(255)),
            ("Int16", Value::Int(-300)),
            ("UInt32", Value::Int(0xDEAD_BEEF)),
            ("UInt64", Value::Int(0xFFFF_FFFF_FFFF)),
            ("PositionType", Value::Int(-42)),
            ("Boolean", Value::Bool(true)),
            ("ProductReleaseType", Value::from("VersionBeta")),
            ("Character", Value::from("x")),
            ("UTF16String", Value::from("Avid Media Composer")),
            ("AUID", Value::Label(label("060e2b34.01010105.01020210.02010000"))),
            (
                "TimeStamp",
                Value::Timestamp(Utc.with_ymd_and_hms(2013, 7, 1, 12, 30, 5).unwrap()),
            ),
            (
                "Rational",
                record(&[("Numerator", Value::Int(30000)), ("Denominator", Value::Int(1001))]),
            ),
            (
                "VersionType",
                record(&[("Major", Value::Int(1)), ("Minor", Value::Int(-2))]),
            ),
            (
                "ProductVersionType",
                record(&[
                    ("Major", Value::Int(2)),
                    ("Minor", Value::Int(0)),
                    ("Patch", Value::Int(3)),
                    ("Build", Value::Int(17)),
                    ("Release", Value::from("VersionReleased")),
                ]),
            ),
            (
                "AUIDSet",
                Value::List(vec![
                    Value::Label(label("060e2b34.04010102.0d010301.02046001")),
                    Value::Label(label("060e2b34.04010109.0d010301.020e0000")),
                ]),
            ),
            (
                "LocalTagEntryBatch",
                Value::List(vec![record(&[
                    ("LocalTag", Value::Int(0x3c0a)),
                    ("UID", Value::Label(label("060e2b34.01010101.01011502.00000000"))),
                ])]),
            ),
            (
                "IndexEntryArray",
                Value::List(vec![
                    record(&[
                        ("TemporalOffset", Value::Int(0)),
                        ("KeyFrameOffset", Value::Int(-1)),
                        ("Flags", Value::Int(0x80)),
                        ("StreamOffset", Value::Int(1 << 40)),
                    ]),
                    record(&[
                        ("TemporalOffset", Value::Int(2)),
                        ("KeyFrameOffset", Value::Int(0)),
                        ("Flags", Value::Int(0)),
                        ("StreamOffset", Value::Int(4096)),
                    ]),
                ]),
            ),
            (
                "RandomIndexItemArray",
                Value::List(vec![
                    record(&[("BodySID", Value::Int(0)), ("ByteOffset", Value::Int(0))]),
                    record(&[("BodySID", Value::Int(1)), ("ByteOffset", Value::Int(80_970_752))]),
                ]),
            ),
            ("UInt8Array", Value::List(vec![Value::Int(1), Value::Int(2)])),
            ("UInt8Array8", Value::Bytes(Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]))),
            (
                "StrongReferenceVectorIdentification",
                Value::List(vec![Value::Label(label("a0b1c2d3-e4f5-0617-2839-4a5b6c7d8e9f"))]),
            ),
        ];
        for (type_name, value) in cases {
            assert_roundtrip(&registry, type_name, value);
        }
    }

    #[test]
    fn headerless_array_has_no_count_prefix() {
        let registry = registry();
        let value = Value::List(vec![record(&[
            ("BodySID", Value::Int(1)),
            ("ByteOffset", Value::Int(512)),
        ])]);
        let mut dst = BytesMut::new();
        registry.write(HEADERLESS_ARRAY, &value, &mut dst).unwrap();
        assert_eq!(dst.as_ref(), &[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 2, 0]);

        let mut counted = BytesMut::new();
        registry.write("IndexEntryArray", &Value::List(vec![]), &mut counted).unwrap();
        assert_eq!(counted.as_ref(), &[0, 0, 0, 0, 0, 0, 0, 11]);
    }

    #[test]
    fn references_decode_to_registered_symbols() {
        let registry = registry();
        let op1a = label("060e2b34.04010101.0d010201.01010900");
        let dict = Arc::clone(registry.dictionary());
        let reference = TypeKind::Label { resolve: true };
        let value = reference.read(op1a.as_bytes(), &dict).unwrap();
        assert_eq!(value, Value::from("MXFOP1aSingleItemSinglePackage"));

        let mut dst = BytesMut::new();
        reference.write(&value, &dict, &mut dst).unwrap();
        assert_eq!(dst.as_ref(), op1a.as_bytes());

        // Unregistered identifiers stay labels.
        let unknown = [0x11u8; 16];
        assert_eq!(
            registry.read("StrongReferenceIdentification", &unknown).unwrap(),
            Value::Label(Label(unknown))
        );
        // Plain AUIDs never resolve.
        assert_eq!(
            registry.read("AUID", op1a.as_bytes()).unwrap(),
            Value::Label(op1a)
        );
    }

    #[test]
    fn type_suffix_and_aliases_share_the_cache() {
        let registry = registry();
        let renamed = registry.resolve("LengthType").unwrap();
        assert_eq!(
            *renamed,
            TypeKind::Integer {
                size: 8,
                signed: true
            }
        );
        assert!(Arc::ptr_eq(&renamed, &registry.resolve("LengthType").unwrap()));
        assert!(registry.resolve("UInt32Type").is_ok());
    }

    #[test]
    fn unresolved_types_fail_fast() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("NoSuchType"),
            Err(TypeError::UnresolvedType(name)) if name == "NoSuchType"
        ));

        let dict = Dictionary::from_definitions([Definition::new(
            "BrokenArray",
            label("060e2b34.01040101.0f000000.00000001"),
            DefinitionKind::VariableArray(ElementDef {
                element_type: "Missing".into(),
            }),
        )])
        .unwrap();
        let registry = TypeRegistry::new(Arc::new(dict));
        assert!(matches!(
            registry.resolve("BrokenArray"),
            Err(TypeError::UnresolvedType(name)) if name == "Missing"
        ));
    }

    #[test]
    fn inconsistent_definitions_are_reported() {
        let dict = Dictionary::from_definitions([
            Definition::new(
                "UInt24",
                label("060e2b34.01040101.0f000000.00000002"),
                DefinitionKind::Integer(IntegerDef {
                    size: 3,
                    is_signed: false,
                }),
            ),
            Definition::new(
                "Loop",
                label("060e2b34.01040101.0f000000.00000003"),
                DefinitionKind::Rename(RenameDef {
                    renamed_type: "Loop".into(),
                }),
            ),
            Definition::new(
                "Texts",
                label("060e2b34.01040101.0f000000.00000004"),
                DefinitionKind::Set(ElementDef {
                    element_type: "Text".into(),
                }),
            ),
            Definition::new(
                "Text",
                label("060e2b34.01040101.0f000000.00000005"),
                DefinitionKind::Opaque(Default::default()),
            ),
        ])
        .unwrap();
        let registry = TypeRegistry::new(Arc::new(dict));
        for name in ["UInt24", "Loop", "Texts"] {
            assert!(
                matches!(
                    registry.resolve(name),
                    Err(TypeError::InconsistentDefinition { .. })
                ),
                "{name}"
            );
        }
    }

    #[test]
    fn records_missing_members_are_rejected() {
        let registry = registry();
        let mut fields = Fields::new();
        fields.insert("Numerator".into(), Value::Int(1));
        let mut dst = BytesMut::new();
        assert!(registry
            .write("Rational", &Value::Record(fields), &mut dst)
            .is_err());
        assert!(dst.is_empty());
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve("IndexEntryArray").unwrap())
            })
            .collect();
        for handle in handles {
            assert!(matches!(*handle.join().unwrap(), TypeKind::Array { .. }));
        }
    }
}
