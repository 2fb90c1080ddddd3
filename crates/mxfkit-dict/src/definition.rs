//! Serde model of registry metadata definitions.
//!
//! Definitions use the PascalCase keys emitted by registry converters, with
//! `MetaType` selecting the kind-specific attributes:
//! ```json
//! { "Symbol": "KAGSize", "Identification": "urn:smpte:ul:060e2b34.01010104.03010201.09000000",
//!   "MetaType": "PropertyDefinition", "Type": "UInt32", "MemberOf": "PartitionPack",
//!   "LocalIdentification": 0 }
//! ```

use std::fmt;

use mxfkit_klv::Label;
use serde::{Deserialize, Deserializer, Serialize};

/// Index category of a definition, used for name lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetaCategory {
    Class,
    Property,
    Type,
    Label,
}

impl fmt::Display for MetaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetaCategory::Class => "ClassDefinition",
            MetaCategory::Property => "PropertyDefinition",
            MetaCategory::Type => "TypeDefinition",
            MetaCategory::Label => "LabelDefinition",
        })
    }
}

/// One class, property, type or label definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Definition {
    pub symbol: String,
    pub identification: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: DefinitionKind,
}

impl Definition {
    pub fn new(symbol: impl Into<String>, identification: Label, kind: DefinitionKind) -> Self {
        Self {
            symbol: symbol.into(),
            identification,
            name: None,
            description: None,
            kind,
        }
    }

    pub fn category(&self) -> MetaCategory {
        self.kind.category()
    }

    pub fn as_class(&self) -> Option<&ClassDef> {
        match &self.kind {
            DefinitionKind::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&PropertyDef> {
        match &self.kind {
            DefinitionKind::Property(property) => Some(property),
            _ => None,
        }
    }
}

/// Kind-specific attributes, tagged by `MetaType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "MetaType")]
pub enum DefinitionKind {
    #[serde(rename = "ClassDefinition")]
    Class(ClassDef),
    #[serde(rename = "PropertyDefinition")]
    Property(PropertyDef),
    #[serde(rename = "LabelDefinition")]
    Label(NoAttributes),
    #[serde(rename = "TypeDefinitionInteger")]
    Integer(IntegerDef),
    #[serde(rename = "TypeDefinitionCharacter")]
    Character(NoAttributes),
    #[serde(rename = "TypeDefinitionString")]
    String(ElementDef),
    #[serde(rename = "TypeDefinitionRecord")]
    Record(RecordDef),
    #[serde(rename = "TypeDefinitionEnumeration")]
    Enumeration(EnumerationDef),
    #[serde(rename = "TypeDefinitionExtendibleEnumeration")]
    ExtendibleEnumeration(NoAttributes),
    #[serde(
        rename = "TypeDefinitionStrongObjectReference",
        alias = "TypeDefinitionStrongReference"
    )]
    StrongReference(ReferenceDef),
    #[serde(
        rename = "TypeDefinitionWeakObjectReference",
        alias = "TypeDefinitionWeakReference"
    )]
    WeakReference(ReferenceDef),
    #[serde(rename = "TypeDefinitionSet")]
    Set(ElementDef),
    #[serde(rename = "TypeDefinitionVariableArray")]
    VariableArray(ElementDef),
    #[serde(rename = "TypeDefinitionFixedArray")]
    FixedArray(FixedArrayDef),
    #[serde(rename = "TypeDefinitionRename")]
    Rename(RenameDef),
    #[serde(rename = "TypeDefinitionIndirect")]
    Indirect(NoAttributes),
    #[serde(rename = "TypeDefinitionOpaque")]
    Opaque(NoAttributes),
    #[serde(rename = "TypeDefinitionStream")]
    Stream(NoAttributes),
}

impl DefinitionKind {
    pub fn category(&self) -> MetaCategory {
        match self {
            DefinitionKind::Class(_) => MetaCategory::Class,
            DefinitionKind::Property(_) => MetaCategory::Property,
            DefinitionKind::Label(_) => MetaCategory::Label,
            _ => MetaCategory::Type,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoAttributes {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClassDef {
    #[serde(default, alias = "Parent", skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    /// Property symbols in wire order, for fixed-length packs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_concrete: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropertyDef {
    #[serde(rename = "Type")]
    pub type_name: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub member_of: Vec<String>,
    #[serde(default)]
    pub is_optional: bool,
    /// Registered 2-byte local tag; 0 when none is registered.
    #[serde(default, deserialize_with = "tag_number")]
    pub local_identification: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegerDef {
    pub size: u8,
    #[serde(default)]
    pub is_signed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElementDef {
    pub element_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FixedArrayDef {
    pub element_type: String,
    pub element_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RenameDef {
    pub renamed_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReferenceDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordDef {
    pub members: Members,
}

/// Record members as parallel name and type lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Members {
    pub name: Vec<String>,
    #[serde(rename = "Type")]
    pub types: Vec<String>,
}

impl Members {
    pub fn new<'a>(members: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let (name, types) = members
            .into_iter()
            .map(|(name, ty)| (name.to_string(), ty.to_string()))
            .unzip();
        Self { name, types }
    }

    /// `(name, type)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.name
            .iter()
            .map(String::as_str)
            .zip(self.types.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.name.len().min(self.types.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnumerationDef {
    pub element_type: String,
    #[serde(default)]
    pub elements: Elements,
}

/// Enumeration elements as parallel name and value lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Elements {
    pub name: Vec<String>,
    #[serde(deserialize_with = "numbers")]
    pub value: Vec<i64>,
}

impl Elements {
    pub fn new<'a>(elements: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        let (name, value) = elements
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .unzip();
        Self { name, value }
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.name
            .iter()
            .position(|candidate| candidate == name)
            .and_then(|index| self.value.get(index).copied())
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.value
            .iter()
            .position(|candidate| *candidate == value)
            .and_then(|index| self.name.get(index))
            .map(String::as_str)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(one) => vec![one],
        OneOrMany::Many(many) => many,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

impl NumberOrText {
    fn to_i64(&self) -> Option<i64> {
        match self {
            NumberOrText::Number(n) => Some(*n),
            NumberOrText::Text(text) => parse_number(text),
        }
    }
}

/// Decimal, `0x` hex or `h` suffixed hex, as found in registry exports.
fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_suffix('h'))
    {
        return i64::from_str_radix(hex, 16).ok();
    }
    text.parse().ok()
}

fn numbers<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i64>, D::Error> {
    Vec::<NumberOrText>::deserialize(deserializer)?
        .iter()
        .map(|value| {
            value
                .to_i64()
                .ok_or_else(|| serde::de::Error::custom("enumeration value is not a number"))
        })
        .collect()
}

fn tag_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let value = NumberOrText::deserialize(deserializer)?;
    value
        .to_i64()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| serde::de::Error::custom("local identification is not a 16-bit tag"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_property_with_single_member_of() {
        let def: Definition = serde_json::from_str(
            r#"{
                "Symbol": "InstanceUID",
                "Name": "Instance UID",
                "Identification": "urn:smpte:ul:060e2b34.01010101.01011502.00000000",
                "UUID": "060e2b34-0101-0101-0101-150200000000",
                "MetaType": "PropertyDefinition",
                "MemberOf": "InterchangeObject",
                "IsOptional": true,
                "Type": "AUID",
                "LocalIdentification": 15370
            }"#,
        )
        .unwrap();

        assert_eq!(def.symbol, "InstanceUID");
        assert_eq!(def.category(), MetaCategory::Property);
        let property = def.as_property().unwrap();
        assert_eq!(property.type_name, "AUID");
        assert_eq!(property.member_of, vec!["InterchangeObject"]);
        assert_eq!(property.local_identification, 0x3c0a);
    }

    #[test]
    fn parses_class_with_parent_alias() {
        let def: Definition = serde_json::from_str(
            r#"{
                "Symbol": "ANCDataDescriptor",
                "Identification": "urn:smpte:ul:060e2b34.02060101.0d010101.01015c00",
                "Parent": "DataEssenceDescriptor",
                "MetaType": "ClassDefinition"
            }"#,
        )
        .unwrap();
        let class = def.as_class().unwrap();
        assert_eq!(class.parent_class.as_deref(), Some("DataEssenceDescriptor"));
        assert!(class.pack_order.is_none());
    }

    #[test]
    fn parses_record_and_enumeration_types() {
        let record: Definition = serde_json::from_str(
            r#"{
                "Symbol": "DeltaEntry",
                "Identification": "urn:smpte:ul:060e2b34.01040101.0f721102.09000000",
                "Members": { "Name": ["PosTableIndex", "Slice", "ElementDelta"],
                             "Type": ["Int8", "UInt8", "UInt32"] },
                "MetaType": "TypeDefinitionRecord"
            }"#,
        )
        .unwrap();
        let DefinitionKind::Record(record) = &record.kind else {
            panic!("expected record, got {:?}", record.kind);
        };
        assert_eq!(
            record.members.iter().collect::<Vec<_>>(),
            vec![
                ("PosTableIndex", "Int8"),
                ("Slice", "UInt8"),
                ("ElementDelta", "UInt32")
            ]
        );

        let enumeration: Definition = serde_json::from_str(
            r#"{
                "Symbol": "ProductReleaseType",
                "Identification": "urn:smpte:ul:060e2b34.01040101.02010101.00000000",
                "ElementType": "UInt16",
                "Elements": { "Name": ["VersionUnknown", "VersionReleased", "VersionDebug"],
                              "Value": [0, "1", "0x02"] },
                "MetaType": "TypeDefinitionEnumeration"
            }"#,
        )
        .unwrap();
        let DefinitionKind::Enumeration(enumeration) = &enumeration.kind else {
            panic!("expected enumeration");
        };
        assert_eq!(enumeration.elements.value, vec![0, 1, 2]);
        assert_eq!(enumeration.elements.value_of("VersionDebug"), Some(2));
        assert_eq!(enumeration.elements.name_of(1), Some("VersionReleased"));
    }

    #[test]
    fn accepts_reference_type_aliases() {
        let def: Definition = serde_json::from_str(
            r#"{
                "Symbol": "StrongReferenceContentStorage",
                "Identification": "urn:smpte:ul:060e2b34.01040101.05022000.00000000",
                "ReferencedType": "ContentStorage",
                "MetaType": "TypeDefinitionStrongReference"
            }"#,
        )
        .unwrap();
        assert!(matches!(
            def.kind,
            DefinitionKind::StrongReference(ReferenceDef {
                referenced_type: Some(ref target)
            }) if target == "ContentStorage"
        ));
        assert_eq!(def.category(), MetaCategory::Type);
    }

    #[test]
    fn serializes_with_meta_type_tag() {
        let def = Definition::new(
            "UInt16",
            "urn:smpte:ul:060e2b34.01040101.01010200.00000000"
                .parse()
                .unwrap(),
            DefinitionKind::Integer(IntegerDef {
                size: 2,
                is_signed: false,
            }),
        );
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["MetaType"], "TypeDefinitionInteger");
        assert_eq!(json["Size"], 2);
        assert_eq!(json["Identification"], "060e2b34-0104-0101-0101-020000000000");
    }

    #[test]
    fn parse_number_forms() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x3c0a"), Some(0x3c0a));
        assert_eq!(parse_number("3c0ah"), Some(0x3c0a));
        assert_eq!(parse_number("-1"), Some(-1));
        assert_eq!(parse_number("nope"), None);
    }
}
