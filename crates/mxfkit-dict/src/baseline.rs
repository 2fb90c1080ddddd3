//! Built-in definitions for the structural MXF sets.
//!
//! Covers partition packs, the primer pack, the random index pack, index
//! table segments, system metadata, fill, the preface and identification
//! sets, and the types they use. Registry snapshots loaded on top extend or
//! override these.

use crate::dictionary::Dictionary;
use crate::error::Result;

/// JSON source of the built-in definitions.
pub const BASELINE_JSON: &str = include_str!("baseline.json");

impl Dictionary {
    /// Dictionary holding only the built-in definitions.
    pub fn baseline() -> Result<Self> {
        Self::from_embedded(&[BASELINE_JSON])
    }

    /// Built-in definitions with registry sources layered on top.
    pub fn baseline_with(sources: &[&str]) -> Result<Self> {
        let mut dictionary = Self::baseline()?;
        for source in sources {
            dictionary.load_json_str(source)?;
        }
        Ok(dictionary)
    }
}

#[cfg(test)]
mod tests {
    use mxfkit_klv::Label;

    use crate::definition::{DefinitionKind, MetaCategory};
    use crate::dictionary::Dictionary;

    fn label(text: &str) -> Label {
        text.parse().unwrap()
    }

    #[test]
    fn every_entry_loads() {
        let dict = Dictionary::baseline().unwrap();
        let entries: Vec<serde_json::Value> =
            serde_json::from_str(super::BASELINE_JSON).unwrap();
        assert_eq!(dict.len(), entries.len());
    }

    #[test]
    fn concrete_partition_packs_share_pack_order() {
        let dict = Dictionary::baseline().unwrap();
        for tail in ["01020100", "01020400", "01030300", "01040200", "01040400"] {
            let key = label(&format!("060e2b34.02050101.0d010201.{tail}"));
            let class = dict.resolve_by_id(&key).unwrap();
            let order = dict.get_pack_order(&class.symbol).unwrap();
            assert_eq!(order.len(), 13, "{}", class.symbol);
            assert_eq!(order[0], "MajorVersion");
            assert_eq!(order[12], "EssenceContainers");
        }
    }

    #[test]
    fn pack_order_properties_and_types_resolve() {
        let dict = Dictionary::baseline().unwrap();
        for class in ["PartitionPack", "PrimerPack", "RandomIndexPack", "SystemMetadata"] {
            for symbol in dict.get_pack_order(class).unwrap() {
                let property = dict.property(&symbol).unwrap();
                let type_name = &property.as_property().unwrap().type_name;
                assert!(
                    dict.resolve_by_name(MetaCategory::Type, type_name).is_some(),
                    "{class}.{symbol}: {type_name}"
                );
            }
        }
    }

    #[test]
    fn registered_local_tags() {
        let dict = Dictionary::baseline().unwrap();
        let index = dict.local_tag_index();
        assert_eq!(
            index.id_for_tag(0x3c0a),
            Some(label("060e2b34.01010101.01011502.00000000"))
        );
        for tag in 0x3f05..=0x3f10u16 {
            assert!(index.id_for_tag(tag).is_some(), "tag {tag:#06x}");
        }
    }

    #[test]
    fn identification_set_resolves_from_local_set_key() {
        let dict = Dictionary::baseline().unwrap();
        let class = dict
            .resolve_by_id(&label("060e2b34.02530101.0d010101.01013000"))
            .unwrap();
        assert_eq!(class.symbol, "Identification");
        assert!(dict.is_kind_of("Identification", "InterchangeObject"));
        assert!(matches!(class.kind, DefinitionKind::Class(_)));
    }

    #[test]
    fn layered_sources_override_baseline() {
        let dict = Dictionary::baseline_with(&[r#"[
            { "Symbol": "KAGSize", "MetaType": "PropertyDefinition",
              "Identification": "urn:smpte:ul:060e2b34.01010104.03010201.09000000",
              "Type": "UInt16", "MemberOf": "PartitionPack" }
        ]"#])
        .unwrap();
        let property = dict.property("KAGSize").unwrap();
        assert_eq!(property.as_property().unwrap().type_name, "UInt16");
    }
}
