use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use mxfkit_klv::ul::{BER_LOCAL_SET, GROUP, LOCAL_SET};
use mxfkit_klv::Label;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::DictionaryConfig;
use crate::definition::{ClassDef, Definition, DefinitionKind, MetaCategory, PropertyDef};
use crate::error::{DictError, Result};

/// Symbol of the class synthesized for essence element keys.
pub const ESSENCE_ELEMENT: &str = "EssenceElement";

/// Parent chains longer than this are treated as cycles.
const MAX_CLASS_DEPTH: usize = 32;

/// Registered local tags in both directions.
#[derive(Debug, Default)]
pub struct LocalTagIndex {
    by_tag: HashMap<u16, Label>,
    by_id: HashMap<Label, u16>,
}

impl LocalTagIndex {
    pub fn id_for_tag(&self, tag: u16) -> Option<Label> {
        self.by_tag.get(&tag).copied()
    }

    pub fn tag_for_id(&self, id: &Label) -> Option<u16> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

/// Class, property, type and label definitions indexed by identifier and
/// by `(category, symbol)`.
///
/// Immutable once built; share it behind an `Arc` across concurrent parses.
#[derive(Debug, Default)]
pub struct Dictionary {
    by_id: HashMap<Label, Arc<Definition>>,
    by_name: HashMap<(MetaCategory, String), Arc<Definition>>,
    config: DictionaryConfig,
    tag_index: OnceLock<LocalTagIndex>,
}

impl Dictionary {
    /// Create an empty dictionary with default config.
    pub fn new() -> Self {
        Self::with_config(DictionaryConfig::default())
    }

    /// Create an empty dictionary with explicit config.
    pub fn with_config(config: DictionaryConfig) -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            config,
            tag_index: OnceLock::new(),
        }
    }

    /// Build a dictionary from already parsed definitions.
    pub fn from_definitions(definitions: impl IntoIterator<Item = Definition>) -> Result<Self> {
        let mut dictionary = Self::new();
        dictionary.extend(definitions)?;
        Ok(dictionary)
    }

    /// Build a dictionary from one JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut dictionary = Self::new();
        dictionary.load_json_str(json)?;
        Ok(dictionary)
    }

    /// Build a dictionary from embedded JSON documents, later ones overriding
    /// earlier ones.
    pub fn from_embedded(sources: &[&str]) -> Result<Self> {
        let mut dictionary = Self::new();
        for source in sources {
            dictionary.load_json_str(source)?;
        }
        Ok(dictionary)
    }

    /// Load every `*.json` file in a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, DictionaryConfig::default())
    }

    /// Load every `*.json` file in a directory with explicit config.
    ///
    /// Files load in file-name order, so override lists can be named to sort
    /// after the registry snapshot they amend.
    pub fn from_directory_with_config(path: &Path, config: DictionaryConfig) -> Result<Self> {
        let mut dictionary = Self::with_config(config);
        dictionary.load_directory(path)?;
        Ok(dictionary)
    }

    /// Add every `*.json` file in a directory on top of the current
    /// definitions. Returns how many definitions were added.
    pub fn load_directory(&mut self, path: &Path) -> Result<usize> {
        let config = self.config;
        let entries = std::fs::read_dir(path)
            .map_err(|err| DictError::LoadFailed(format!("{}: {err}", path.display())))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| DictError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.to_ascii_lowercase().ends_with(".json") {
                continue;
            }

            let entry_path = entry.path();
            let file_type = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| DictError::LoadFailed(err.to_string()))?
                .file_type();
            if file_type.is_symlink() {
                return Err(DictError::LoadFailed(format!(
                    "refusing to load dictionary symlink: {file_name}"
                )));
            }
            if file_type.is_file() {
                files.push((file_name, entry_path));
            }
        }
        files.sort();

        if files.len() > config.max_files_from_directory {
            return Err(DictError::LoadFailed(format!(
                "dictionary file count exceeds configured max ({}): {}",
                config.max_files_from_directory,
                files.len()
            )));
        }

        let mut total = 0;
        for (file_name, entry_path) in files {
            let file = std::fs::File::open(&entry_path).map_err(|err| {
                DictError::LoadFailed(format!(
                    "failed opening dictionary {}: {err}",
                    entry_path.display()
                ))
            })?;

            let max_bytes = config.max_file_size;
            let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
            let mut content = String::new();
            file.take(read_limit)
                .read_to_string(&mut content)
                .map_err(|err| {
                    DictError::LoadFailed(format!(
                        "failed reading dictionary {}: {err}",
                        entry_path.display()
                    ))
                })?;
            if content.len() > max_bytes {
                return Err(DictError::LoadFailed(format!(
                    "dictionary file too large: {file_name}"
                )));
            }

            let loaded = self.load_json_str(&content)?;
            debug!(file = %file_name, definitions = loaded, "loaded dictionary file");
            total += loaded;
        }

        Ok(total)
    }

    /// Add definitions from a JSON document: either an array of definitions
    /// or an object keyed by identifier. Returns how many were added.
    ///
    /// Entries that are not definitions (no symbol, unknown `MetaType`) are
    /// skipped with a warning.
    pub fn load_json_str(&mut self, json: &str) -> Result<usize> {
        let document: JsonValue = serde_json::from_str(json)?;
        let entries: Vec<JsonValue> = match document {
            JsonValue::Array(items) => items,
            JsonValue::Object(map) => map.into_iter().map(|(_, value)| value).collect(),
            other => {
                return Err(DictError::LoadFailed(format!(
                    "expected an array or object of definitions, found {other}"
                )))
            }
        };

        let mut definitions = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<Definition>(entry) {
                Ok(definition) => definitions.push(definition),
                Err(err) => warn!(error = %err, "skipping dictionary entry"),
            }
        }
        let count = definitions.len();
        self.extend(definitions)?;
        Ok(count)
    }

    /// Add definitions. A definition for an identifier that is already
    /// present replaces the earlier one unless `fail_on_duplicate` is set.
    pub fn extend(&mut self, definitions: impl IntoIterator<Item = Definition>) -> Result<()> {
        for definition in definitions {
            self.insert(definition)?;
        }
        self.tag_index = OnceLock::new();
        Ok(())
    }

    fn insert(&mut self, definition: Definition) -> Result<()> {
        let id = definition.identification;
        if let Some(previous) = self.by_id.get(&id) {
            if self.config.fail_on_duplicate {
                return Err(DictError::DuplicateDefinition {
                    symbol: definition.symbol,
                    id,
                });
            }
            debug!(
                symbol = %definition.symbol,
                previous = %previous.symbol,
                id = %id,
                "overriding dictionary definition"
            );
        }

        let definition = Arc::new(definition);
        self.by_name.insert(
            (definition.category(), definition.symbol.clone()),
            Arc::clone(&definition),
        );
        self.by_id.insert(id, definition);
        Ok(())
    }

    /// Look up a definition by identifier.
    ///
    /// Essence element keys resolve to a synthesized `EssenceElement` class,
    /// and local set keys are looked up under their canonical group form.
    pub fn resolve_by_id(&self, id: &Label) -> Option<Arc<Definition>> {
        if id.is_essence_element() {
            return Some(Arc::new(Definition::new(
                ESSENCE_ELEMENT,
                *id,
                DefinitionKind::Class(ClassDef {
                    is_concrete: Some(true),
                    ..ClassDef::default()
                }),
            )));
        }
        self.by_id.get(&canonical_id(id)).cloned()
    }

    /// Look up a definition by category and symbol, retrying without a
    /// trailing `Type` suffix.
    pub fn resolve_by_name(&self, category: MetaCategory, symbol: &str) -> Option<Arc<Definition>> {
        self.lookup(category, symbol).or_else(|| {
            symbol
                .strip_suffix("Type")
                .filter(|stripped| !stripped.is_empty())
                .and_then(|stripped| self.lookup(category, stripped))
        })
    }

    fn lookup(&self, category: MetaCategory, symbol: &str) -> Option<Arc<Definition>> {
        self.by_name
            .get(&(category, symbol.to_string()))
            .cloned()
    }

    pub fn class(&self, symbol: &str) -> Option<Arc<Definition>> {
        self.resolve_by_name(MetaCategory::Class, symbol)
    }

    pub fn property(&self, symbol: &str) -> Option<Arc<Definition>> {
        self.resolve_by_name(MetaCategory::Property, symbol)
    }

    /// Property attributes of a property definition found by identifier.
    pub fn property_by_id(&self, id: &Label) -> Option<(Arc<Definition>, PropertyDef)> {
        let definition = self.resolve_by_id(id)?;
        let property = definition.as_property()?.clone();
        Some((definition, property))
    }

    /// Field order of a fixed-length pack class, inherited from the nearest
    /// ancestor that declares one.
    pub fn get_pack_order(&self, class_symbol: &str) -> Option<Vec<String>> {
        let mut symbol = class_symbol.to_string();
        for _ in 0..MAX_CLASS_DEPTH {
            let definition = self.class(&symbol)?;
            let class = definition.as_class()?;
            if let Some(order) = &class.pack_order {
                return Some(order.clone());
            }
            symbol = class.parent_class.clone()?;
        }
        warn!(class = class_symbol, "class hierarchy too deep resolving pack order");
        None
    }

    /// Whether `class_symbol` is `ancestor` or inherits from it.
    pub fn is_kind_of(&self, class_symbol: &str, ancestor: &str) -> bool {
        let mut symbol = class_symbol.to_string();
        for _ in 0..MAX_CLASS_DEPTH {
            if symbol == ancestor {
                return true;
            }
            let Some(parent) = self
                .class(&symbol)
                .and_then(|definition| definition.as_class()?.parent_class.clone())
            else {
                return false;
            };
            symbol = parent;
        }
        false
    }

    /// Symbol registered for a label, for readable decoding of references
    /// and extendible enumerations.
    pub fn resolve_label_symbol(&self, label: &Label) -> Option<String> {
        self.by_id
            .get(label)
            .or_else(|| self.by_id.get(&canonical_id(label)))
            .map(|definition| definition.symbol.clone())
    }

    /// Identifier registered for a symbol, preferring label definitions.
    pub fn resolve_symbol_label(&self, symbol: &str) -> Option<Label> {
        [
            MetaCategory::Label,
            MetaCategory::Class,
            MetaCategory::Type,
            MetaCategory::Property,
        ]
        .into_iter()
        .find_map(|category| self.lookup(category, symbol))
        .map(|definition| definition.identification)
    }

    /// Dictionary-wide index between registered local tags and property
    /// identifiers, built on first use.
    pub fn local_tag_index(&self) -> &LocalTagIndex {
        self.tag_index.get_or_init(|| {
            let mut index = LocalTagIndex::default();
            for definition in self.by_id.values() {
                let Some(property) = definition.as_property() else {
                    continue;
                };
                let tag = property.local_identification;
                if tag == 0 {
                    continue;
                }
                index.by_tag.insert(tag, definition.identification);
                index.by_id.insert(definition.identification, tag);
            }
            debug!(tags = index.len(), "built local tag index");
            index
        })
    }

    /// All definitions, in no particular order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<Definition>> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }
}

/// Local set keys carry designator 0x53 (or 0x13); dictionaries register
/// the group under 0x06.
pub fn canonical_id(id: &Label) -> Label {
    match id.registry_designator() {
        LOCAL_SET | BER_LOCAL_SET if id.is_smpte() => id.with_designator(GROUP),
        _ => *id,
    }
}
