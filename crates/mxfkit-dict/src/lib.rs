//! Registry-driven metadata dictionary for MXF.
//!
//! Holds class, property, type and label definitions indexed by universal
//! label and by `(category, symbol)`. Definitions load from JSON registry
//! exports (arrays or identifier-keyed objects); a built-in baseline covers
//! the structural MXF sets.

pub mod baseline;
pub mod config;
pub mod definition;
pub mod dictionary;
pub mod error;

pub use config::DictionaryConfig;
pub use definition::{
    ClassDef, Definition, DefinitionKind, ElementDef, Elements, EnumerationDef, FixedArrayDef,
    IntegerDef, Members, MetaCategory, NoAttributes, PropertyDef, RecordDef, ReferenceDef,
    RenameDef,
};
pub use dictionary::{canonical_id, Dictionary, LocalTagIndex, ESSENCE_ELEMENT};
pub use error::{DictError, Result};
