use mxfkit_klv::{KlvRecord, Label};
use mxfkit_types::{Fields, Value};
use serde::Serialize;

use crate::error::ObjectError;

/// One item of a decoded local set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyInfo {
    pub tag: u16,
    pub length: usize,
    /// Property symbol, when the tag resolved.
    pub name: Option<String>,
}

/// A KLV record decoded into named fields.
#[derive(Debug, Serialize)]
pub struct DecodedObject {
    pub key: Label,
    pub object_class: String,
    pub fields: Fields,
    /// Local set items in wire order. Empty for packs and essence.
    pub properties: Vec<PropertyInfo>,
    /// Properties that failed to resolve or decode.
    #[serde(skip)]
    pub issues: Vec<ObjectError>,
    pub stream_offset: u64,
    pub length_field_width: u8,
}

impl DecodedObject {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Result of detailing one record.
#[derive(Debug)]
pub enum Decoded {
    Object(DecodedObject),
    /// Records whose key names no decodable category, such as fill.
    Passthrough(KlvRecord),
}

impl Decoded {
    pub fn object(&self) -> Option<&DecodedObject> {
        match self {
            Decoded::Object(object) => Some(object),
            Decoded::Passthrough(_) => None,
        }
    }

    pub fn into_object(self) -> Option<DecodedObject> {
        match self {
            Decoded::Object(object) => Some(object),
            Decoded::Passthrough(_) => None,
        }
    }
}

/// A symbolic object to encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MxfObject {
    pub object_class: String,
    pub fields: Fields,
    /// BER width to reuse, typically carried over from a decoded record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_field_width: Option<u8>,
}

impl MxfObject {
    pub fn new(object_class: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            fields: Fields::new(),
            length_field_width: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_length_field_width(mut self, width: u8) -> Self {
        self.length_field_width = Some(width);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl From<DecodedObject> for MxfObject {
    fn from(object: DecodedObject) -> Self {
        Self {
            object_class: object.object_class,
            fields: object.fields,
            length_field_width: Some(object.length_field_width),
        }
    }
}
