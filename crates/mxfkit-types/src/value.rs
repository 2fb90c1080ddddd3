use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use mxfkit_klv::Label;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Named fields of a record value or decoded object.
pub type Fields = BTreeMap<String, Value>;

/// A decoded metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A value the file marks as unknown, such as an all-zero timestamp.
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Label(Label),
    Timestamp(DateTime<Utc>),
    /// Fixed byte arrays and essence payloads.
    Bytes(Bytes),
    List(Vec<Value>),
    Record(Fields),
}

impl Value {
    /// Variant name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::Label(_) => "label",
            Value::Timestamp(_) => "timestamp",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&Label> {
        match self {
            Value::Label(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Fields> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Label(v) => write!(f, "{v}"),
            Value::Timestamp(v) => f.write_str(&v.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Bytes(v) => {
                for byte in v.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Record(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Str(v) => serializer.serialize_str(v),
            Value::Label(v) => v.serialize(serializer),
            Value::Timestamp(v) => {
                serializer.serialize_str(&v.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Bytes(v) => serializer.serialize_bytes(v),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

macro_rules! from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Label> for Value {
    fn from(v: Label) -> Self {
        Value::Label(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Fields> for Value {
    fn from(v: Fields) -> Self {
        Value::Record(v)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn serializes_as_plain_json() {
        let mut fields = Fields::new();
        fields.insert("Major".into(), Value::from(1u16));
        fields.insert("Name".into(), Value::from("mxfkit"));
        fields.insert(
            "When".into(),
            Value::from(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()),
        );
        fields.insert(
            "Containers".into(),
            Value::List(vec![Value::Label(
                "060e2b34.04010101.0d010201.01010900".parse().unwrap(),
            )]),
        );

        let json = serde_json::to_value(Value::Record(fields)).unwrap();
        assert_eq!(json["Major"], 1);
        assert_eq!(json["Name"], "mxfkit");
        assert_eq!(json["When"], "2024-05-06T07:08:09.000Z");
        assert_eq!(
            json["Containers"][0],
            "060e2b34-0401-0101-0d01-020101010900"
        );
    }

    #[test]
    fn display_renders_nested_values() {
        let value = Value::List(vec![
            Value::Int(-3),
            Value::Bytes(Bytes::from_static(&[0xab, 0x01])),
            Value::Bool(true),
        ]);
        assert_eq!(value.to_string(), "[-3, ab01, true]");
    }

    #[test]
    fn accessors_match_variants() {
        assert_eq!(Value::Int(5).as_i64(), Some(5));
        assert_eq!(Value::Str("x".into()).as_i64(), None);
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::List(vec![]).kind_name(), "list");
        assert_eq!(Value::Null.kind_name(), "null");
    }

    #[test]
    fn null_renders_as_null() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(serde_json::to_value(Value::Null).unwrap(), serde_json::Value::Null);
    }
}
