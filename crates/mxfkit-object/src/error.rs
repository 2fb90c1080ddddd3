use mxfkit_klv::KlvError;
use mxfkit_types::TypeError;

/// Errors decoding or encoding one object.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// No class definition for a key or class symbol.
    #[error("unresolved class: {0}")]
    UnresolvedClass(String),

    /// A local tag or field name has no property definition.
    #[error("unresolved property {property} in {class}")]
    UnresolvedProperty { class: String, property: String },

    /// BER-length local sets are not decoded or encoded.
    #[error("unsupported encoding for {key}: registry designator {designator:#04x}")]
    UnsupportedEncoding { key: String, designator: u8 },

    #[error("malformed local set at byte {offset}: {reason}")]
    MalformedLocalSet { offset: usize, reason: String },

    /// A fixed pack field required by the pack order is absent.
    #[error("{class} is missing field {field}")]
    MissingField { class: String, field: String },

    /// A local set item longer than its 2-byte length field allows.
    #[error("value of {property} is {length} bytes, local sets allow 65535")]
    ValueTooLong { property: String, length: usize },

    /// A property value failed to decode or encode.
    #[error("property {property}: {source}")]
    InvalidProperty {
        property: String,
        #[source]
        source: TypeError,
    },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Klv(#[from] KlvError),
}

impl ObjectError {
    /// Whether the error stems from dictionary coverage rather than bad data.
    ///
    /// Dictionaries lag registry updates, so callers typically tolerate
    /// these and halt on the rest.
    pub fn is_coverage_gap(&self) -> bool {
        match self {
            ObjectError::UnresolvedClass(_)
            | ObjectError::UnresolvedProperty { .. }
            | ObjectError::UnsupportedEncoding { .. } => true,
            ObjectError::InvalidProperty { source, .. } | ObjectError::Type(source) => {
                matches!(source, TypeError::UnresolvedType(_))
            }
            _ => false,
        }
    }
}

/// Errors from an object stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The byte stream cannot be framed further; iteration ends.
    #[error("framing failed: {0}")]
    Framing(#[from] KlvError),

    /// One record failed to decode; the stream continues after it.
    #[error("record at offset {offset}: {error}")]
    Record {
        offset: u64,
        #[source]
        error: ObjectError,
    },
}

impl StreamError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::Framing(_))
    }
}

pub type Result<T> = std::result::Result<T, ObjectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_gaps_are_distinguished_from_integrity_errors() {
        assert!(ObjectError::UnresolvedClass("x".into()).is_coverage_gap());
        assert!(ObjectError::InvalidProperty {
            property: "Foo".into(),
            source: TypeError::UnresolvedType("FooType".into()),
        }
        .is_coverage_gap());
        assert!(!ObjectError::InvalidProperty {
            property: "Foo".into(),
            source: TypeError::InvalidString("bad".into()),
        }
        .is_coverage_gap());
        assert!(!ObjectError::MalformedLocalSet {
            offset: 3,
            reason: "truncated".into()
        }
        .is_coverage_gap());
    }

    #[test]
    fn record_errors_are_not_fatal() {
        let err = StreamError::Record {
            offset: 10,
            error: ObjectError::UnresolvedClass("k".into()),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "record at offset 10: unresolved class: k");
    }
}
