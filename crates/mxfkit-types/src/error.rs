/// Errors produced while resolving or coding a typed value.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// A type symbol has no definition in the dictionary.
    #[error("unresolved type: {0}")]
    UnresolvedType(String),

    /// A definition exists but cannot be compiled into a codec.
    #[error("inconsistent definition for type {type_name}: {reason}")]
    InconsistentDefinition { type_name: String, reason: String },

    /// An integer does not fit the wire width, or an 8-byte field uses
    /// more than 48 significant bits.
    #[error("integer {value} out of range for {size}-byte field (signed: {signed})")]
    IntegerOutOfRange { value: i128, size: u8, signed: bool },

    #[error("insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid string: {0}")]
    InvalidString(String),

    /// The value variant cannot be written with this type.
    #[error("expected {expected}, found {found}")]
    ValueMismatch { expected: String, found: &'static str },

    #[error("unknown enumeration element: {0}")]
    UnknownEnumeration(String),

    /// A symbolic label could not be mapped to an identifier.
    #[error("unresolved label: {0}")]
    UnresolvedLabel(String),
}

impl TypeError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: &crate::Value) -> Self {
        Self::ValueMismatch {
            expected: expected.into(),
            found: found.kind_name(),
        }
    }

    pub(crate) fn inconsistent(type_name: &str, reason: impl Into<String>) -> Self {
        Self::InconsistentDefinition {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TypeError>;
