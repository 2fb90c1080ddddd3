use mxfkit_klv::{Label, ParseLabelError};

/// Errors that can occur while building a metadata dictionary.
#[derive(Debug, thiserror::Error)]
pub enum DictError {
    /// A dictionary source could not be read.
    #[error("failed to load dictionary: {0}")]
    LoadFailed(String),

    /// A dictionary source is not valid JSON.
    #[error("dictionary source is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A definition carries an identification that is not a universal label.
    #[error("invalid identification: {0}")]
    InvalidLabel(#[from] ParseLabelError),

    /// Strict loading found a second definition for the same identifier.
    #[error("duplicate definition {symbol} for {id}")]
    DuplicateDefinition { symbol: String, id: Label },
}

pub type Result<T> = std::result::Result<T, DictError>;
