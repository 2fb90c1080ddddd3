/// Reasons a BER length cannot be written with the requested width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LengthEncodingError {
    /// MXF defines BER length fields of 1 to 9 bytes.
    #[error("invalid BER length width {0} (MXF defines 1 to 9 bytes)")]
    InvalidWidth(u8),

    /// A 1-byte (short form) length only holds values below 128.
    #[error("1 byte length cannot hold {0} (short form holds values below 128)")]
    WidthTooSmall(u64),

    /// The long form with `width - 1` tail bytes cannot hold the value.
    #[error("length {length} exceeds the capacity of a {width} byte BER length")]
    LengthExceedsWidth { length: u64, width: u8 },
}

/// Errors that can occur while framing or writing KLV records.
#[derive(Debug, thiserror::Error)]
pub enum KlvError {
    /// A key and length could not be written with the requested width.
    #[error("invalid length encoding: {0}")]
    InvalidLengthEncoding(#[from] LengthEncodingError),

    /// A BER length header declares more tail bytes than MXF allows.
    ///
    /// The next record boundary cannot be found, so this is fatal for the stream.
    #[error("corrupt BER length at offset {offset}: {tail} tail bytes (max 8)")]
    CorruptLength { offset: u64, tail: u8 },

    /// The declared value length exceeds the configured maximum.
    #[error("value too large at offset {offset} ({size} bytes, max {max})")]
    ValueTooLarge { offset: u64, size: u64, max: usize },

    /// The stream ended inside a record.
    #[error("stream ended with {pending} bytes of an incomplete KLV record at offset {offset}")]
    Truncated { offset: u64, pending: usize },

    /// A record's declared length disagrees with its value bytes.
    #[error("record length {declared} does not match {actual} value bytes")]
    LengthMismatch { declared: u64, actual: usize },

    /// An I/O error occurred while reading or writing records.
    #[error("KLV I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KlvError {
    /// Whether the error leaves the stream without a findable next record.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            KlvError::InvalidLengthEncoding(_) | KlvError::LengthMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, KlvError>;
