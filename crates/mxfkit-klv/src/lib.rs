//! KLV framing for MXF (SMPTE 377M) streams.
//!
//! Every MXF byte is part of a Key-Length-Value record:
//! - A 16-byte universal label as key
//! - A BER-coded length, 1 to 9 bytes wide
//! - `length` value bytes
//!
//! The framer reassembles records from chunks of any size, so callers never
//! deal with records split across reads.

pub mod ber;
#[cfg(feature = "async")]
pub mod codec;
pub mod error;
pub mod framer;
pub mod reader;
pub mod record;
pub mod ul;
pub mod writer;

pub use ber::{
    encode_key_and_length, min_width, read_key_and_length, write_key_and_length, KeyAndLength,
};
#[cfg(feature = "async")]
pub use codec::KlvCodec;
pub use error::{KlvError, LengthEncodingError, Result};
pub use framer::{FramerConfig, KlvFramer, DEFAULT_MAX_VALUE_SIZE, DEFAULT_READ_CHUNK_SIZE};
pub use reader::KlvReader;
pub use record::{Fragments, KlvRecord};
pub use ul::{Label, ParseLabelError, ESSENCE_ELEMENT_PREFIX, LABEL_SIZE};
pub use writer::KlvWriter;
