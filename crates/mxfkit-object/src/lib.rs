//! MXF object layer.
//!
//! Turns framed KLV records into named objects and back. The [`Detailer`]
//! decodes fixed packs, local sets and essence elements; the [`Encoder`]
//! produces records from [`MxfObject`]s. Both keep a [`Primer`] mapping
//! local tags to property labels.
//!
//! ```no_run
//! use std::fs::File;
//! use std::sync::Arc;
//!
//! use mxfkit_dict::Dictionary;
//! use mxfkit_object::ObjectReader;
//! use mxfkit_types::TypeRegistry;
//!
//! let registry = Arc::new(TypeRegistry::new(Arc::new(Dictionary::baseline()?)));
//! for decoded in ObjectReader::new(File::open("clip.mxf")?, registry) {
//!     if let Some(object) = decoded?.object() {
//!         println!("{} at {}", object.object_class, object.stream_offset);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod detail;
pub mod encode;
pub mod error;
pub mod essence;
pub mod object;
pub mod primer;
pub mod stream;

pub use detail::{Category, Detailer, DetailerConfig, PRIMER_ENTRIES, PRIMER_PACK};
pub use encode::{Encoder, EncoderConfig, DEFAULT_LENGTH_FIELD_WIDTH};
pub use error::{ObjectError, Result, StreamError};
pub use essence::{essence_length_width, EssenceTrack, WIDE_ESSENCE_THRESHOLD};
pub use object::{Decoded, DecodedObject, MxfObject, PropertyInfo};
pub use primer::{Primer, DYNAMIC_TAG_FLOOR, SEEDED_TAGS};
pub use stream::{ObjectReader, ObjectWriter};
