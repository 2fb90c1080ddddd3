//! Decode and encode MXF (SMPTE 377M) KLV streams.
//!
//! mxfkit frames a byte stream into KLV records, resolves their keys against
//! a metadata dictionary and decodes them into named objects, and runs the
//! same path in reverse to produce bytes.
//!
//! # Crate Structure
//!
//! - [`klv`]: universal labels, BER lengths and KLV framing
//! - [`dict`]: metadata dictionary and the built-in baseline
//! - [`types`]: value model and binary type codecs
//! - [`object`]: primer table, object decoding and encoding
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mxfkit::dict::Dictionary;
//! use mxfkit::object::{Encoder, MxfObject};
//! use mxfkit::types::TypeRegistry;
//!
//! let registry = Arc::new(TypeRegistry::new(Arc::new(Dictionary::baseline()?)));
//! let mut encoder = Encoder::new(registry);
//! let record = encoder.encode(
//!     &MxfObject::new("Identification").with_field("CompanyName", "Acme"),
//! )?;
//! println!("{} ({} bytes)", record.key, record.length);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Re-export KLV framing types.
pub mod klv {
    pub use mxfkit_klv::*;
}

/// Re-export dictionary types.
pub mod dict {
    pub use mxfkit_dict::*;
}

/// Re-export value and type codec types.
pub mod types {
    pub use mxfkit_types::*;
}

/// Re-export object layer types.
pub mod object {
    pub use mxfkit_object::*;
}
