//! Binary codecs for MXF metadata values.
//!
//! A [`TypeRegistry`] compiles dictionary type definitions into a closed
//! [`TypeKind`] union. Every kind reads, writes, sizes and measures
//! [`Value`]s in its wire encoding.

pub mod error;
pub mod kind;
pub mod registry;
pub mod value;

pub use error::{Result, TypeError};
pub use kind::{integer_range, ArrayLayout, TypeKind, ARRAY_HEADER_SIZE, TIMESTAMP_SIZE};
pub use registry::{TypeRegistry, HEADERLESS_ARRAY};
pub use value::{Fields, Value};
