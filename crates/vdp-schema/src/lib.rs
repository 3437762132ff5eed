//! Self-describing channel schemas for VDP.
//!
//! A channel's payload is a tree of [`Part`]s. The tree describes itself in a
//! broadcast ([`Part::write_schema`]) so the peer can rebuild it with
//! [`decode_schema`], and afterwards only values travel
//! ([`Part::write_message`] / [`Part::read_message`]).
//!
//! Parts are shared between the application and the registry through
//! [`PartPtr`], a reference-counted handle.

pub mod decoder;
pub mod error;
pub mod number;
pub mod part;
pub mod record;
pub mod text;
pub mod types;

pub use decoder::{decode_schema, MAX_DEPTH};
pub use error::{Result, SchemaError};
pub use number::{
    Float32, Float64, Int16, Int32, Int64, Int8, Number, NumberKind, Uint16, Uint32, Uint64, Uint8,
};
pub use part::{lock_part, part_ptr, pretty_print, Part, PartPtr};
pub use record::Record;
pub use text::Text;
pub use types::SchemaType;
