//! Avro record codec.
//!
//! Records are encoded as Avro binary prefixed with a zero magic byte and the
//! big-endian id of the writer schema (see [`wire`]). The [`Encoder`]
//! registers the schema before encoding; the [`Decoder`] resolves the id back
//! to the writer schema. Both go through a [`schema_registry::SchemaRegistry`],
//! normally a shared [`schema_registry::CachedSchemaRegistry`].

mod convert;
mod decoder;
mod encoder;
pub mod wire;

pub use decoder::{Decoded, Decoder};
pub use encoder::{EncodedMessage, Encoder};
