//! xcodec — cross-language binary serialization codec.
//!
//! Serializes in-memory object graphs into a self-describing little-endian
//! byte stream whose layout is shared with peer implementations in other
//! languages, and back. Sharing and cycles in the graph are preserved
//! through reference tracking; type identity crosses the wire either as a
//! stable numeric id or as interned (namespace, name) metastrings.
//!
//! ```
//! use xcodec::{ByteBuffer, Codec, Value};
//!
//! let mut codec = Codec::new();
//! let mut buf = ByteBuffer::new();
//! codec.serialize(&mut buf, &Value::string("hello")).unwrap();
//! assert_eq!(codec.deserialize(&mut buf).unwrap(), Value::string("hello"));
//! ```

pub mod buffer;
pub mod codec;
pub mod error;
pub mod meta;
pub mod resolver;
pub mod types;
pub mod value;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports for the common API entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// The codec instance: `serialize` / `deserialize` plus the out-of-band
/// variants.
pub use codec::Codec;
/// Builder-style configuration (registry, reference tracking, depth limit).
pub use codec::CodecBuilder;
/// Trait implemented by caller-supplied codecs for extension types.
pub use codec::ext::ExtCodec;

/// Little-endian byte store with independent reader and writer cursors.
pub use buffer::ByteBuffer;
/// Zero-copy read-only view into a buffer.
pub use buffer::ByteSlice;

/// Crate-wide error type.
pub use error::Error;
/// Crate-wide result alias.
pub use error::Result;

/// Dynamic value model for object graphs.
pub use value::Value;
/// Registry identity of user-defined types.
pub use value::TypeTag;
/// Struct instance payload.
pub use value::StructValue;
/// Extension value payload.
pub use value::ExtValue;

/// The type registry shared across codec instances.
pub use resolver::type_resolver::TypeRegistry;
/// One registered field: name plus declared static type.
pub use resolver::type_resolver::FieldDef;
/// Declared field list of a registered struct.
pub use resolver::type_resolver::StructSchema;
/// Installs the process-wide default registry (write-once).
pub use resolver::type_resolver::install_default_registry;
/// The installed process-wide default registry, if any.
pub use resolver::type_resolver::default_registry;
/// Structural static-type descriptor and composite-name grammar.
pub use resolver::typespec::TypeSpec;

/// Wire-type vocabulary.
pub use types::TypeId;
/// Two-byte stream magic (`D4 62` on the wire).
pub use types::MAGIC_NUMBER;
