//! Metastring compression — interned short string fragments for type headers.
//!
//! Type namespaces and names repeat heavily inside one stream; this module
//! packs each fragment into its smallest representation and replaces repeat
//! occurrences with one-varint back-references.

pub mod metastring;
pub mod resolver;

pub use metastring::{
    MetaEncoding, MetaStringBytes, MetaStringEncoder, NAMESPACE_ENCODER, TYPE_NAME_ENCODER,
};
pub use resolver::{MetaStringReader, MetaStringWriter};
