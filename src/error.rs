//! Crate-wide error taxonomy.
//!
//! Every failure the codec can produce is one variant of [`Error`]; errors
//! bubble to the top-level `serialize` / `deserialize` call unchanged and
//! nothing is retried inside the codec. A failed call always leaves the
//! codec instance reusable — session state is reset on every exit path.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure kinds of the wire codec.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The reader hit the end of the buffer in the middle of a value.
    #[error("unexpected end of buffer while reading {context}")]
    Truncated {
        /// What was being read when the buffer ran out.
        context: &'static str,
    },

    /// The stream does not begin with the xlang magic bytes `D4 62`.
    #[error("stream does not start with the xlang magic number 0x62D4")]
    BadMagic,

    /// The session flag byte declares a feature bit this port does not know.
    #[error("unsupported session flags 0x{bits:02x}")]
    UnsupportedVersion {
        /// The offending flag bits.
        bits: u8,
    },

    /// The destination type is incompatible with what the wire carries.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What the slot's static type or wire header demanded.
        expected: String,
        /// What was actually present.
        found: String,
    },

    /// A named type header references a (namespace, name) pair absent from
    /// the registry. Carries the decoded name so callers can register it.
    #[error("unregistered type (namespace {namespace:?}, name {name:?})")]
    UnregisteredType {
        /// Decoded namespace fragment, possibly empty.
        namespace: String,
        /// Decoded type-name fragment.
        name: String,
    },

    /// A metastring back-reference points past the fragments read so far.
    #[error("metastring back-reference {id} is out of range")]
    UnknownMetaStringId {
        /// The out-of-range fragment id.
        id: u32,
    },

    /// A reference back-reference points past the objects read so far.
    #[error("object back-reference {id} is out of range")]
    UnknownRefId {
        /// The out-of-range reference id.
        id: u32,
    },

    /// Varint continuation bytes exceeded the encoding's size limit.
    #[error("varint exceeds {max_bytes} bytes")]
    VarintTooLong {
        /// Maximum byte count for the varint form being read.
        max_bytes: usize,
    },

    /// A string payload does not decode under its declared encoding.
    #[error("string payload is not valid for its declared encoding")]
    InvalidUtf8,

    /// A date, timestamp, or duration payload is outside the representable
    /// range of the host time types.
    #[error("date/time payload out of representable range")]
    InvalidDate,

    /// Registration API misuse: the id or name slot is already taken.
    #[error("already registered: {what}")]
    AlreadyRegistered {
        /// Description of the occupied slot.
        what: String,
    },

    /// A user registration id collides with the wire-type vocabulary or the
    /// internal sentinel ranges.
    #[error("type id {id} is outside the user-assignable range")]
    InvalidTypeId {
        /// The rejected id.
        id: i32,
    },

    /// A type was registered under an empty or malformed name.
    #[error("invalid type name {name:?}")]
    InvalidTypeName {
        /// The rejected name.
        name: String,
    },

    /// Nesting exceeded the configured depth with reference tracking off;
    /// the graph is either cyclic or pathologically deep.
    #[error("recursion limit of {limit} exceeded with reference tracking disabled")]
    RecursionLimit {
        /// The configured depth limit.
        limit: usize,
    },

    /// A metastring header or payload is malformed.
    #[error("malformed metastring header or payload")]
    MetaStringTruncated,

    /// Bytes remain after the root value was fully read.
    #[error("{remaining} trailing bytes after the root value")]
    TrailingBytes {
        /// Number of unread bytes left in the buffer.
        remaining: usize,
    },

    /// An out-of-band placeholder has no matching side-channel buffer.
    #[error("out-of-band placeholder {index} has no matching buffer")]
    MissingOutOfBandBuffer {
        /// The placeholder index that failed to resolve.
        index: usize,
    },

    /// The underlying buffer refused a write (caller-imposed limit).
    #[error("buffer refused the write: {reason}")]
    Io {
        /// Why the write was refused.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let e = Error::Truncated { context: "varint32" };
        assert!(e.to_string().contains("varint32"));

        let e = Error::UnregisteredType {
            namespace: "example".into(),
            name: "A".into(),
        };
        assert!(e.to_string().contains("example"));
        assert!(e.to_string().contains('A'));
    }

    #[test]
    fn error_is_std_error() {
        fn assert_std_error<E: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
