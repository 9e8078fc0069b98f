//! User extension types — caller-supplied value codecs.
//!
//! Everything else in the value layer dispatches over the closed wire-type
//! taxonomy; extension types are the one open seam, so they go through a
//! trait object the caller registers alongside the type.

use std::any::Any;

use crate::buffer::ByteBuffer;
use crate::error::Result;

/// Codec for one registered extension type.
///
/// The payload is opaque to the codec; implementations downcast the
/// `dyn Any` they handed out at construction time. Encode and decode must
/// agree byte-for-byte with the peer's registration for the same
/// (namespace, name) or id.
pub trait ExtCodec: Send + Sync {
    /// Serializes one ext payload into the stream.
    fn encode(&self, buf: &mut ByteBuffer, value: &dyn Any) -> Result<()>;

    /// Materializes one ext payload from the stream.
    fn decode(&self, buf: &mut ByteBuffer) -> Result<Box<dyn Any>>;
}
