//! Top-level codec — framing, session lifecycle, and the public API.
//!
//! A stream is `magic(2) flags(1) root_value` where the root is a fully
//! dynamic slot. One `Codec` instance handles one serialize or deserialize
//! call at a time (`&mut self` makes concurrent calls unrepresentable);
//! session state lives on the instance so its maps are cleared, not
//! reallocated, between calls, and is unconditionally reset on every exit
//! path — after a failure the instance is immediately reusable.

pub mod ext;
pub(crate) mod map;
pub(crate) mod read;
pub(crate) mod strings;
pub(crate) mod structs;
pub(crate) mod time;
pub(crate) mod write;

use std::rc::Rc;
use std::sync::Arc;

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::meta::resolver::{MetaStringReader, MetaStringWriter};
use crate::resolver::reference::{RefReader, RefWriter};
use crate::resolver::type_resolver::{default_registry, TypeRegistry, TypeResolver};
use crate::types::{session_flags, MAGIC_NUMBER};
use crate::value::Value;

/// Default nesting limit applied when reference tracking is off.
pub const DEFAULT_MAX_DEPTH: usize = 512;

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct WriteSession<'a, 'b> {
    pub buf: &'a mut ByteBuffer,
    pub resolver: &'a TypeResolver,
    pub meta: &'a mut MetaStringWriter,
    pub refs: &'a mut RefWriter,
    pub tracking: bool,
    pub depth: usize,
    pub max_depth: usize,
    pub oob: Option<&'b mut dyn FnMut(&Rc<Vec<u8>>) -> bool>,
    pub oob_count: u32,
}

pub(crate) struct ReadSession<'a> {
    pub buf: &'a mut ByteBuffer,
    pub resolver: &'a mut TypeResolver,
    pub meta: &'a mut MetaStringReader,
    pub refs: &'a mut RefReader,
    pub oob_mode: bool,
    pub oob: Option<&'a [Rc<Vec<u8>>]>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Configures and builds a [`Codec`].
#[derive(Default)]
pub struct CodecBuilder {
    registry: Option<Arc<TypeRegistry>>,
    ref_tracking: Option<bool>,
    max_depth: Option<usize>,
}

impl CodecBuilder {
    /// Uses the given shared registry instead of the process default.
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Enables or disables reference tracking (default: enabled). With
    /// tracking off, shared objects are duplicated on the wire and cyclic
    /// graphs fail the depth guard instead of looping.
    pub fn ref_tracking(mut self, on: bool) -> Self {
        self.ref_tracking = Some(on);
        self
    }

    /// Overrides the nesting limit used when tracking is off.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Builds the codec. Falls back to the installed process-wide default
    /// registry, or a fresh built-ins-only registry if none is installed.
    pub fn build(self) -> Codec {
        let registry = self
            .registry
            .or_else(default_registry)
            .unwrap_or_else(|| Arc::new(TypeRegistry::with_builtins()));
        Codec {
            resolver: TypeResolver::new(registry),
            ref_tracking: self.ref_tracking.unwrap_or(true),
            max_depth: self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            meta_writer: MetaStringWriter::new(),
            meta_reader: MetaStringReader::new(),
            ref_writer: RefWriter::new(),
            ref_reader: RefReader::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

/// The xlang codec: serializes [`Value`] graphs to the cross-language wire
/// format and back.
pub struct Codec {
    resolver: TypeResolver,
    ref_tracking: bool,
    max_depth: usize,
    meta_writer: MetaStringWriter,
    meta_reader: MetaStringReader,
    ref_writer: RefWriter,
    ref_reader: RefReader,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// A codec over the process default registry (or built-ins only).
    pub fn new() -> Self {
        CodecBuilder::default().build()
    }

    /// A codec over an explicit shared registry.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        CodecBuilder::default().registry(registry).build()
    }

    /// Starts configuring a codec.
    pub fn builder() -> CodecBuilder {
        CodecBuilder::default()
    }

    /// The registry this codec resolves against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.resolver.registry()
    }

    /// Serializes one value graph into `buf`.
    pub fn serialize(&mut self, buf: &mut ByteBuffer, value: &Value) -> Result<()> {
        self.serialize_session(buf, value, None)
    }

    /// Serializes with out-of-band binary extraction: `sink` is offered
    /// every binary payload and returning `true` claims it, leaving a
    /// placeholder index in the stream. Extracted buffers are indexed in
    /// stream order.
    pub fn serialize_with_oob<F>(
        &mut self,
        buf: &mut ByteBuffer,
        value: &Value,
        mut sink: F,
    ) -> Result<()>
    where
        F: FnMut(&Rc<Vec<u8>>) -> bool,
    {
        self.serialize_session(buf, value, Some(&mut sink))
    }

    /// Deserializes one value graph from `buf`.
    pub fn deserialize(&mut self, buf: &mut ByteBuffer) -> Result<Value> {
        self.deserialize_session(buf, None)
    }

    /// Deserializes a stream written with out-of-band extraction,
    /// resolving placeholder indices against `oob_buffers`.
    pub fn deserialize_with_oob(
        &mut self,
        buf: &mut ByteBuffer,
        oob_buffers: &[Rc<Vec<u8>>],
    ) -> Result<Value> {
        self.deserialize_session(buf, Some(oob_buffers))
    }

    fn serialize_session<'b>(
        &mut self,
        buf: &mut ByteBuffer,
        value: &Value,
        oob: Option<&'b mut dyn FnMut(&Rc<Vec<u8>>) -> bool>,
    ) -> Result<()> {
        let result = self.write_stream(buf, value, oob);
        // Session state never leaks into the next call, success or not.
        self.ref_writer.clear();
        self.meta_writer.clear();
        result
    }

    fn write_stream<'b>(
        &mut self,
        buf: &mut ByteBuffer,
        value: &Value,
        oob: Option<&'b mut dyn FnMut(&Rc<Vec<u8>>) -> bool>,
    ) -> Result<()> {
        buf.write_u16(MAGIC_NUMBER)?;
        let mut flags = session_flags::XLANG;
        if self.ref_tracking {
            flags |= session_flags::REF_TRACKING;
        }
        if oob.is_some() {
            flags |= session_flags::OUT_OF_BAND;
        }
        buf.write_u8(flags)?;

        self.ref_writer.begin(self.ref_tracking);
        let mut session = WriteSession {
            buf,
            resolver: &self.resolver,
            meta: &mut self.meta_writer,
            refs: &mut self.ref_writer,
            tracking: self.ref_tracking,
            depth: 0,
            max_depth: self.max_depth,
            oob,
            oob_count: 0,
        };
        write::write_any_slot(&mut session, value)
    }

    fn deserialize_session(
        &mut self,
        buf: &mut ByteBuffer,
        oob: Option<&[Rc<Vec<u8>>]>,
    ) -> Result<Value> {
        let result = self.read_stream(buf, oob);
        self.ref_reader.clear();
        self.meta_reader.clear();
        result
    }

    fn read_stream(&mut self, buf: &mut ByteBuffer, oob: Option<&[Rc<Vec<u8>>]>) -> Result<Value> {
        let magic = buf.read_u16().map_err(|_| Error::BadMagic)?;
        if magic != MAGIC_NUMBER {
            return Err(Error::BadMagic);
        }
        let flags = buf.read_u8()?;
        let unknown = flags & !session_flags::KNOWN_MASK;
        if unknown != 0 {
            return Err(Error::UnsupportedVersion { bits: unknown });
        }
        if flags & session_flags::XLANG == 0 {
            // Only the cross-language dialect is implemented here.
            return Err(Error::UnsupportedVersion { bits: flags });
        }
        let oob_mode = flags & session_flags::OUT_OF_BAND != 0;
        if oob_mode && oob.is_none() {
            return Err(Error::MissingOutOfBandBuffer { index: 0 });
        }

        let root = {
            let mut session = ReadSession {
                buf: &mut *buf,
                resolver: &mut self.resolver,
                meta: &mut self.meta_reader,
                refs: &mut self.ref_reader,
                oob_mode,
                oob,
            };
            read::read_any_slot(&mut session)?
        };
        if buf.remaining() != 0 {
            return Err(Error::TrailingBytes {
                remaining: buf.remaining(),
            });
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_call_leaves_codec_reusable() {
        let mut codec = Codec::new();
        // Truncated stream: magic only.
        let mut bad = ByteBuffer::from_bytes(&[0xD4, 0x62]);
        assert!(codec.deserialize(&mut bad).is_err());

        // The same instance immediately handles a clean round-trip.
        let mut buf = ByteBuffer::new();
        codec.serialize(&mut buf, &Value::Bool(true)).unwrap();
        assert_eq!(codec.deserialize(&mut buf).unwrap(), Value::Bool(true));
    }

    #[test]
    fn builder_defaults() {
        let codec = Codec::builder().build();
        assert!(codec.ref_tracking);
        assert_eq!(codec.max_depth, DEFAULT_MAX_DEPTH);
    }
}
