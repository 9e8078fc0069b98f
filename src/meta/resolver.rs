//! Stream-local metastring interning.
//!
//! The first occurrence of a fragment goes on the wire as a literal; every
//! repeat is a one-varint back-reference to the n-th previously written
//! fragment. Writer and reader keep parallel tables that are cleared (not
//! reallocated) at every session boundary.
//!
//! Wire forms:
//! - literal: `varuint32((byte_len << 1) | 0)`, then a single encoding byte
//!   when `byte_len <= 16` or the 8-byte fragment hashcode otherwise (its
//!   low byte carries the encoding), then the payload bytes;
//! - back-reference: `varuint32(((id + 1) << 1) | 1)`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::meta::metastring::{MetaEncoding, MetaStringBytes, MetaStringEncoder};

/// Longest payload whose literal header is a single encoding byte.
const SMALL_FRAGMENT_LIMIT: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Write side
// ─────────────────────────────────────────────────────────────────────────────

/// Write-side interning state: fragment content to stream-local id.
#[derive(Debug, Default)]
pub struct MetaStringWriter {
    ids: HashMap<Arc<MetaStringBytes>, u32>,
}

impl MetaStringWriter {
    /// Creates an empty writer table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `fragment` as a literal on first use or a back-reference on
    /// every repeat.
    pub fn write(&mut self, buf: &mut ByteBuffer, fragment: &Arc<MetaStringBytes>) -> Result<()> {
        if let Some(&id) = self.ids.get(fragment) {
            return buf.write_varuint32(((id + 1) << 1) | 1);
        }
        let id = self.ids.len() as u32;
        self.ids.insert(fragment.clone(), id);

        let len = fragment.data.len();
        buf.write_varuint32((len as u32) << 1)?;
        if len <= SMALL_FRAGMENT_LIMIT {
            buf.write_u8(u8::from(fragment.encoding))?;
        } else {
            buf.write_u64(fragment.hashcode)?;
        }
        buf.write_bytes(&fragment.data)
    }

    /// Number of distinct fragments written so far this session.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when no fragment has been written this session.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drops session state, keeping allocations.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read side
// ─────────────────────────────────────────────────────────────────────────────

/// Read-side interning state: stream-local id to decoded fragment.
#[derive(Debug, Default)]
pub struct MetaStringReader {
    fragments: Vec<(Arc<MetaStringBytes>, Arc<str>)>,
}

impl MetaStringReader {
    /// Creates an empty reader table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one fragment — literal or back-reference — decoding literals
    /// with `encoder` and recording them for later back-references.
    pub fn read(
        &mut self,
        buf: &mut ByteBuffer,
        encoder: &MetaStringEncoder,
    ) -> Result<(Arc<MetaStringBytes>, Arc<str>)> {
        let header = buf.read_varuint32()?;
        if header & 1 == 1 {
            let biased = header >> 1;
            if biased == 0 {
                return Err(Error::MetaStringTruncated);
            }
            let id = biased - 1;
            return self
                .fragments
                .get(id as usize)
                .cloned()
                .ok_or(Error::UnknownMetaStringId { id });
        }

        let len = (header >> 1) as usize;
        let raw_encoding = if len <= SMALL_FRAGMENT_LIMIT {
            buf.read_u8()?
        } else {
            (buf.read_u64()? & 0xFF) as u8
        };
        let encoding =
            MetaEncoding::try_from(raw_encoding).map_err(|_| Error::MetaStringTruncated)?;
        let data = buf.read_bytes(len)?.to_vec();
        let decoded = encoder.decode(encoding, &data)?;
        let entry = (
            Arc::new(MetaStringBytes::new(encoding, data)),
            Arc::<str>::from(decoded.as_str()),
        );
        self.fragments.push(entry.clone());
        Ok(entry)
    }

    /// Drops session state, keeping allocations.
    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::metastring::{NAMESPACE_ENCODER, TYPE_NAME_ENCODER};

    #[test]
    fn literal_then_backref() {
        let mut writer = MetaStringWriter::new();
        let mut buf = ByteBuffer::new();
        let frag = Arc::new(TYPE_NAME_ENCODER.encode("somename"));

        writer.write(&mut buf, &frag).unwrap();
        let literal_len = buf.writer_index();
        writer.write(&mut buf, &frag).unwrap();
        // Small ids back-reference in exactly one byte.
        assert_eq!(buf.writer_index(), literal_len + 1);

        let mut reader = MetaStringReader::new();
        let (_, first) = reader.read(&mut buf, &TYPE_NAME_ENCODER).unwrap();
        let (_, second) = reader.read(&mut buf, &TYPE_NAME_ENCODER).unwrap();
        assert_eq!(&*first, "somename");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn long_fragment_carries_hash_header() {
        let name = "a_very_long_namespace_fragment_indeed";
        let frag = Arc::new(NAMESPACE_ENCODER.encode(name));
        assert!(frag.data.len() > 16);

        let mut writer = MetaStringWriter::new();
        let mut buf = ByteBuffer::new();
        writer.write(&mut buf, &frag).unwrap();

        let mut reader = MetaStringReader::new();
        let (msb, s) = reader.read(&mut buf, &NAMESPACE_ENCODER).unwrap();
        assert_eq!(&*s, name);
        assert_eq!(msb.hashcode, frag.hashcode);
    }

    #[test]
    fn shared_id_space_across_encoders() {
        let mut writer = MetaStringWriter::new();
        let mut buf = ByteBuffer::new();
        let ns = Arc::new(NAMESPACE_ENCODER.encode("example"));
        let name = Arc::new(TYPE_NAME_ENCODER.encode("widget"));
        writer.write(&mut buf, &ns).unwrap();
        writer.write(&mut buf, &name).unwrap();
        writer.write(&mut buf, &ns).unwrap();

        let mut reader = MetaStringReader::new();
        let (_, a) = reader.read(&mut buf, &NAMESPACE_ENCODER).unwrap();
        let (_, b) = reader.read(&mut buf, &TYPE_NAME_ENCODER).unwrap();
        let (_, c) = reader.read(&mut buf, &NAMESPACE_ENCODER).unwrap();
        assert_eq!(&*a, "example");
        assert_eq!(&*b, "widget");
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn out_of_range_backref_is_rejected() {
        let mut buf = ByteBuffer::new();
        // Back-reference to id 4 with nothing written.
        buf.write_varuint32(((4 + 1) << 1) | 1).unwrap();
        let mut reader = MetaStringReader::new();
        assert!(matches!(
            reader.read(&mut buf, &TYPE_NAME_ENCODER),
            Err(Error::UnknownMetaStringId { id: 4 })
        ));
    }

    #[test]
    fn zero_biased_backref_is_malformed() {
        let mut buf = ByteBuffer::new();
        buf.write_varuint32(1).unwrap(); // odd header, biased id 0
        let mut reader = MetaStringReader::new();
        assert!(matches!(
            reader.read(&mut buf, &TYPE_NAME_ENCODER),
            Err(Error::MetaStringTruncated)
        ));
    }

    #[test]
    fn truncated_literal_is_rejected() {
        let mut buf = ByteBuffer::new();
        buf.write_varuint32(10 << 1).unwrap(); // announces 10 payload bytes
        buf.write_u8(u8::from(MetaEncoding::Utf8)).unwrap();
        buf.write_bytes(b"abc").unwrap(); // only 3 present
        let mut reader = MetaStringReader::new();
        assert!(matches!(
            reader.read(&mut buf, &TYPE_NAME_ENCODER),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn state_clears_between_sessions() {
        let mut writer = MetaStringWriter::new();
        let mut buf = ByteBuffer::new();
        let frag = Arc::new(TYPE_NAME_ENCODER.encode("x"));
        writer.write(&mut buf, &frag).unwrap();
        writer.clear();
        let mut buf2 = ByteBuffer::new();
        writer.write(&mut buf2, &frag).unwrap();
        // After clearing, the fragment is a literal again, not a back-ref.
        assert_eq!(buf.as_slice(), buf2.as_slice());
    }
}
