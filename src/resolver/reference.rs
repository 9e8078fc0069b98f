//! Reference resolver — preserves object identity and encodes cycles.
//!
//! Every reference-bearing slot starts with one flag byte. The writer
//! registers a trackable object *before* emitting its body, and the reader
//! registers the materialized shell *before* reading the body, so a cycle
//! like `a.self = a` resolves without a fix-up pass: the nested slot sees a
//! back-reference to an object that is still being filled.
//!
//! Identity is keyed by `Rc` handle for containers, structs, binaries,
//! arrays, and ext values; strings are keyed by content so equal strings
//! within one stream collapse to a single literal.

use std::collections::HashMap;
use std::rc::Rc;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::value::Value;

/// The flag byte ahead of every reference-bearing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RefFlag {
    /// The value is null / absent; no body follows.
    Null = 0,
    /// A `varuint32` back-reference id follows instead of a body.
    Ref = 1,
    /// Non-null and untracked (reference tracking off); a body follows.
    NonRefNull = 2,
    /// Non-null and tracked; a reference id is implicitly allocated before
    /// the body when the type participates in tracking.
    NonRef = 3,
}

/// Identity key of a value on the write side.
#[derive(Debug, PartialEq, Eq, Hash)]
enum RefKey {
    /// Handle identity — the `Rc` allocation address.
    Ptr(usize),
    /// Content identity, used for strings only.
    Str(Rc<str>),
}

fn ref_key(value: &Value) -> Option<RefKey> {
    let ptr = |p: usize| Some(RefKey::Ptr(p));
    match value {
        Value::String(s) => Some(RefKey::Str(s.clone())),
        Value::Binary(b) => ptr(Rc::as_ptr(b) as usize),
        Value::List(l) => ptr(Rc::as_ptr(l) as usize),
        Value::Set(s) => ptr(Rc::as_ptr(s) as usize),
        Value::Map(m) => ptr(Rc::as_ptr(m) as usize),
        Value::Struct(s) => ptr(Rc::as_ptr(s) as usize),
        Value::Ext(e) => ptr(Rc::as_ptr(e) as usize),
        Value::BoolArray(a) => ptr(Rc::as_ptr(a) as usize),
        Value::Int8Array(a) => ptr(Rc::as_ptr(a) as usize),
        Value::Int16Array(a) => ptr(Rc::as_ptr(a) as usize),
        Value::Int32Array(a) => ptr(Rc::as_ptr(a) as usize),
        Value::Int64Array(a) => ptr(Rc::as_ptr(a) as usize),
        Value::Float16Array(a) => ptr(Rc::as_ptr(a) as usize),
        Value::Float32Array(a) => ptr(Rc::as_ptr(a) as usize),
        Value::Float64Array(a) => ptr(Rc::as_ptr(a) as usize),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Write side
// ─────────────────────────────────────────────────────────────────────────────

/// Write-side session state: identity map and sequential id counter.
#[derive(Debug, Default)]
pub struct RefWriter {
    ids: HashMap<RefKey, u32>,
    tracking: bool,
}

impl RefWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the writer for a new session.
    pub fn begin(&mut self, tracking: bool) {
        self.tracking = tracking;
    }

    /// Emits the reference flag (and back-reference id, if any) for `value`.
    ///
    /// Returns `true` when the caller must write the value body. Trackable
    /// first occurrences are registered here, before their body, so nested
    /// slots can back-reference the object being written.
    pub fn write_flag(&mut self, buf: &mut ByteBuffer, value: &Value) -> Result<bool> {
        if value.is_null() {
            buf.write_u8(RefFlag::Null.into())?;
            return Ok(false);
        }
        if !self.tracking {
            buf.write_u8(RefFlag::NonRefNull.into())?;
            return Ok(true);
        }
        match ref_key(value) {
            None => {
                // Untrackable values still occupy a NON_REF slot but
                // allocate no id; the reader derives the same from the type.
                buf.write_u8(RefFlag::NonRef.into())?;
                Ok(true)
            }
            Some(key) => {
                if let Some(&id) = self.ids.get(&key) {
                    buf.write_u8(RefFlag::Ref.into())?;
                    buf.write_varuint32(id)?;
                    Ok(false)
                } else {
                    let id = self.ids.len() as u32;
                    self.ids.insert(key, id);
                    buf.write_u8(RefFlag::NonRef.into())?;
                    Ok(true)
                }
            }
        }
    }

    /// Drops session state, keeping allocations.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read side
// ─────────────────────────────────────────────────────────────────────────────

/// Read-side session state: the arena of materialized objects, indexed by
/// reference id.
#[derive(Debug, Default)]
pub struct RefReader {
    arena: Vec<Value>,
}

impl RefReader {
    /// Creates an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and validates one reference flag byte.
    pub fn read_flag(&mut self, buf: &mut ByteBuffer) -> Result<RefFlag> {
        let b = buf.read_u8()?;
        RefFlag::try_from(b).map_err(|_| Error::TypeMismatch {
            expected: "reference flag".into(),
            found: format!("byte 0x{b:02x}"),
        })
    }

    /// Allocates the next reference id with a placeholder entry. The caller
    /// fills the slot via [`RefReader::set`] — immediately for container
    /// shells, after the body for leaf values.
    pub fn reserve(&mut self) -> u32 {
        let id = self.arena.len() as u32;
        self.arena.push(Value::Null);
        id
    }

    /// Stores the materialized object for a reserved id.
    pub fn set(&mut self, id: u32, value: Value) {
        if let Some(slot) = self.arena.get_mut(id as usize) {
            *slot = value;
        }
    }

    /// Resolves a back-reference.
    pub fn get(&self, id: u32) -> Result<Value> {
        self.arena
            .get(id as usize)
            .cloned()
            .ok_or(Error::UnknownRefId { id })
    }

    /// Drops session state, keeping allocations.
    pub fn clear(&mut self) {
        self.arena.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_writes_single_byte() {
        let mut w = RefWriter::new();
        w.begin(true);
        let mut buf = ByteBuffer::new();
        assert!(!w.write_flag(&mut buf, &Value::Null).unwrap());
        assert_eq!(buf.as_slice(), &[0x00]);
    }

    #[test]
    fn untracked_session_uses_non_ref_null() {
        let mut w = RefWriter::new();
        w.begin(false);
        let mut buf = ByteBuffer::new();
        assert!(w.write_flag(&mut buf, &Value::Bool(true)).unwrap());
        assert!(w.write_flag(&mut buf, &Value::string("x")).unwrap());
        // Same string again: still a full body without tracking.
        assert!(w.write_flag(&mut buf, &Value::string("x")).unwrap());
        assert_eq!(buf.as_slice(), &[0x02, 0x02, 0x02]);
    }

    #[test]
    fn primitives_get_non_ref_without_an_id() {
        let mut w = RefWriter::new();
        w.begin(true);
        let mut buf = ByteBuffer::new();
        assert!(w.write_flag(&mut buf, &Value::Bool(true)).unwrap());
        assert_eq!(buf.as_slice(), &[0x03]);
        // The id space is untouched: the first trackable gets id 0.
        let list = Value::list(vec![]);
        assert!(w.write_flag(&mut buf, &list).unwrap());
        assert!(!w.write_flag(&mut buf, &list).unwrap());
        assert_eq!(&buf.as_slice()[1..], &[0x03, 0x01, 0x00]);
    }

    #[test]
    fn strings_dedupe_by_content() {
        let mut w = RefWriter::new();
        w.begin(true);
        let mut buf = ByteBuffer::new();
        // Two distinct handles, equal content.
        assert!(w.write_flag(&mut buf, &Value::string("str1")).unwrap());
        assert!(!w.write_flag(&mut buf, &Value::string("str1")).unwrap());
        assert_eq!(buf.as_slice(), &[0x03, 0x01, 0x00]);
    }

    #[test]
    fn handles_dedupe_by_identity_not_content() {
        let mut w = RefWriter::new();
        w.begin(true);
        let mut buf = ByteBuffer::new();
        let a = Value::binary(vec![1, 2, 3]);
        let b = Value::binary(vec![1, 2, 3]);
        assert!(w.write_flag(&mut buf, &a).unwrap());
        assert!(w.write_flag(&mut buf, &b).unwrap());
        assert!(!w.write_flag(&mut buf, &a).unwrap());
        assert_eq!(buf.as_slice(), &[0x03, 0x03, 0x01, 0x00]);
    }

    #[test]
    fn reader_arena_roundtrip() {
        let mut r = RefReader::new();
        let id = r.reserve();
        let shell = Value::list(vec![]);
        r.set(id, shell.clone());
        let back = r.get(id).unwrap();
        assert!(back.ptr_eq(&shell));
        assert!(matches!(r.get(7), Err(Error::UnknownRefId { id: 7 })));
    }

    #[test]
    fn invalid_flag_byte_is_rejected() {
        let mut r = RefReader::new();
        let mut buf = ByteBuffer::from_bytes(&[0x04]);
        assert!(matches!(
            r.read_flag(&mut buf),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn clear_resets_id_sequence() {
        let mut w = RefWriter::new();
        w.begin(true);
        let mut buf = ByteBuffer::new();
        let list = Value::list(vec![]);
        let _ = w.write_flag(&mut buf, &list).unwrap();
        w.clear();
        w.begin(true);
        let mut buf2 = ByteBuffer::new();
        // Registered again from scratch: NON_REF, not a back-ref.
        assert!(w.write_flag(&mut buf2, &list).unwrap());
        assert_eq!(buf2.as_slice(), &[0x03]);
    }
}
