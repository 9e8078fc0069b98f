//! Chunked map encoding.
//!
//! A map is a run of chunks terminated by a single zero size byte. Each
//! chunk covers up to 255 entries sharing one key/value type pattern and
//! starts with a 2-byte header: the entry count, then a flag byte (see
//! `types::chunk_flags`). Chunk-level key/value type headers, when
//! announced by the flags, sit between the header and the first entry.
//! Entries are interleaved `key, value, key, value…`; per-entry reference
//! flags appear only when the corresponding TRACKING bit is set.
//!
//! Entries with a null key or value get their own single-entry chunk with
//! the matching HAS_NULL bit; the null side carries no payload. A type
//! change between neighboring entries simply starts a new chunk, which is
//! what amortizes type headers over homogeneous runs while still handling
//! heterogeneous maps.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::codec::{read, write, ReadSession, WriteSession};
use crate::error::Result;
use crate::resolver::type_resolver::{ResolvedType, TypeInfo};
use crate::resolver::typespec::TypeSpec;
use crate::types::chunk_flags::*;
use crate::types::MAX_MAP_CHUNK_SIZE;
use crate::value::Value;

/// True when the declared slot type leaves the entry type open, so chunks
/// must carry their own type headers.
fn needs_chunk_header(spec: &TypeSpec) -> bool {
    matches!(spec, TypeSpec::Any)
}

fn strip_ptr(spec: &TypeSpec) -> &TypeSpec {
    match spec {
        TypeSpec::Ptr(inner) => strip_ptr(inner),
        other => other,
    }
}

fn slot_trackable(info: Option<&Arc<TypeInfo>>, spec: &TypeSpec) -> bool {
    match info {
        Some(info) => info.is_trackable(),
        None => spec.is_trackable(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Write side
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn write_map(
    s: &mut WriteSession,
    entries: &[(Value, Value)],
    key_spec: &TypeSpec,
    value_spec: &TypeSpec,
) -> Result<()> {
    let key_spec = strip_ptr(key_spec);
    let value_spec = strip_ptr(value_spec);
    let key_dynamic = needs_chunk_header(key_spec);
    let value_dynamic = needs_chunk_header(value_spec);

    let mut i = 0usize;
    while i < entries.len() {
        let (k, v) = &entries[i];
        if k.is_null() || v.is_null() {
            write_null_entry_chunk(s, k, v, key_spec, value_spec, key_dynamic, value_dynamic)?;
            i += 1;
            continue;
        }

        let key_info = if key_dynamic {
            Some(s.resolver.resolve_value_type(k)?)
        } else {
            None
        };
        let value_info = if value_dynamic {
            Some(s.resolver.resolve_value_type(v)?)
        } else {
            None
        };

        // Extend the run while neighbors keep the same type pattern.
        let mut run = 1usize;
        while i + run < entries.len() && run < MAX_MAP_CHUNK_SIZE {
            let (k2, v2) = &entries[i + run];
            if k2.is_null() || v2.is_null() {
                break;
            }
            if let Some(ki) = &key_info {
                if !Arc::ptr_eq(ki, &s.resolver.resolve_value_type(k2)?) {
                    break;
                }
            }
            if let Some(vi) = &value_info {
                if !Arc::ptr_eq(vi, &s.resolver.resolve_value_type(v2)?) {
                    break;
                }
            }
            run += 1;
        }

        let track_key = s.tracking && slot_trackable(key_info.as_ref(), key_spec);
        let track_value = s.tracking && slot_trackable(value_info.as_ref(), value_spec);
        let mut flags = 0u8;
        if key_dynamic {
            flags |= KEY_NOT_DECL_TYPE | KEY_DECL_TYPE;
        }
        if value_dynamic {
            flags |= VALUE_NOT_DECL_TYPE | VALUE_DECL_TYPE;
        }
        if track_key {
            flags |= TRACKING_KEY_REF;
        }
        if track_value {
            flags |= TRACKING_VALUE_REF;
        }

        s.buf.write_u8(run as u8)?;
        s.buf.write_u8(flags)?;
        if let Some(ki) = &key_info {
            s.resolver.write_type_info(s.buf, s.meta, ki)?;
        }
        if let Some(vi) = &value_info {
            s.resolver.write_type_info(s.buf, s.meta, vi)?;
        }
        for (k, v) in &entries[i..i + run] {
            write_map_item(s, k, key_info.as_ref(), key_spec, track_key)?;
            write_map_item(s, v, value_info.as_ref(), value_spec, track_value)?;
        }
        i += run;
    }
    s.buf.write_u8(0)
}

fn write_null_entry_chunk(
    s: &mut WriteSession,
    k: &Value,
    v: &Value,
    key_spec: &TypeSpec,
    value_spec: &TypeSpec,
    key_dynamic: bool,
    value_dynamic: bool,
) -> Result<()> {
    let key_info = if !k.is_null() && key_dynamic {
        Some(s.resolver.resolve_value_type(k)?)
    } else {
        None
    };
    let value_info = if !v.is_null() && value_dynamic {
        Some(s.resolver.resolve_value_type(v)?)
    } else {
        None
    };
    let track_key = !k.is_null() && s.tracking && slot_trackable(key_info.as_ref(), key_spec);
    let track_value = !v.is_null() && s.tracking && slot_trackable(value_info.as_ref(), value_spec);

    let mut flags = 0u8;
    if k.is_null() {
        flags |= KEY_HAS_NULL;
    } else {
        if key_dynamic {
            flags |= KEY_NOT_DECL_TYPE | KEY_DECL_TYPE;
        }
        if track_key {
            flags |= TRACKING_KEY_REF;
        }
    }
    if v.is_null() {
        flags |= VALUE_HAS_NULL;
    } else {
        if value_dynamic {
            flags |= VALUE_NOT_DECL_TYPE | VALUE_DECL_TYPE;
        }
        if track_value {
            flags |= TRACKING_VALUE_REF;
        }
    }

    s.buf.write_u8(1)?;
    s.buf.write_u8(flags)?;
    if let Some(ki) = &key_info {
        s.resolver.write_type_info(s.buf, s.meta, ki)?;
    }
    if let Some(vi) = &value_info {
        s.resolver.write_type_info(s.buf, s.meta, vi)?;
    }
    if !k.is_null() {
        write_map_item(s, k, key_info.as_ref(), key_spec, track_key)?;
    }
    if !v.is_null() {
        write_map_item(s, v, value_info.as_ref(), value_spec, track_value)?;
    }
    Ok(())
}

fn write_map_item(
    s: &mut WriteSession,
    value: &Value,
    info: Option<&Arc<TypeInfo>>,
    spec: &TypeSpec,
    tracked: bool,
) -> Result<()> {
    if tracked && !s.refs.write_flag(s.buf, value)? {
        return Ok(());
    }
    match info {
        Some(info) => write::write_body_for(s, value, info),
        None => write::write_declared_body(s, value, spec),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read side
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn read_map_shell(
    s: &mut ReadSession,
    register: bool,
    key_spec: &TypeSpec,
    value_spec: &TypeSpec,
) -> Result<Value> {
    let shell = Rc::new(RefCell::new(Vec::new()));
    let value = Value::Map(shell.clone());
    if register {
        let id = s.refs.reserve();
        s.refs.set(id, value.clone());
    }
    let key_spec = strip_ptr(key_spec);
    let value_spec = strip_ptr(value_spec);

    loop {
        let size = s.buf.read_u8()? as usize;
        if size == 0 {
            break;
        }
        let flags = s.buf.read_u8()?;
        let key_null = flags & KEY_HAS_NULL != 0;
        let value_null = flags & VALUE_HAS_NULL != 0;
        let key_rt = if !key_null && flags & KEY_DECL_TYPE != 0 {
            Some(s.resolver.read_type_info(s.buf, s.meta)?)
        } else {
            None
        };
        let value_rt = if !value_null && flags & VALUE_DECL_TYPE != 0 {
            Some(s.resolver.read_type_info(s.buf, s.meta)?)
        } else {
            None
        };
        let track_key = flags & TRACKING_KEY_REF != 0;
        let track_value = flags & TRACKING_VALUE_REF != 0;

        for _ in 0..size {
            let k = if key_null {
                Value::Null
            } else {
                read_map_item(s, key_rt.as_ref(), key_spec, track_key)?
            };
            let v = if value_null {
                Value::Null
            } else {
                read_map_item(s, value_rt.as_ref(), value_spec, track_value)?
            };
            shell.borrow_mut().push((k, v));
        }
    }
    Ok(value)
}

fn read_map_item(
    s: &mut ReadSession,
    rt: Option<&ResolvedType>,
    spec: &TypeSpec,
    tracked: bool,
) -> Result<Value> {
    use crate::resolver::reference::RefFlag;
    if tracked {
        let flag = s.refs.read_flag(s.buf)?;
        return match flag {
            RefFlag::Null => Ok(Value::Null),
            RefFlag::Ref => {
                let id = s.buf.read_varuint32()?;
                s.refs.get(id)
            }
            RefFlag::NonRefNull => read_item_body(s, rt, spec, false),
            RefFlag::NonRef => read_item_body(s, rt, spec, true),
        };
    }
    read_item_body(s, rt, spec, false)
}

fn read_item_body(
    s: &mut ReadSession,
    rt: Option<&ResolvedType>,
    spec: &TypeSpec,
    track_candidate: bool,
) -> Result<Value> {
    match rt {
        Some(rt) => read::read_resolved_body(s, rt, track_candidate && rt.is_trackable()),
        None => read::read_declared_body(s, spec, track_candidate),
    }
}
