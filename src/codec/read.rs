//! Read-side value dispatch — the exact inverse of the write side.
//!
//! Trackable objects are registered with the reference reader before their
//! bodies are read: containers and structs register an empty shell and
//! fill it in place, leaves reserve their id first and fill the slot after
//! decoding. Either way the id sequence matches the writer's exactly, so
//! back-references into still-under-construction objects resolve.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::buffer::ByteBuffer;
use crate::codec::{map, strings, structs, time, ReadSession};
use crate::error::{Error, Result};
use crate::resolver::reference::RefFlag;
use crate::resolver::type_resolver::{ResolvedType, TypeInfo, TypeKind};
use crate::resolver::typespec::TypeSpec;
use crate::types::TypeId;
use crate::value::{ExtValue, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Slots
// ─────────────────────────────────────────────────────────────────────────────

/// Reads a fully dynamic slot: reference flag, type header, body.
pub(crate) fn read_any_slot(s: &mut ReadSession) -> Result<Value> {
    let flag = s.refs.read_flag(s.buf)?;
    match flag {
        RefFlag::Null => Ok(Value::Null),
        RefFlag::Ref => {
            let id = s.buf.read_varuint32()?;
            s.refs.get(id)
        }
        RefFlag::NonRefNull => {
            let rt = s.resolver.read_type_info(s.buf, s.meta)?;
            read_resolved_body(s, &rt, false)
        }
        RefFlag::NonRef => {
            let rt = s.resolver.read_type_info(s.buf, s.meta)?;
            let register = rt.is_trackable();
            read_resolved_body(s, &rt, register)
        }
    }
}

/// Reads a slot whose static type is declared.
pub(crate) fn read_spec_slot(s: &mut ReadSession, spec: &TypeSpec) -> Result<Value> {
    if spec.is_primitive() {
        return read_primitive_exact(s, spec);
    }
    if matches!(spec, TypeSpec::Any) {
        return read_any_slot(s);
    }
    let spec = if let TypeSpec::Ptr(inner) = spec {
        inner.as_ref()
    } else {
        spec
    };
    let flag = s.refs.read_flag(s.buf)?;
    match flag {
        RefFlag::Null => Ok(Value::Null),
        RefFlag::Ref => {
            let id = s.buf.read_varuint32()?;
            s.refs.get(id)
        }
        RefFlag::NonRefNull => read_declared_body(s, spec, false),
        RefFlag::NonRef => read_declared_body(s, spec, true),
    }
}

/// Reads a declared body. `track_candidate` is true when the slot's flag
/// was NON_REF under a tracking session; whether an id is actually
/// consumed depends on the concrete type, mirroring the writer.
pub(crate) fn read_declared_body(
    s: &mut ReadSession,
    spec: &TypeSpec,
    track_candidate: bool,
) -> Result<Value> {
    if spec.is_primitive() {
        return read_primitive_exact(s, spec);
    }
    match spec {
        TypeSpec::Any => {
            let rt = s.resolver.read_type_info(s.buf, s.meta)?;
            let register = track_candidate && rt.is_trackable();
            read_resolved_body(s, &rt, register)
        }
        TypeSpec::String => leaf(s, track_candidate, |s| {
            Ok(Value::String(strings::read_string(s.buf)?))
        }),
        TypeSpec::Binary => leaf(s, track_candidate, read_binary),
        TypeSpec::Date => Ok(Value::Date(time::read_date(s.buf)?)),
        TypeSpec::Timestamp => Ok(Value::Timestamp(time::read_timestamp(s.buf)?)),
        TypeSpec::Duration => Ok(Value::Duration(time::read_duration(s.buf)?)),
        TypeSpec::List(elem) => read_list_shell(s, track_candidate, false, elem),
        TypeSpec::FixedList(elem, n) => {
            let value = read_list_shell(s, track_candidate, false, elem)?;
            if let Value::List(items) = &value {
                let len = items.borrow().len();
                if len != *n {
                    return Err(Error::TypeMismatch {
                        expected: format!("list of exactly {n} elements"),
                        found: format!("list of {len}"),
                    });
                }
            }
            Ok(value)
        }
        TypeSpec::Set(elem) => read_list_shell(s, track_candidate, true, elem),
        TypeSpec::Map(key_spec, value_spec) => {
            map::read_map_shell(s, track_candidate, key_spec, value_spec)
        }
        TypeSpec::Named { namespace, name } => {
            let info = s
                .resolver
                .registry()
                .get_by_name(namespace, name)
                .ok_or_else(|| Error::UnregisteredType {
                    namespace: namespace.clone(),
                    name: name.clone(),
                })?;
            let register = track_candidate && info.is_trackable();
            read_info_body(s, &info, register)
        }
        TypeSpec::Registered(id) => {
            let info = s.resolver.registry().get_by_id(*id as i32).ok_or_else(|| {
                Error::UnregisteredType {
                    namespace: String::new(),
                    name: format!("#{id}"),
                }
            })?;
            let register = track_candidate && info.is_trackable();
            read_info_body(s, &info, register)
        }
        TypeSpec::Ptr(inner) => read_declared_body(s, inner, track_candidate),
        _ => {
            let tid = spec.wire_type().ok_or_else(|| Error::TypeMismatch {
                expected: "concrete type".into(),
                found: spec.to_string(),
            })?;
            leaf(s, track_candidate, |s| read_packed_array(s.buf, tid))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bodies
// ─────────────────────────────────────────────────────────────────────────────

/// Reads one body for a resolved dynamic type.
pub(crate) fn read_resolved_body(
    s: &mut ReadSession,
    rt: &ResolvedType,
    register: bool,
) -> Result<Value> {
    match rt {
        ResolvedType::Info(info) => read_info_body(s, info, register),
        ResolvedType::Spec(spec) => read_declared_body(s, spec, register),
    }
}

/// Reads one body for a registered type.
pub(crate) fn read_info_body(
    s: &mut ReadSession,
    info: &Arc<TypeInfo>,
    register: bool,
) -> Result<Value> {
    match info.kind {
        TypeKind::Internal => read_internal_body(s, info.wire_id, register),
        TypeKind::Struct => structs::read_struct_body(s, info, register),
        TypeKind::Enum => {
            let ordinal = s.buf.read_varuint32()?;
            Ok(Value::Enum {
                tag: info.tag(),
                ordinal,
            })
        }
        TypeKind::Ext => {
            let Some(codec) = info.ext.clone() else {
                return Err(Error::UnregisteredType {
                    namespace: String::new(),
                    name: info.describe(),
                });
            };
            let tag = info.tag();
            leaf(s, register, move |s| {
                let data = codec.decode(s.buf)?;
                Ok(Value::Ext(Rc::new(ExtValue { tag, data })))
            })
        }
    }
}

fn read_internal_body(s: &mut ReadSession, tid: TypeId, register: bool) -> Result<Value> {
    match tid {
        TypeId::Bool => Ok(Value::Bool(s.buf.read_bool()?)),
        TypeId::Int8 => Ok(Value::Int8(s.buf.read_i8()?)),
        TypeId::Int16 => Ok(Value::Int16(s.buf.read_i16()?)),
        TypeId::Int32 => Ok(Value::Int32(s.buf.read_i32()?)),
        TypeId::VarInt32 => Ok(Value::Int32(s.buf.read_varint32()?)),
        TypeId::Int64 => Ok(Value::Int64(s.buf.read_i64()?)),
        TypeId::VarInt64 => Ok(Value::Int64(s.buf.read_varint64()?)),
        TypeId::SliInt64 => Ok(Value::Int64(read_sli_int64(s.buf)?)),
        TypeId::Float32 => Ok(Value::Float32(s.buf.read_f32()?)),
        TypeId::Float64 => Ok(Value::Float64(s.buf.read_f64()?)),
        TypeId::String => leaf(s, register, |s| {
            Ok(Value::String(strings::read_string(s.buf)?))
        }),
        TypeId::Binary => leaf(s, register, read_binary),
        TypeId::LocalDate => Ok(Value::Date(time::read_date(s.buf)?)),
        TypeId::Timestamp => Ok(Value::Timestamp(time::read_timestamp(s.buf)?)),
        TypeId::Duration => Ok(Value::Duration(time::read_duration(s.buf)?)),
        TypeId::List => read_list_shell(s, register, false, &TypeSpec::Any),
        TypeId::Set => read_list_shell(s, register, true, &TypeSpec::Any),
        TypeId::Map => map::read_map_shell(s, register, &TypeSpec::Any, &TypeSpec::Any),
        TypeId::BoolArray
        | TypeId::Int8Array
        | TypeId::Int16Array
        | TypeId::Int32Array
        | TypeId::Int64Array
        | TypeId::Float16Array
        | TypeId::Float32Array
        | TypeId::Float64Array => leaf(s, register, |s| read_packed_array(s.buf, tid)),
        // Family markers carry no body of their own; a registered user
        // type should have resolved instead.
        TypeId::Enum
        | TypeId::NamedEnum
        | TypeId::Struct
        | TypeId::NamedStruct
        | TypeId::CompatibleStruct
        | TypeId::NamedCompatibleStruct
        | TypeId::Ext
        | TypeId::NamedExt => Err(Error::TypeMismatch {
            expected: "registered user type".into(),
            found: tid.name().to_string(),
        }),
    }
}

fn read_primitive_exact(s: &mut ReadSession, spec: &TypeSpec) -> Result<Value> {
    match spec {
        TypeSpec::Bool => Ok(Value::Bool(s.buf.read_bool()?)),
        TypeSpec::Int8 => Ok(Value::Int8(s.buf.read_i8()?)),
        TypeSpec::Int16 => Ok(Value::Int16(s.buf.read_i16()?)),
        TypeSpec::Int32 => Ok(Value::Int32(s.buf.read_i32()?)),
        TypeSpec::VarInt32 => Ok(Value::Int32(s.buf.read_varint32()?)),
        TypeSpec::Int64 => Ok(Value::Int64(s.buf.read_i64()?)),
        TypeSpec::VarInt64 => Ok(Value::Int64(s.buf.read_varint64()?)),
        TypeSpec::SliInt64 => Ok(Value::Int64(read_sli_int64(s.buf)?)),
        TypeSpec::Float32 => Ok(Value::Float32(s.buf.read_f32()?)),
        TypeSpec::Float64 => Ok(Value::Float64(s.buf.read_f64()?)),
        _ => Err(Error::TypeMismatch {
            expected: "primitive spec".into(),
            found: spec.to_string(),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Leaf registration: reserve the id before the body so nested allocations
/// (there are none for leaves, but the numbering must match the writer)
/// stay aligned, fill the slot after.
fn leaf<F>(s: &mut ReadSession, register: bool, read: F) -> Result<Value>
where
    F: FnOnce(&mut ReadSession) -> Result<Value>,
{
    if register {
        let id = s.refs.reserve();
        let value = read(s)?;
        s.refs.set(id, value.clone());
        Ok(value)
    } else {
        read(s)
    }
}

/// Reads a list or set into a pre-registered shell so cycles through the
/// container resolve.
pub(crate) fn read_list_shell(
    s: &mut ReadSession,
    register: bool,
    is_set: bool,
    elem: &TypeSpec,
) -> Result<Value> {
    let shell = Rc::new(RefCell::new(Vec::new()));
    let value = if is_set {
        Value::Set(shell.clone())
    } else {
        Value::List(shell.clone())
    };
    if register {
        let id = s.refs.reserve();
        s.refs.set(id, value.clone());
    }
    let len = s.buf.read_varuint32()? as usize;
    shell.borrow_mut().reserve(len.min(s.buf.remaining()));
    for _ in 0..len {
        let item = read_spec_slot(s, elem)?;
        shell.borrow_mut().push(item);
    }
    Ok(value)
}

/// Reads a binary body, resolving out-of-band placeholders against the
/// session's side-channel buffers.
pub(crate) fn read_binary(s: &mut ReadSession) -> Result<Value> {
    if s.oob_mode {
        let in_band = s.buf.read_u8()?;
        if in_band == 0 {
            let index = s.buf.read_varuint32()? as usize;
            let buffers = s.oob.ok_or(Error::MissingOutOfBandBuffer { index })?;
            let bytes = buffers
                .get(index)
                .cloned()
                .ok_or(Error::MissingOutOfBandBuffer { index })?;
            return Ok(Value::Binary(bytes));
        }
    }
    let bytes = s.buf.read_length_prefixed_bytes()?.to_vec();
    Ok(Value::Binary(Rc::new(bytes)))
}

fn read_packed_array(buf: &mut ByteBuffer, tid: TypeId) -> Result<Value> {
    let len = buf.read_varuint32()? as usize;
    let avail = buf.remaining();
    match tid {
        TypeId::BoolArray => {
            let mut out = Vec::with_capacity(len.min(avail));
            for _ in 0..len {
                out.push(buf.read_bool()?);
            }
            Ok(Value::BoolArray(Rc::new(out)))
        }
        TypeId::Int8Array => {
            let mut out = Vec::with_capacity(len.min(avail));
            for _ in 0..len {
                out.push(buf.read_i8()?);
            }
            Ok(Value::Int8Array(Rc::new(out)))
        }
        TypeId::Int16Array => {
            let mut out = Vec::with_capacity(len.min(avail / 2 + 1));
            for _ in 0..len {
                out.push(buf.read_i16()?);
            }
            Ok(Value::Int16Array(Rc::new(out)))
        }
        TypeId::Int32Array => {
            let mut out = Vec::with_capacity(len.min(avail / 4 + 1));
            for _ in 0..len {
                out.push(buf.read_i32()?);
            }
            Ok(Value::Int32Array(Rc::new(out)))
        }
        TypeId::Int64Array => {
            let mut out = Vec::with_capacity(len.min(avail / 8 + 1));
            for _ in 0..len {
                out.push(buf.read_i64()?);
            }
            Ok(Value::Int64Array(Rc::new(out)))
        }
        TypeId::Float16Array => {
            let mut out = Vec::with_capacity(len.min(avail / 2 + 1));
            for _ in 0..len {
                out.push(buf.read_u16()?);
            }
            Ok(Value::Float16Array(Rc::new(out)))
        }
        TypeId::Float32Array => {
            let mut out = Vec::with_capacity(len.min(avail / 4 + 1));
            for _ in 0..len {
                out.push(buf.read_f32()?);
            }
            Ok(Value::Float32Array(Rc::new(out)))
        }
        TypeId::Float64Array => {
            let mut out = Vec::with_capacity(len.min(avail / 8 + 1));
            for _ in 0..len {
                out.push(buf.read_f64()?);
            }
            Ok(Value::Float64Array(Rc::new(out)))
        }
        _ => Err(Error::TypeMismatch {
            expected: "primitive array".into(),
            found: tid.name().to_string(),
        }),
    }
}

/// Inverse of the hybrid small-long encoding; the 31-bit form is restored
/// with an arithmetic shift so sign extension is explicit.
pub(crate) fn read_sli_int64(buf: &mut ByteBuffer) -> Result<i64> {
    let b0 = buf.read_u8()?;
    if b0 & 1 == 0 {
        let rest = buf.read_bytes(3)?;
        let word = i32::from_le_bytes([b0, rest[0], rest[1], rest[2]]);
        Ok(i64::from(word >> 1))
    } else {
        buf.read_i64()
    }
}
