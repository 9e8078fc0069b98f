//! Write-side value dispatch.
//!
//! Three slot shapes cover every position in a stream:
//! - a dynamic (`any`) slot: reference flag, type header, body;
//! - a declared reference-bearing slot: reference flag, body (the static
//!   type makes the header redundant);
//! - a declared primitive slot: the bare body.
//!
//! Dispatch is a match over the closed wire-type taxonomy; only user
//! extension types go through a trait object.

use std::rc::Rc;
use std::sync::Arc;

use crate::buffer::ByteBuffer;
use crate::codec::{map, strings, structs, time, WriteSession};
use crate::error::{Error, Result};
use crate::resolver::type_resolver::{TypeInfo, TypeKind};
use crate::resolver::typespec::TypeSpec;
use crate::types::TypeId;
use crate::value::Value;

pub(crate) fn mismatch(expected: &str, value: &Value) -> Error {
    Error::TypeMismatch {
        expected: expected.to_string(),
        found: value.kind_name().to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Depth guard (active only when reference tracking is off)
// ─────────────────────────────────────────────────────────────────────────────

fn enter(s: &mut WriteSession) -> Result<()> {
    if !s.tracking {
        s.depth += 1;
        if s.depth > s.max_depth {
            return Err(Error::RecursionLimit { limit: s.max_depth });
        }
    }
    Ok(())
}

fn leave(s: &mut WriteSession) {
    if !s.tracking {
        s.depth -= 1;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Slots
// ─────────────────────────────────────────────────────────────────────────────

/// Writes a fully dynamic slot: reference flag, type header, body.
pub(crate) fn write_any_slot(s: &mut WriteSession, value: &Value) -> Result<()> {
    enter(s)?;
    let result = (|| -> Result<()> {
        if s.refs.write_flag(s.buf, value)? {
            let info = s.resolver.resolve_value_type(value)?;
            s.resolver.write_type_info(s.buf, s.meta, &info)?;
            write_body_for(s, value, &info)?;
        }
        Ok(())
    })();
    leave(s);
    result
}

/// Writes a slot whose static type is declared.
pub(crate) fn write_spec_slot(s: &mut WriteSession, value: &Value, spec: &TypeSpec) -> Result<()> {
    if spec.is_primitive() {
        return write_primitive_exact(s, value, spec);
    }
    if matches!(spec, TypeSpec::Any) {
        return write_any_slot(s, value);
    }
    enter(s)?;
    let result = (|| -> Result<()> {
        let spec = if let TypeSpec::Ptr(inner) = spec {
            inner.as_ref()
        } else {
            spec
        };
        if s.refs.write_flag(s.buf, value)? {
            write_declared_body(s, value, spec)?;
        }
        Ok(())
    })();
    leave(s);
    result
}

/// Writes a declared body: scalars inline, everything else by shape.
pub(crate) fn write_declared_body(
    s: &mut WriteSession,
    value: &Value,
    spec: &TypeSpec,
) -> Result<()> {
    if spec.is_primitive() {
        return write_primitive_exact(s, value, spec);
    }
    match spec {
        TypeSpec::Any => {
            // Reached from pointer-to-any slots: the flag is already on the
            // wire, the header is not.
            let info = s.resolver.resolve_value_type(value)?;
            s.resolver.write_type_info(s.buf, s.meta, &info)?;
            write_body_for(s, value, &info)
        }
        TypeSpec::String => match value {
            Value::String(v) => strings::write_string(s.buf, v),
            _ => Err(mismatch("string", value)),
        },
        TypeSpec::Binary => match value {
            Value::Binary(v) => write_binary(s, v),
            _ => Err(mismatch("binary", value)),
        },
        TypeSpec::Date => match value {
            Value::Date(v) => time::write_date(s.buf, v),
            _ => Err(mismatch("date", value)),
        },
        TypeSpec::Timestamp => match value {
            Value::Timestamp(v) => time::write_timestamp(s.buf, v),
            _ => Err(mismatch("timestamp", value)),
        },
        TypeSpec::Duration => match value {
            Value::Duration(v) => time::write_duration(s.buf, v),
            _ => Err(mismatch("duration", value)),
        },
        TypeSpec::List(elem) => match value {
            Value::List(items) => write_list(s, &items.borrow(), elem),
            _ => Err(mismatch("list", value)),
        },
        TypeSpec::FixedList(elem, n) => match value {
            Value::List(items) => {
                let items = items.borrow();
                if items.len() != *n {
                    return Err(Error::TypeMismatch {
                        expected: format!("list of exactly {n} elements"),
                        found: format!("list of {}", items.len()),
                    });
                }
                write_list(s, &items, elem)
            }
            _ => Err(mismatch("list", value)),
        },
        TypeSpec::Set(elem) => match value {
            Value::Set(items) => write_list(s, &items.borrow(), elem),
            _ => Err(mismatch("set", value)),
        },
        TypeSpec::Map(key_spec, value_spec) => match value {
            Value::Map(entries) => map::write_map(s, &entries.borrow(), key_spec, value_spec),
            _ => Err(mismatch("map", value)),
        },
        TypeSpec::Named { .. } | TypeSpec::Registered(_) => {
            let declared = lookup_spec_info(s, spec)?;
            let actual = s.resolver.resolve_value_type(value)?;
            if !Arc::ptr_eq(&declared, &actual) {
                return Err(Error::TypeMismatch {
                    expected: declared.describe(),
                    found: actual.describe(),
                });
            }
            write_body_for(s, value, &declared)
        }
        TypeSpec::Ptr(inner) => write_declared_body(s, value, inner),
        _ => write_array_body(s, value, spec),
    }
}

fn lookup_spec_info(s: &WriteSession, spec: &TypeSpec) -> Result<Arc<TypeInfo>> {
    match spec {
        TypeSpec::Named { namespace, name } => s
            .resolver
            .registry()
            .get_by_name(namespace, name)
            .ok_or_else(|| Error::UnregisteredType {
                namespace: namespace.clone(),
                name: name.clone(),
            }),
        TypeSpec::Registered(id) => {
            s.resolver
                .registry()
                .get_by_id(*id as i32)
                .ok_or_else(|| Error::UnregisteredType {
                    namespace: String::new(),
                    name: format!("#{id}"),
                })
        }
        _ => Err(Error::TypeMismatch {
            expected: "registered type spec".into(),
            found: spec.to_string(),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bodies
// ─────────────────────────────────────────────────────────────────────────────

/// Writes the body of `value` for an already-resolved dynamic type.
pub(crate) fn write_body_for(
    s: &mut WriteSession,
    value: &Value,
    info: &Arc<TypeInfo>,
) -> Result<()> {
    match info.kind {
        TypeKind::Internal => write_internal_body(s, value, info.wire_id),
        TypeKind::Struct => structs::write_struct_body(s, value, info),
        TypeKind::Enum => match value {
            Value::Enum { ordinal, .. } => s.buf.write_varuint32(*ordinal),
            _ => Err(mismatch("enum", value)),
        },
        TypeKind::Ext => {
            let Some(codec) = info.ext.clone() else {
                return Err(Error::UnregisteredType {
                    namespace: String::new(),
                    name: info.describe(),
                });
            };
            match value {
                Value::Ext(e) => codec.encode(s.buf, e.data.as_ref()),
                _ => Err(mismatch("ext", value)),
            }
        }
    }
}

fn write_internal_body(s: &mut WriteSession, value: &Value, tid: TypeId) -> Result<()> {
    match (tid, value) {
        (TypeId::Bool, Value::Bool(v)) => s.buf.write_bool(*v),
        (TypeId::Int8, Value::Int8(v)) => s.buf.write_i8(*v),
        (TypeId::Int16, Value::Int16(v)) => s.buf.write_i16(*v),
        (TypeId::Int32, Value::Int32(v)) => s.buf.write_i32(*v),
        (TypeId::VarInt32, Value::Int32(v)) => s.buf.write_varint32(*v),
        (TypeId::Int64, Value::Int64(v)) => s.buf.write_i64(*v),
        (TypeId::VarInt64, Value::Int64(v)) => s.buf.write_varint64(*v),
        (TypeId::SliInt64, Value::Int64(v)) => write_sli_int64(s.buf, *v),
        (TypeId::Float32, Value::Float32(v)) => s.buf.write_f32(*v),
        (TypeId::Float64, Value::Float64(v)) => s.buf.write_f64(*v),
        (TypeId::String, Value::String(v)) => strings::write_string(s.buf, v),
        (TypeId::Binary, Value::Binary(v)) => write_binary(s, v),
        (TypeId::LocalDate, Value::Date(v)) => time::write_date(s.buf, v),
        (TypeId::Timestamp, Value::Timestamp(v)) => time::write_timestamp(s.buf, v),
        (TypeId::Duration, Value::Duration(v)) => time::write_duration(s.buf, v),
        (TypeId::List, Value::List(items)) => write_list(s, &items.borrow(), &TypeSpec::Any),
        (TypeId::Set, Value::Set(items)) => write_list(s, &items.borrow(), &TypeSpec::Any),
        (TypeId::Map, Value::Map(entries)) => {
            map::write_map(s, &entries.borrow(), &TypeSpec::Any, &TypeSpec::Any)
        }
        (
            TypeId::BoolArray
            | TypeId::Int8Array
            | TypeId::Int16Array
            | TypeId::Int32Array
            | TypeId::Int64Array
            | TypeId::Float16Array
            | TypeId::Float32Array
            | TypeId::Float64Array,
            _,
        ) => write_packed_array(s.buf, value, tid),
        _ => Err(mismatch(tid.name(), value)),
    }
}

fn write_array_body(s: &mut WriteSession, value: &Value, spec: &TypeSpec) -> Result<()> {
    match spec.wire_type() {
        Some(tid) if tid.is_primitive_array() => write_packed_array(s.buf, value, tid),
        _ => Err(mismatch(&spec.to_string(), value)),
    }
}

fn write_packed_array(buf: &mut ByteBuffer, value: &Value, tid: TypeId) -> Result<()> {
    match (tid, value) {
        (TypeId::BoolArray, Value::BoolArray(a)) => {
            buf.write_varuint32(a.len() as u32)?;
            for &v in a.iter() {
                buf.write_bool(v)?;
            }
            Ok(())
        }
        (TypeId::Int8Array, Value::Int8Array(a)) => {
            buf.write_varuint32(a.len() as u32)?;
            for &v in a.iter() {
                buf.write_i8(v)?;
            }
            Ok(())
        }
        (TypeId::Int16Array, Value::Int16Array(a)) => {
            buf.write_varuint32(a.len() as u32)?;
            for &v in a.iter() {
                buf.write_i16(v)?;
            }
            Ok(())
        }
        (TypeId::Int32Array, Value::Int32Array(a)) => {
            buf.write_varuint32(a.len() as u32)?;
            for &v in a.iter() {
                buf.write_i32(v)?;
            }
            Ok(())
        }
        (TypeId::Int64Array, Value::Int64Array(a)) => {
            buf.write_varuint32(a.len() as u32)?;
            for &v in a.iter() {
                buf.write_i64(v)?;
            }
            Ok(())
        }
        (TypeId::Float16Array, Value::Float16Array(a)) => {
            buf.write_varuint32(a.len() as u32)?;
            for &v in a.iter() {
                buf.write_u16(v)?;
            }
            Ok(())
        }
        (TypeId::Float32Array, Value::Float32Array(a)) => {
            buf.write_varuint32(a.len() as u32)?;
            for &v in a.iter() {
                buf.write_f32(v)?;
            }
            Ok(())
        }
        (TypeId::Float64Array, Value::Float64Array(a)) => {
            buf.write_varuint32(a.len() as u32)?;
            for &v in a.iter() {
                buf.write_f64(v)?;
            }
            Ok(())
        }
        _ => Err(mismatch(tid.name(), value)),
    }
}

/// Writes a scalar slot with no flag and no header.
pub(crate) fn write_primitive_exact(
    s: &mut WriteSession,
    value: &Value,
    spec: &TypeSpec,
) -> Result<()> {
    match (spec, value) {
        (TypeSpec::Bool, Value::Bool(v)) => s.buf.write_bool(*v),
        (TypeSpec::Int8, Value::Int8(v)) => s.buf.write_i8(*v),
        (TypeSpec::Int16, Value::Int16(v)) => s.buf.write_i16(*v),
        (TypeSpec::Int32, Value::Int32(v)) => s.buf.write_i32(*v),
        (TypeSpec::VarInt32, Value::Int32(v)) => s.buf.write_varint32(*v),
        (TypeSpec::Int64, Value::Int64(v)) => s.buf.write_i64(*v),
        (TypeSpec::VarInt64, Value::Int64(v)) => s.buf.write_varint64(*v),
        (TypeSpec::SliInt64, Value::Int64(v)) => write_sli_int64(s.buf, *v),
        (TypeSpec::Float32, Value::Float32(v)) => s.buf.write_f32(*v),
        (TypeSpec::Float64, Value::Float64(v)) => s.buf.write_f64(*v),
        _ => Err(Error::TypeMismatch {
            expected: spec.to_string(),
            found: value.kind_name().to_string(),
        }),
    }
}

/// Writes `len` then one slot per element; scalar elements are packed
/// without flags, dynamic elements carry their own headers.
pub(crate) fn write_list(s: &mut WriteSession, items: &[Value], elem: &TypeSpec) -> Result<()> {
    s.buf.write_varuint32(items.len() as u32)?;
    for item in items {
        write_spec_slot(s, item, elem)?;
    }
    Ok(())
}

/// Writes a binary body, diverting through the out-of-band sink when the
/// session has one.
pub(crate) fn write_binary(s: &mut WriteSession, bytes: &Rc<Vec<u8>>) -> Result<()> {
    if let Some(sink) = s.oob.as_mut() {
        if sink(bytes) {
            s.buf.write_u8(0)?;
            let index = s.oob_count;
            s.oob_count += 1;
            return s.buf.write_varuint32(index);
        }
        s.buf.write_u8(1)?;
    }
    s.buf.write_length_prefixed_bytes(bytes)
}

/// Hybrid small-long encoding: values fitting 31 bits go as a 4-byte word
/// with a zero low bit and the payload in the upper 31; everything else is
/// a one-byte discriminator with the low bit set, then 8 fixed bytes.
pub(crate) fn write_sli_int64(buf: &mut ByteBuffer, v: i64) -> Result<()> {
    const SMALL_MIN: i64 = -(1 << 30);
    const SMALL_MAX: i64 = (1 << 30) - 1;
    if (SMALL_MIN..=SMALL_MAX).contains(&v) {
        buf.write_i32((v as i32) << 1)
    } else {
        buf.write_u8(1)?;
        buf.write_i64(v)
    }
}
