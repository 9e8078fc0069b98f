//! Struct bodies — declared-order field slots.
//!
//! The type header (written by the resolver) already carried the struct's
//! identity; the body is the fields in schema order. Scalar fields are
//! inline, everything else is a reference-bearing slot, and dynamic fields
//! carry nested type headers. On read, the struct shell is registered with
//! the reference reader before any field is read, which is what lets a
//! field resolve a back-reference to its own enclosing struct.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::codec::{read, write, ReadSession, WriteSession};
use crate::error::{Error, Result};
use crate::resolver::type_resolver::TypeInfo;
use crate::value::{StructValue, Value};

pub(crate) fn write_struct_body(
    s: &mut WriteSession,
    value: &Value,
    info: &Arc<TypeInfo>,
) -> Result<()> {
    let Value::Struct(sv) = value else {
        return Err(write::mismatch(&info.describe(), value));
    };
    let Some(schema) = info.schema.clone() else {
        return Err(Error::TypeMismatch {
            expected: "struct type with a schema".into(),
            found: info.describe(),
        });
    };
    let sv = sv.borrow();
    if sv.fields.len() != schema.fields.len() {
        return Err(Error::TypeMismatch {
            expected: format!("{} fields for {}", schema.fields.len(), info.describe()),
            found: format!("{} fields", sv.fields.len()),
        });
    }
    for (field, value) in schema.fields.iter().zip(sv.fields.iter()) {
        write::write_spec_slot(s, value, &field.spec)?;
    }
    Ok(())
}

pub(crate) fn read_struct_body(
    s: &mut ReadSession,
    info: &Arc<TypeInfo>,
    register: bool,
) -> Result<Value> {
    let Some(schema) = info.schema.clone() else {
        return Err(Error::TypeMismatch {
            expected: "struct type with a schema".into(),
            found: info.describe(),
        });
    };
    let shell = Rc::new(RefCell::new(StructValue {
        tag: info.tag(),
        fields: Vec::with_capacity(schema.fields.len()),
    }));
    let value = Value::Struct(shell.clone());
    if register {
        let id = s.refs.reserve();
        s.refs.set(id, value.clone());
    }
    for field in &schema.fields {
        let field_value = read::read_spec_slot(s, &field.spec)?;
        shell.borrow_mut().fields.push(field_value);
    }
    Ok(value)
}
