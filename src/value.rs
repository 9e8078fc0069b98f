//! Dynamic value model — the crate's native representation of object graphs.
//!
//! One variant per logical wire type. Reference-bearing variants are held
//! behind `Rc` handles so graph sharing and cycles are expressible and
//! observable (`Rc::ptr_eq`); containers and structs add a `RefCell`
//! interior so a cyclic graph can be materialized shell-first during
//! deserialization and filled in place.
//!
//! `PartialEq` compares structurally and does not terminate on cyclic
//! graphs; identity assertions on cyclic data use [`Value::ptr_eq`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

// ─────────────────────────────────────────────────────────────────────────────
// Type tags
// ─────────────────────────────────────────────────────────────────────────────

/// Registry identity of a user-defined type as carried by a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Registered under an explicit numeric id.
    Id(u32),
    /// Registered under a (namespace, name) pair; the namespace may be empty.
    Named {
        /// Dot-separated package path, possibly empty.
        namespace: Arc<str>,
        /// Bare type name.
        name: Arc<str>,
    },
}

impl TypeTag {
    /// Tag for a type registered by (namespace, name).
    pub fn named(namespace: &str, name: &str) -> Self {
        TypeTag::Named {
            namespace: Arc::from(namespace),
            name: Arc::from(name),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Id(id) => write!(f, "#{id}"),
            TypeTag::Named { namespace, name } if namespace.is_empty() => {
                write!(f, "@{name}")
            }
            TypeTag::Named { namespace, name } => write!(f, "@{namespace}.{name}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User-defined payloads
// ─────────────────────────────────────────────────────────────────────────────

/// A user struct instance: its registry identity plus field values in
/// declared schema order.
#[derive(Debug, PartialEq)]
pub struct StructValue {
    /// Which registered struct type this instance belongs to.
    pub tag: TypeTag,
    /// Field values, positionally aligned with the registered schema.
    pub fields: Vec<Value>,
}

/// A user extension value: its registry identity plus an opaque payload
/// understood only by the registered ext codec.
pub struct ExtValue {
    /// Which registered ext type this instance belongs to.
    pub tag: TypeTag,
    /// Caller-defined payload, encoded/decoded by the ext codec.
    pub data: Box<dyn Any>,
}

impl fmt::Debug for ExtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtValue")
            .field("tag", &self.tag)
            .field("data", &"<opaque>")
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A dynamically-typed value of the codec's data model.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / null.
    Null,
    /// BOOL.
    Bool(bool),
    /// INT8.
    Int8(i8),
    /// INT16.
    Int16(i16),
    /// INT32 (fixed form in dynamic slots; var/zigzag forms come from
    /// declared field types).
    Int32(i32),
    /// INT64 (fixed form in dynamic slots; var and small-long forms come
    /// from declared field types).
    Int64(i64),
    /// FLOAT32.
    Float32(f32),
    /// FLOAT64.
    Float64(f64),
    /// STRING. Tracked by content, so equal strings share one wire literal.
    String(Rc<str>),
    /// BINARY, tracked by handle identity.
    Binary(Rc<Vec<u8>>),
    /// LOCAL_DATE.
    Date(NaiveDate),
    /// TIMESTAMP at millisecond precision, UTC.
    Timestamp(NaiveDateTime),
    /// DURATION as seconds plus subsecond nanos.
    Duration(TimeDelta),
    /// ENUM / NAMED_ENUM: registry identity plus ordinal.
    Enum {
        /// The registered enum type.
        tag: TypeTag,
        /// Zero-based variant ordinal.
        ordinal: u32,
    },
    /// LIST of dynamic elements.
    List(Rc<RefCell<Vec<Value>>>),
    /// SET. Same interior as a list; uniqueness is the caller's concern.
    Set(Rc<RefCell<Vec<Value>>>),
    /// MAP as an ordered sequence of entries.
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    /// A user struct instance.
    Struct(Rc<RefCell<StructValue>>),
    /// A user extension value.
    Ext(Rc<ExtValue>),
    /// BOOL_ARRAY, packed one byte per element on the wire.
    BoolArray(Rc<Vec<bool>>),
    /// INT8_ARRAY.
    Int8Array(Rc<Vec<i8>>),
    /// INT16_ARRAY.
    Int16Array(Rc<Vec<i16>>),
    /// INT32_ARRAY.
    Int32Array(Rc<Vec<i32>>),
    /// INT64_ARRAY.
    Int64Array(Rc<Vec<i64>>),
    /// FLOAT16_ARRAY carried as raw IEEE-754 binary16 bit patterns.
    Float16Array(Rc<Vec<u16>>),
    /// FLOAT32_ARRAY.
    Float32Array(Rc<Vec<f32>>),
    /// FLOAT64_ARRAY.
    Float64Array(Rc<Vec<f64>>),
}

impl Value {
    /// Builds a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Builds a binary value.
    pub fn binary(bytes: Vec<u8>) -> Self {
        Value::Binary(Rc::new(bytes))
    }

    /// Builds a list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Builds a set value.
    pub fn set(items: Vec<Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    /// Builds a map value from ordered entries.
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    /// Builds a struct value; fields must match the registered schema order.
    pub fn structure(tag: TypeTag, fields: Vec<Value>) -> Self {
        Value::Struct(Rc::new(RefCell::new(StructValue { tag, fields })))
    }

    /// Builds an ext value with an opaque payload.
    pub fn ext(tag: TypeTag, data: Box<dyn Any>) -> Self {
        Value::Ext(Rc::new(ExtValue { tag, data }))
    }

    /// True for `Value::Null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Handle identity for reference-bearing variants. Strings compare by
    /// handle here even though the codec tracks them by content.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Binary(a), Value::Binary(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Struct(a), Value::Struct(b)) => Rc::ptr_eq(a, b),
            (Value::Ext(a), Value::Ext(b)) => Rc::ptr_eq(a, b),
            (Value::BoolArray(a), Value::BoolArray(b)) => Rc::ptr_eq(a, b),
            (Value::Int8Array(a), Value::Int8Array(b)) => Rc::ptr_eq(a, b),
            (Value::Int16Array(a), Value::Int16Array(b)) => Rc::ptr_eq(a, b),
            (Value::Int32Array(a), Value::Int32Array(b)) => Rc::ptr_eq(a, b),
            (Value::Int64Array(a), Value::Int64Array(b)) => Rc::ptr_eq(a, b),
            (Value::Float16Array(a), Value::Float16Array(b)) => Rc::ptr_eq(a, b),
            (Value::Float32Array(a), Value::Float32Array(b)) => Rc::ptr_eq(a, b),
            (Value::Float64Array(a), Value::Float64Array(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Variant name for diagnostics and `TypeMismatch` messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Duration(_) => "duration",
            Value::Enum { .. } => "enum",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::Ext(_) => "ext",
            Value::BoolArray(_) => "bool_array",
            Value::Int8Array(_) => "int8_array",
            Value::Int16Array(_) => "int16_array",
            Value::Int32Array(_) => "int32_array",
            Value::Int64Array(_) => "int64_array",
            Value::Float16Array(_) => "float16_array",
            Value::Float32Array(_) => "float32_array",
            Value::Float64Array(_) => "float64_array",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int8(a), Value::Int8(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (
                Value::Enum { tag: ta, ordinal: oa },
                Value::Enum { tag: tb, ordinal: ob },
            ) => ta == tb && oa == ob,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Set(a), Value::Set(b)) => *a.borrow() == *b.borrow(),
            (Value::Map(a), Value::Map(b)) => *a.borrow() == *b.borrow(),
            (Value::Struct(a), Value::Struct(b)) => *a.borrow() == *b.borrow(),
            // Ext payloads are opaque; equality is handle identity.
            (Value::Ext(a), Value::Ext(b)) => Rc::ptr_eq(a, b),
            (Value::BoolArray(a), Value::BoolArray(b)) => a == b,
            (Value::Int8Array(a), Value::Int8Array(b)) => a == b,
            (Value::Int16Array(a), Value::Int16Array(b)) => a == b,
            (Value::Int32Array(a), Value::Int32Array(b)) => a == b,
            (Value::Int64Array(a), Value::Int64Array(b)) => a == b,
            (Value::Float16Array(a), Value::Float16Array(b)) => a == b,
            (Value::Float32Array(a), Value::Float32Array(b)) => a == b,
            (Value::Float64Array(a), Value::Float64Array(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        assert_eq!(Value::string("abc"), Value::string("abc"));
        assert_ne!(Value::string("abc"), Value::string("abd"));
        assert_eq!(
            Value::list(vec![Value::Int32(1), Value::Null]),
            Value::list(vec![Value::Int32(1), Value::Null]),
        );
        assert_ne!(Value::Int32(1), Value::Int64(1));
        assert_ne!(
            Value::list(vec![Value::Int32(1)]),
            Value::set(vec![Value::Int32(1)]),
        );
    }

    #[test]
    fn ptr_eq_distinguishes_handles() {
        let a = Value::list(vec![Value::Bool(true)]);
        let b = a.clone();
        let c = Value::list(vec![Value::Bool(true)]);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a, c);
    }

    #[test]
    fn shared_handle_mutation_is_visible() {
        let inner = Rc::new(RefCell::new(vec![Value::Int32(1)]));
        let a = Value::List(inner.clone());
        inner.borrow_mut().push(Value::Int32(2));
        assert_eq!(a, Value::list(vec![Value::Int32(1), Value::Int32(2)]));
    }

    #[test]
    fn tag_display() {
        assert_eq!(TypeTag::Id(412).to_string(), "#412");
        assert_eq!(TypeTag::named("example", "A").to_string(), "@example.A");
        assert_eq!(TypeTag::named("", "A").to_string(), "@A");
    }
}
