//! Structural static-type descriptors and the composite-name grammar.
//!
//! Declared struct fields and dynamic slots whose element types are known
//! statically are described by a [`TypeSpec`]. The same structure doubles
//! as the AST of the composite-type name grammar a peer may carry on the
//! wire for fully dynamic slots:
//!
//! ```text
//! spec    := "*" spec            pointer (nullable, reference-flagged)
//!          | "[]" spec           list; of a fixed-width scalar: packed array
//!          | "[" N "]" spec      fixed-length list
//!          | "map[" spec "]" spec
//!          | "set[" spec "]"
//!          | "@" [ns "."] name   registered named type
//!          | "#" id              registered numeric type id
//!          | scalar token        bool | int8 | ... | string | date | ...
//! ```
//!
//! `[]byte` denotes the BINARY type; `[]` of the other fixed-width scalars
//! denotes the packed primitive-array types.

use std::fmt;

use crate::types::TypeId;

/// Static type of a declared slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    /// Fully dynamic: the slot carries its own type header.
    Any,
    /// BOOL.
    Bool,
    /// INT8.
    Int8,
    /// INT16.
    Int16,
    /// INT32, fixed 4-byte form.
    Int32,
    /// INT32 as ZigZag varint.
    VarInt32,
    /// INT64, fixed 8-byte form.
    Int64,
    /// INT64 as ZigZag varint.
    VarInt64,
    /// INT64 in the hybrid small-long form.
    SliInt64,
    /// FLOAT32.
    Float32,
    /// FLOAT64.
    Float64,
    /// STRING.
    String,
    /// BINARY (`[]byte`).
    Binary,
    /// LOCAL_DATE.
    Date,
    /// TIMESTAMP.
    Timestamp,
    /// DURATION.
    Duration,
    /// BOOL_ARRAY.
    BoolArray,
    /// INT8_ARRAY.
    Int8Array,
    /// INT16_ARRAY.
    Int16Array,
    /// INT32_ARRAY.
    Int32Array,
    /// INT64_ARRAY.
    Int64Array,
    /// FLOAT16_ARRAY.
    Float16Array,
    /// FLOAT32_ARRAY.
    Float32Array,
    /// FLOAT64_ARRAY.
    Float64Array,
    /// LIST with a statically known element type.
    List(Box<TypeSpec>),
    /// LIST whose length is fixed by the declaration.
    FixedList(Box<TypeSpec>, usize),
    /// SET with a statically known element type.
    Set(Box<TypeSpec>),
    /// MAP with statically known key and value types.
    Map(Box<TypeSpec>, Box<TypeSpec>),
    /// A type registered by (namespace, name).
    Named {
        /// Dot-separated package path, possibly empty.
        namespace: String,
        /// Bare type name.
        name: String,
    },
    /// A type registered by explicit numeric id.
    Registered(u32),
    /// Pointer form: the slot is nullable and reference-flagged; the
    /// pointee encodes as `TypeSpec` itself.
    Ptr(Box<TypeSpec>),
}

impl TypeSpec {
    /// True for scalar specs written inline without a reference flag.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeSpec::Bool
                | TypeSpec::Int8
                | TypeSpec::Int16
                | TypeSpec::Int32
                | TypeSpec::VarInt32
                | TypeSpec::Int64
                | TypeSpec::VarInt64
                | TypeSpec::SliInt64
                | TypeSpec::Float32
                | TypeSpec::Float64
        )
    }

    /// True when values of this spec participate in reference tracking.
    /// Must agree with [`TypeId::is_trackable`] so writer and reader
    /// allocate identical id sequences.
    pub fn is_trackable(&self) -> bool {
        match self {
            TypeSpec::String
            | TypeSpec::Binary
            | TypeSpec::BoolArray
            | TypeSpec::Int8Array
            | TypeSpec::Int16Array
            | TypeSpec::Int32Array
            | TypeSpec::Int64Array
            | TypeSpec::Float16Array
            | TypeSpec::Float32Array
            | TypeSpec::Float64Array
            | TypeSpec::List(_)
            | TypeSpec::FixedList(..)
            | TypeSpec::Set(_)
            | TypeSpec::Map(..)
            | TypeSpec::Named { .. }
            | TypeSpec::Registered(_) => true,
            TypeSpec::Ptr(inner) => inner.is_trackable(),
            _ => false,
        }
    }

    /// The wire type this spec fixes, when it is not resolver-dependent.
    pub fn wire_type(&self) -> Option<TypeId> {
        Some(match self {
            TypeSpec::Bool => TypeId::Bool,
            TypeSpec::Int8 => TypeId::Int8,
            TypeSpec::Int16 => TypeId::Int16,
            TypeSpec::Int32 => TypeId::Int32,
            TypeSpec::VarInt32 => TypeId::VarInt32,
            TypeSpec::Int64 => TypeId::Int64,
            TypeSpec::VarInt64 => TypeId::VarInt64,
            TypeSpec::SliInt64 => TypeId::SliInt64,
            TypeSpec::Float32 => TypeId::Float32,
            TypeSpec::Float64 => TypeId::Float64,
            TypeSpec::String => TypeId::String,
            TypeSpec::Binary => TypeId::Binary,
            TypeSpec::Date => TypeId::LocalDate,
            TypeSpec::Timestamp => TypeId::Timestamp,
            TypeSpec::Duration => TypeId::Duration,
            TypeSpec::BoolArray => TypeId::BoolArray,
            TypeSpec::Int8Array => TypeId::Int8Array,
            TypeSpec::Int16Array => TypeId::Int16Array,
            TypeSpec::Int32Array => TypeId::Int32Array,
            TypeSpec::Int64Array => TypeId::Int64Array,
            TypeSpec::Float16Array => TypeId::Float16Array,
            TypeSpec::Float32Array => TypeId::Float32Array,
            TypeSpec::Float64Array => TypeId::Float64Array,
            TypeSpec::List(_) | TypeSpec::FixedList(..) => TypeId::List,
            TypeSpec::Set(_) => TypeId::Set,
            TypeSpec::Map(..) => TypeId::Map,
            TypeSpec::Ptr(inner) => return inner.wire_type(),
            TypeSpec::Any | TypeSpec::Named { .. } | TypeSpec::Registered(_) => return None,
        })
    }

    /// Parses a composite-type name. Returns `None` on any syntax error;
    /// the caller decides how unresolvable names surface.
    pub fn parse(s: &str) -> Option<TypeSpec> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(rest) = s.strip_prefix('*') {
            return TypeSpec::parse(rest).map(|t| TypeSpec::Ptr(Box::new(t)));
        }
        if let Some(rest) = s.strip_prefix("[]") {
            return Some(match rest {
                "byte" | "uint8" => TypeSpec::Binary,
                "bool" => TypeSpec::BoolArray,
                "int8" => TypeSpec::Int8Array,
                "int16" => TypeSpec::Int16Array,
                "int32" => TypeSpec::Int32Array,
                "int64" => TypeSpec::Int64Array,
                "float16" => TypeSpec::Float16Array,
                "float32" => TypeSpec::Float32Array,
                "float64" => TypeSpec::Float64Array,
                other => TypeSpec::List(Box::new(TypeSpec::parse(other)?)),
            });
        }
        if let Some(rest) = s.strip_prefix("map[") {
            let split = matching_bracket(rest)?;
            let key = TypeSpec::parse(&rest[..split])?;
            let value = TypeSpec::parse(&rest[split + 1..])?;
            return Some(TypeSpec::Map(Box::new(key), Box::new(value)));
        }
        if let Some(rest) = s.strip_prefix("set[") {
            let split = matching_bracket(rest)?;
            if !rest[split + 1..].is_empty() {
                return None;
            }
            return Some(TypeSpec::Set(Box::new(TypeSpec::parse(&rest[..split])?)));
        }
        if let Some(rest) = s.strip_prefix('[') {
            let close = rest.find(']')?;
            let n: usize = rest[..close].parse().ok()?;
            let inner = TypeSpec::parse(&rest[close + 1..])?;
            return Some(TypeSpec::FixedList(Box::new(inner), n));
        }
        if let Some(rest) = s.strip_prefix('@') {
            let (namespace, name) = match rest.rfind('.') {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                None => ("", rest),
            };
            if name.is_empty() {
                return None;
            }
            return Some(TypeSpec::Named {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        if let Some(rest) = s.strip_prefix('#') {
            return rest.parse().ok().map(TypeSpec::Registered);
        }
        Some(match s {
            "any" => TypeSpec::Any,
            "bool" => TypeSpec::Bool,
            "int8" => TypeSpec::Int8,
            "int16" => TypeSpec::Int16,
            "int32" => TypeSpec::Int32,
            "varint32" => TypeSpec::VarInt32,
            "int64" => TypeSpec::Int64,
            "varint64" => TypeSpec::VarInt64,
            "sliint64" => TypeSpec::SliInt64,
            "float32" => TypeSpec::Float32,
            "float64" => TypeSpec::Float64,
            "string" => TypeSpec::String,
            "date" => TypeSpec::Date,
            "timestamp" => TypeSpec::Timestamp,
            "duration" => TypeSpec::Duration,
            _ => return None,
        })
    }
}

/// Index of the `]` matching the already-consumed opening bracket, honoring
/// nesting.
fn matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Any => f.write_str("any"),
            TypeSpec::Bool => f.write_str("bool"),
            TypeSpec::Int8 => f.write_str("int8"),
            TypeSpec::Int16 => f.write_str("int16"),
            TypeSpec::Int32 => f.write_str("int32"),
            TypeSpec::VarInt32 => f.write_str("varint32"),
            TypeSpec::Int64 => f.write_str("int64"),
            TypeSpec::VarInt64 => f.write_str("varint64"),
            TypeSpec::SliInt64 => f.write_str("sliint64"),
            TypeSpec::Float32 => f.write_str("float32"),
            TypeSpec::Float64 => f.write_str("float64"),
            TypeSpec::String => f.write_str("string"),
            TypeSpec::Binary => f.write_str("[]byte"),
            TypeSpec::Date => f.write_str("date"),
            TypeSpec::Timestamp => f.write_str("timestamp"),
            TypeSpec::Duration => f.write_str("duration"),
            TypeSpec::BoolArray => f.write_str("[]bool"),
            TypeSpec::Int8Array => f.write_str("[]int8"),
            TypeSpec::Int16Array => f.write_str("[]int16"),
            TypeSpec::Int32Array => f.write_str("[]int32"),
            TypeSpec::Int64Array => f.write_str("[]int64"),
            TypeSpec::Float16Array => f.write_str("[]float16"),
            TypeSpec::Float32Array => f.write_str("[]float32"),
            TypeSpec::Float64Array => f.write_str("[]float64"),
            TypeSpec::List(t) => write!(f, "[]{t}"),
            TypeSpec::FixedList(t, n) => write!(f, "[{n}]{t}"),
            TypeSpec::Set(t) => write!(f, "set[{t}]"),
            TypeSpec::Map(k, v) => write!(f, "map[{k}]{v}"),
            TypeSpec::Named { namespace, name } if namespace.is_empty() => {
                write!(f, "@{name}")
            }
            TypeSpec::Named { namespace, name } => write!(f, "@{namespace}.{name}"),
            TypeSpec::Registered(id) => write!(f, "#{id}"),
            TypeSpec::Ptr(t) => write!(f, "*{t}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) -> TypeSpec {
        let spec = TypeSpec::parse(s).unwrap_or_else(|| panic!("failed to parse {s:?}"));
        assert_eq!(spec.to_string(), s, "display did not mirror {s:?}");
        spec
    }

    #[test]
    fn scalars() {
        assert_eq!(roundtrip("bool"), TypeSpec::Bool);
        assert_eq!(roundtrip("varint32"), TypeSpec::VarInt32);
        assert_eq!(roundtrip("sliint64"), TypeSpec::SliInt64);
        assert_eq!(roundtrip("string"), TypeSpec::String);
        assert_eq!(roundtrip("any"), TypeSpec::Any);
    }

    #[test]
    fn slices_of_scalars_are_packed_arrays() {
        assert_eq!(roundtrip("[]byte"), TypeSpec::Binary);
        assert_eq!(roundtrip("[]int32"), TypeSpec::Int32Array);
        assert_eq!(roundtrip("[]float16"), TypeSpec::Float16Array);
        assert_eq!(
            roundtrip("[]string"),
            TypeSpec::List(Box::new(TypeSpec::String))
        );
    }

    #[test]
    fn pointers_and_named_types() {
        assert_eq!(
            roundtrip("@example.A"),
            TypeSpec::Named {
                namespace: "example".into(),
                name: "A".into()
            }
        );
        assert_eq!(
            roundtrip("*@example.A"),
            TypeSpec::Ptr(Box::new(TypeSpec::Named {
                namespace: "example".into(),
                name: "A".into()
            }))
        );
        assert_eq!(
            roundtrip("@Widget"),
            TypeSpec::Named {
                namespace: "".into(),
                name: "Widget".into()
            }
        );
        // Namespaces may themselves be dotted; the last dot splits.
        assert_eq!(
            roundtrip("@org.example.model.Widget"),
            TypeSpec::Named {
                namespace: "org.example.model".into(),
                name: "Widget".into()
            }
        );
    }

    #[test]
    fn nested_composites() {
        assert_eq!(
            roundtrip("map[string][]int64"),
            TypeSpec::Map(
                Box::new(TypeSpec::String),
                Box::new(TypeSpec::Int64Array)
            )
        );
        assert_eq!(
            roundtrip("map[string]map[int32]*@a.B"),
            TypeSpec::Map(
                Box::new(TypeSpec::String),
                Box::new(TypeSpec::Map(
                    Box::new(TypeSpec::Int32),
                    Box::new(TypeSpec::Ptr(Box::new(TypeSpec::Named {
                        namespace: "a".into(),
                        name: "B".into()
                    })))
                ))
            )
        );
        assert_eq!(
            roundtrip("[4]*string"),
            TypeSpec::FixedList(Box::new(TypeSpec::Ptr(Box::new(TypeSpec::String))), 4)
        );
        assert_eq!(
            roundtrip("set[int64]"),
            TypeSpec::Set(Box::new(TypeSpec::Int64))
        );
    }

    #[test]
    fn rejects_garbage() {
        for s in ["", "intt32", "[]", "map[string]", "map[]int32", "@", "@ns.", "[x]int32", "set[int32]x"] {
            assert!(TypeSpec::parse(s).is_none(), "{s:?} should not parse");
        }
    }

    #[test]
    fn trackability_matches_wire_types() {
        assert!(TypeSpec::String.is_trackable());
        assert!(TypeSpec::Int32Array.is_trackable());
        assert!(TypeSpec::Ptr(Box::new(TypeSpec::String)).is_trackable());
        assert!(!TypeSpec::Ptr(Box::new(TypeSpec::Int32)).is_trackable());
        assert!(!TypeSpec::Bool.is_trackable());
        assert!(!TypeSpec::Timestamp.is_trackable());
    }

    #[test]
    fn wire_types() {
        assert_eq!(TypeSpec::VarInt32.wire_type(), Some(TypeId::VarInt32));
        assert_eq!(
            TypeSpec::List(Box::new(TypeSpec::Any)).wire_type(),
            Some(TypeId::List)
        );
        assert_eq!(TypeSpec::Any.wire_type(), None);
        assert_eq!(
            TypeSpec::Named { namespace: "a".into(), name: "B".into() }.wire_type(),
            None
        );
    }
}
