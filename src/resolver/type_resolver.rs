//! Type resolver — the registry and the type-header wire form.
//!
//! Covers:
//! - `TypeRegistry`: built-in registrations for the internal wire types,
//!   user registration by explicit id or by (namespace, name), auto-id
//!   allocation for name-registered types, serializer replacement
//! - `TypeInfo`: one record per registered type
//! - `TypeResolver`: header encode/decode with the per-instance composite
//!   hash cache and name-lookup backfill
//! - the process-wide default registry behind a write-once initializer
//!
//! Registrations are a startup-phase activity; after that the registry is
//! shared immutably (`Arc`) across codec instances, and header reads only
//! mutate the resolver's own cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::{debug, trace};
use xxhash_rust::xxh64::xxh64;

use crate::buffer::ByteBuffer;
use crate::codec::ext::ExtCodec;
use crate::error::{Error, Result};
use crate::meta::metastring::{MetaStringBytes, NAMESPACE_ENCODER, TYPE_NAME_ENCODER};
use crate::meta::resolver::{MetaStringReader, MetaStringWriter};
use crate::resolver::typespec::TypeSpec;
use crate::types::{is_named_wire_id, TypeId, AUTO_TYPE_ID_BASE, INTERNAL_ID_FLOOR};
use crate::value::{TypeTag, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Schemas
// ─────────────────────────────────────────────────────────────────────────────

/// One struct field: its name and declared static type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name; informational (the wire carries fields positionally).
    pub name: String,
    /// Declared static type of the field.
    pub spec: TypeSpec,
}

impl FieldDef {
    /// Builds a field definition.
    pub fn new(name: impl Into<String>, spec: TypeSpec) -> Self {
        FieldDef {
            name: name.into(),
            spec,
        }
    }
}

/// Declared field list of a registered struct type, in wire order.
#[derive(Debug, Clone, Default)]
pub struct StructSchema {
    /// Fields in declaration order.
    pub fields: Vec<FieldDef>,
}

impl StructSchema {
    /// Builds a schema from fields in declaration order.
    pub fn new(fields: Vec<FieldDef>) -> Self {
        StructSchema { fields }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TypeInfo
// ─────────────────────────────────────────────────────────────────────────────

/// Behavioral family of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeKind {
    /// A built-in wire type with a fixed serializer.
    Internal = 0,
    /// A user struct with a registered schema.
    Struct = 1,
    /// A user enum, carried as an ordinal.
    Enum = 2,
    /// A user extension type with a caller-supplied codec.
    Ext = 3,
}

/// Interned (namespace, name) identity of a name-registered type.
#[derive(Debug, Clone)]
pub struct NamedTypeName {
    /// Encoded namespace fragment.
    pub namespace: Arc<MetaStringBytes>,
    /// Encoded name fragment.
    pub name: Arc<MetaStringBytes>,
    /// Decoded namespace.
    pub namespace_str: Arc<str>,
    /// Decoded name.
    pub name_str: Arc<str>,
}

/// One record per registered type.
#[derive(Clone)]
pub struct TypeInfo {
    /// Registry id: the wire id for built-ins and explicit registrations,
    /// an auto-assigned handle (>= 300) for name-registered types. Negative
    /// values denote the pointer variant and are normalized on lookup.
    pub type_id: i32,
    /// Wire family tag; determines the header form and body dispatch.
    pub wire_id: TypeId,
    /// Behavioral family.
    pub kind: TypeKind,
    /// Present exactly when the type is registered by name.
    pub named: Option<NamedTypeName>,
    /// Field schema for struct kinds.
    pub schema: Option<Arc<StructSchema>>,
    /// Caller-supplied codec for ext kinds.
    pub ext: Option<Arc<dyn ExtCodec>>,
    /// Stable hash over (namespace, name, kind); zero for built-ins.
    pub hash: u64,
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("type_id", &self.type_id)
            .field("wire_id", &self.wire_id)
            .field("kind", &self.kind)
            .field("named", &self.named.as_ref().map(|n| (&n.namespace_str, &n.name_str)))
            .field("has_schema", &self.schema.is_some())
            .field("has_ext", &self.ext.is_some())
            .field("hash", &self.hash)
            .finish()
    }
}

impl TypeInfo {
    fn internal(wire_id: TypeId) -> Self {
        TypeInfo {
            type_id: wire_id as i32,
            wire_id,
            kind: TypeKind::Internal,
            named: None,
            schema: None,
            ext: None,
            hash: 0,
        }
    }

    /// True when values of this type participate in reference tracking.
    pub fn is_trackable(&self) -> bool {
        match self.kind {
            TypeKind::Internal => self.wire_id.is_trackable(),
            TypeKind::Struct | TypeKind::Ext => true,
            TypeKind::Enum => false,
        }
    }

    /// The tag under which values reference this type.
    pub fn tag(&self) -> TypeTag {
        match &self.named {
            Some(n) => TypeTag::Named {
                namespace: n.namespace_str.clone(),
                name: n.name_str.clone(),
            },
            None => TypeTag::Id(self.type_id.unsigned_abs()),
        }
    }

    /// Diagnostic name for mismatch messages.
    pub fn describe(&self) -> String {
        match &self.named {
            Some(n) if n.namespace_str.is_empty() => format!("@{}", n.name_str),
            Some(n) => format!("@{}.{}", n.namespace_str, n.name_str),
            None => self.wire_id.name().to_string(),
        }
    }
}

fn type_hash(namespace: &str, name: &str, kind: TypeKind) -> u64 {
    let mut bytes = Vec::with_capacity(namespace.len() + name.len() + 2);
    bytes.extend_from_slice(namespace.as_bytes());
    bytes.push(b'.');
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(kind as u8);
    xxh64(&bytes, 0)
}

// ─────────────────────────────────────────────────────────────────────────────
// TypeRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Every built-in wire type registered at initialization.
const BUILTIN_TYPES: [TypeId; 34] = [
    TypeId::Bool,
    TypeId::Int8,
    TypeId::Int16,
    TypeId::Int32,
    TypeId::VarInt32,
    TypeId::Int64,
    TypeId::VarInt64,
    TypeId::SliInt64,
    TypeId::Float32,
    TypeId::Float64,
    TypeId::String,
    TypeId::Enum,
    TypeId::NamedEnum,
    TypeId::Struct,
    TypeId::NamedStruct,
    TypeId::CompatibleStruct,
    TypeId::NamedCompatibleStruct,
    TypeId::Ext,
    TypeId::NamedExt,
    TypeId::List,
    TypeId::Set,
    TypeId::Map,
    TypeId::Duration,
    TypeId::Timestamp,
    TypeId::LocalDate,
    TypeId::Binary,
    TypeId::BoolArray,
    TypeId::Int8Array,
    TypeId::Int16Array,
    TypeId::Int32Array,
    TypeId::Int64Array,
    TypeId::Float32Array,
    TypeId::Float64Array,
    TypeId::Float16Array,
];

/// The type registry: native type identity to [`TypeInfo`].
///
/// Populate during startup via the `register_*` methods, then share
/// immutably across codec instances with `Arc`.
#[derive(Debug)]
pub struct TypeRegistry {
    by_id: HashMap<u32, Arc<TypeInfo>>,
    by_name: HashMap<(Arc<str>, Arc<str>), Arc<TypeInfo>>,
    next_auto_id: u32,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// Creates a registry pre-populated with every built-in wire type.
    pub fn with_builtins() -> Self {
        let mut by_id = HashMap::with_capacity(BUILTIN_TYPES.len() + 16);
        for tid in BUILTIN_TYPES {
            by_id.insert(tid as u32, Arc::new(TypeInfo::internal(tid)));
        }
        TypeRegistry {
            by_id,
            by_name: HashMap::new(),
            next_auto_id: AUTO_TYPE_ID_BASE,
        }
    }

    /// Registers a struct under an explicit id.
    pub fn register_struct(&mut self, id: u32, schema: StructSchema) -> Result<()> {
        self.insert_by_id(id, TypeKind::Struct, TypeId::Struct, Some(Arc::new(schema)), None)
    }

    /// Registers a struct under (namespace, name).
    pub fn register_struct_by_name(
        &mut self,
        namespace: &str,
        name: &str,
        schema: StructSchema,
    ) -> Result<()> {
        self.insert_by_name(
            namespace,
            name,
            TypeKind::Struct,
            TypeId::NamedStruct,
            Some(Arc::new(schema)),
            None,
        )
    }

    /// Registers a struct by name only; the namespace defaults to empty.
    pub fn register_struct_named(&mut self, name: &str, schema: StructSchema) -> Result<()> {
        self.register_struct_by_name("", name, schema)
    }

    /// Registers an enum under an explicit id.
    pub fn register_enum(&mut self, id: u32) -> Result<()> {
        self.insert_by_id(id, TypeKind::Enum, TypeId::Enum, None, None)
    }

    /// Registers an enum under (namespace, name).
    pub fn register_enum_by_name(&mut self, namespace: &str, name: &str) -> Result<()> {
        self.insert_by_name(namespace, name, TypeKind::Enum, TypeId::NamedEnum, None, None)
    }

    /// Registers an extension type under an explicit id.
    pub fn register_ext(&mut self, id: u32, codec: Arc<dyn ExtCodec>) -> Result<()> {
        self.insert_by_id(id, TypeKind::Ext, TypeId::Ext, None, Some(codec))
    }

    /// Registers an extension type under (namespace, name).
    pub fn register_ext_by_name(
        &mut self,
        namespace: &str,
        name: &str,
        codec: Arc<dyn ExtCodec>,
    ) -> Result<()> {
        self.insert_by_name(
            namespace,
            name,
            TypeKind::Ext,
            TypeId::NamedExt,
            None,
            Some(codec),
        )
    }

    /// Replaces the serializer of an already-registered type with a custom
    /// codec; the type becomes an ext type on the wire.
    pub fn register_serializer(&mut self, tag: &TypeTag, codec: Arc<dyn ExtCodec>) -> Result<()> {
        let info = self.lookup_tag(tag).ok_or_else(|| unregistered(tag))?;
        let mut replaced = (*info).clone();
        replaced.kind = TypeKind::Ext;
        replaced.wire_id = if replaced.named.is_some() {
            TypeId::NamedExt
        } else {
            TypeId::Ext
        };
        replaced.ext = Some(codec);
        let replaced = Arc::new(replaced);
        self.by_id.insert(replaced.type_id.unsigned_abs(), replaced.clone());
        if let Some(n) = &replaced.named {
            self.by_name
                .insert((n.namespace_str.clone(), n.name_str.clone()), replaced.clone());
        }
        debug!("replaced serializer for {}", replaced.describe());
        Ok(())
    }

    /// Looks a type up by id, normalizing the pointer-variant sign.
    pub fn get_by_id(&self, id: i32) -> Option<Arc<TypeInfo>> {
        self.by_id.get(&id.unsigned_abs()).cloned()
    }

    /// Looks a type up by (namespace, name).
    pub fn get_by_name(&self, namespace: &str, name: &str) -> Option<Arc<TypeInfo>> {
        self.by_name
            .get(&(Arc::<str>::from(namespace), Arc::<str>::from(name)))
            .cloned()
    }

    /// Looks a type up by value tag.
    pub fn lookup_tag(&self, tag: &TypeTag) -> Option<Arc<TypeInfo>> {
        match tag {
            TypeTag::Id(id) => self.get_by_id(*id as i32),
            TypeTag::Named { namespace, name } => self.get_by_name(namespace, name),
        }
    }

    fn insert_by_id(
        &mut self,
        id: u32,
        kind: TypeKind,
        wire_id: TypeId,
        schema: Option<Arc<StructSchema>>,
        ext: Option<Arc<dyn ExtCodec>>,
    ) -> Result<()> {
        if id <= TypeId::Float16Array as u32 || id >= INTERNAL_ID_FLOOR {
            return Err(Error::InvalidTypeId { id: id as i32 });
        }
        if self.by_id.contains_key(&id) {
            return Err(Error::AlreadyRegistered {
                what: format!("type id {id}"),
            });
        }
        debug!("registering {kind:?} type under id {id}");
        self.by_id.insert(
            id,
            Arc::new(TypeInfo {
                type_id: id as i32,
                wire_id,
                kind,
                named: None,
                schema,
                ext,
                hash: 0,
            }),
        );
        Ok(())
    }

    fn insert_by_name(
        &mut self,
        namespace: &str,
        name: &str,
        kind: TypeKind,
        wire_id: TypeId,
        schema: Option<Arc<StructSchema>>,
        ext: Option<Arc<dyn ExtCodec>>,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidTypeName { name: name.into() });
        }
        let key: (Arc<str>, Arc<str>) = (Arc::from(namespace), Arc::from(name));
        if self.by_name.contains_key(&key) {
            return Err(Error::AlreadyRegistered {
                what: format!("type name {namespace:?}.{name:?}"),
            });
        }
        let auto_id = self.take_auto_id();
        let named = NamedTypeName {
            namespace: Arc::new(NAMESPACE_ENCODER.encode(namespace)),
            name: Arc::new(TYPE_NAME_ENCODER.encode(name)),
            namespace_str: key.0.clone(),
            name_str: key.1.clone(),
        };
        let info = Arc::new(TypeInfo {
            type_id: auto_id as i32,
            wire_id,
            kind,
            named: Some(named),
            schema,
            ext,
            hash: type_hash(namespace, name, kind),
        });
        debug!("registering {kind:?} type {namespace:?}.{name:?} with auto id {auto_id}");
        self.by_id.insert(auto_id, info.clone());
        self.by_name.insert(key, info);
        Ok(())
    }

    fn take_auto_id(&mut self) -> u32 {
        while self.by_id.contains_key(&self.next_auto_id) {
            self.next_auto_id += 1;
        }
        let id = self.next_auto_id;
        self.next_auto_id += 1;
        id
    }
}

fn unregistered(tag: &TypeTag) -> Error {
    match tag {
        TypeTag::Id(id) => Error::UnregisteredType {
            namespace: String::new(),
            name: format!("#{id}"),
        },
        TypeTag::Named { namespace, name } => Error::UnregisteredType {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Global default registry
// ─────────────────────────────────────────────────────────────────────────────

static DEFAULT_REGISTRY: OnceLock<Arc<TypeRegistry>> = OnceLock::new();

/// Installs the process-wide default registry. Write-once: a second call
/// fails with `AlreadyRegistered`.
pub fn install_default_registry(registry: TypeRegistry) -> Result<()> {
    DEFAULT_REGISTRY
        .set(Arc::new(registry))
        .map_err(|_| Error::AlreadyRegistered {
            what: "process-wide default registry".into(),
        })
}

/// The installed process-wide default registry, if any.
pub fn default_registry() -> Option<Arc<TypeRegistry>> {
    DEFAULT_REGISTRY.get().cloned()
}

// ─────────────────────────────────────────────────────────────────────────────
// TypeResolver
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of reading one type header.
#[derive(Debug, Clone)]
pub enum ResolvedType {
    /// A registered type.
    Info(Arc<TypeInfo>),
    /// A structural type synthesized from a composite name on the wire.
    Spec(TypeSpec),
}

impl ResolvedType {
    /// Whether values of the resolved type participate in tracking.
    pub fn is_trackable(&self) -> bool {
        match self {
            ResolvedType::Info(info) => info.is_trackable(),
            ResolvedType::Spec(spec) => spec.is_trackable(),
        }
    }
}

/// Per-codec view onto a shared registry, plus the read-side composite
/// hash cache. The cache outlives sessions — named lookups get cheaper as
/// an instance keeps deserializing.
#[derive(Debug)]
pub struct TypeResolver {
    registry: Arc<TypeRegistry>,
    named_cache: HashMap<(u64, u64), ResolvedType>,
}

impl TypeResolver {
    /// Creates a resolver over a shared registry.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        TypeResolver {
            registry,
            named_cache: HashMap::new(),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Emits the type header: `varuint32(|type_id|)`, plus namespace and
    /// name fragments for the named family.
    pub fn write_type_info(
        &self,
        buf: &mut ByteBuffer,
        meta: &mut MetaStringWriter,
        info: &TypeInfo,
    ) -> Result<()> {
        match &info.named {
            Some(named) => {
                buf.write_varuint32(info.wire_id as u32)?;
                meta.write(buf, &named.namespace)?;
                meta.write(buf, &named.name)
            }
            None => buf.write_varuint32(info.type_id.unsigned_abs()),
        }
    }

    /// Reads one type header and resolves it against the registry.
    ///
    /// Named headers resolve through the (namespace-hash, name-hash)
    /// composite cache first, then by decoded name with cache backfill,
    /// then by parsing the name as a composite-type string. A peer that
    /// wrote `uint32(type_id)` for a negative pointer-variant id is
    /// normalized here.
    pub fn read_type_info(
        &mut self,
        buf: &mut ByteBuffer,
        meta: &mut MetaStringReader,
    ) -> Result<ResolvedType> {
        let raw = buf.read_varuint32()?;
        if !is_named_wire_id(raw) {
            return self
                .registry
                .get_by_id(raw as i32)
                .map(ResolvedType::Info)
                .ok_or_else(|| Error::UnregisteredType {
                    namespace: String::new(),
                    name: format!("#{raw}"),
                });
        }

        let expected_kind = named_kind_of(raw);
        let (ns_msb, ns_str) = meta.read(buf, &NAMESPACE_ENCODER)?;
        let (name_msb, name_str) = meta.read(buf, &TYPE_NAME_ENCODER)?;
        let key = (ns_msb.hashcode, name_msb.hashcode);
        if let Some(hit) = self.named_cache.get(&key) {
            return Ok(hit.clone());
        }

        let resolved = if let Some(info) = self.registry.get_by_name(&ns_str, &name_str) {
            if info.kind != expected_kind {
                return Err(Error::TypeMismatch {
                    expected: format!("{expected_kind:?} type"),
                    found: format!("{:?} registration for {}", info.kind, info.describe()),
                });
            }
            ResolvedType::Info(info)
        } else if let Some(spec) = TypeSpec::parse(&name_str) {
            ResolvedType::Spec(spec)
        } else {
            return Err(Error::UnregisteredType {
                namespace: ns_str.to_string(),
                name: name_str.to_string(),
            });
        };
        trace!("backfilling named-type cache for {ns_str:?}.{name_str:?}");
        self.named_cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Resolves the dynamic type of a value on the write side.
    pub fn resolve_value_type(&self, value: &Value) -> Result<Arc<TypeInfo>> {
        let tid = match value {
            Value::Null => {
                return Err(Error::TypeMismatch {
                    expected: "non-null value".into(),
                    found: "null".into(),
                })
            }
            Value::Enum { tag, .. } => return self.lookup_tag(tag),
            Value::Struct(s) => {
                let tag = s.borrow().tag.clone();
                return self.lookup_tag(&tag);
            }
            Value::Ext(e) => return self.lookup_tag(&e.tag),
            Value::Bool(_) => TypeId::Bool,
            Value::Int8(_) => TypeId::Int8,
            Value::Int16(_) => TypeId::Int16,
            Value::Int32(_) => TypeId::Int32,
            Value::Int64(_) => TypeId::Int64,
            Value::Float32(_) => TypeId::Float32,
            Value::Float64(_) => TypeId::Float64,
            Value::String(_) => TypeId::String,
            Value::Binary(_) => TypeId::Binary,
            Value::Date(_) => TypeId::LocalDate,
            Value::Timestamp(_) => TypeId::Timestamp,
            Value::Duration(_) => TypeId::Duration,
            Value::List(_) => TypeId::List,
            Value::Set(_) => TypeId::Set,
            Value::Map(_) => TypeId::Map,
            Value::BoolArray(_) => TypeId::BoolArray,
            Value::Int8Array(_) => TypeId::Int8Array,
            Value::Int16Array(_) => TypeId::Int16Array,
            Value::Int32Array(_) => TypeId::Int32Array,
            Value::Int64Array(_) => TypeId::Int64Array,
            Value::Float16Array(_) => TypeId::Float16Array,
            Value::Float32Array(_) => TypeId::Float32Array,
            Value::Float64Array(_) => TypeId::Float64Array,
        };
        self.builtin(tid)
    }

    /// The registry record of a built-in wire type.
    pub fn builtin(&self, tid: TypeId) -> Result<Arc<TypeInfo>> {
        self.registry
            .get_by_id(tid as i32)
            .ok_or_else(|| Error::UnregisteredType {
                namespace: String::new(),
                name: tid.name().to_string(),
            })
    }

    /// The registry record referenced by a value tag.
    pub fn lookup_tag(&self, tag: &TypeTag) -> Result<Arc<TypeInfo>> {
        self.registry.lookup_tag(tag).ok_or_else(|| unregistered(tag))
    }
}

fn named_kind_of(raw: u32) -> TypeKind {
    if raw == TypeId::NamedEnum as u32 {
        TypeKind::Enum
    } else if raw == TypeId::NamedExt as u32 {
        TypeKind::Ext
    } else {
        // NamedStruct, NamedCompatibleStruct, the internal tag sentinel,
        // and the auto-assigned range are all struct-family headers.
        TypeKind::Struct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TypeResolver {
        TypeResolver::new(Arc::new(TypeRegistry::with_builtins()))
    }

    #[test]
    fn builtins_resolve_by_id() {
        let r = resolver();
        for tid in BUILTIN_TYPES {
            let info = r.registry().get_by_id(tid as i32).unwrap();
            assert_eq!(info.wire_id, tid);
            assert_eq!(info.kind, TypeKind::Internal);
        }
    }

    #[test]
    fn explicit_id_registration_validates_range() {
        let mut reg = TypeRegistry::with_builtins();
        assert!(matches!(
            reg.register_struct(4, StructSchema::default()),
            Err(Error::InvalidTypeId { id: 4 })
        ));
        assert!(matches!(
            reg.register_enum(256),
            Err(Error::InvalidTypeId { id: 256 })
        ));
        reg.register_struct(100, StructSchema::default()).unwrap();
        assert!(matches!(
            reg.register_enum(100),
            Err(Error::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn named_registration_assigns_auto_ids() {
        let mut reg = TypeRegistry::with_builtins();
        reg.register_struct_by_name("example", "A", StructSchema::default())
            .unwrap();
        reg.register_struct_named("B", StructSchema::default()).unwrap();
        let a = reg.get_by_name("example", "A").unwrap();
        let b = reg.get_by_name("", "B").unwrap();
        assert_eq!(a.type_id, AUTO_TYPE_ID_BASE as i32);
        assert_eq!(b.type_id, AUTO_TYPE_ID_BASE as i32 + 1);
        assert_eq!(a.wire_id, TypeId::NamedStruct);
        assert_ne!(a.hash, 0);
        assert!(matches!(
            reg.register_enum_by_name("example", "A"),
            Err(Error::AlreadyRegistered { .. })
        ));
        assert!(matches!(
            reg.register_struct_named("", StructSchema::default()),
            Err(Error::InvalidTypeName { .. })
        ));
    }

    #[test]
    fn pointer_variant_normalizes_sign() {
        let reg = TypeRegistry::with_builtins();
        let pos = reg.get_by_id(TypeId::String as i32).unwrap();
        let neg = reg.get_by_id(-(TypeId::String as i32)).unwrap();
        assert!(Arc::ptr_eq(&pos, &neg));
    }

    #[test]
    fn plain_header_roundtrip() {
        let r = resolver();
        let mut buf = ByteBuffer::new();
        let mut mw = MetaStringWriter::new();
        let info = r.builtin(TypeId::Int64).unwrap();
        r.write_type_info(&mut buf, &mut mw, &info).unwrap();
        assert_eq!(buf.as_slice(), &[TypeId::Int64 as u8]);

        let mut r2 = resolver();
        let mut mr = MetaStringReader::new();
        match r2.read_type_info(&mut buf, &mut mr).unwrap() {
            ResolvedType::Info(read) => assert_eq!(read.wire_id, TypeId::Int64),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn named_header_roundtrip_with_backref() {
        let mut reg = TypeRegistry::with_builtins();
        reg.register_struct_by_name("example", "A", StructSchema::default())
            .unwrap();
        let reg = Arc::new(reg);
        let writer_res = TypeResolver::new(reg.clone());
        let info = writer_res
            .lookup_tag(&TypeTag::named("example", "A"))
            .unwrap();

        let mut buf = ByteBuffer::new();
        let mut mw = MetaStringWriter::new();
        writer_res.write_type_info(&mut buf, &mut mw, &info).unwrap();
        let first = buf.writer_index();
        writer_res.write_type_info(&mut buf, &mut mw, &info).unwrap();
        // Second header: the varuint id plus two 1-byte fragment back-refs.
        assert_eq!(buf.writer_index() - first, 1 + 1 + 1);

        let mut reader_res = TypeResolver::new(reg);
        let mut mr = MetaStringReader::new();
        for _ in 0..2 {
            match reader_res.read_type_info(&mut buf, &mut mr).unwrap() {
                ResolvedType::Info(read) => {
                    assert_eq!(read.wire_id, TypeId::NamedStruct);
                    assert_eq!(read.tag(), TypeTag::named("example", "A"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn unknown_named_type_carries_decoded_name() {
        let mut reg = TypeRegistry::with_builtins();
        reg.register_struct_by_name("example", "Gone", StructSchema::default())
            .unwrap();
        let writer_res = TypeResolver::new(Arc::new(reg));
        let info = writer_res
            .lookup_tag(&TypeTag::named("example", "Gone"))
            .unwrap();
        let mut buf = ByteBuffer::new();
        let mut mw = MetaStringWriter::new();
        writer_res.write_type_info(&mut buf, &mut mw, &info).unwrap();

        // The reading side never registered the type.
        let mut reader_res = resolver();
        let mut mr = MetaStringReader::new();
        match reader_res.read_type_info(&mut buf, &mut mr) {
            Err(Error::UnregisteredType { namespace, name }) => {
                assert_eq!(namespace, "example");
                assert_eq!(name, "Gone");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn structural_name_synthesizes_a_spec() {
        // A peer may describe a dynamic slot structurally; an unregistered
        // composite name parses into a TypeSpec.
        let mut buf = ByteBuffer::new();
        let mut mw = MetaStringWriter::new();
        buf.write_varuint32(TypeId::NamedStruct as u32).unwrap();
        mw.write(&mut buf, &Arc::new(NAMESPACE_ENCODER.encode(""))).unwrap();
        mw.write(&mut buf, &Arc::new(TYPE_NAME_ENCODER.encode("map[string]int32")))
            .unwrap();

        let mut r = resolver();
        let mut mr = MetaStringReader::new();
        match r.read_type_info(&mut buf, &mut mr).unwrap() {
            ResolvedType::Spec(spec) => {
                assert_eq!(
                    spec,
                    TypeSpec::Map(Box::new(TypeSpec::String), Box::new(TypeSpec::Int32))
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn auto_id_range_header_is_treated_as_named() {
        // A peer port may put its auto-assigned id on the wire instead of
        // the canonical named id; fragments still follow.
        let mut reg = TypeRegistry::with_builtins();
        reg.register_struct_by_name("example", "A", StructSchema::default())
            .unwrap();
        let reg = Arc::new(reg);

        let mut buf = ByteBuffer::new();
        let mut mw = MetaStringWriter::new();
        buf.write_varuint32(AUTO_TYPE_ID_BASE + 5).unwrap();
        mw.write(&mut buf, &Arc::new(NAMESPACE_ENCODER.encode("example"))).unwrap();
        mw.write(&mut buf, &Arc::new(TYPE_NAME_ENCODER.encode("A"))).unwrap();

        let mut r = TypeResolver::new(reg);
        let mut mr = MetaStringReader::new();
        match r.read_type_info(&mut buf, &mut mr).unwrap() {
            ResolvedType::Info(info) => assert_eq!(info.tag(), TypeTag::named("example", "A")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn family_conflict_is_a_type_mismatch() {
        let mut reg = TypeRegistry::with_builtins();
        reg.register_enum_by_name("example", "Color").unwrap();
        let reg = Arc::new(reg);
        let writer_res = TypeResolver::new(reg.clone());
        let info = writer_res
            .lookup_tag(&TypeTag::named("example", "Color"))
            .unwrap();

        // Forge a struct-family header over an enum registration.
        let mut buf = ByteBuffer::new();
        let mut mw = MetaStringWriter::new();
        buf.write_varuint32(TypeId::NamedStruct as u32).unwrap();
        let named = info.named.as_ref().unwrap();
        mw.write(&mut buf, &named.namespace).unwrap();
        mw.write(&mut buf, &named.name).unwrap();

        let mut r = TypeResolver::new(reg);
        let mut mr = MetaStringReader::new();
        assert!(matches!(
            r.read_type_info(&mut buf, &mut mr),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
