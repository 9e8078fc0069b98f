//! Graph and type resolution — reference tracking and the type registry.

pub mod reference;
pub mod type_resolver;
pub mod typespec;

pub use reference::{RefFlag, RefReader, RefWriter};
pub use type_resolver::{
    default_registry, install_default_registry, FieldDef, ResolvedType, StructSchema, TypeInfo,
    TypeKind, TypeRegistry, TypeResolver,
};
pub use typespec::TypeSpec;
