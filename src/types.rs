//! Wire-type vocabulary, session flags, and shared wire constants.
//!
//! The type-id table below is the binary contract shared with peer
//! implementations in other languages; the numeric values are frozen.
//! Ids at or above [`INTERNAL_ID_FLOOR`] are implementation-internal
//! sentinels, and ids at or above [`AUTO_TYPE_ID_BASE`] are runtime
//! registry handles for name-registered types.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Two-byte stream magic, written little-endian as `D4 62`.
pub const MAGIC_NUMBER: u16 = 0x62D4;

/// Session-level option bits carried in the flag byte after the magic.
pub mod session_flags {
    /// The stream uses the cross-language wire format.
    pub const XLANG: u8 = 1 << 0;
    /// Reference tracking was enabled on the write side.
    pub const REF_TRACKING: u8 = 1 << 1;
    /// Binary payloads may be extracted to an out-of-band side channel.
    pub const OUT_OF_BAND: u8 = 1 << 2;
    /// Every bit this port understands; anything else is a version error.
    pub const KNOWN_MASK: u8 = XLANG | REF_TRACKING | OUT_OF_BAND;
}

/// Per-chunk flag bits of the chunked map encoding (byte 1 of the header).
pub mod chunk_flags {
    /// Every key in the chunk is null.
    pub const KEY_HAS_NULL: u8 = 1 << 0;
    /// Every value in the chunk is null.
    pub const VALUE_HAS_NULL: u8 = 1 << 1;
    /// The slot's static type did not determine the key type.
    pub const KEY_NOT_DECL_TYPE: u8 = 1 << 2;
    /// The slot's static type did not determine the value type.
    pub const VALUE_NOT_DECL_TYPE: u8 = 1 << 3;
    /// Keys carry per-entry reference flags.
    pub const TRACKING_KEY_REF: u8 = 1 << 4;
    /// Values carry per-entry reference flags.
    pub const TRACKING_VALUE_REF: u8 = 1 << 5;
    /// One key type header precedes the chunk's entries.
    pub const KEY_DECL_TYPE: u8 = 1 << 6;
    /// One value type header precedes the chunk's entries.
    pub const VALUE_DECL_TYPE: u8 = 1 << 7;
}

/// Largest chunk the map encoding can describe (the size byte).
pub const MAX_MAP_CHUNK_SIZE: usize = 255;

/// Internal named-type sentinel. Kept for registry bookkeeping only; the
/// canonical named family (`NamedStruct` and friends) is what goes on the
/// wire.
pub const TYPE_TAG: u32 = 256;

/// First id of the implementation-internal sentinel range.
pub const INTERNAL_ID_FLOOR: u32 = 256;

/// First id of the runtime auto-assigned range for name-registered types.
/// Auto ids are registry handles; peers resolve such types by
/// (namespace, name), never by the id.
pub const AUTO_TYPE_ID_BASE: u32 = 300;

/// Logical wire types with their frozen ids.
///
/// A negative id on the wire denotes the pointer/boxed variant of the same
/// structural type; this port has uniform reference semantics and
/// normalizes the sign on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TypeId {
    Bool = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    VarInt32 = 5,
    Int64 = 6,
    VarInt64 = 7,
    SliInt64 = 8,
    Float32 = 10,
    Float64 = 11,
    String = 12,
    Enum = 13,
    NamedEnum = 14,
    Struct = 15,
    NamedStruct = 16,
    CompatibleStruct = 17,
    NamedCompatibleStruct = 18,
    Ext = 19,
    NamedExt = 20,
    List = 21,
    Set = 22,
    Map = 23,
    Duration = 24,
    Timestamp = 25,
    LocalDate = 26,
    Binary = 28,
    BoolArray = 30,
    Int8Array = 31,
    Int16Array = 32,
    Int32Array = 33,
    Int64Array = 34,
    Float32Array = 35,
    Float64Array = 36,
    Float16Array = 37,
}

impl TypeId {
    /// True for the named family: on-wire identity is (namespace, name).
    #[inline]
    pub const fn is_named(self) -> bool {
        matches!(
            self,
            TypeId::NamedEnum | TypeId::NamedStruct | TypeId::NamedCompatibleStruct | TypeId::NamedExt
        )
    }

    /// True for fixed- and variable-width scalar types.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        matches!(
            self,
            TypeId::Bool
                | TypeId::Int8
                | TypeId::Int16
                | TypeId::Int32
                | TypeId::VarInt32
                | TypeId::Int64
                | TypeId::VarInt64
                | TypeId::SliInt64
                | TypeId::Float32
                | TypeId::Float64
        )
    }

    /// True for packed primitive arrays (no per-element flags on the wire).
    #[inline]
    pub const fn is_primitive_array(self) -> bool {
        matches!(
            self,
            TypeId::BoolArray
                | TypeId::Int8Array
                | TypeId::Int16Array
                | TypeId::Int32Array
                | TypeId::Int64Array
                | TypeId::Float32Array
                | TypeId::Float64Array
                | TypeId::Float16Array
        )
    }

    /// True when values of this type participate in reference tracking.
    ///
    /// Both peers derive trackability from the type alone, which keeps the
    /// implicit reference-id sequences of writer and reader in lockstep.
    #[inline]
    pub const fn is_trackable(self) -> bool {
        matches!(
            self,
            TypeId::String
                | TypeId::Binary
                | TypeId::List
                | TypeId::Set
                | TypeId::Map
                | TypeId::Struct
                | TypeId::NamedStruct
                | TypeId::CompatibleStruct
                | TypeId::NamedCompatibleStruct
                | TypeId::Ext
                | TypeId::NamedExt
        ) || self.is_primitive_array()
    }

    /// Human-readable name for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            TypeId::Bool => "BOOL",
            TypeId::Int8 => "INT8",
            TypeId::Int16 => "INT16",
            TypeId::Int32 => "INT32",
            TypeId::VarInt32 => "VAR_INT32",
            TypeId::Int64 => "INT64",
            TypeId::VarInt64 => "VAR_INT64",
            TypeId::SliInt64 => "SLI_INT64",
            TypeId::Float32 => "FLOAT32",
            TypeId::Float64 => "FLOAT64",
            TypeId::String => "STRING",
            TypeId::Enum => "ENUM",
            TypeId::NamedEnum => "NAMED_ENUM",
            TypeId::Struct => "STRUCT",
            TypeId::NamedStruct => "NAMED_STRUCT",
            TypeId::CompatibleStruct => "COMPATIBLE_STRUCT",
            TypeId::NamedCompatibleStruct => "NAMED_COMPATIBLE_STRUCT",
            TypeId::Ext => "EXT",
            TypeId::NamedExt => "NAMED_EXT",
            TypeId::List => "LIST",
            TypeId::Set => "SET",
            TypeId::Map => "MAP",
            TypeId::Duration => "DURATION",
            TypeId::Timestamp => "TIMESTAMP",
            TypeId::LocalDate => "LOCAL_DATE",
            TypeId::Binary => "BINARY",
            TypeId::BoolArray => "BOOL_ARRAY",
            TypeId::Int8Array => "INT8_ARRAY",
            TypeId::Int16Array => "INT16_ARRAY",
            TypeId::Int32Array => "INT32_ARRAY",
            TypeId::Int64Array => "INT64_ARRAY",
            TypeId::Float32Array => "FLOAT32_ARRAY",
            TypeId::Float64Array => "FLOAT64_ARRAY",
            TypeId::Float16Array => "FLOAT16_ARRAY",
        }
    }
}

/// True when a raw wire id announces (namespace, name) fragments after it:
/// the canonical named family, the internal tag sentinel, and the
/// auto-assigned range a peer port may emit.
#[inline]
pub const fn is_named_wire_id(id: u32) -> bool {
    id == TypeId::NamedEnum as u32
        || id == TypeId::NamedStruct as u32
        || id == TypeId::NamedCompatibleStruct as u32
        || id == TypeId::NamedExt as u32
        || id == TYPE_TAG
        || id >= AUTO_TYPE_ID_BASE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_id_values() {
        assert_eq!(TypeId::Bool as u8, 1);
        assert_eq!(TypeId::VarInt32 as u8, 5);
        assert_eq!(TypeId::SliInt64 as u8, 8);
        assert_eq!(TypeId::Float32 as u8, 10);
        assert_eq!(TypeId::String as u8, 12);
        assert_eq!(TypeId::NamedStruct as u8, 16);
        assert_eq!(TypeId::NamedExt as u8, 20);
        assert_eq!(TypeId::List as u8, 21);
        assert_eq!(TypeId::Map as u8, 23);
        assert_eq!(TypeId::Timestamp as u8, 25);
        assert_eq!(TypeId::Binary as u8, 28);
        assert_eq!(TypeId::BoolArray as u8, 30);
        assert_eq!(TypeId::Float16Array as u8, 37);
    }

    #[test]
    fn named_classification() {
        assert!(TypeId::NamedStruct.is_named());
        assert!(TypeId::NamedEnum.is_named());
        assert!(!TypeId::Struct.is_named());
        assert!(is_named_wire_id(TypeId::NamedExt as u32));
        assert!(is_named_wire_id(TYPE_TAG));
        assert!(is_named_wire_id(AUTO_TYPE_ID_BASE));
        assert!(is_named_wire_id(AUTO_TYPE_ID_BASE + 17));
        assert!(!is_named_wire_id(TypeId::Struct as u32));
        assert!(!is_named_wire_id(TypeId::String as u32));
    }

    #[test]
    fn trackability_partition() {
        assert!(TypeId::String.is_trackable());
        assert!(TypeId::Map.is_trackable());
        assert!(TypeId::Int32Array.is_trackable());
        assert!(!TypeId::Bool.is_trackable());
        assert!(!TypeId::Int64.is_trackable());
        assert!(!TypeId::Timestamp.is_trackable());
        assert!(!TypeId::Enum.is_trackable());
    }

    #[test]
    fn primitive_partition() {
        assert!(TypeId::Bool.is_primitive());
        assert!(TypeId::SliInt64.is_primitive());
        assert!(!TypeId::String.is_primitive());
        assert!(TypeId::Float16Array.is_primitive_array());
        assert!(!TypeId::Binary.is_primitive_array());
    }

    #[test]
    fn flag_bits_are_disjoint() {
        use chunk_flags::*;
        let all = [
            KEY_HAS_NULL,
            VALUE_HAS_NULL,
            KEY_NOT_DECL_TYPE,
            VALUE_NOT_DECL_TYPE,
            TRACKING_KEY_REF,
            TRACKING_VALUE_REF,
            KEY_DECL_TYPE,
            VALUE_DECL_TYPE,
        ];
        let mut seen = 0u8;
        for bit in all {
            assert_eq!(seen & bit, 0);
            seen |= bit;
        }
        assert_eq!(seen, 0xFF);
    }
}
