// Byte-level assertions against the normative stream layout: magic,
// session flags, reference flags, type headers, metastring interning, and
// the chunked map encoding.

use std::sync::Arc;

use xcodec::types::{chunk_flags, session_flags};
use xcodec::{ByteBuffer, Codec, FieldDef, StructSchema, TypeRegistry, TypeSpec, TypeTag, Value};

fn serialize(value: &Value) -> Vec<u8> {
    let mut codec = Codec::new();
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, value).unwrap();
    buf.into_vec()
}

/// `serialize(true)` opens with magic `D4 62`, the session flags, then
/// `NON_REF(03) BOOL(01) 01`.
#[test]
fn bool_stream_layout() {
    let bytes = serialize(&Value::Bool(true));
    assert_eq!(bytes, vec![0xD4, 0x62, 0x03, 0x03, 0x01, 0x01]);
}

#[test]
fn session_flag_bits() {
    let bytes = serialize(&Value::Bool(false));
    let flags = bytes[2];
    assert_eq!(flags & session_flags::XLANG, session_flags::XLANG);
    assert_eq!(flags & session_flags::REF_TRACKING, session_flags::REF_TRACKING);
    assert_eq!(flags & session_flags::OUT_OF_BAND, 0);

    let mut untracked = Codec::builder().ref_tracking(false).build();
    let mut buf = ByteBuffer::new();
    untracked.serialize(&mut buf, &Value::Bool(false)).unwrap();
    let bytes = buf.into_vec();
    assert_eq!(bytes[2] & session_flags::REF_TRACKING, 0);
    // Untracked non-null slots carry NON_REF_NULL.
    assert_eq!(bytes[3], 0x02);
}

/// `-1i64` takes the INT64 tag and an 8-byte two's-complement payload.
#[test]
fn int64_wire_form() {
    let bytes = serialize(&Value::Int64(-1));
    assert_eq!(&bytes[..5], &[0xD4, 0x62, 0x03, 0x03, 0x06]);
    assert_eq!(&bytes[5..], &[0xFF; 8]);
}

#[test]
fn null_root_is_one_flag_byte() {
    let bytes = serialize(&Value::Null);
    assert_eq!(bytes, vec![0xD4, 0x62, 0x03, 0x00]);
}

/// Duplicate strings cost one literal plus a back-reference, so the whole
/// stream undercuts twice the duplicated payload.
#[test]
fn string_deduplication_shrinks_stream() {
    let v = Value::list(vec![
        Value::string("str1"),
        Value::string("str1"),
        Value::string(""),
        Value::string(""),
        Value::string("str2"),
    ]);
    let bytes = serialize(&v);
    // Every literal appears exactly once.
    let payload = b"str1";
    let occurrences = bytes.windows(payload.len()).filter(|w| w == payload).count();
    assert_eq!(occurrences, 1);
    // A back-reference to a small id is flag + id: two bytes.
    // list(5 slots): the two repeats cost 2 bytes each instead of 7.
    assert!(bytes.len() < 2 * (6 + 6 + 2 + 2 + 6));
}

/// Two headers for the same named type: one literal fragment pair, then
/// 1-byte back-references.
#[test]
fn metastring_interning_across_headers() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "example",
        "Pair",
        StructSchema::new(vec![FieldDef::new("n", TypeSpec::VarInt32)]),
    )
    .unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));

    let pair = |n: i32| Value::structure(TypeTag::named("example", "Pair"), vec![Value::Int32(n)]);
    let one = {
        let mut buf = ByteBuffer::new();
        codec.serialize(&mut buf, &Value::list(vec![pair(1)])).unwrap();
        buf.writer_index()
    };
    let two = {
        let mut buf = ByteBuffer::new();
        codec
            .serialize(&mut buf, &Value::list(vec![pair(1), pair(2)]))
            .unwrap();
        buf.writer_index()
    };
    // Second element: ref flag + type id + two fragment back-refs + varint
    // field = 5 bytes, far below a second literal pair.
    assert_eq!(two - one, 5);
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunked maps
// ─────────────────────────────────────────────────────────────────────────────

/// A homogeneous string→int32 map is one chunk plus the zero terminator.
#[test]
fn homogeneous_map_is_single_chunk() {
    let v = Value::map(vec![
        (Value::string("k1"), Value::Int32(1)),
        (Value::string("k2"), Value::Int32(-1)),
        (Value::string(""), Value::Int32(3)),
    ]);
    let bytes = serialize(&v);
    // magic(2) flags(1) ref(1) MAP header(1 byte: 23).
    assert_eq!(bytes[4], 23);
    // Chunk header: three entries, dynamic+declared-per-chunk on both
    // sides, tracked keys (strings), untracked values (int32).
    assert_eq!(bytes[5], 3);
    let flags = bytes[6];
    assert_ne!(flags & chunk_flags::KEY_DECL_TYPE, 0);
    assert_ne!(flags & chunk_flags::KEY_NOT_DECL_TYPE, 0);
    assert_ne!(flags & chunk_flags::VALUE_DECL_TYPE, 0);
    assert_ne!(flags & chunk_flags::TRACKING_KEY_REF, 0);
    assert_eq!(flags & chunk_flags::TRACKING_VALUE_REF, 0);
    assert_eq!(flags & (chunk_flags::KEY_HAS_NULL | chunk_flags::VALUE_HAS_NULL), 0);
    // Chunk-level type headers: STRING then INT32.
    assert_eq!(bytes[7], 12);
    assert_eq!(bytes[8], 4);
    // The terminator chunk closes the stream.
    assert_eq!(*bytes.last().unwrap(), 0);
}

/// A map mixing value types produces at least two chunks before the
/// terminator and still decodes with per-entry types intact.
#[test]
fn mixed_map_breaks_chunks() {
    let v = Value::map(vec![
        (Value::string("a"), Value::Int32(1)),
        (Value::string("b"), Value::string("two")),
    ]);
    let bytes = serialize(&v);
    let homogeneous = serialize(&Value::map(vec![
        (Value::string("a"), Value::Int32(1)),
        (Value::string("b"), Value::Int32(2)),
    ]));
    // The chunk break costs a second header + value type header.
    assert!(bytes.len() > homogeneous.len());

    let mut codec = Codec::new();
    let mut buf = ByteBuffer::from_vec(bytes);
    let back = codec.deserialize(&mut buf).unwrap();
    assert_eq!(back, v);

    // Two single-entry chunks on the wire.
    let mut buf = ByteBuffer::from_vec(buf.into_vec());
    let _ = buf.read_bytes(5).unwrap(); // magic, flags, ref flag, MAP id
    assert_eq!(buf.read_u8().unwrap(), 1, "first chunk holds one entry");
}

/// Declared-type maps inside a registered struct skip chunk type headers.
#[test]
fn declared_map_omits_chunk_type_headers() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "example",
        "Scores",
        StructSchema::new(vec![FieldDef::new(
            "scores",
            TypeSpec::Map(Box::new(TypeSpec::String), Box::new(TypeSpec::Int32)),
        )]),
    )
    .unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));
    let v = Value::structure(
        TypeTag::named("example", "Scores"),
        vec![Value::map(vec![
            (Value::string("a"), Value::Int32(1)),
            (Value::string("b"), Value::Int32(2)),
        ])],
    );
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &v).unwrap();
    let bytes = buf.as_slice().to_vec();

    // Find the chunk header: it follows the struct field's map ref flag.
    // Walk: magic(2) flags(1) ref(1) named header(1 id + ns frag + name
    // frag) field ref flag(1) then size byte 2.
    let pos = bytes.iter().position(|&b| b == 2).unwrap();
    let flags = bytes[pos + 1];
    assert_eq!(flags & chunk_flags::KEY_DECL_TYPE, 0);
    assert_eq!(flags & chunk_flags::VALUE_DECL_TYPE, 0);
    assert_ne!(flags & chunk_flags::TRACKING_KEY_REF, 0);

    let back = codec.deserialize(&mut buf).unwrap();
    assert_eq!(back, v);
}

/// Varuint byte counts at the stream level, via length-prefixed binary.
#[test]
fn varuint_length_prefixes() {
    for (len, prefix_bytes) in [(0usize, 1usize), (127, 1), (128, 2), (16_384, 3)] {
        let bytes = serialize(&Value::binary(vec![0xAB; len]));
        // magic(2) flags(1) ref(1) BINARY header(1) prefix payload.
        assert_eq!(bytes.len(), 5 + prefix_bytes + len, "len {len}");
    }
}

#[test]
fn sli_int64_forms() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "example",
        "Holder",
        StructSchema::new(vec![FieldDef::new("v", TypeSpec::SliInt64)]),
    )
    .unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));
    let sizes: Vec<usize> = [0i64, 1 << 20, (1 << 30) - 1, 1 << 30, i64::MIN]
        .into_iter()
        .map(|v| {
            let val = Value::structure(TypeTag::named("example", "Holder"), vec![Value::Int64(v)]);
            let mut buf = ByteBuffer::new();
            codec.serialize(&mut buf, &val).unwrap();
            let total = buf.writer_index();
            assert_eq!(codec.deserialize(&mut buf).unwrap(), val);
            total
        })
        .collect();
    // Small form is 4 bytes, large form 9; the header cost is constant.
    assert_eq!(sizes[0], sizes[1]);
    assert_eq!(sizes[1], sizes[2]);
    assert_eq!(sizes[3], sizes[0] + 5);
    assert_eq!(sizes[4], sizes[3]);
}
