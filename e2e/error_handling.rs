// Failure semantics: one typed error per failed call, session state reset
// on every exit path, instance immediately reusable.

use std::sync::Arc;

use xcodec::types::session_flags;
use xcodec::{
    ByteBuffer, Codec, Error, FieldDef, StructSchema, TypeRegistry, TypeSpec, TypeTag, Value,
};

fn serialized(value: &Value) -> Vec<u8> {
    let mut codec = Codec::new();
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, value).unwrap();
    buf.into_vec()
}

#[test]
fn bad_magic() {
    let mut codec = Codec::new();
    for stream in [&[][..], &[0xD4][..], &[0x62, 0xD4, 0x03][..], &[0x00, 0x00, 0x03][..]] {
        let mut buf = ByteBuffer::from_bytes(stream);
        assert!(
            matches!(codec.deserialize(&mut buf), Err(Error::BadMagic)),
            "stream {stream:02x?}"
        );
    }
}

#[test]
fn reserved_flag_bits_are_a_version_error() {
    let mut codec = Codec::new();
    let mut bytes = serialized(&Value::Bool(true));
    bytes[2] |= 0x40;
    let mut buf = ByteBuffer::from_vec(bytes);
    match codec.deserialize(&mut buf) {
        Err(Error::UnsupportedVersion { bits: 0x40 }) => {}
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn non_xlang_stream_is_rejected() {
    let mut codec = Codec::new();
    let mut bytes = serialized(&Value::Bool(true));
    bytes[2] &= !session_flags::XLANG;
    let mut buf = ByteBuffer::from_vec(bytes);
    assert!(matches!(
        codec.deserialize(&mut buf),
        Err(Error::UnsupportedVersion { .. })
    ));
}

#[test]
fn truncation_at_every_byte() {
    let bytes = serialized(&Value::list(vec![
        Value::string("payload"),
        Value::Int64(12),
        Value::map(vec![(Value::string("k"), Value::Int32(1))]),
    ]));
    let mut codec = Codec::new();
    // Any strict prefix fails; none of them panic or loop.
    for cut in 0..bytes.len() {
        let mut buf = ByteBuffer::from_bytes(&bytes[..cut]);
        assert!(codec.deserialize(&mut buf).is_err(), "prefix of {cut} bytes");
    }
    // The whole stream still decodes after all those failures.
    let mut buf = ByteBuffer::from_vec(bytes);
    assert!(codec.deserialize(&mut buf).is_ok());
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = serialized(&Value::Bool(true));
    bytes.extend_from_slice(&[0xAA, 0xBB]);
    let mut codec = Codec::new();
    let mut buf = ByteBuffer::from_vec(bytes);
    match codec.deserialize(&mut buf) {
        Err(Error::TrailingBytes { remaining: 2 }) => {}
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unregistered_type_on_write_and_read() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name("example", "Known", StructSchema::default()).unwrap();
    let mut writer = Codec::with_registry(Arc::new(reg));

    // Write side: a tag the registry has never seen.
    let mut buf = ByteBuffer::new();
    let unknown = Value::structure(TypeTag::named("example", "Unknown"), vec![]);
    match writer.serialize(&mut buf, &unknown) {
        Err(Error::UnregisteredType { namespace, name }) => {
            assert_eq!(namespace, "example");
            assert_eq!(name, "Unknown");
        }
        other => panic!("unexpected {other:?}"),
    }

    // Read side: the peer registered the type, we did not.
    let mut buf = ByteBuffer::new();
    let known = Value::structure(TypeTag::named("example", "Known"), vec![]);
    writer.serialize(&mut buf, &known).unwrap();
    let mut reader = Codec::new();
    match reader.deserialize(&mut buf) {
        Err(Error::UnregisteredType { namespace, name }) => {
            assert_eq!(namespace, "example");
            assert_eq!(name, "Known");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn schema_arity_mismatch() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "example",
        "Pair",
        StructSchema::new(vec![
            FieldDef::new("a", TypeSpec::Int32),
            FieldDef::new("b", TypeSpec::Int32),
        ]),
    )
    .unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));
    let wrong = Value::structure(TypeTag::named("example", "Pair"), vec![Value::Int32(1)]);
    let mut buf = ByteBuffer::new();
    assert!(matches!(
        codec.serialize(&mut buf, &wrong),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn field_type_mismatch() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "example",
        "Holder",
        StructSchema::new(vec![FieldDef::new("v", TypeSpec::Int32)]),
    )
    .unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));
    let wrong = Value::structure(TypeTag::named("example", "Holder"), vec![Value::string("x")]);
    let mut buf = ByteBuffer::new();
    assert!(matches!(
        codec.serialize(&mut buf, &wrong),
        Err(Error::TypeMismatch { .. })
    ));
    // Null is not a valid primitive field either.
    let null_field = Value::structure(TypeTag::named("example", "Holder"), vec![Value::Null]);
    let mut buf = ByteBuffer::new();
    assert!(matches!(
        codec.serialize(&mut buf, &null_field),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn corrupt_ref_flag_and_ref_id() {
    let mut codec = Codec::new();
    // Flag byte 0x07 is not a reference flag.
    let mut buf = ByteBuffer::from_bytes(&[0xD4, 0x62, 0x03, 0x07]);
    assert!(matches!(
        codec.deserialize(&mut buf),
        Err(Error::TypeMismatch { .. })
    ));
    // REF pointing at an id that never existed.
    let mut buf = ByteBuffer::from_bytes(&[0xD4, 0x62, 0x03, 0x01, 0x09]);
    assert!(matches!(
        codec.deserialize(&mut buf),
        Err(Error::UnknownRefId { id: 9 })
    ));
}

#[test]
fn write_limited_buffer_propagates_io() {
    let mut codec = Codec::new();
    let mut buf = ByteBuffer::with_limit(4);
    let v = Value::string("this will not fit");
    match codec.serialize(&mut buf, &v) {
        Err(Error::Io { .. }) => {}
        other => panic!("unexpected {other:?}"),
    }
    // Same instance, fresh buffer: fine.
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &v).unwrap();
    assert_eq!(codec.deserialize(&mut buf).unwrap(), v);
}

#[test]
fn registration_misuse() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct(200, StructSchema::default()).unwrap();
    assert!(matches!(
        reg.register_struct(200, StructSchema::default()),
        Err(Error::AlreadyRegistered { .. })
    ));
    assert!(matches!(
        reg.register_struct(1, StructSchema::default()),
        Err(Error::InvalidTypeId { id: 1 })
    ));
    assert!(matches!(
        reg.register_struct(300, StructSchema::default()),
        Err(Error::InvalidTypeId { id: 300 })
    ));
}

#[test]
fn failed_session_does_not_leak_ref_state() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "example",
        "Holder",
        StructSchema::new(vec![FieldDef::new("v", TypeSpec::Int32)]),
    )
    .unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));

    // First call fails halfway: a list is registered, then a bad field.
    let bad = Value::list(vec![
        Value::string("s"),
        Value::structure(TypeTag::named("example", "Holder"), vec![Value::Null]),
    ]);
    let mut buf = ByteBuffer::new();
    assert!(codec.serialize(&mut buf, &bad).is_err());

    // A clean value in a fresh buffer round-trips: no stale ref ids, no
    // stale metastring ids.
    let good = Value::list(vec![
        Value::string("s"),
        Value::structure(TypeTag::named("example", "Holder"), vec![Value::Int32(1)]),
    ]);
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &good).unwrap();
    assert_eq!(codec.deserialize(&mut buf).unwrap(), good);
}
