// End-to-end round-trip law: deserialize(serialize(v)) == v for every
// value shape of every registered type, with object-graph identity
// preserved for reference-tracked containers.

use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeDelta};
use xcodec::{
    ByteBuffer, Codec, ExtCodec, FieldDef, StructSchema, TypeRegistry, TypeSpec, TypeTag, Value,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn roundtrip_with(codec: &mut Codec, value: &Value) -> Value {
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, value).expect("serialize");
    let back = codec.deserialize(&mut buf).expect("deserialize");
    assert_eq!(buf.remaining(), 0);
    back
}

fn roundtrip(value: &Value) -> Value {
    let mut codec = Codec::new();
    let back = roundtrip_with(&mut codec, value);
    assert_eq!(&back, value);
    back
}

// ─────────────────────────────────────────────────────────────────────────────
// Scalars and leaves
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn scalars() {
    init_logging();
    roundtrip(&Value::Null);
    roundtrip(&Value::Bool(true));
    roundtrip(&Value::Bool(false));
    roundtrip(&Value::Int8(-7));
    roundtrip(&Value::Int16(-30_000));
    roundtrip(&Value::Int32(i32::MIN));
    roundtrip(&Value::Int64(i64::MAX));
    roundtrip(&Value::Int64(-1));
    roundtrip(&Value::Float32(3.5));
    roundtrip(&Value::Float64(-0.125));
}

#[test]
fn strings_in_all_encodings() {
    roundtrip(&Value::string(""));
    roundtrip(&Value::string("plain ascii"));
    roundtrip(&Value::string("café au lait"));
    roundtrip(&Value::string("编码格式测试"));
    roundtrip(&Value::string("mixed 编码 and ascii"));
    roundtrip(&Value::string("🦀 crab"));
}

#[test]
fn binary_and_arrays() {
    roundtrip(&Value::binary(vec![]));
    roundtrip(&Value::binary(vec![0, 1, 2, 0xFF]));
    roundtrip(&Value::BoolArray(Rc::new(vec![true, false, true])));
    roundtrip(&Value::Int8Array(Rc::new(vec![-1, 0, 1])));
    roundtrip(&Value::Int16Array(Rc::new(vec![i16::MIN, i16::MAX])));
    roundtrip(&Value::Int32Array(Rc::new(vec![0; 5])));
    roundtrip(&Value::Int64Array(Rc::new(vec![i64::MIN, -1, 0, 1, i64::MAX])));
    roundtrip(&Value::Float16Array(Rc::new(vec![0x3C00, 0x0000, 0xBC00])));
    roundtrip(&Value::Float32Array(Rc::new(vec![1.0, -2.5])));
    roundtrip(&Value::Float64Array(Rc::new(vec![0.0; 5])));
}

#[test]
fn time_values() {
    roundtrip(&Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    roundtrip(&Value::Date(NaiveDate::from_ymd_opt(1969, 7, 20).unwrap()));
    roundtrip(&Value::Timestamp(
        DateTime::from_timestamp_millis(1_700_000_000_123).unwrap().naive_utc(),
    ));
    roundtrip(&Value::Duration(TimeDelta::milliseconds(1_500)));
    roundtrip(&Value::Duration(TimeDelta::milliseconds(-1_500)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Containers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn lists_and_sets() {
    roundtrip(&Value::list(vec![]));
    roundtrip(&Value::list(vec![
        Value::Int32(1),
        Value::Null,
        Value::string("three"),
    ]));
    roundtrip(&Value::set(vec![Value::Int64(1), Value::Int64(2)]));
    // Nested.
    roundtrip(&Value::list(vec![
        Value::list(vec![Value::Bool(true)]),
        Value::list(vec![]),
    ]));
}

/// The mixed dynamic list: every element carries its own type header.
#[test]
fn mixed_dynamic_list() {
    let v = Value::list(vec![
        Value::Bool(true),
        Value::Bool(false),
        Value::string("str"),
        Value::Float64(-1.1),
        Value::Int64(1),
        Value::Int32Array(Rc::new(vec![0; 5])),
        Value::Float64Array(Rc::new(vec![0.0; 5])),
    ]);
    roundtrip(&v);
}

#[test]
fn maps() {
    roundtrip(&Value::map(vec![]));
    // Homogeneous string -> int32.
    roundtrip(&Value::map(vec![
        (Value::string("k1"), Value::Int32(1)),
        (Value::string("k2"), Value::Int32(-1)),
        (Value::string(""), Value::Int32(3)),
    ]));
    // Heterogeneous values force a chunk break.
    roundtrip(&Value::map(vec![
        (Value::string("a"), Value::Int32(1)),
        (Value::string("b"), Value::string("two")),
        (Value::string("c"), Value::Int32(3)),
    ]));
    // Null keys and values.
    roundtrip(&Value::map(vec![
        (Value::Null, Value::Int32(1)),
        (Value::string("k"), Value::Null),
        (Value::Null, Value::Null),
        (Value::string("x"), Value::Int32(9)),
    ]));
    // Map values that are containers.
    roundtrip(&Value::map(vec![(
        Value::string("nested"),
        Value::map(vec![(Value::Int32(1), Value::string("one"))]),
    )]));
}

#[test]
fn large_map_spans_multiple_chunks() {
    let entries: Vec<(Value, Value)> = (0..600)
        .map(|i| (Value::Int32(i), Value::Int64(i64::from(i) * 3)))
        .collect();
    roundtrip(&Value::map(entries));
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity preservation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn equal_strings_share_one_object_when_tracked() {
    let v = Value::list(vec![
        Value::string("str1"),
        Value::string("str1"),
        Value::string(""),
        Value::string(""),
        Value::string("str2"),
    ]);
    let mut codec = Codec::new();
    let back = roundtrip_with(&mut codec, &v);
    assert_eq!(back, v);
    let Value::List(items) = &back else { panic!("not a list") };
    let items = items.borrow();
    assert!(items[0].ptr_eq(&items[1]), "duplicate strings must share");
    assert!(items[2].ptr_eq(&items[3]), "empty strings must share");
    assert!(!items[0].ptr_eq(&items[4]));

    // Deduplication must also shrink the stream: the same list with
    // tracking off repeats every payload.
    let mut tracked = ByteBuffer::new();
    codec.serialize(&mut tracked, &v).unwrap();
    let mut untracked_codec = Codec::builder().ref_tracking(false).build();
    let mut untracked = ByteBuffer::new();
    untracked_codec.serialize(&mut untracked, &v).unwrap();
    assert!(tracked.writer_index() < untracked.writer_index());
}

#[test]
fn shared_containers_come_back_shared() {
    let shared = Value::list(vec![Value::Int32(42)]);
    let outer = Value::list(vec![shared.clone(), shared.clone(), Value::list(vec![Value::Int32(42)])]);
    let back = roundtrip(&outer);
    let Value::List(items) = &back else { panic!("not a list") };
    let items = items.borrow();
    assert!(items[0].ptr_eq(&items[1]), "shared handle must stay shared");
    assert!(!items[0].ptr_eq(&items[2]), "distinct handles must stay distinct");
}

#[test]
fn without_tracking_sharing_is_lost_but_data_survives() {
    let shared = Value::binary(vec![9, 9, 9]);
    let outer = Value::list(vec![shared.clone(), shared]);
    let mut codec = Codec::builder().ref_tracking(false).build();
    let back = roundtrip_with(&mut codec, &outer);
    assert_eq!(back, outer);
    let Value::List(items) = &back else { panic!("not a list") };
    let items = items.borrow();
    assert!(!items[0].ptr_eq(&items[1]));
}

// ─────────────────────────────────────────────────────────────────────────────
// Registered types
// ─────────────────────────────────────────────────────────────────────────────

fn person_registry() -> TypeRegistry {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "example",
        "Person",
        StructSchema::new(vec![
            FieldDef::new("name", TypeSpec::String),
            FieldDef::new("age", TypeSpec::VarInt32),
            FieldDef::new("balance", TypeSpec::SliInt64),
            FieldDef::new("tags", TypeSpec::List(Box::new(TypeSpec::String))),
            FieldDef::new("attrs", TypeSpec::Map(Box::new(TypeSpec::String), Box::new(TypeSpec::Any))),
            FieldDef::new("extra", TypeSpec::Any),
        ]),
    )
    .unwrap();
    reg.register_enum_by_name("example", "Color").unwrap();
    reg
}

fn person(name: &str) -> Value {
    Value::structure(
        TypeTag::named("example", "Person"),
        vec![
            Value::string(name),
            Value::Int32(41),
            Value::Int64(1 << 40),
            Value::list(vec![Value::string("a"), Value::string("b")]),
            Value::map(vec![(Value::string("color"), Value::Enum {
                tag: TypeTag::named("example", "Color"),
                ordinal: 2,
            })]),
            Value::Null,
        ],
    )
}

#[test]
fn named_struct_roundtrip() {
    let mut codec = Codec::with_registry(Arc::new(person_registry()));
    let v = person("Ada");
    let back = roundtrip_with(&mut codec, &v);
    assert_eq!(back, v);
}

#[test]
fn named_struct_in_dynamic_slots() {
    let mut codec = Codec::with_registry(Arc::new(person_registry()));
    let v = Value::list(vec![person("Ada"), person("Brian"), Value::Null]);
    let back = roundtrip_with(&mut codec, &v);
    assert_eq!(back, v);
}

#[test]
fn id_registered_struct_roundtrip() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct(
        100,
        StructSchema::new(vec![
            FieldDef::new("x", TypeSpec::Int32),
            FieldDef::new("y", TypeSpec::Int32),
        ]),
    )
    .unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));
    let v = Value::structure(TypeTag::Id(100), vec![Value::Int32(3), Value::Int32(-4)]);
    let back = roundtrip_with(&mut codec, &v);
    assert_eq!(back, v);
}

#[test]
fn nested_declared_structs() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "geo",
        "Point",
        StructSchema::new(vec![
            FieldDef::new("x", TypeSpec::Float64),
            FieldDef::new("y", TypeSpec::Float64),
        ]),
    )
    .unwrap();
    reg.register_struct_by_name(
        "geo",
        "Segment",
        StructSchema::new(vec![
            FieldDef::new("from", TypeSpec::Named { namespace: "geo".into(), name: "Point".into() }),
            FieldDef::new("to", TypeSpec::Named { namespace: "geo".into(), name: "Point".into() }),
            FieldDef::new("label", TypeSpec::Ptr(Box::new(TypeSpec::String))),
        ]),
    )
    .unwrap();
    let point = |x: f64, y: f64| {
        Value::structure(
            TypeTag::named("geo", "Point"),
            vec![Value::Float64(x), Value::Float64(y)],
        )
    };
    let mut codec = Codec::with_registry(Arc::new(reg));
    let v = Value::structure(
        TypeTag::named("geo", "Segment"),
        vec![point(0.0, 0.0), point(1.0, 2.0), Value::Null],
    );
    let back = roundtrip_with(&mut codec, &v);
    assert_eq!(back, v);
}

#[test]
fn enums_by_id_and_name() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_enum(90).unwrap();
    reg.register_enum_by_name("example", "Color").unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));
    let by_id = Value::Enum { tag: TypeTag::Id(90), ordinal: 0 };
    let by_name = Value::Enum { tag: TypeTag::named("example", "Color"), ordinal: 7 };
    assert_eq!(roundtrip_with(&mut codec, &by_id), by_id);
    assert_eq!(roundtrip_with(&mut codec, &by_name), by_name);
}

// ─────────────────────────────────────────────────────────────────────────────
// Extension types
// ─────────────────────────────────────────────────────────────────────────────

/// A caller type the codec knows nothing about.
#[derive(Debug, PartialEq, Clone)]
struct Complex {
    re: f64,
    im: f64,
}

struct ComplexCodec;

impl ExtCodec for ComplexCodec {
    fn encode(&self, buf: &mut ByteBuffer, value: &dyn Any) -> xcodec::Result<()> {
        let c = value.downcast_ref::<Complex>().ok_or_else(|| xcodec::Error::TypeMismatch {
            expected: "Complex".into(),
            found: "other payload".into(),
        })?;
        buf.write_f64(c.re)?;
        buf.write_f64(c.im)
    }

    fn decode(&self, buf: &mut ByteBuffer) -> xcodec::Result<Box<dyn Any>> {
        let re = buf.read_f64()?;
        let im = buf.read_f64()?;
        Ok(Box::new(Complex { re, im }))
    }
}

#[test]
fn ext_type_roundtrip() {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_ext_by_name("math", "Complex", Arc::new(ComplexCodec)).unwrap();
    let mut codec = Codec::with_registry(Arc::new(reg));

    let v = Value::ext(
        TypeTag::named("math", "Complex"),
        Box::new(Complex { re: 1.5, im: -2.0 }),
    );
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &v).unwrap();
    let back = codec.deserialize(&mut buf).unwrap();
    let Value::Ext(e) = back else { panic!("not ext") };
    assert_eq!(e.tag, TypeTag::named("math", "Complex"));
    assert_eq!(
        e.data.downcast_ref::<Complex>(),
        Some(&Complex { re: 1.5, im: -2.0 })
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance reuse
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn one_codec_many_streams() {
    let mut codec = Codec::with_registry(Arc::new(person_registry()));
    for i in 0..20 {
        let v = Value::list(vec![
            person(&format!("p{i}")),
            Value::string("str1"),
            Value::string("str1"),
        ]);
        let back = roundtrip_with(&mut codec, &v);
        assert_eq!(back, v);
    }
}
