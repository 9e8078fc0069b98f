//! Criterion benchmarks for the hot wire paths.
//!
//! Run with:
//!   cargo bench --bench codec

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use xcodec::{ByteBuffer, Codec, FieldDef, StructSchema, TypeRegistry, TypeSpec, TypeTag, Value};

fn bench_varints(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint");
    let samples: Vec<u32> = (0..4096u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();

    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_function("write_read_varuint32", |b| {
        let mut buf = ByteBuffer::with_capacity(samples.len() * 5);
        b.iter(|| {
            buf.clear();
            for &v in &samples {
                buf.write_varuint32(v).unwrap();
            }
            let mut total = 0u64;
            for _ in &samples {
                total = total.wrapping_add(u64::from(buf.read_varuint32().unwrap()));
            }
            total
        })
    });
    group.finish();
}

fn registry() -> Arc<TypeRegistry> {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "bench",
        "Record",
        StructSchema::new(vec![
            FieldDef::new("id", TypeSpec::VarInt64),
            FieldDef::new("name", TypeSpec::String),
            FieldDef::new("scores", TypeSpec::Int32Array),
            FieldDef::new("tags", TypeSpec::List(Box::new(TypeSpec::String))),
        ]),
    )
    .unwrap();
    Arc::new(reg)
}

fn record(i: i64) -> Value {
    Value::structure(
        TypeTag::named("bench", "Record"),
        vec![
            Value::Int64(i),
            Value::string(format!("record-{i}")),
            Value::Int32Array(std::rc::Rc::new((0..32).collect())),
            Value::list(vec![Value::string("alpha"), Value::string("beta")]),
        ],
    )
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");

    for &n in &[1usize, 64, 512] {
        let value = Value::list((0..n as i64).map(record).collect());
        let mut codec = Codec::with_registry(registry());
        let mut probe = ByteBuffer::new();
        codec.serialize(&mut probe, &value).unwrap();
        group.throughput(Throughput::Bytes(probe.writer_index() as u64));

        group.bench_with_input(BenchmarkId::new("serialize", n), &value, |b, value| {
            let mut buf = ByteBuffer::with_capacity(probe.writer_index());
            b.iter(|| {
                buf.clear();
                codec.serialize(&mut buf, value).unwrap();
                buf.writer_index()
            })
        });

        let mut codec = Codec::with_registry(registry());
        let bytes = probe.into_vec();
        group.bench_with_input(BenchmarkId::new("deserialize", n), &bytes, |b, bytes| {
            b.iter(|| {
                let mut buf = ByteBuffer::from_bytes(bytes);
                codec.deserialize(&mut buf).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_strings(c: &mut Criterion) {
    let mut group = c.benchmark_group("strings");
    let ascii = Value::list((0..256).map(|i| Value::string(format!("key-{i}"))).collect());
    let mut codec = Codec::new();
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &ascii).unwrap();
    group.throughput(Throughput::Bytes(buf.writer_index() as u64));
    group.bench_function("latin1_list", |b| {
        let mut out = ByteBuffer::with_capacity(buf.writer_index());
        b.iter(|| {
            out.clear();
            codec.serialize(&mut out, &ascii).unwrap();
            out.writer_index()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_varints, bench_roundtrip, bench_strings);
criterion_main!(benches);
