// Cyclic object graphs: registration-before-body on both sides means a
// back-reference can resolve into an object that is still being filled.

use std::sync::Arc;

use xcodec::{
    ByteBuffer, Codec, Error, FieldDef, StructSchema, TypeRegistry, TypeSpec, TypeTag, Value,
};

fn node_registry() -> TypeRegistry {
    let mut reg = TypeRegistry::with_builtins();
    reg.register_struct_by_name(
        "example",
        "A",
        StructSchema::new(vec![FieldDef::new(
            "a1",
            TypeSpec::Ptr(Box::new(TypeSpec::Named {
                namespace: "example".into(),
                name: "A".into(),
            })),
        )]),
    )
    .unwrap();
    reg
}

/// `a.a1 = a` round-trips to `a'` with `a'.a1` the same object as `a'`.
#[test]
fn self_referential_struct() {
    let mut codec = Codec::with_registry(Arc::new(node_registry()));

    let a = Value::structure(TypeTag::named("example", "A"), vec![Value::Null]);
    if let Value::Struct(cell) = &a {
        cell.borrow_mut().fields[0] = a.clone();
    }

    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &a).unwrap();
    let back = codec.deserialize(&mut buf).unwrap();

    let Value::Struct(cell) = &back else { panic!("not a struct") };
    let field = cell.borrow().fields[0].clone();
    assert!(field.ptr_eq(&back), "cycle must close on the same object");
}

#[test]
fn two_node_cycle() {
    let mut codec = Codec::with_registry(Arc::new(node_registry()));
    let tag = TypeTag::named("example", "A");

    let a = Value::structure(tag.clone(), vec![Value::Null]);
    let b = Value::structure(tag, vec![a.clone()]);
    if let Value::Struct(cell) = &a {
        cell.borrow_mut().fields[0] = b.clone();
    }

    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &a).unwrap();
    let back_a = codec.deserialize(&mut buf).unwrap();

    let Value::Struct(a_cell) = &back_a else { panic!("not a struct") };
    let back_b = a_cell.borrow().fields[0].clone();
    let Value::Struct(b_cell) = &back_b else { panic!("not a struct") };
    let back_a_again = b_cell.borrow().fields[0].clone();
    assert!(back_a_again.ptr_eq(&back_a));
    assert!(!back_b.ptr_eq(&back_a));
}

#[test]
fn list_containing_itself() {
    let mut codec = Codec::new();
    let list = Value::list(vec![Value::Int32(7)]);
    if let Value::List(cell) = &list {
        let self_ref = list.clone();
        cell.borrow_mut().push(self_ref);
    }

    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &list).unwrap();
    let back = codec.deserialize(&mut buf).unwrap();

    let Value::List(cell) = &back else { panic!("not a list") };
    let items = cell.borrow();
    assert_eq!(items[0], Value::Int32(7));
    assert!(items[1].ptr_eq(&back), "self-slot must alias the list");
}

#[test]
fn map_containing_itself_as_value() {
    let mut codec = Codec::new();
    let map = Value::map(vec![(Value::string("self"), Value::Null)]);
    if let Value::Map(cell) = &map {
        let self_ref = map.clone();
        cell.borrow_mut()[0].1 = self_ref;
    }

    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &map).unwrap();
    let back = codec.deserialize(&mut buf).unwrap();

    let Value::Map(cell) = &back else { panic!("not a map") };
    let entries = cell.borrow();
    assert_eq!(entries[0].0, Value::string("self"));
    assert!(entries[0].1.ptr_eq(&back));
}

/// With tracking off, a cyclic graph trips the depth guard instead of
/// recursing forever.
#[test]
fn untracked_cycle_hits_recursion_limit() {
    let mut codec = Codec::builder()
        .registry(Arc::new(node_registry()))
        .ref_tracking(false)
        .max_depth(64)
        .build();

    let a = Value::structure(TypeTag::named("example", "A"), vec![Value::Null]);
    if let Value::Struct(cell) = &a {
        cell.borrow_mut().fields[0] = a.clone();
    }

    let mut buf = ByteBuffer::new();
    match codec.serialize(&mut buf, &a) {
        Err(Error::RecursionLimit { limit: 64 }) => {}
        other => panic!("expected recursion limit, got {other:?}"),
    }

    // The instance stays usable after the failure.
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &Value::Int32(5)).unwrap();
    assert_eq!(codec.deserialize(&mut buf).unwrap(), Value::Int32(5));
}

/// Deep but acyclic nesting under the limit still works untracked.
#[test]
fn untracked_deep_nesting_below_limit() {
    let mut codec = Codec::builder().ref_tracking(false).max_depth(64).build();
    let mut v = Value::Int32(1);
    for _ in 0..40 {
        v = Value::list(vec![v]);
    }
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &v).unwrap();
    let back = codec.deserialize(&mut buf).unwrap();
    assert_eq!(back, v);
}
