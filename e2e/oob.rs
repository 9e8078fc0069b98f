// Out-of-band binary extraction: large payloads leave the main stream as
// placeholder indices and travel on a caller-owned side channel.

use std::rc::Rc;

use xcodec::types::session_flags;
use xcodec::{ByteBuffer, Codec, Error, Value};

#[test]
fn extracted_buffers_resolve_by_index() {
    let big1 = Rc::new(vec![1u8; 4096]);
    let big2 = Rc::new(vec![2u8; 4096]);
    let small = Rc::new(vec![3u8; 4]);
    let v = Value::list(vec![
        Value::Binary(big1.clone()),
        Value::Binary(small.clone()),
        Value::Binary(big2.clone()),
    ]);

    let mut codec = Codec::new();
    let mut buf = ByteBuffer::new();
    let mut side_channel: Vec<Rc<Vec<u8>>> = Vec::new();
    codec
        .serialize_with_oob(&mut buf, &v, |bytes| {
            if bytes.len() >= 1024 {
                side_channel.push(bytes.clone());
                true
            } else {
                false
            }
        })
        .unwrap();

    // Both large payloads left the stream.
    assert_eq!(side_channel.len(), 2);
    assert!(buf.writer_index() < 1024);
    assert_eq!(buf.as_slice()[2] & session_flags::OUT_OF_BAND, session_flags::OUT_OF_BAND);

    let back = codec.deserialize_with_oob(&mut buf, &side_channel).unwrap();
    assert_eq!(back, v);

    // Extraction is zero-copy end to end: the side-channel handle itself
    // lands in the decoded graph.
    let Value::List(items) = &back else { panic!("not a list") };
    let items = items.borrow();
    assert!(matches!(&items[0], Value::Binary(b) if Rc::ptr_eq(b, &side_channel[0])));
    assert!(matches!(&items[2], Value::Binary(b) if Rc::ptr_eq(b, &side_channel[1])));
}

#[test]
fn sink_can_decline_everything() {
    let v = Value::binary(vec![7u8; 64]);
    let mut codec = Codec::new();
    let mut buf = ByteBuffer::new();
    codec.serialize_with_oob(&mut buf, &v, |_| false).unwrap();
    // The flag is set but every payload stayed in band.
    let back = codec.deserialize_with_oob(&mut buf, &[]).unwrap();
    assert_eq!(back, v);
}

#[test]
fn oob_stream_without_buffers_fails() {
    let v = Value::binary(vec![7u8; 64]);
    let mut codec = Codec::new();
    let mut buf = ByteBuffer::new();
    codec.serialize_with_oob(&mut buf, &v, |_| true).unwrap();

    match codec.deserialize(&mut buf) {
        Err(Error::MissingOutOfBandBuffer { .. }) => {}
        other => panic!("unexpected {other:?}"),
    }

    // With too few buffers the placeholder index is reported.
    let mut buf = ByteBuffer::new();
    let v2 = Value::list(vec![Value::binary(vec![1; 8]), Value::binary(vec![2; 8])]);
    codec.serialize_with_oob(&mut buf, &v2, |_| true).unwrap();
    let one_buffer = vec![Rc::new(vec![1u8; 8])];
    match codec.deserialize_with_oob(&mut buf, &one_buffer) {
        Err(Error::MissingOutOfBandBuffer { index: 1 }) => {}
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn plain_streams_have_no_inband_discriminator() {
    // A stream written without a sink reads back under a plain
    // deserialize and its binary body is the bare length-prefixed form.
    let v = Value::binary(vec![0xAB; 3]);
    let mut codec = Codec::new();
    let mut buf = ByteBuffer::new();
    codec.serialize(&mut buf, &v).unwrap();
    // magic(2) flags(1) ref(1) BINARY(1) len(1) payload(3).
    assert_eq!(buf.writer_index(), 9);
    assert_eq!(codec.deserialize(&mut buf).unwrap(), v);
}
