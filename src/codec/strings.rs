//! String bodies — three encodings behind a combined length/encoding header.
//!
//! Wire form: `varuint32((byte_len << 2) | encoding)` then `byte_len` raw
//! bytes. The writer picks the narrowest encoding that represents the
//! content faithfully; readers accept all three.

use std::rc::Rc;

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

const ENCODING_LATIN1: u32 = 0;
const ENCODING_UTF16LE: u32 = 1;
const ENCODING_UTF8: u32 = 2;

/// Writes one string body.
pub(crate) fn write_string(buf: &mut ByteBuffer, s: &str) -> Result<()> {
    if s.chars().all(|c| (c as u32) <= 0xFF) {
        // One byte per char; never wider than UTF-8 for this content.
        let len = s.chars().count() as u32;
        buf.write_varuint32((len << 2) | ENCODING_LATIN1)?;
        for c in s.chars() {
            buf.write_u8(c as u32 as u8)?;
        }
        return Ok(());
    }
    let utf16_len = s.encode_utf16().count() * 2;
    if utf16_len < s.len() {
        buf.write_varuint32(((utf16_len as u32) << 2) | ENCODING_UTF16LE)?;
        for unit in s.encode_utf16() {
            buf.write_u16(unit)?;
        }
        return Ok(());
    }
    buf.write_varuint32(((s.len() as u32) << 2) | ENCODING_UTF8)?;
    buf.write_bytes(s.as_bytes())
}

/// Reads one string body, accepting any of the three encodings.
pub(crate) fn read_string(buf: &mut ByteBuffer) -> Result<Rc<str>> {
    let header = buf.read_varuint32()?;
    let len = (header >> 2) as usize;
    let decoded = match header & 0b11 {
        ENCODING_LATIN1 => {
            let bytes = buf.read_bytes(len)?;
            bytes.iter().map(|&b| b as char).collect::<String>()
        }
        ENCODING_UTF16LE => {
            if len % 2 != 0 {
                return Err(Error::InvalidUtf8);
            }
            let bytes = buf.read_bytes(len)?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16(&units).map_err(|_| Error::InvalidUtf8)?
        }
        ENCODING_UTF8 => {
            let bytes = buf.read_bytes(len)?;
            std::str::from_utf8(bytes)
                .map_err(|_| Error::InvalidUtf8)?
                .to_owned()
        }
        _ => return Err(Error::InvalidUtf8),
    };
    Ok(Rc::from(decoded.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) -> (u32, usize) {
        let mut buf = ByteBuffer::new();
        write_string(&mut buf, s).unwrap();
        let header_preview = {
            let mut probe = ByteBuffer::from_bytes(buf.as_slice());
            probe.read_varuint32().unwrap()
        };
        let total = buf.writer_index();
        let back = read_string(&mut buf).unwrap();
        assert_eq!(&*back, s);
        assert_eq!(buf.remaining(), 0);
        (header_preview & 0b11, total)
    }

    #[test]
    fn ascii_is_latin1() {
        let (encoding, total) = roundtrip("hello");
        assert_eq!(encoding, ENCODING_LATIN1);
        assert_eq!(total, 1 + 5);
    }

    #[test]
    fn latin1_covers_u00ff() {
        let (encoding, _) = roundtrip("café");
        assert_eq!(encoding, ENCODING_LATIN1);
    }

    #[test]
    fn bmp_text_prefers_utf16() {
        // CJK: three bytes per char in UTF-8, two in UTF-16.
        let (encoding, total) = roundtrip("编码格式");
        assert_eq!(encoding, ENCODING_UTF16LE);
        assert_eq!(total, 1 + 8);
    }

    #[test]
    fn mixed_text_falls_back_to_utf8() {
        // Mostly ASCII with one wide char: UTF-8 is smaller than UTF-16.
        let (encoding, _) = roundtrip("value=编");
        assert_eq!(encoding, ENCODING_UTF8);
    }

    #[test]
    fn surrogate_pairs_roundtrip() {
        let (_, _) = roundtrip("🦀🦀");
        let (_, _) = roundtrip("a🦀b");
    }

    #[test]
    fn empty_string() {
        let (encoding, total) = roundtrip("");
        assert_eq!(encoding, ENCODING_LATIN1);
        assert_eq!(total, 1);
    }

    #[test]
    fn invalid_payloads_are_rejected() {
        // Odd UTF-16 byte length.
        let mut buf = ByteBuffer::new();
        buf.write_varuint32((3 << 2) | ENCODING_UTF16LE).unwrap();
        buf.write_bytes(&[0, 1, 2]).unwrap();
        assert!(matches!(read_string(&mut buf), Err(Error::InvalidUtf8)));

        // Truncated payload.
        let mut buf = ByteBuffer::new();
        buf.write_varuint32((9 << 2) | ENCODING_UTF8).unwrap();
        buf.write_bytes(b"abc").unwrap();
        assert!(matches!(read_string(&mut buf), Err(Error::Truncated { .. })));

        // Bad UTF-8 bytes.
        let mut buf = ByteBuffer::new();
        buf.write_varuint32((2 << 2) | ENCODING_UTF8).unwrap();
        buf.write_bytes(&[0xFF, 0xFE]).unwrap();
        assert!(matches!(read_string(&mut buf), Err(Error::InvalidUtf8)));

        // Reserved encoding tag.
        let mut buf = ByteBuffer::new();
        buf.write_varuint32((1 << 2) | 3).unwrap();
        buf.write_u8(b'x').unwrap();
        assert!(matches!(read_string(&mut buf), Err(Error::InvalidUtf8)));
    }
}
