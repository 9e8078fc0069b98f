//! Metastring encodings — five representations for short name fragments.
//!
//! Covers:
//! - the encoding taxonomy (`MetaEncoding`) and per-context encoders
//!   (namespace vs type name, differing in their two special characters)
//! - minimum-size encoding selection
//! - MSB-first sub-byte packing behind a leading strip bit
//! - the 64-bit fragment hashcode whose low byte carries the encoding tag
//!
//! Peer implementations must produce byte-identical fragments and
//! hashcodes for the same input, so every rule here is part of the wire
//! contract.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use xxhash_rust::xxh64::xxh64;

use crate::error::{Error, Result};

/// How one fragment's payload bytes are to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MetaEncoding {
    /// Raw UTF-8 bytes.
    Utf8 = 0,
    /// 5 bits per char from the lowercase charset `a-z . _ $ |`.
    LowerSpecial = 1,
    /// 6 bits per char from `a-z A-Z 0-9` plus the encoder's two specials.
    LowerUpperDigitSpecial = 2,
    /// LowerSpecial with the leading uppercase letter lowered on encode and
    /// restored on decode.
    FirstToLowerSpecial = 3,
    /// LowerSpecial with every uppercase letter escaped as `|` + lowercase.
    AllToLowerSpecial = 4,
}

/// The interned form of one fragment.
///
/// `hashcode` is `(xxh64(data) & !0xFF) | encoding`: the low byte of the
/// hash is replaced by the encoding tag, letting the hashcode double as the
/// long-form wire header for fragments over 16 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaStringBytes {
    /// Payload interpretation.
    pub encoding: MetaEncoding,
    /// Encoded payload bytes.
    pub data: Vec<u8>,
    /// Truncated content hash carrying the encoding in its low byte.
    pub hashcode: u64,
}

impl MetaStringBytes {
    /// Builds the interned form, computing the hashcode.
    pub fn new(encoding: MetaEncoding, data: Vec<u8>) -> Self {
        let hashcode = (xxh64(&data, 0) & !0xFF) | u64::from(u8::from(encoding));
        MetaStringBytes {
            encoding,
            data,
            hashcode,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Charsets
// ─────────────────────────────────────────────────────────────────────────────

const LOWER_BITS: usize = 5;
const LOWER_UPPER_DIGIT_BITS: usize = 6;

/// The escape character of `AllToLowerSpecial`.
const UPPER_ESCAPE: char = '|';

fn lower_code(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some(c as u8 - b'a'),
        '.' => Some(26),
        '_' => Some(27),
        '$' => Some(28),
        '|' => Some(29),
        _ => None,
    }
}

fn lower_char(code: u8) -> Result<char> {
    match code {
        0..=25 => Ok((b'a' + code) as char),
        26 => Ok('.'),
        27 => Ok('_'),
        28 => Ok('$'),
        29 => Ok('|'),
        _ => Err(Error::MetaStringTruncated),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoder
// ─────────────────────────────────────────────────────────────────────────────

/// Context-specific fragment encoder. The two special characters
/// parameterize the 6-bit charset; namespaces separate with `.`/`_`, type
/// names with `$`/`_`, and peers must agree on both.
#[derive(Debug, Clone, Copy)]
pub struct MetaStringEncoder {
    special1: char,
    special2: char,
}

/// Encoder for namespace fragments.
pub const NAMESPACE_ENCODER: MetaStringEncoder = MetaStringEncoder {
    special1: '.',
    special2: '_',
};

/// Encoder for type-name fragments.
pub const TYPE_NAME_ENCODER: MetaStringEncoder = MetaStringEncoder {
    special1: '$',
    special2: '_',
};

impl MetaStringEncoder {
    fn digit_code(&self, c: char) -> Option<u8> {
        match c {
            'a'..='z' => Some(c as u8 - b'a'),
            'A'..='Z' => Some(c as u8 - b'A' + 26),
            '0'..='9' => Some(c as u8 - b'0' + 52),
            _ if c == self.special1 => Some(62),
            _ if c == self.special2 => Some(63),
            _ => None,
        }
    }

    fn digit_char(&self, code: u8) -> Result<char> {
        match code {
            0..=25 => Ok((b'a' + code) as char),
            26..=51 => Ok((b'A' + code - 26) as char),
            52..=61 => Ok((b'0' + code - 52) as char),
            62 => Ok(self.special1),
            63 => Ok(self.special2),
            _ => Err(Error::MetaStringTruncated),
        }
    }

    /// Encodes a fragment, choosing the smallest applicable representation.
    pub fn encode(&self, s: &str) -> MetaStringBytes {
        if s.is_empty() {
            return MetaStringBytes::new(MetaEncoding::Utf8, Vec::new());
        }
        let n = s.chars().count();
        let mut best = (MetaEncoding::Utf8, s.len());

        // Candidates are examined from most to least specific; a strictly
        // smaller size wins.
        if s.chars().all(|c| lower_code(c).is_some()) {
            let size = packed_size(n, LOWER_BITS);
            if size < best.1 {
                best = (MetaEncoding::LowerSpecial, size);
            }
        }
        if self.first_to_lower_applies(s) {
            let size = packed_size(n, LOWER_BITS);
            if size < best.1 {
                best = (MetaEncoding::FirstToLowerSpecial, size);
            }
        }
        if self.all_to_lower_applies(s) {
            let escaped = n + s.chars().filter(|c| c.is_ascii_uppercase()).count();
            let size = packed_size(escaped, LOWER_BITS);
            if size < best.1 {
                best = (MetaEncoding::AllToLowerSpecial, size);
            }
        }
        if s.chars().all(|c| self.digit_code(c).is_some()) {
            let size = packed_size(n, LOWER_UPPER_DIGIT_BITS);
            if size < best.1 {
                best = (MetaEncoding::LowerUpperDigitSpecial, size);
            }
        }

        let data = match best.0 {
            MetaEncoding::Utf8 => s.as_bytes().to_vec(),
            MetaEncoding::LowerSpecial => {
                pack(s.chars().filter_map(lower_code), n, LOWER_BITS)
            }
            MetaEncoding::FirstToLowerSpecial => pack(
                s.chars()
                    .enumerate()
                    .filter_map(|(i, c)| {
                        lower_code(if i == 0 { c.to_ascii_lowercase() } else { c })
                    }),
                n,
                LOWER_BITS,
            ),
            MetaEncoding::AllToLowerSpecial => {
                let mut codes = Vec::new();
                for c in s.chars() {
                    if c.is_ascii_uppercase() {
                        codes.push(29); // the '|' escape
                        codes.push(c.to_ascii_lowercase() as u8 - b'a');
                    } else if let Some(code) = lower_code(c) {
                        codes.push(code);
                    }
                }
                let len = codes.len();
                pack(codes.into_iter(), len, LOWER_BITS)
            }
            MetaEncoding::LowerUpperDigitSpecial => {
                pack(s.chars().filter_map(|c| self.digit_code(c)), n, LOWER_UPPER_DIGIT_BITS)
            }
        };
        MetaStringBytes::new(best.0, data)
    }

    fn first_to_lower_applies(&self, s: &str) -> bool {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) if first.is_ascii_uppercase() => {
                chars.all(|c| lower_code(c).is_some())
            }
            _ => false,
        }
    }

    fn all_to_lower_applies(&self, s: &str) -> bool {
        // The escape char itself must not appear, or decoding would be
        // ambiguous.
        s.chars().any(|c| c.is_ascii_uppercase())
            && !s.contains(UPPER_ESCAPE)
            && s.chars()
                .all(|c| c.is_ascii_uppercase() || lower_code(c).is_some())
    }

    /// Decodes a fragment payload back to its string form.
    pub fn decode(&self, encoding: MetaEncoding, data: &[u8]) -> Result<String> {
        match encoding {
            MetaEncoding::Utf8 => String::from_utf8(data.to_vec()).map_err(|_| Error::InvalidUtf8),
            MetaEncoding::LowerSpecial => {
                let codes = unpack(data, LOWER_BITS);
                codes.into_iter().map(lower_char).collect()
            }
            MetaEncoding::FirstToLowerSpecial => {
                let codes = unpack(data, LOWER_BITS);
                let mut out = String::with_capacity(codes.len());
                for (i, code) in codes.into_iter().enumerate() {
                    let c = lower_char(code)?;
                    out.push(if i == 0 { c.to_ascii_uppercase() } else { c });
                }
                Ok(out)
            }
            MetaEncoding::AllToLowerSpecial => {
                let codes = unpack(data, LOWER_BITS);
                let mut out = String::with_capacity(codes.len());
                let mut escaped = false;
                for code in codes {
                    let c = lower_char(code)?;
                    if escaped {
                        out.push(c.to_ascii_uppercase());
                        escaped = false;
                    } else if c == UPPER_ESCAPE {
                        escaped = true;
                    } else {
                        out.push(c);
                    }
                }
                if escaped {
                    return Err(Error::MetaStringTruncated);
                }
                Ok(out)
            }
            MetaEncoding::LowerUpperDigitSpecial => {
                let codes = unpack(data, LOWER_UPPER_DIGIT_BITS);
                codes.into_iter().map(|c| self.digit_char(c)).collect()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bit packing
// ─────────────────────────────────────────────────────────────────────────────

#[inline]
fn packed_size(n_chars: usize, bits: usize) -> usize {
    (1 + n_chars * bits).div_ceil(8)
}

/// Packs `n_chars` sub-byte codes MSB-first after a leading strip bit.
///
/// The strip bit is set when the trailing zero padding is wide enough that
/// a decoder would otherwise see one spurious extra character.
fn pack(codes: impl Iterator<Item = u8>, n_chars: usize, bits: usize) -> Vec<u8> {
    let byte_len = packed_size(n_chars, bits);
    let mut out = vec![0u8; byte_len];
    if byte_len > 0 && (byte_len * 8 - 1) / bits > n_chars {
        out[0] |= 0x80;
    }
    let mut bit_pos = 1usize;
    for code in codes {
        for k in (0..bits).rev() {
            if (code >> k) & 1 == 1 {
                out[bit_pos / 8] |= 0x80 >> (bit_pos % 8);
            }
            bit_pos += 1;
        }
    }
    out
}

/// Inverse of [`pack`].
fn unpack(data: &[u8], bits: usize) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let strip = data[0] & 0x80 != 0;
    let mut count = (data.len() * 8 - 1) / bits;
    if strip {
        count -= 1;
    }
    let mut out = Vec::with_capacity(count);
    let mut bit_pos = 1usize;
    for _ in 0..count {
        let mut code = 0u8;
        for _ in 0..bits {
            code <<= 1;
            code |= (data[bit_pos / 8] >> (7 - bit_pos % 8)) & 1;
            bit_pos += 1;
        }
        out.push(code);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(encoder: &MetaStringEncoder, s: &str) -> MetaStringBytes {
        let msb = encoder.encode(s);
        let decoded = encoder.decode(msb.encoding, &msb.data).unwrap();
        assert_eq!(decoded, s, "fragment {s:?} did not round-trip");
        msb
    }

    #[test]
    fn lower_special_picked_for_plain_names() {
        let msb = roundtrip(&TYPE_NAME_ENCODER, "someclass");
        assert_eq!(msb.encoding, MetaEncoding::LowerSpecial);
        // 9 chars * 5 bits + strip bit = 46 bits -> 6 bytes (< 9 UTF-8 bytes).
        assert_eq!(msb.data.len(), 6);
    }

    #[test]
    fn namespace_with_dots_stays_sub_byte() {
        let msb = roundtrip(&NAMESPACE_ENCODER, "org.example.model");
        assert_eq!(msb.encoding, MetaEncoding::LowerSpecial);
        assert!(msb.data.len() < "org.example.model".len());
    }

    #[test]
    fn first_to_lower_for_capitalized_names() {
        let msb = roundtrip(&TYPE_NAME_ENCODER, "Someclass");
        assert_eq!(msb.encoding, MetaEncoding::FirstToLowerSpecial);
    }

    #[test]
    fn all_to_lower_for_sparse_uppercase() {
        // One interior capital: escaping (15 five-bit chars) beats the
        // 6-bit charset (14 six-bit chars) by a byte.
        let msb = roundtrip(&TYPE_NAME_ENCODER, "internalXvalue");
        assert_eq!(msb.encoding, MetaEncoding::AllToLowerSpecial);
    }

    #[test]
    fn dense_uppercase_takes_six_bit_charset() {
        // Three capitals in 13 chars: per-char escapes cost more than the
        // wider charset.
        let msb = roundtrip(&TYPE_NAME_ENCODER, "SomeClassName");
        assert_eq!(msb.encoding, MetaEncoding::LowerUpperDigitSpecial);
    }

    #[test]
    fn digits_force_six_bit_charset() {
        let msb = roundtrip(&TYPE_NAME_ENCODER, "Shape2d");
        assert_eq!(msb.encoding, MetaEncoding::LowerUpperDigitSpecial);
    }

    #[test]
    fn unicode_falls_back_to_utf8() {
        let msb = roundtrip(&TYPE_NAME_ENCODER, "类型");
        assert_eq!(msb.encoding, MetaEncoding::Utf8);
    }

    #[test]
    fn empty_fragment() {
        let msb = roundtrip(&NAMESPACE_ENCODER, "");
        assert_eq!(msb.encoding, MetaEncoding::Utf8);
        assert!(msb.data.is_empty());
    }

    #[test]
    fn specials_differ_between_encoders() {
        // '$' is a 5-bit charset member, so nested names stay compact for
        // the type-name encoder.
        let msb = roundtrip(&TYPE_NAME_ENCODER, "outer$inner");
        assert_eq!(msb.encoding, MetaEncoding::LowerSpecial);
        // With digits present, '$' must be one of the 6-bit specials.
        let msb = roundtrip(&TYPE_NAME_ENCODER, "outer$inner2");
        assert_eq!(msb.encoding, MetaEncoding::LowerUpperDigitSpecial);
    }

    #[test]
    fn strip_bit_prevents_phantom_chars() {
        // One 5-bit char: 6 content bits, 2 padding bits -> no strip needed.
        // Three 5-bit chars: 16 content bits, 8 spare bits in 3 bytes ->
        // naive count is 4, strip bit must fire.
        for s in ["a", "ab", "abc", "abcd", "abcde", "abcdef"] {
            roundtrip(&NAMESPACE_ENCODER, s);
        }
    }

    #[test]
    fn hashcode_low_byte_is_encoding() {
        let msb = TYPE_NAME_ENCODER.encode("SomeClassName");
        assert_eq!(
            (msb.hashcode & 0xFF) as u8,
            u8::from(MetaEncoding::AllToLowerSpecial)
        );
        // Same content, same hash; different content, different hash.
        assert_eq!(msb.hashcode, TYPE_NAME_ENCODER.encode("SomeClassName").hashcode);
        assert_ne!(msb.hashcode, TYPE_NAME_ENCODER.encode("OtherClass").hashcode);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        // 0b000_11110 decodes to code 30 in the first position: out of range.
        let bad = vec![0x78, 0x00];
        assert!(TYPE_NAME_ENCODER
            .decode(MetaEncoding::LowerSpecial, &bad)
            .is_err());
    }
}
