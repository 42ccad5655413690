//! Incremental UTF-8 validation for decoded URL bytes.
//!
//! Percent-decoded bytes arrive one at a time and a multi-byte sequence can span several
//! `%XX` triplets and several reads, so validation is a table-driven automaton that keeps
//! its state between bytes. Each byte is mapped to a character class, `state + class`
//! indexes the transition table, state 0 accepts and state 12 rejects.

const ACCEPT: u8 = 0;
const REJECT: u8 = 12;

#[rustfmt::skip]
static CHAR_CLASSES: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    8, 8, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    10, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 3, 3,
    11, 6, 6, 6, 5, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
];

#[rustfmt::skip]
static TRANSITIONS: [u8; 108] = [
    0, 12, 24, 36, 60, 96, 84, 12, 12, 12, 48, 72,
    12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12,
    12, 0, 12, 12, 12, 12, 12, 0, 12, 0, 12, 12,
    12, 24, 12, 12, 12, 12, 12, 24, 12, 24, 12, 12,
    12, 12, 12, 12, 12, 12, 12, 24, 12, 12, 12, 12,
    12, 24, 12, 12, 12, 12, 12, 12, 12, 24, 12, 12,
    12, 12, 12, 12, 12, 12, 12, 36, 12, 36, 12, 12,
    12, 36, 12, 12, 12, 12, 12, 36, 12, 36, 12, 12,
    12, 36, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12,
];

/// Raised when a byte can't continue a valid UTF-8 sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InvalidUtf8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Utf8Decoder {
    state: u8,
    code_point: u32,
}

impl Utf8Decoder {
    /// Feeds one byte, returning the completed character if the byte finished one.
    #[inline]
    pub(crate) fn decode(&mut self, byte: u8) -> Result<Option<char>, InvalidUtf8> {
        let class = CHAR_CLASSES[byte as usize];

        self.code_point = if self.state == ACCEPT {
            (0xff_u32 >> class) & u32::from(byte)
        } else {
            u32::from(byte & 0x3f) | (self.code_point << 6)
        };

        self.state = TRANSITIONS[(self.state + class) as usize];
        match self.state {
            ACCEPT => Ok(char::from_u32(self.code_point)),
            REJECT => Err(InvalidUtf8),
            _ => Ok(None),
        }
    }

    /// True when no multi-byte sequence is half way through.
    #[inline]
    pub(crate) fn is_complete(&self) -> bool {
        self.state == ACCEPT
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Result<String, InvalidUtf8> {
        let mut decoder = Utf8Decoder::default();
        let mut out = String::new();
        for b in bytes {
            if let Some(c) = decoder.decode(*b)? {
                out.push(c);
            }
        }
        if decoder.is_complete() { Ok(out) } else { Err(InvalidUtf8) }
    }

    #[test]
    fn decodes_multi_byte_sequences() {
        assert_eq!(decode_all(b"abc").unwrap(), "abc");
        assert_eq!(decode_all(&[0xC3, 0xA9]).unwrap(), "é");
        assert_eq!(decode_all("€".as_bytes()).unwrap(), "€");
        assert_eq!(decode_all("😀".as_bytes()).unwrap(), "😀");
    }

    #[test]
    fn rejects_invalid_sequences() {
        // lone continuation byte
        assert_eq!(decode_all(&[0x80]), Err(InvalidUtf8));
        // overlong encoding of '/'
        assert_eq!(decode_all(&[0xC0, 0xAF]), Err(InvalidUtf8));
        // surrogate half
        assert_eq!(decode_all(&[0xED, 0xA0, 0x80]), Err(InvalidUtf8));
        // above U+10FFFF
        assert_eq!(decode_all(&[0xF4, 0x90, 0x80, 0x80]), Err(InvalidUtf8));
        // truncated
        assert_eq!(decode_all(&[0xE2, 0x82]), Err(InvalidUtf8));
    }

    #[test]
    fn state_survives_between_calls() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(0xE2), Ok(None));
        assert!(!decoder.is_complete());
        assert_eq!(decoder.decode(0x82), Ok(None));
        assert_eq!(decoder.decode(0xAC), Ok(Some('€')));
        assert!(decoder.is_complete());
    }
}
