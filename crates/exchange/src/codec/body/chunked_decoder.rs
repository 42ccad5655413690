//! Decoder for `Transfer-Encoding: chunked` request bodies, RFC 7230 §4.1.
//!
//! Chunk extensions and trailer fields are validated for framing and then dropped.

use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::{
    Body, BodyCr, BodyLf, End, EndCr, EndLf, Extension, Size, SizeDigits, SizeLf, SizeLws, Trailer, TrailerLf,
};
use bytes::{Buf, Bytes, BytesMut};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// first hex digit of the chunk size
    Size,
    /// further hex digits of the chunk size
    SizeDigits,
    /// whitespace after the size
    SizeLws,
    /// `;name=value` after the size, ignored
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    /// a trailer field line, ignored
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut buf = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(result) => result?,
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.has_remaining() {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

fn invalid(reason: &str) -> Poll<Result<ChunkedState, ParseError>> {
    Poll::Ready(Err(ParseError::invalid_body(reason)))
}

impl ChunkedState {
    fn step(
        self,
        src: &mut BytesMut,
        remaining_size: &mut u64,
        buf: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        match self {
            Size => Self::read_first_size_digit(src, remaining_size),
            SizeDigits => Self::read_size(src, remaining_size),
            SizeLws => Self::read_size_lws(src),
            Extension => Self::read_extension(src),
            SizeLf => Self::read_size_lf(src, *remaining_size),
            Body => Self::read_body(src, remaining_size, buf),
            BodyCr => Self::expect(src, b'\r', BodyLf, "invalid chunk body CR"),
            BodyLf => Self::expect(src, b'\n', Size, "invalid chunk body LF"),
            Trailer => Self::read_trailer(src),
            TrailerLf => Self::expect(src, b'\n', EndCr, "invalid trailer end LF"),
            EndCr => Self::read_end_cr(src),
            EndLf => Self::expect(src, b'\n', End, "invalid chunk end LF"),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn expect(src: &mut BytesMut, expected: u8, next: ChunkedState, reason: &str) -> Poll<Result<ChunkedState, ParseError>> {
        if try_next_byte!(src) == expected { Poll::Ready(Ok(next)) } else { invalid(reason) }
    }

    fn read_first_size_digit(src: &mut BytesMut, size: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        match src.first() {
            Some(b) if b.is_ascii_hexdigit() => Self::read_size(src, size),
            Some(_) => invalid("invalid chunk size line: missing size"),
            None => Poll::Pending,
        }
    }

    fn read_size(src: &mut BytesMut, size: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return invalid("invalid chunk size line: Invalid Size"),
        };

        match size.checked_mul(16).and_then(|s| s.checked_add(u64::from(digit))) {
            Some(new_size) => {
                *size = new_size;
                Poll::Ready(Ok(SizeDigits))
            }
            None => invalid("invalid overflow chunked length"),
        }
    }

    fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            // no more digits can follow the whitespace
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => invalid("invalid chunk size linear white space"),
        }
    }

    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        // a bare LF would let a lenient peer see a different chunk boundary
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => invalid("invalid chunk extension contains newline"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size: u64) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' if size == 0 => Poll::Ready(Ok(EndCr)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => invalid("invalid chunk size LF"),
        }
    }

    fn read_body(src: &mut BytesMut, size: &mut u64, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        if *size == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let read_size = usize::try_from(*size).map_or(src.len(), |remaining| remaining.min(src.len()));
        *size -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if *size > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_trailer(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(item: Option<PayloadItem>) -> Bytes {
        item.and_then(PayloadItem::into_bytes).expect("expected a chunk")
    }

    #[test]
    fn test_basic() {
        let mut buffer = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(decoder.decode(&mut buffer).unwrap())[..], b"1234567890abcdef");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(decoder.decode(&mut buffer).unwrap())[..], b"hello");
        assert_eq!(&chunk(decoder.decode(&mut buffer).unwrap())[..], b", world");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_extensions_and_trailers() {
        let mut buffer = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\nTrailer: value\r\n\r\nGET"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(decoder.decode(&mut buffer).unwrap())[..], b"hello");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        // the next pipelined request stays untouched
        assert_eq!(&buffer[..], b"GET");
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(decoder.decode(&mut buffer).unwrap())[..], b"hel");
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"lo\r\n0\r");
        assert_eq!(&chunk(decoder.decode(&mut buffer).unwrap())[..], b"lo");
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"\n\r\n");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_invalid_framing() {
        let mut decoder = ChunkedDecoder::new();
        assert!(matches!(decoder.decode(&mut BytesMut::from(&b"xyz\r\n"[..])), Err(ParseError::InvalidBody { .. })));

        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"5\r\nhelloBad"[..]);
        assert_eq!(&chunk(decoder.decode(&mut buffer).unwrap())[..], b"hello");
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidBody { .. })));

        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"5;ext\nhello"[..]);
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidBody { .. })));

        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidBody { .. })));
    }

    #[test]
    fn test_size_line_needs_a_digit() {
        let inputs: [&[u8]; 3] = [b"\r\n\r\n", b";ext\r\nhello\r\n", b" 5\r\nhello\r\n"];
        for input in inputs {
            let mut decoder = ChunkedDecoder::new();
            let mut buffer = BytesMut::from(input);
            assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidBody { .. })), "{input:?}");
        }

        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"0\r\n"[..]);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        buffer.extend_from_slice(b"\r\n");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_large_chunk() {
        let size = 1024 * 1024;
        let mut data = format!("{size:x}\r\n").into_bytes();
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let mut buffer = BytesMut::from(&data[..]);
        let mut decoder = ChunkedDecoder::new();

        let bytes = chunk(decoder.decode(&mut buffer).unwrap());
        assert_eq!(bytes.len(), size);
        assert!(bytes.iter().all(|&b| b == b'A'));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
