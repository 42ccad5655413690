//! Resumable serializer for a response head.
//!
//! The status line and header fields are copied into a bounded buffer. When the buffer is
//! full the writer stops at the exact byte it reached (which part, which header, which
//! offset inside it) and continues from there once the buffer has been flushed, so nothing
//! is repeated or skipped however small the buffer is.

use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderName, HeaderValue};

use crate::protocol::ResponseHead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    StatusLine,
    Name,
    Separator,
    Value,
    LineEnd,
    HeadEnd,
    Done,
}

#[derive(Debug)]
pub struct HeadWriter {
    status_line: Vec<u8>,
    headers: Vec<(HeaderName, HeaderValue)>,
    part: Part,
    index: usize,
    offset: usize,
}

impl HeadWriter {
    pub fn new(head: ResponseHead) -> Self {
        let mut status_line = Vec::with_capacity(32);
        // writing into a Vec can't fail
        let _ = write!(status_line, "{} {} {}\r\n", head.protocol(), head.status().as_str(), head.reason());

        let mut headers = Vec::with_capacity(head.headers.len());
        let mut last_name: Option<HeaderName> = None;
        for (name, value) in head.headers {
            // repeated values of a field come without their name
            if let Some(name) = name {
                last_name = Some(name);
            }
            if let Some(name) = &last_name {
                headers.push((name.clone(), value));
            }
        }

        Self { status_line, headers, part: Part::StatusLine, index: 0, offset: 0 }
    }

    pub fn is_done(&self) -> bool {
        self.part == Part::Done
    }

    fn piece(&self) -> Option<&[u8]> {
        let piece = match self.part {
            Part::StatusLine => &self.status_line[..],
            Part::Name => self.headers[self.index].0.as_str().as_bytes(),
            Part::Separator => b": ",
            Part::Value => self.headers[self.index].1.as_bytes(),
            Part::LineEnd | Part::HeadEnd => b"\r\n",
            Part::Done => return None,
        };
        Some(piece)
    }

    fn header_or_end(&self) -> Part {
        if self.index < self.headers.len() { Part::Name } else { Part::HeadEnd }
    }

    fn next_part(&mut self) {
        self.offset = 0;
        self.part = match self.part {
            Part::StatusLine => self.header_or_end(),
            Part::LineEnd => {
                self.index += 1;
                self.header_or_end()
            }
            Part::Name => Part::Separator,
            Part::Separator => Part::Value,
            Part::Value => Part::LineEnd,
            Part::HeadEnd | Part::Done => Part::Done,
        };
    }

    /// Copies the rest of the head into `dst` without letting it grow past `limit` bytes.
    ///
    /// Returns true once the blank line ending the head has been written.
    pub fn write(&mut self, dst: &mut BytesMut, limit: usize) -> bool {
        loop {
            let room = limit.saturating_sub(dst.len());
            let (written, complete) = match self.piece() {
                None => return true,
                Some(_) if room == 0 => return false,
                Some(piece) => {
                    let rest = &piece[self.offset..];
                    let n = rest.len().min(room);
                    dst.put_slice(&rest[..n]);
                    (n, n == rest.len())
                }
            };

            if complete {
                self.next_part();
            } else {
                self.offset += written;
                return false;
            }
        }
    }
}
