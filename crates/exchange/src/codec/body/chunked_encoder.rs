use crate::codec::write_queue::WriteQueue;
use crate::protocol::{PayloadItem, SendError};
use bytes::Bytes;
use std::io::Write;

/// Frames each chunk as `size CRLF data CRLF` and the end as a zero-size chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }

    pub fn encode(&mut self, item: PayloadItem<Bytes>, dst: &mut WriteQueue) -> Result<(), SendError> {
        if self.eof {
            return Ok(());
        }

        match item {
            // an empty chunk would read as the last one
            PayloadItem::Chunk(bytes) if bytes.is_empty() => Ok(()),
            PayloadItem::Chunk(bytes) => {
                write!(dst, "{:X}\r\n", bytes.len())?;
                dst.push(bytes);
                dst.push_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.push_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}
