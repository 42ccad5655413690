use crate::codec::write_queue::WriteQueue;
use crate::protocol::{PayloadItem, SendError};
use bytes::Bytes;
use tracing::warn;

/// Passes through exactly the declared number of bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }

    pub fn encode(&mut self, item: PayloadItem<Bytes>, dst: &mut WriteQueue) -> Result<(), SendError> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                if self.length == 0 {
                    warn!(size = bytes.len(), "dropping response bytes beyond content-length");
                    return Ok(());
                }
                if bytes.len() as u64 > self.length {
                    warn!(size = bytes.len(), remaining = self.length, "truncating response bytes beyond content-length");
                    // length is smaller than a usize here
                    bytes.truncate(usize::try_from(self.length).unwrap_or(usize::MAX));
                }
                self.length -= bytes.len() as u64;
                dst.push(bytes);
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                if self.length > 0 {
                    return Err(SendError::invalid_body(format!(
                        "response body ended {} bytes before its content-length",
                        self.length
                    )));
                }
                Ok(())
            }
        }
    }
}
