use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::codec::write_queue::WriteQueue;
use crate::protocol::{PayloadItem, PayloadSize, SendError};
use bytes::Bytes;

/// Frames a response body according to the [`PayloadSize`] chosen when the response committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// content-length payload
    Length(LengthEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// close-delimited payload, bytes pass through as they are
    Identity { eof: bool },

    /// no body may be sent, whatever the handler writes is dropped
    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    pub fn identity() -> Self {
        Self { kind: Kind::Identity { eof: false } }
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::Identity { eof } => *eof,
            Kind::NoBody => true,
        }
    }

    pub fn encode(&mut self, item: PayloadItem<Bytes>, dst: &mut WriteQueue) -> Result<(), SendError> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::Identity { eof } => {
                match item {
                    PayloadItem::Chunk(bytes) => dst.push(bytes),
                    PayloadItem::Eof => *eof = true,
                }
                Ok(())
            }
            Kind::NoBody => Ok(()),
        }
    }
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => PayloadEncoder::fix_length(length),
            PayloadSize::Chunked => PayloadEncoder::chunked(),
            PayloadSize::Empty => PayloadEncoder::empty(),
            PayloadSize::Identity => PayloadEncoder::identity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn encode_all(mut encoder: PayloadEncoder, items: Vec<PayloadItem>) -> Result<Vec<u8>, SendError> {
        let mut queue = WriteQueue::new();
        for item in items {
            encoder.encode(item, &mut queue)?;
        }
        let mut out = Vec::new();
        queue.write_to(&mut out).await?;
        Ok(out)
    }

    fn chunk(s: &'static str) -> PayloadItem {
        PayloadItem::Chunk(Bytes::from_static(s.as_bytes()))
    }

    #[tokio::test]
    async fn chunked_framing() {
        let out = encode_all(PayloadEncoder::chunked(), vec![chunk("hello"), chunk(""), chunk("0123456789abcdef!"), PayloadItem::Eof])
            .await
            .unwrap();
        assert_eq!(out, b"5\r\nhello\r\n11\r\n0123456789abcdef!\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn length_truncates_extra_bytes() {
        let out = encode_all(PayloadEncoder::fix_length(7), vec![chunk("hello"), chunk(" world"), PayloadItem::Eof]).await.unwrap();
        assert_eq!(out, b"hello w");
    }

    #[tokio::test]
    async fn length_rejects_short_body() {
        let result = encode_all(PayloadEncoder::fix_length(10), vec![chunk("short"), PayloadItem::Eof]).await;
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }

    #[tokio::test]
    async fn identity_and_empty() {
        let out = encode_all(PayloadEncoder::identity(), vec![chunk("raw"), chunk(" bytes"), PayloadItem::Eof]).await.unwrap();
        assert_eq!(out, b"raw bytes");

        let out = encode_all(PayloadEncoder::from(PayloadSize::Empty), vec![chunk("dropped"), PayloadItem::Eof]).await.unwrap();
        assert!(out.is_empty());
    }
}
