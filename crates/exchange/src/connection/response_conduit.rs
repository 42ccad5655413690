use std::sync::Arc;

use futures::StreamExt;
use futures::channel::mpsc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, trace};

use crate::buffer::{BufferPool, PooledBuffer};
use crate::codec::{HeadWriter, PayloadEncoder, WriteQueue};
use crate::exchange::ResponseMessage;
use crate::protocol::{Message, ResponseHead, SendError};

/// The write half of a connection.
///
/// Response heads are staged in a pooled buffer and body chunks are framed onto the write
/// queue. Nothing reaches the transport before a chunk is written or [`ResponseConduit::flush`]
/// is called, which is what lets responses to pipelined requests share writes.
#[derive(Debug)]
pub(crate) struct ResponseConduit<W> {
    writer: W,
    pool: Arc<dyn BufferPool>,
    queue: WriteQueue,
    encoder: Option<PayloadEncoder>,
    buffer_size: usize,
}

impl<W> ResponseConduit<W>
where
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(writer: W, pool: Arc<dyn BufferPool>, buffer_size: usize) -> Self {
        Self { writer, pool, queue: WriteQueue::new(), encoder: None, buffer_size }
    }

    pub(crate) fn set_pool(&mut self, pool: Arc<dyn BufferPool>) {
        self.pool = pool;
    }

    pub(crate) fn set_buffer_size(&mut self, buffer_size: usize) {
        self.buffer_size = buffer_size;
    }

    /// Writes one response as the exchange hands it over, until the exchange drops its sender.
    ///
    /// With `hold` set, body chunks stay queued until a buffer's worth has accumulated.
    pub(crate) async fn pump(&mut self, mut receiver: mpsc::Receiver<ResponseMessage>, hold: bool) -> Result<(), SendError> {
        while let Some(message) = receiver.next().await {
            match message {
                Message::Header((head, payload_size)) => {
                    trace!(status = head.status().as_u16(), ?payload_size, "writing response head");
                    self.encoder = Some(payload_size.into());
                    self.write_head(head).await?;
                }
                Message::Payload(item) => {
                    let Some(encoder) = &mut self.encoder else {
                        error!("response body arrived before its head");
                        return Err(SendError::invalid_body("response body arrived before its head"));
                    };
                    let is_chunk = item.is_chunk();
                    encoder.encode(item, &mut self.queue)?;

                    if is_chunk && (!hold || self.queue.len() >= self.buffer_size) {
                        self.queue.write_to(&mut self.writer).await?;
                    }
                }
            }
        }

        if self.encoder.take().is_some_and(|encoder| !encoder.is_finish()) {
            return Err(SendError::invalid_body("response ended before its body was complete"));
        }
        Ok(())
    }

    async fn write_head(&mut self, head: ResponseHead) -> Result<(), SendError> {
        let mut writer = HeadWriter::new(head);
        let mut buffer = PooledBuffer::acquire(&self.pool);
        let limit = buffer.limit().max(1);

        while !writer.write(&mut buffer, limit) {
            self.queue.push_slice(&buffer);
            buffer.clear();
            self.queue.write_to(&mut self.writer).await?;
        }
        self.queue.push_slice(&buffer);
        Ok(())
    }

    /// Writes bytes that bypass response framing, then flushes.
    pub(crate) async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.queue.push_slice(bytes);
        self.flush().await
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub(crate) async fn flush(&mut self) -> Result<(), SendError> {
        self.queue.write_to(&mut self.writer).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) -> Result<(), SendError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SimpleBufferPool;
    use crate::protocol::{PayloadItem, PayloadSize};
    use bytes::Bytes;
    use futures::SinkExt;
    use http::{HeaderMap, HeaderValue, StatusCode, Version, header};

    fn head(headers: &[(header::HeaderName, &'static str)]) -> ResponseHead {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(name.clone(), HeaderValue::from_static(*value));
        }
        ResponseHead::new(Version::HTTP_11, StatusCode::OK, map)
    }

    async fn run(messages: Vec<ResponseMessage>, pool_buffer_size: usize) -> (Result<(), SendError>, Vec<u8>) {
        let pool: Arc<dyn BufferPool> = Arc::new(SimpleBufferPool::new(pool_buffer_size, 4));
        let mut conduit = ResponseConduit::new(Vec::new(), pool, 1024);
        let (mut sender, receiver) = mpsc::channel(16);
        for message in messages {
            sender.send(message).await.unwrap();
        }
        drop(sender);

        let result = conduit.pump(receiver, false).await;
        conduit.flush().await.unwrap();
        (result, conduit.writer)
    }

    #[tokio::test]
    async fn chunked_response() {
        let messages = vec![
            Message::Header((head(&[(header::TRANSFER_ENCODING, "chunked")]), PayloadSize::Chunked)),
            Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello"))),
            Message::Payload(PayloadItem::Eof),
        ];
        let (result, written) = run(messages, 8).await;
        result.unwrap();
        assert_eq!(written, b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn head_larger_than_pooled_buffer() {
        let messages = vec![
            Message::Header((head(&[(header::CONTENT_LENGTH, "0"), (header::SERVER, "micro-exchange")]), PayloadSize::Empty)),
            Message::Payload(PayloadItem::Eof),
        ];
        let (result, written) = run(messages, 3).await;
        result.unwrap();
        assert_eq!(written, b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nserver: micro-exchange\r\n\r\n");
    }

    #[tokio::test]
    async fn short_body_is_reported() {
        let messages = vec![
            Message::Header((head(&[(header::CONTENT_LENGTH, "10")]), PayloadSize::Length(10))),
            Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"short"))),
        ];
        let (result, _) = run(messages, 64).await;
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }

    #[tokio::test]
    async fn body_without_head_is_rejected() {
        let messages = vec![Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"orphan")))];
        let (result, written) = run(messages, 64).await;
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
        assert!(written.is_empty());
    }
}
