//! Outbound bytes waiting for the transport.
//!
//! Small pieces (status line, chunk size lines, CRLFs) are collected in a scratch buffer,
//! body chunks are queued as they are so they reach the socket without being copied. The
//! queue is drained with vectored writes, which is what turns a head followed by its first
//! body chunk into one gather-write.

use std::collections::VecDeque;
use std::io::{self, IoSlice};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

const MAX_IO_SLICES: usize = 64;

#[derive(Debug, Default)]
pub struct WriteQueue {
    queue: VecDeque<Bytes>,
    scratch: BytesMut,
    len: usize,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `bytes` without copying them.
    pub fn push(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.seal();
        self.len += bytes.len();
        self.queue.push_back(bytes);
    }

    /// Copies `bytes` into the scratch buffer.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        self.scratch.put_slice(bytes);
        self.len += bytes.len();
    }

    /// Number of bytes not written yet.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn seal(&mut self) {
        if !self.scratch.is_empty() {
            self.queue.push_back(self.scratch.split().freeze());
        }
    }

    /// Writes everything queued to `writer`, continuing after partial writes.
    pub async fn write_to<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.seal();

        while !self.queue.is_empty() {
            let written = {
                let slices: Vec<IoSlice<'_>> = self.queue.iter().take(MAX_IO_SLICES).map(|b| IoSlice::new(b)).collect();
                writer.write_vectored(&slices).await?
            };

            if written == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write queued response bytes"));
            }
            self.advance(written);
        }
        Ok(())
    }

    fn advance(&mut self, mut written: usize) {
        self.len -= written;
        while written > 0 {
            let Some(front) = self.queue.front_mut() else {
                return;
            };
            if front.len() > written {
                front.advance(written);
                return;
            }
            written -= front.len();
            self.queue.pop_front();
        }
    }
}

impl io::Write for WriteQueue {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Accepts at most `max` bytes per write call.
    struct Trickle {
        out: Vec<u8>,
        max: usize,
    }

    impl AsyncWrite for Trickle {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.max);
            self.out.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn keeps_order_across_partial_writes() {
        let mut queue = WriteQueue::new();
        queue.push_slice(b"HTTP/1.1 200 OK\r\n\r\n");
        queue.push(Bytes::from_static(b"hello "));
        write!(queue, "{:X}\r\n", 255).unwrap();
        queue.push(Bytes::from_static(b"world"));
        assert_eq!(queue.len(), 19 + 6 + 4 + 5);

        let mut writer = Trickle { out: Vec::new(), max: 3 };
        queue.write_to(&mut writer).await.unwrap();

        assert!(queue.is_empty());
        assert_eq!(writer.out, b"HTTP/1.1 200 OK\r\n\r\nhello FF\r\nworld");
    }

    #[tokio::test]
    async fn drains_into_any_writer() {
        let mut queue = WriteQueue::new();
        queue.push_slice(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n");
        queue.push(Bytes::from_static(b"hello"));

        let mut writer = tokio::io::sink();
        queue.write_to(&mut writer).await.unwrap();
        assert!(queue.is_empty());

        let mut writer = Trickle { out: Vec::new(), max: usize::MAX };
        queue.push_slice(b"a");
        queue.push(Bytes::from_static(b"b"));
        queue.write_to(&mut writer).await.unwrap();
        assert_eq!(writer.out, b"ab");
    }
}
