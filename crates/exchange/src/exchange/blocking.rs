//! `std::io` adapters over the request and response bodies.
//!
//! They park the calling thread until the connection catches up, so they can only be used by a
//! handler running off the async worker threads, typically one dispatched to a
//! [`BlockingExecutor`](super::BlockingExecutor).

use std::io::{self, Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use futures::executor::block_on;
use http_body_util::BodyExt;
use tracing::warn;

use super::HttpServerExchange;
use crate::ensure;
use crate::protocol::ExchangeError;
use crate::protocol::body::ReqBody;

impl HttpServerExchange {
    /// A blocking reader over the request body. Takes the body like
    /// [`HttpServerExchange::request_body`] does, but stays in blocking mode.
    pub fn input_stream(&mut self) -> Result<BlockingInput, ExchangeError> {
        ensure!(self.is_blocking(), ExchangeError::NotBlocking);
        Ok(BlockingInput::new(self.take_request_body()?))
    }

    /// A blocking, buffered writer over the response body.
    pub fn output_stream(&mut self) -> Result<BlockingOutput<'_>, ExchangeError> {
        ensure!(self.is_blocking(), ExchangeError::NotBlocking);
        ensure!(!self.is_dispatched(), ExchangeError::AlreadyDispatched);
        Ok(BlockingOutput::new(self))
    }
}

#[derive(Debug)]
pub struct BlockingInput {
    body: ReqBody,
    current: Bytes,
}

impl BlockingInput {
    fn new(body: ReqBody) -> Self {
        Self { body, current: Bytes::new() }
    }
}

impl Read for BlockingInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.current.is_empty() {
            match block_on(self.body.frame()) {
                None => return Ok(0),
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.current = data;
                    }
                }
                Some(Err(e)) => return Err(io::Error::other(e)),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

/// Collects writes into chunks of the configured buffer size before sending them.
///
/// Whatever is left is sent on [`Write::flush`] or when the stream is dropped.
#[derive(Debug)]
pub struct BlockingOutput<'a> {
    exchange: &'a mut HttpServerExchange,
    buffer: BytesMut,
    capacity: usize,
}

impl<'a> BlockingOutput<'a> {
    fn new(exchange: &'a mut HttpServerExchange) -> Self {
        let capacity = exchange.options().buffer_size.max(1);
        Self { exchange, buffer: BytesMut::with_capacity(capacity), capacity }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = self.buffer.split().freeze();
        block_on(self.exchange.write_body(data)).map_err(io::Error::other)
    }
}

impl Write for BlockingOutput<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.capacity - self.buffer.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() >= self.capacity {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

impl Drop for BlockingOutput<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.send_buffered() {
            warn!(cause = %e, "failed to flush blocking output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ServerOptions;
    use crate::protocol::{Message, PayloadItem};
    use futures::StreamExt;
    use futures::channel::mpsc;
    use std::sync::Arc;

    #[test]
    fn streams_require_blocking_mode() {
        let mut exchange = HttpServerExchange::default();
        assert_eq!(exchange.input_stream().err(), Some(ExchangeError::NotBlocking));
        assert_eq!(exchange.output_stream().err(), Some(ExchangeError::NotBlocking));

        exchange.start_blocking();
        let mut input = exchange.input_stream().unwrap();
        let mut read = Vec::new();
        assert_eq!(input.read_to_end(&mut read).unwrap(), 0);
    }

    #[test]
    fn last_requested_mode_wins() {
        let mut exchange = HttpServerExchange::default();
        let (sender, _receiver) = mpsc::channel(16);
        exchange.attach_response_channel(sender);

        exchange.start_blocking();
        block_on(exchange.send_data("async")).unwrap();
        assert!(!exchange.is_blocking());
        assert_eq!(exchange.output_stream().err(), Some(ExchangeError::NotBlocking));

        exchange.start_blocking();
        {
            let mut output = exchange.output_stream().unwrap();
            output.write_all(b"blocking").unwrap();
        }
        assert!(exchange.is_blocking());
        assert!(matches!(exchange.output_stream(), Ok(_)));

        let body = exchange.request_body().unwrap();
        assert!(body.is_finished());
        assert!(!exchange.is_blocking());
        assert_eq!(exchange.input_stream().err(), Some(ExchangeError::NotBlocking));
        assert_eq!(exchange.bytes_sent(), 13);
    }

    #[test]
    fn output_is_sent_in_buffer_sized_chunks() {
        let options = ServerOptions::new().with_buffer_size(4);
        let mut exchange = HttpServerExchange::new(Arc::new(options));
        let (sender, receiver) = mpsc::channel(16);
        exchange.attach_response_channel(sender);
        exchange.start_blocking();

        {
            let mut output = exchange.output_stream().unwrap();
            output.write_all(b"hello world").unwrap();
        }
        exchange.response_channel = None;

        let chunks: Vec<_> = block_on(receiver.collect::<Vec<_>>())
            .into_iter()
            .filter_map(|message| match message {
                Message::Payload(PayloadItem::Chunk(bytes)) => Some(bytes),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec![Bytes::from("hell"), Bytes::from("o wo"), Bytes::from("rld")]);
        assert_eq!(exchange.bytes_sent(), 11);
    }
}
