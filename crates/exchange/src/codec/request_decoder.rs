//! Request decoding for [`FramedRead`](tokio_util::codec::FramedRead).
//!
//! The decoder operates in two phases:
//! 1. Head parsing: the [`RequestParser`] fills a fresh [`HttpServerExchange`] until the head
//!    is complete, then the framing of the body is decided.
//! 2. Payload parsing: if the request has a body, a [`PayloadDecoder`] yields it chunk by
//!    chunk, ending with [`PayloadItem::Eof`].
//!
//! The decoder maintains its state through the `payload_decoder` field:
//! - `None`: currently parsing a head
//! - `Some(PayloadDecoder)`: currently parsing a body

use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::body::PayloadDecoder;
use super::parser::{ParseState, RequestParser};
use super::transfer_encoding;
use crate::ensure;
use crate::exchange::HttpServerExchange;
use crate::options::ServerOptions;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize};

#[derive(Debug)]
pub struct RequestDecoder {
    options: Arc<ServerOptions>,
    parser: RequestParser,
    state: ParseState,
    exchange: Option<Box<HttpServerExchange>>,
    header_bytes: usize,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Arc<ServerOptions>) -> Self {
        Self {
            parser: RequestParser::new(&options),
            options,
            state: ParseState::new(),
            exchange: None,
            header_bytes: 0,
            payload_decoder: None,
        }
    }

    /// True between requests, when nothing of the next one has been read yet.
    pub fn is_idle(&self) -> bool {
        self.payload_decoder.is_none() && self.state.is_idle()
    }

    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<(Box<HttpServerExchange>, PayloadSize)>, ParseError> {
        let options = &self.options;
        let exchange = self.exchange.get_or_insert_with(|| Box::new(HttpServerExchange::new(Arc::clone(options))));

        let before = src.len();
        let result = self.parser.handle(src, &mut self.state, exchange);
        self.header_bytes += before - src.len();

        let max_size = self.options.max_header_size;
        ensure!(self.header_bytes <= max_size, ParseError::too_large_header(self.header_bytes, max_size));
        result?;

        if !self.state.is_complete() {
            return Ok(None);
        }

        self.state.reset();
        self.header_bytes = 0;
        let Some(mut exchange) = self.exchange.take() else {
            return Ok(None);
        };

        let payload_size = transfer_encoding::configure_request(&mut exchange, !src.is_empty());
        if !payload_size.is_empty() {
            self.payload_decoder = Some(payload_size.into());
        }
        Ok(Some((exchange, payload_size)))
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::with_options(Arc::new(ServerOptions::default()))
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(Box<HttpServerExchange>, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        if src.is_empty() {
            return Ok(None);
        }

        Ok(self.decode_head(src)?.map(Message::Header))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        match &self.payload_decoder {
            Some(decoder) if decoder.is_identity() => {
                self.payload_decoder = None;
                Ok(Some(Message::Payload(PayloadItem::Eof)))
            }
            Some(_) => Err(ParseError::io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed inside a request body"))),
            None if self.state.is_idle() && src.is_empty() => Ok(None),
            None => Err(ParseError::io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed inside a request head"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use http::{Method, header};
    use indoc::indoc;
    use tokio_util::codec::FramedRead;

    async fn decode_all(input: &'static [u8], options: ServerOptions) -> Vec<Result<Message<(Box<HttpServerExchange>, PayloadSize)>, ParseError>> {
        FramedRead::new(input, RequestDecoder::with_options(Arc::new(options))).collect().await
    }

    fn body(messages: &[Result<Message<(Box<HttpServerExchange>, PayloadSize)>, ParseError>]) -> Vec<u8> {
        messages
            .iter()
            .filter_map(|message| match message {
                Ok(Message::Payload(PayloadItem::Chunk(bytes))) => Some(bytes.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[tokio::test]
    async fn get_then_post() {
        let input = indoc! {"
            GET /a HTTP/1.1\r
            Host: example.com\r
            \r
            POST /b HTTP/1.1\r
            Host: example.com\r
            Content-Length: 5\r
            \r
            hello"};

        let messages = decode_all(input.as_bytes(), ServerOptions::default()).await;
        assert_eq!(messages.len(), 4);

        let Ok(Message::Header((first, size))) = &messages[0] else { panic!("expected a head") };
        assert_eq!(first.request_path(), "/a");
        assert_eq!(*size, PayloadSize::Empty);
        assert!(first.is_request_complete());
        assert!(first.is_pipelined());

        let Ok(Message::Header((second, size))) = &messages[1] else { panic!("expected a head") };
        assert_eq!(second.request_method(), Method::POST);
        assert_eq!(*size, PayloadSize::Length(5));
        assert!(!second.is_request_complete());

        assert_eq!(body(&messages), b"hello");
        assert!(matches!(messages[3], Ok(Message::Payload(PayloadItem::Eof))));
    }

    #[tokio::test]
    async fn chunked_body() {
        let input = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let messages = decode_all(input, ServerOptions::default()).await;
        assert_eq!(body(&messages), b"hello world");
        assert!(matches!(messages.last(), Some(Ok(Message::Payload(PayloadItem::Eof)))));
    }

    #[tokio::test]
    async fn header_block_limit() {
        let input = b"GET / HTTP/1.1\r\nX-Long: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n";
        let messages = decode_all(input, ServerOptions::new().with_max_header_size(32)).await;
        assert!(matches!(messages.last(), Some(Err(ParseError::TooLargeHeader { max_size: 32, .. }))));
    }

    #[tokio::test]
    async fn close_inside_head_is_an_error() {
        let messages = decode_all(b"GET /index.html HTTP/1.1\r\nHost: a", ServerOptions::default()).await;
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], Err(e) if e.is_io()));
    }

    #[tokio::test]
    async fn close_between_requests_is_clean() {
        let messages = decode_all(b"GET / HTTP/1.1\r\n\r\n", ServerOptions::default()).await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_ok());
    }

    #[tokio::test]
    async fn close_inside_fixed_body_is_an_error() {
        let messages = decode_all(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nhel", ServerOptions::default()).await;
        assert_eq!(body(&messages), b"hel");
        assert!(matches!(messages.last(), Some(Err(e)) if e.is_io()));
    }

    #[tokio::test]
    async fn malformed_length_reads_until_close() {
        let messages = decode_all(b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\nuntil the end", ServerOptions::default()).await;

        let Ok(Message::Header((exchange, size))) = &messages[0] else { panic!("expected a head") };
        assert_eq!(*size, PayloadSize::Identity);
        assert!(!exchange.is_persistent());
        assert_eq!(exchange.request_headers().get(header::CONTENT_LENGTH).unwrap(), "ten");

        assert_eq!(body(&messages), b"until the end");
        assert!(matches!(messages.last(), Some(Ok(Message::Payload(PayloadItem::Eof)))));
    }
}
