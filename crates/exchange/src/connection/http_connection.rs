use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use futures::channel::mpsc;
use futures::{FutureExt, StreamExt};
use http::Version;
use http::header::EXPECT;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, trace, warn};

use super::response_conduit::ResponseConduit;
use crate::buffer::{BufferPool, shared_pool};
use crate::codec::RequestDecoder;
use crate::exchange::{self, Executor, HttpServerExchange};
use crate::handler::HttpHandler;
use crate::options::ServerOptions;
use crate::protocol::body::{ReqBody, body_channel};
use crate::protocol::{HeaderMapExt, HttpError, Message, ParseError, PayloadSize};

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\nConnection: keep-alive\r\n\r\n";

/// How many response messages may wait between the exchange and the transport.
const RESPONSE_CHANNEL_CAPACITY: usize = 8;

/// An HTTP/1.x connection that parses requests, drives them through a handler and writes
/// the responses back.
///
/// `HttpConnection` handles the full lifecycle of a connection:
/// - reading and decoding request heads, then streaming their bodies on demand
/// - answering `Expect: 100-continue`
/// - keeping the connection alive, or closing it, as the exchanges decide
/// - holding back responses while pipelined requests are waiting in the read buffer
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    conduit: ResponseConduit<W>,
    options: Arc<ServerOptions>,
    executor: Option<Arc<dyn Executor>>,
    peer_address: Option<SocketAddr>,
    local_address: Option<SocketAddr>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        let options = Arc::new(ServerOptions::default());
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::with_options(Arc::clone(&options)), options.buffer_size),
            conduit: ResponseConduit::new(writer, shared_pool(), options.buffer_size),
            options,
            executor: None,
            peer_address: None,
            local_address: None,
        }
    }

    /// Replaces the options, must be called before the first request is read.
    pub fn with_options(mut self, options: Arc<ServerOptions>) -> Self {
        let reader = self.framed_read.into_inner();
        self.framed_read = FramedRead::with_capacity(reader, RequestDecoder::with_options(Arc::clone(&options)), options.buffer_size);
        self.conduit.set_buffer_size(options.buffer_size);
        self.options = options;
        self
    }

    pub fn with_buffer_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.conduit.set_pool(pool);
        self
    }

    pub fn with_addresses(mut self, peer_address: Option<SocketAddr>, local_address: Option<SocketAddr>) -> Self {
        self.peer_address = peer_address;
        self.local_address = local_address;
        self
    }

    /// The executor exchanges dispatch to when they don't name one.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Serves requests until the peer closes, a response closes the connection or an error
    /// occurs.
    ///
    /// A malformed request is answered with a fixed `400 Bad Request` and the connection is
    /// closed without calling the handler.
    pub async fn process(mut self, handler: Arc<dyn HttpHandler>) -> Result<(), HttpError> {
        loop {
            // responses held back for the pipeline go out before waiting on the peer
            let next = match self.framed_read.next().now_or_never() {
                Some(next) => next,
                None => {
                    if self.conduit.has_pending() {
                        trace!("flushing pipelined responses");
                        self.conduit.flush().await?;
                    }
                    self.framed_read.next().await
                }
            };

            match next {
                Some(Ok(Message::Header((exchange, payload_size)))) => {
                    if !self.do_process(exchange, payload_size, &handler).await? {
                        debug!("closing non-persistent connection");
                        self.conduit.flush().await?;
                        self.conduit.shutdown().await?;
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("received request body without a request head");
                    self.conduit.write_raw(BAD_REQUEST).await?;
                    self.conduit.shutdown().await?;
                    return Err(ParseError::invalid_body("request body without a request head").into());
                }

                Some(Err(e)) if e.is_io() => {
                    debug!(cause = %e, "connection closed while reading a request");
                    return Err(e.into());
                }

                Some(Err(e)) => {
                    warn!(cause = %e, "malformed request, answering 400");
                    self.conduit.write_raw(BAD_REQUEST).await?;
                    self.conduit.shutdown().await?;
                    return Err(e.into());
                }

                None => {
                    info!("peer closed the connection");
                    self.conduit.flush().await?;
                    return Ok(());
                }
            }
        }
    }

    /// Runs one exchange to its end, returning whether the connection can be reused.
    async fn do_process(
        &mut self,
        mut exchange: Box<HttpServerExchange>,
        payload_size: PayloadSize,
        handler: &Arc<dyn HttpHandler>,
    ) -> Result<bool, HttpError> {
        exchange.set_addresses(self.peer_address, self.local_address);
        exchange.set_default_executor(self.executor.clone());

        if exchange.protocol() == Version::HTTP_11
            && !payload_size.is_empty()
            && exchange.request_headers().contains_token(EXPECT, "100-continue")
        {
            self.conduit.write_raw(CONTINUE).await?;
            debug!("sent 100 continue");
        }

        let (response_sender, response_receiver) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        exchange.attach_response_channel(response_sender);
        let hold = exchange.is_pipelined();

        let (mut body_sender, req_body) = if payload_size.is_empty() {
            (None, ReqBody::empty())
        } else {
            let (sender, body) = body_channel(&mut self.framed_read, payload_size);
            (Some(sender), body)
        };
        exchange.attach_request_body(req_body);

        let (returned, pump_result) = {
            let drive = exchange::drive(exchange, Arc::clone(handler));
            let pump = self.conduit.pump(response_receiver, hold);
            let body = async {
                if let Some(sender) = body_sender.as_mut() {
                    sender.start().await;
                }
            };
            tokio::pin!(drive, pump, body);

            let mut returned = None;
            let mut drive_done = false;
            let mut pump_result = None;
            let mut body_done = false;

            // the body side only moves when the handler asks for data, the other two end the exchange
            while !drive_done || pump_result.is_none() {
                select! {
                    biased;
                    exchange = &mut drive, if !drive_done => {
                        drive_done = true;
                        returned = exchange;
                    }
                    result = &mut pump, if pump_result.is_none() => {
                        pump_result = Some(result);
                    }
                    () = &mut body, if !body_done => {
                        body_done = true;
                    }
                }
            }
            (returned, pump_result)
        };

        if let Some(Err(e)) = pump_result {
            error!(cause = %e, "failed to write response");
            return Err(e.into());
        }

        let Some(mut exchange) = returned else {
            return Ok(false);
        };

        let mut reusable = exchange.is_persistent();
        if let Some(mut sender) = body_sender {
            sender.drain_signals();
            if sender.is_abandoned() || payload_size.is_identity() {
                debug!("request body leaves no reusable connection, closing");
                reusable = false;
            } else if !reusable {
                trace!("not draining request body of a closing connection");
            } else if !sender.is_eof() {
                match sender.skip_data().await {
                    Ok(skipped) => debug!(skipped, "skipped unread request body"),
                    Err(e) => {
                        warn!(cause = %e, "failed to skip request body");
                        reusable = false;
                    }
                }
            }
        }
        exchange.terminate_request();

        if !(reusable && exchange.is_persistent()) {
            return Ok(false);
        }

        let read_buffer = self.framed_read.read_buffer_mut();
        if read_buffer.is_empty() && read_buffer.capacity() > self.options.buffer_size {
            trace!(capacity = read_buffer.capacity(), "releasing idle read buffer");
            *read_buffer = BytesMut::with_capacity(self.options.buffer_size);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxError, make_handler};
    use futures::future::BoxFuture;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    fn hello(exchange: &mut HttpServerExchange) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            exchange.set_response_body("hello")?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn single_request_then_peer_close() {
        let (client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let connection = HttpConnection::new(server_read, server_write);
        let task = tokio::spawn(connection.process(Arc::new(make_handler(hello))));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut response = String::new();
        client_read.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: keep-alive\r\n\r\nhello");
        task.await.unwrap().unwrap();
    }
}
