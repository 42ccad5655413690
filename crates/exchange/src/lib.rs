//! An embeddable, non-blocking HTTP/1.x server engine.
//!
//! This crate turns raw bytes off a socket into [`HttpServerExchange`](exchange::HttpServerExchange)s,
//! drives each one through a handler and serializes the response back, managing keep-alive,
//! pipelining, chunked and fixed-length framing and `100-continue` along the way. It is built
//! on tokio and meant to sit underneath a routing or application layer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::future::BoxFuture;
//! use micro_exchange::exchange::HttpServerExchange;
//! use micro_exchange::handler::{BoxError, make_handler};
//! use micro_exchange::server::Server;
//!
//! fn hello_world(exchange: &mut HttpServerExchange) -> BoxFuture<'_, Result<(), BoxError>> {
//!     Box::pin(async move {
//!         exchange.response_headers_mut().insert(http::header::CONTENT_TYPE, "text/plain".parse()?);
//!         exchange.set_response_body("Hello World!\r\n")?;
//!         Ok(())
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.serve(Arc::new(make_handler(hello_world))).await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: the resumable request parser, body decoders and encoders, and the framing
//!   decisions for both directions
//! - [`exchange`]: the request/response state, its listeners, dispatch and blocking streams
//! - [`connection`]: the per-connection loop tying the codecs to an exchange and a handler
//! - [`protocol`]: shared message types, header helpers and errors
//! - [`handler`]: the [`HttpHandler`](handler::HttpHandler) seam for application code
//! - [`options`], [`buffer`] and [`server`]: configuration, write buffer pooling and a TCP
//!   accept loop
//!
//! ## Request Processing
//!
//! The parser can stop at any byte and resume when more data arrives. Once a head is complete
//! the body framing is chosen from `Transfer-Encoding`, `Content-Length` and the protocol
//! version, and requests without a body are complete before their handler runs. Request bodies
//! are only read off the connection when the handler asks for them.
//!
//! ## Error Handling
//!
//! - [`protocol::ParseError`]: malformed requests, answered with a fixed `400 Bad Request`
//! - [`protocol::SendError`]: failures while writing a response
//! - [`protocol::ExchangeError`]: misuse of the exchange API, such as changing the status
//!   after the response started
//! - [`protocol::HttpError`]: the union of the above
//!
//! # Limitations
//!
//! - HTTP/1.x only, no HTTP/2 or HTTP/3
//! - No TLS support (use a reverse proxy for HTTPS)
//! - No WebSocket framing, upgrades end at the `101` response head

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod exchange;
pub mod handler;
pub mod options;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
