//! The seam between the connection and application code.
//!
//! A handler gets exclusive access to the exchange for as long as it runs. It may answer right
//! away, stream a response, or [`dispatch`](crate::exchange::HttpServerExchange::dispatch) the
//! exchange to another handler. Returning an error answers with `500 Internal Server Error`
//! if the response hasn't started yet, and closes the connection otherwise.

use std::error::Error;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::exchange::HttpServerExchange;

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait HttpHandler: Send + Sync {
    async fn handle_request(&self, exchange: &mut HttpServerExchange) -> Result<(), BoxError>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F> HttpHandler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut HttpServerExchange) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync,
{
    async fn handle_request(&self, exchange: &mut HttpServerExchange) -> Result<(), BoxError> {
        (self.f)(exchange).await
    }
}

/// Wraps a function returning a boxed future into an [`HttpHandler`].
///
/// ```
/// use futures::future::BoxFuture;
/// use micro_exchange::exchange::HttpServerExchange;
/// use micro_exchange::handler::{BoxError, make_handler};
///
/// fn hello(exchange: &mut HttpServerExchange) -> BoxFuture<'_, Result<(), BoxError>> {
///     Box::pin(async move {
///         exchange.set_response_body("hello")?;
///         Ok(())
///     })
/// }
///
/// let handler = make_handler(hello);
/// ```
pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut HttpServerExchange) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teapot(exchange: &mut HttpServerExchange) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            exchange.set_status_code(418)?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn function_handler() {
        let handler = make_handler(teapot);
        let mut exchange = HttpServerExchange::default();
        handler.handle_request(&mut exchange).await.unwrap();
        assert_eq!(exchange.status_code(), 418);
    }
}
