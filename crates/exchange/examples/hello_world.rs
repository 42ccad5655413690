use std::io::{Read, Write};
use std::sync::Arc;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::BodyExt;
use micro_exchange::exchange::{BlockingExecutor, Executor, HttpServerExchange};
use micro_exchange::handler::{BoxError, HttpHandler};
use micro_exchange::server::Server;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// `/echo` streams the request body back, `/blocking/echo` does the same with blocking I/O on
/// tokio's blocking pool, everything else says hello.
struct Routes {
    blocking: Arc<dyn Executor>,
    blocking_echo: Arc<dyn HttpHandler>,
}

#[async_trait]
impl HttpHandler for Routes {
    async fn handle_request(&self, exchange: &mut HttpServerExchange) -> Result<(), BoxError> {
        info!(method = %exchange.request_method(), path = exchange.request_path(), "receive request");

        match exchange.request_path() {
            "/echo" => {
                let body = exchange.request_body()?.collect().await?.to_bytes();
                exchange.send_data(body).await?;
            }
            "/blocking/echo" => {
                exchange.dispatch(Some(Arc::clone(&self.blocking)), Arc::clone(&self.blocking_echo))?;
            }
            _ => {
                exchange.response_headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                exchange.set_response_body("Hello World!\r\n")?;
            }
        }
        Ok(())
    }
}

struct BlockingEcho;

#[async_trait]
impl HttpHandler for BlockingEcho {
    async fn handle_request(&self, exchange: &mut HttpServerExchange) -> Result<(), BoxError> {
        exchange.start_blocking();
        let mut body = Vec::new();
        exchange.input_stream()?.read_to_end(&mut body)?;
        let mut output = exchange.output_stream()?;
        output.write_all(&body)?;
        output.flush()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = match Server::bind("127.0.0.1:8080").await {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let routes = Routes { blocking: Arc::new(BlockingExecutor::current()), blocking_echo: Arc::new(BlockingEcho) };
    server.serve(Arc::new(routes)).await;
}
