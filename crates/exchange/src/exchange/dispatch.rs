use std::fmt::Debug;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use http::StatusCode;
use tokio::runtime::Handle;
use tracing::{error, trace, warn};

use super::HttpServerExchange;
use crate::handler::HttpHandler;

/// Somewhere a dispatched handler can run.
pub trait Executor: Send + Sync + Debug {
    fn execute(&self, task: BoxFuture<'static, ()>);
}

impl Executor for Handle {
    fn execute(&self, task: BoxFuture<'static, ()>) {
        self.spawn(task);
    }
}

/// Runs dispatched handlers on tokio's blocking thread pool.
///
/// Handlers running here may use the blocking streams of the exchange. Needs a multi-threaded
/// runtime.
#[derive(Debug, Clone)]
pub struct BlockingExecutor {
    handle: Handle,
}

impl BlockingExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Executor for BlockingExecutor {
    fn execute(&self, task: BoxFuture<'static, ()>) {
        let handle = self.handle.clone();
        self.handle.spawn_blocking(move || handle.block_on(task));
    }
}

async fn run(exchange: &mut HttpServerExchange, handler: &dyn HttpHandler) {
    exchange.flags.in_call = true;
    exchange.flags.dispatched = false;
    let result = handler.handle_request(exchange).await;
    exchange.flags.in_call = false;

    if let Err(e) = result {
        error!(cause = %e, uri = exchange.request_uri(), "handler failed");
        exchange.pending_dispatch = None;
        exchange.flags.dispatched = false;
        if exchange.is_response_started() {
            exchange.set_persistent(false);
        } else {
            exchange.response_headers_mut().clear();
            exchange.response_body = None;
            exchange.reason = None;
            exchange.status = StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
}

/// Runs `handler` and every handler it dispatches to, then ends the exchange.
///
/// Returns `None` when the exchange was lost on an executor, the connection can't continue then.
pub(crate) async fn drive(mut exchange: Box<HttpServerExchange>, handler: Arc<dyn HttpHandler>) -> Option<Box<HttpServerExchange>> {
    run(&mut exchange, handler.as_ref()).await;

    while let Some((executor, next)) = exchange.pending_dispatch.take() {
        match executor {
            Some(executor) => {
                trace!(?executor, "running dispatched handler");
                let (sender, receiver) = oneshot::channel();
                executor.execute(Box::pin(async move {
                    let mut exchange = exchange;
                    run(&mut exchange, next.as_ref()).await;
                    if sender.send(exchange).is_err() {
                        warn!("connection went away while a dispatched handler was running");
                    }
                }));
                match receiver.await {
                    Ok(returned) => exchange = returned,
                    Err(_canceled) => {
                        error!("dispatched task dropped the exchange");
                        return None;
                    }
                }
            }
            None => run(&mut exchange, next.as_ref()).await,
        }
    }

    exchange.end_exchange().await;
    Some(exchange)
}
