//! A TCP accept loop serving every connection with one handler.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info, warn};

use crate::buffer::{BufferPool, shared_pool};
use crate::connection::HttpConnection;
use crate::exchange::Executor;
use crate::handler::HttpHandler;
use crate::options::ServerOptions;

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    options: Arc<ServerOptions>,
    pool: Arc<dyn BufferPool>,
    executor: Option<Arc<dyn Executor>>,
}

impl Server {
    pub async fn bind<A: ToSocketAddrs>(address: A) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, options: Arc::new(ServerOptions::default()), pool: shared_pool(), executor: None })
    }

    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn with_buffer_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, each one served on its own task.
    pub async fn serve(self, handler: Arc<dyn HttpHandler>) {
        match self.listener.local_addr() {
            Ok(address) => info!(%address, "start listening"),
            Err(e) => warn!(cause = %e, "listening on an unknown address"),
        }

        loop {
            let (tcp_stream, peer_address) = match self.listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            if let Err(e) = tcp_stream.set_nodelay(true) {
                warn!(cause = %e, "failed to set TCP_NODELAY");
            }
            let local_address = tcp_stream.local_addr().ok();

            let mut connection = {
                let (reader, writer) = tcp_stream.into_split();
                HttpConnection::new(reader, writer)
                    .with_options(Arc::clone(&self.options))
                    .with_buffer_pool(Arc::clone(&self.pool))
                    .with_addresses(Some(peer_address), local_address)
            };
            if let Some(executor) = &self.executor {
                connection = connection.with_executor(Arc::clone(executor));
            }

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                match connection.process(handler).await {
                    Ok(()) => info!(%peer_address, "finished process, connection shutdown"),
                    Err(e) => error!(%peer_address, cause = %e, "connection closed with error"),
                }
            });
        }
    }
}
