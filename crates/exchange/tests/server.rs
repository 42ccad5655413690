use std::sync::Arc;

use futures::future::BoxFuture;
use micro_exchange::exchange::HttpServerExchange;
use micro_exchange::handler::{BoxError, make_handler};
use micro_exchange::options::ServerOptions;
use micro_exchange::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn addresses(exchange: &mut HttpServerExchange) -> BoxFuture<'_, Result<(), BoxError>> {
    Box::pin(async move {
        let body = match (exchange.peer_address(), exchange.local_address()) {
            (Some(peer), Some(local)) if peer.ip() == local.ip() => "local peer",
            _ => "unknown peer",
        };
        exchange.set_response_body(body)?;
        Ok(())
    })
}

#[tokio::test]
async fn serves_tcp_connections() {
    let server = Server::bind("127.0.0.1:0").await.unwrap().with_options(ServerOptions::new().with_max_headers(8));
    let address = server.local_addr().unwrap();
    tokio::spawn(server.serve(Arc::new(make_handler(addresses))));

    for _ in 0..2 {
        let mut stream = TcpStream::connect(address).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "HTTP/1.1 200 OK\r\ncontent-length: 10\r\nconnection: close\r\n\r\nlocal peer");
    }
}
