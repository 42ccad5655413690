//! Connection handling.
//!
//! [`HttpConnection`] owns both halves of a transport. It reads requests one after another,
//! runs each exchange to its end and decides, from the exchange's persistence, whether the
//! next request is read or the connection is closed. Requests are always answered in the
//! order they arrived.

mod http_connection;
mod response_conduit;

pub use http_connection::HttpConnection;
