//! Request body streaming.
//!
//! [`ReqBody`] is the consumer side, it implements `http_body::Body` and lives in the
//! exchange. The producer side reads body frames off the connection only when the consumer
//! asks for data, and drains whatever the handler left unread once the exchange is over.

mod body_channel;
mod req_body;

pub(crate) use body_channel::body_channel;
pub use req_body::ReqBody;
