//! Body framing for requests and responses.
//!
//! Decoders turn the bytes after a request head into [`PayloadItem`](crate::protocol::PayloadItem)s,
//! encoders frame response [`PayloadItem`](crate::protocol::PayloadItem)s onto a
//! [`WriteQueue`](crate::codec::WriteQueue). Both pick their framing once per message from a
//! [`PayloadSize`](crate::protocol::PayloadSize).

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
