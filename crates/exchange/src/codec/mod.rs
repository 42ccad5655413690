//! Wire-level encoding and decoding.
//!
//! - Request side: [`RequestDecoder`] drives the incremental [`parser`] and, once a head is
//!   complete, the body [`PayloadDecoder`] picked for it.
//! - Response side: [`HeadWriter`] serializes a committed head in bounded steps and
//!   [`PayloadEncoder`] frames the body, both writing into a [`WriteQueue`].
//!
//! Which body framing applies to a message, and whether the connection survives it, is decided
//! in one place for both directions.

mod body;
mod header;
pub mod parser;
mod request_decoder;
pub(crate) mod transfer_encoding;
mod write_queue;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use header::HeadWriter;
pub use request_decoder::RequestDecoder;
pub use write_queue::WriteQueue;
