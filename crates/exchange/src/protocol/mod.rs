//! Protocol types shared by the codecs, the exchange and the connection.
//!
//! - [`Message`], [`PayloadItem`] and [`PayloadSize`]: the units flowing between
//!   the codecs and the connection
//! - [`ResponseHead`]: the frozen head of a committed response
//! - [`HeaderMapExt`]: multi-valued header access and the `Connection` token helpers
//! - errors: [`HttpError`], [`ParseError`], [`SendError`] and [`ExchangeError`]
//! - [`body::ReqBody`]: the streaming request body
//!
//! Well-known methods, versions and header names are interned in a private token table.

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::ExchangeError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

mod header;
pub use header::HeaderMapExt;
pub(crate) use header::{connection_close, connection_keep_alive, value_contains_token};

pub(crate) mod token;

pub mod body;
