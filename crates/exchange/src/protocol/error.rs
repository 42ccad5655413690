use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("exchange error: {source}")]
    ExchangeError {
        #[from]
        source: ExchangeError,
    },
}

/// Failures while reading a request.
///
/// Everything except [`ParseError::Io`] and [`ParseError::EntityTooLarge`] is fatal to the
/// request being parsed: the connection answers with a fixed `400 Bad Request` and closes.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("parameter number exceed the limit {max_num}")]
    TooManyParameters { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {reason}")]
    InvalidVersion { reason: String },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri: {reason}")]
    InvalidUri { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("request entity size {size} exceed the limit {max_size}")]
    EntityTooLarge { size: u64, max_size: u64 },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_many_parameters(max_num: usize) -> Self {
        Self::TooManyParameters { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_version<S: ToString>(str: S) -> Self {
        Self::InvalidVersion { reason: str.to_string() }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn entity_too_large(size: u64, max_size: u64) -> Self {
        Self::EntityTooLarge { size, max_size }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true if the failure came from the transport rather than from the bytes on it.
    pub fn is_io(&self) -> bool {
        matches!(self, ParseError::Io { .. })
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Misuse of the [`HttpServerExchange`](crate::exchange::HttpServerExchange) API.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("response has already started")]
    ResponseStarted,

    #[error("request body read has already started")]
    RequestReadStarted,

    #[error("invalid status code {0}, expect 100..=999")]
    InvalidStatus(u16),

    #[error("reason phrase may only hold visible characters, spaces and tabs")]
    InvalidReasonPhrase,

    #[error("request body has already been taken")]
    RequestBodyTaken,

    #[error("exchange is not in blocking mode")]
    NotBlocking,

    #[error("exchange has already been dispatched in this turn")]
    AlreadyDispatched,
}
