//! Message framing and connection persistence.
//!
//! [`configure_request`] runs once the request head is parsed and decides how the request body
//! is delimited. [`configure_response`] runs when the response commits, works out how the
//! response body is delimited and rewrites the `Connection` header to match the final
//! persistence decision.

use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use tracing::{debug, warn};

use crate::exchange::HttpServerExchange;
use crate::protocol::{PayloadSize, connection_close, connection_keep_alive, value_contains_token};

/// `Transfer-Encoding` is present and names something other than `identity`.
fn has_transfer_encoding(headers: &HeaderMap) -> bool {
    headers.get_all(TRANSFER_ENCODING).iter().any(|value| !value_contains_token(value, "identity"))
}

enum ContentLength {
    Absent,
    Valid(u64),
    Malformed,
}

fn content_length(headers: &HeaderMap) -> ContentLength {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = value.to_str().ok().and_then(|value| value.trim().parse::<u64>().ok());
        match (parsed, length) {
            (None, _) => return ContentLength::Malformed,
            (Some(n), Some(previous)) if n != previous => return ContentLength::Malformed,
            (Some(n), _) => length = Some(n),
        }
    }
    length.map_or(ContentLength::Absent, ContentLength::Valid)
}

/// Decides persistence and the request body framing.
///
/// A request without a body is terminated right away. `has_extra_bytes` tells whether the
/// read buffer already holds bytes past this request's head, the response is then held back
/// for the pipeline when the options allow it.
pub(crate) fn configure_request(exchange: &mut HttpServerExchange, has_extra_bytes: bool) -> PayloadSize {
    let headers = exchange.request_headers();
    let persistent = match exchange.protocol() {
        Version::HTTP_11 => !connection_close(headers),
        Version::HTTP_10 => connection_keep_alive(headers),
        _ => false,
    };
    exchange.set_persistent(persistent);

    if has_transfer_encoding(exchange.request_headers()) {
        if exchange.request_headers_mut().remove(CONTENT_LENGTH).is_some() {
            debug!("request carries both transfer-encoding and content-length, closing after response");
            exchange.set_persistent(false);
        }
        return PayloadSize::new_chunked();
    }

    match content_length(exchange.request_headers()) {
        ContentLength::Valid(0) | ContentLength::Absent => no_body(exchange, has_extra_bytes),
        ContentLength::Valid(length) => {
            if length > exchange.max_entity_size() {
                debug!(length, max_size = exchange.max_entity_size(), "declared request body too large, closing after response");
                exchange.set_persistent(false);
            }
            PayloadSize::new_length(length)
        }
        ContentLength::Malformed => {
            warn!(uri = exchange.request_uri(), "malformed content-length, reading body until close");
            exchange.set_persistent(false);
            PayloadSize::Identity
        }
    }
}

fn no_body(exchange: &mut HttpServerExchange, has_extra_bytes: bool) -> PayloadSize {
    exchange.terminate_request();
    if has_extra_bytes && exchange.is_persistent() && exchange.options().buffer_pipelined_data {
        exchange.set_pipelined(true);
    }
    PayloadSize::new_empty()
}

/// Decides the response body framing, called once right before the head is frozen.
pub(crate) fn configure_response(exchange: &mut HttpServerExchange) -> PayloadSize {
    if connection_close(exchange.response_headers()) {
        exchange.set_persistent(false);
    }

    let status = exchange.status();
    let payload_size = response_payload_size(exchange, status);

    if status != StatusCode::SWITCHING_PROTOCOLS {
        rewrite_connection_header(exchange);
    }
    payload_size
}

fn response_payload_size(exchange: &mut HttpServerExchange, status: StatusCode) -> PayloadSize {
    let content_length = content_length(exchange.response_headers());

    if status == StatusCode::SWITCHING_PROTOCOLS
        && let ContentLength::Valid(length) = content_length
    {
        return PayloadSize::new_length(length);
    }

    if exchange.request_method() == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return PayloadSize::new_empty();
    }

    if has_transfer_encoding(exchange.response_headers()) {
        return PayloadSize::new_chunked();
    }

    match content_length {
        ContentLength::Valid(length) => return PayloadSize::new_length(length),
        ContentLength::Malformed => {
            warn!("malformed response content-length, closing connection after response");
            exchange.response_headers_mut().remove(CONTENT_LENGTH);
            exchange.set_persistent(false);
        }
        ContentLength::Absent => {}
    }

    if exchange.protocol() == Version::HTTP_11 && exchange.is_persistent() {
        exchange.response_headers_mut().insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        return PayloadSize::new_chunked();
    }

    exchange.set_persistent(false);
    PayloadSize::Identity
}

fn rewrite_connection_header(exchange: &mut HttpServerExchange) {
    let persistent = exchange.is_persistent();
    let always_set_keep_alive = exchange.options().always_set_keep_alive;
    let is_http11 = exchange.protocol() == Version::HTTP_11;
    let headers = exchange.response_headers_mut();

    match (is_http11, persistent) {
        (true, true) => {
            if always_set_keep_alive {
                headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
            }
        }
        (true, false) => {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }
        (false, true) => {
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
        (false, false) => {
            headers.remove(CONNECTION);
        }
    }
}
