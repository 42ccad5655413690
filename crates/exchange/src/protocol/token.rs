//! Interned protocol tokens.
//!
//! Methods, versions and well-known header names are matched against static tables so the
//! parser hands out shared values instead of allocating a fresh token for every request.

use std::collections::HashMap;

use http::{HeaderName, Method, Version, header};
use once_cell::sync::Lazy;

/// Request-line prefixes recognised without accumulating the method byte by byte.
static KNOWN_METHODS: [(&[u8], Method); 9] = [
    (b"GET ", Method::GET),
    (b"POST ", Method::POST),
    (b"PUT ", Method::PUT),
    (b"DELETE ", Method::DELETE),
    (b"HEAD ", Method::HEAD),
    (b"OPTIONS ", Method::OPTIONS),
    (b"PATCH ", Method::PATCH),
    (b"TRACE ", Method::TRACE),
    (b"CONNECT ", Method::CONNECT),
];

const HTTP_09: &[u8] = b"HTTP/0.9";
const HTTP_10: &[u8] = b"HTTP/1.0";
const HTTP_11: &[u8] = b"HTTP/1.1";

/// Longest protocol token we are willing to accumulate.
pub(crate) const MAX_VERSION_LEN: usize = HTTP_11.len();

static HEADER_NAMES: Lazy<HashMap<Vec<u8>, HeaderName>> = Lazy::new(|| {
    let names = [
        header::ACCEPT,
        header::ACCEPT_CHARSET,
        header::ACCEPT_ENCODING,
        header::ACCEPT_LANGUAGE,
        header::ACCEPT_RANGES,
        header::AUTHORIZATION,
        header::CACHE_CONTROL,
        header::CONNECTION,
        header::CONTENT_DISPOSITION,
        header::CONTENT_ENCODING,
        header::CONTENT_LANGUAGE,
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
        header::COOKIE,
        header::DATE,
        header::ETAG,
        header::EXPECT,
        header::FORWARDED,
        header::HOST,
        header::IF_MATCH,
        header::IF_MODIFIED_SINCE,
        header::IF_NONE_MATCH,
        header::IF_RANGE,
        header::IF_UNMODIFIED_SINCE,
        header::LOCATION,
        header::ORIGIN,
        header::PRAGMA,
        header::RANGE,
        header::REFERER,
        header::SEC_WEBSOCKET_KEY,
        header::SEC_WEBSOCKET_VERSION,
        header::SERVER,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::USER_AGENT,
        header::VIA,
    ];

    let mut map = HashMap::with_capacity(names.len() + 3);
    for name in names {
        map.insert(name.as_str().as_bytes().to_vec(), name);
    }
    map.insert(b"keep-alive".to_vec(), HeaderName::from_static("keep-alive"));
    map.insert(b"x-forwarded-for".to_vec(), HeaderName::from_static("x-forwarded-for"));
    map.insert(b"x-forwarded-proto".to_vec(), HeaderName::from_static("x-forwarded-proto"));
    map
});

/// Matches a well-known method at the start of `bytes`, including its trailing space.
///
/// Returns the method and the number of bytes it occupies.
pub(crate) fn match_method(bytes: &[u8]) -> Option<(Method, usize)> {
    KNOWN_METHODS
        .iter()
        .find(|(prefix, _)| bytes.starts_with(prefix))
        .map(|(prefix, method)| (method.clone(), prefix.len()))
}

/// Maps an accumulated method token to a [`Method`], well-known methods are shared.
pub(crate) fn method(token: &[u8]) -> Option<Method> {
    KNOWN_METHODS
        .iter()
        .find(|(prefix, _)| &prefix[..prefix.len() - 1] == token)
        .map(|(_, method)| method.clone())
        .or_else(|| Method::from_bytes(token).ok())
}

pub(crate) fn version(token: &[u8]) -> Option<Version> {
    match token {
        HTTP_11 => Some(Version::HTTP_11),
        HTTP_10 => Some(Version::HTTP_10),
        HTTP_09 => Some(Version::HTTP_09),
        _ => None,
    }
}

/// Resolves a header name, `token` is lower-cased in place.
pub(crate) fn header_name(token: &mut [u8]) -> Option<HeaderName> {
    token.make_ascii_lowercase();
    match HEADER_NAMES.get(&token[..]) {
        Some(name) => Some(name.clone()),
        None => HeaderName::from_bytes(token).ok(),
    }
}

/// `tchar` from RFC 7230 §3.2.6.
#[inline]
pub(crate) fn is_token_char(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z')
}
