use http::header::{AsHeaderName, CONNECTION};
use http::{HeaderMap, HeaderValue};

/// Convenience accessors over a multi-valued [`HeaderMap`].
pub trait HeaderMapExt {
    /// The first value of `name` as a string, if it is visible ASCII.
    fn get_first<K: AsHeaderName>(&self, name: K) -> Option<&str>;

    /// The last value of `name` as a string, if it is visible ASCII.
    fn get_last<K: AsHeaderName>(&self, name: K) -> Option<&str>;

    /// Whether any comma separated element of any `name` value equals `token`, ignoring case.
    fn contains_token<K: AsHeaderName>(&self, name: K, token: &str) -> bool;
}

impl HeaderMapExt for HeaderMap {
    fn get_first<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.get(name).and_then(|value| value.to_str().ok())
    }

    fn get_last<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.get_all(name).iter().next_back().and_then(|value| value.to_str().ok())
    }

    fn contains_token<K: AsHeaderName>(&self, name: K, token: &str) -> bool {
        self.get_all(name).iter().any(|value| value_contains_token(value, token))
    }
}

pub(crate) fn value_contains_token(value: &HeaderValue, token: &str) -> bool {
    value.as_bytes().split(|b| *b == b',').any(|element| element.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
}

pub(crate) fn connection_close(headers: &HeaderMap) -> bool {
    headers.contains_token(CONNECTION, "close")
}

pub(crate) fn connection_keep_alive(headers: &HeaderMap) -> bool {
    headers.contains_token(CONNECTION, "keep-alive")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ACCEPT;

    #[test]
    fn first_and_last() {
        let mut headers = HeaderMap::new();
        headers.append(ACCEPT, HeaderValue::from_static("text/html"));
        headers.append(ACCEPT, HeaderValue::from_static("text/plain"));

        assert_eq!(headers.get_first(ACCEPT), Some("text/html"));
        assert_eq!(headers.get_last(ACCEPT), Some("text/plain"));
        assert_eq!(headers.get_first("missing"), None);
    }

    #[test]
    fn connection_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade, Keep-Alive"));
        assert!(connection_keep_alive(&headers));
        assert!(!connection_close(&headers));

        headers.append(CONNECTION, HeaderValue::from_static("close"));
        assert!(connection_close(&headers));
    }
}
