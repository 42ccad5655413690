//! HTTP response head handling.
//!
//! The head is frozen from the exchange when the response commits and handed to the
//! response conduit together with the body framing.

use http::{HeaderMap, StatusCode, Version};

/// The head of a committed response: status line parts plus the final header map.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) reason: Option<String>,
    pub(crate) headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(version: Version, status: StatusCode, headers: HeaderMap) -> Self {
        Self { version, status, reason: None, headers }
    }

    /// Overrides the canonical reason phrase of the status line.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The reason phrase written on the status line.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => self.status.canonical_reason().unwrap_or("Unknown"),
        }
    }

    /// The protocol token written on the status line.
    ///
    /// HTTP/1.0 requests are answered in kind, everything else as HTTP/1.1.
    pub fn protocol(&self) -> &'static str {
        match self.version {
            Version::HTTP_10 | Version::HTTP_09 => "HTTP/1.0",
            _ => "HTTP/1.1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_falls_back_to_canonical() {
        let head = ResponseHead::new(Version::HTTP_11, StatusCode::NOT_FOUND, HeaderMap::new());
        assert_eq!(head.reason(), "Not Found");
        assert_eq!(head.protocol(), "HTTP/1.1");

        let head = ResponseHead::new(Version::HTTP_10, StatusCode::from_u16(599).unwrap(), HeaderMap::new());
        assert_eq!(head.reason(), "Unknown");
        assert_eq!(head.protocol(), "HTTP/1.0");

        let head = head.with_reason("Custom");
        assert_eq!(head.reason(), "Custom");
    }
}
