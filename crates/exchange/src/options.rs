//! Connection-level options.
//!
//! A [`ServerOptions`] value is built once, wrapped in an `Arc` and handed to every
//! connection, it is never mutated afterwards. The defaults match the limits most HTTP
//! servers ship with, and the whole set can be loaded from any serde format:
//!
//! ```
//! use micro_exchange::options::ServerOptions;
//!
//! let options: ServerOptions = serde_json::from_str(r#"{ "max_headers": 32 }"#).unwrap();
//! assert_eq!(options.max_headers, 32);
//! assert_eq!(options.max_header_size, 8 * 1024);
//! ```

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;
pub const DEFAULT_MAX_HEADERS: usize = 64;
pub const DEFAULT_MAX_PARAMETERS: usize = 1000;
pub const DEFAULT_MAX_ENTITY_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Upper bound for the request line plus the header block, in bytes
    pub max_header_size: usize,
    /// Upper bound for the number of request header fields
    pub max_headers: usize,
    /// Upper bound for query plus path parameters of a single request
    pub max_parameters: usize,
    /// Default request entity limit, handlers may change it per exchange
    pub max_entity_size: u64,
    /// Hold back responses of pipelined requests until the pipeline is drained
    pub buffer_pipelined_data: bool,
    /// Size of read buffers and of pooled write buffers
    pub buffer_size: usize,
    /// Decode `%2F` in the path instead of keeping it literal
    pub allow_encoded_slash: bool,
    /// Accept raw non-ASCII bytes in the request target
    pub allow_unescaped_characters_in_url: bool,
    /// Send `Connection: keep-alive` on persistent HTTP/1.1 responses
    pub always_set_keep_alive: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_headers: DEFAULT_MAX_HEADERS,
            max_parameters: DEFAULT_MAX_PARAMETERS,
            max_entity_size: DEFAULT_MAX_ENTITY_SIZE,
            buffer_pipelined_data: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            allow_encoded_slash: false,
            allow_unescaped_characters_in_url: false,
            always_set_keep_alive: true,
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_header_size(mut self, max_header_size: usize) -> Self {
        self.max_header_size = max_header_size;
        self
    }

    pub fn with_max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers;
        self
    }

    pub fn with_max_parameters(mut self, max_parameters: usize) -> Self {
        self.max_parameters = max_parameters;
        self
    }

    pub fn with_max_entity_size(mut self, max_entity_size: u64) -> Self {
        self.max_entity_size = max_entity_size;
        self
    }

    pub fn with_buffer_pipelined_data(mut self, buffer_pipelined_data: bool) -> Self {
        self.buffer_pipelined_data = buffer_pipelined_data;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_allow_encoded_slash(mut self, allow_encoded_slash: bool) -> Self {
        self.allow_encoded_slash = allow_encoded_slash;
        self
    }

    pub fn with_allow_unescaped_characters_in_url(mut self, allow: bool) -> Self {
        self.allow_unescaped_characters_in_url = allow;
        self
    }

    pub fn with_always_set_keep_alive(mut self, always_set_keep_alive: bool) -> Self {
        self.always_set_keep_alive = always_set_keep_alive;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let options: ServerOptions =
            serde_json::from_str(r#"{ "max_parameters": 2, "allow_encoded_slash": true }"#).unwrap();

        assert_eq!(options.max_parameters, 2);
        assert!(options.allow_encoded_slash);
        assert_eq!(options.max_entity_size, DEFAULT_MAX_ENTITY_SIZE);
        assert!(options.buffer_pipelined_data);
    }

    #[test]
    fn builder_setters() {
        let options = ServerOptions::new().with_max_headers(3).with_buffer_size(512).with_always_set_keep_alive(false);
        assert_eq!(options.max_headers, 3);
        assert_eq!(options.buffer_size, 512);
        assert!(!options.always_set_keep_alive);

        let json = serde_json::to_string(&options).unwrap();
        let back: ServerOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
