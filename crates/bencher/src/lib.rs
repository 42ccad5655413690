//! Raw request fixtures shared by the benchmarks.

/// A byte stream as a client would send it, holding one or more pipelined requests.
#[derive(Debug, Copy, Clone)]
pub struct RequestFixture {
    name: &'static str,
    content: &'static str,
    requests: usize,
}

impl RequestFixture {
    pub const fn new(name: &'static str, content: &'static str, requests: usize) -> Self {
        Self { name, content, requests }
    }

    pub const fn single(name: &'static str, content: &'static str) -> Self {
        Self::new(name, content, 1)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.content.as_bytes()
    }

    /// How many request heads a decoder should produce from [`bytes`](Self::bytes).
    pub fn requests(&self) -> usize {
        self.requests
    }
}
