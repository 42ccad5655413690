/// Where the request side of an exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestPhase {
    /// body bytes may still arrive
    #[default]
    Reading,
    /// the body has been fully read, drained or abandoned
    Terminated,
}

/// Where the response side of an exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponsePhase {
    /// status and headers can still change
    #[default]
    Pending,
    /// the head has been committed to the connection
    Started,
    /// the last byte of the response has been handed to the connection
    Terminated,
}

impl ResponsePhase {
    pub fn is_started(self) -> bool {
        self != ResponsePhase::Pending
    }
}

/// Flags that change independently of the request and response phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Flags {
    pub(crate) persistent: bool,
    pub(crate) dispatched: bool,
    pub(crate) uri_contains_host: bool,
    pub(crate) in_call: bool,
    pub(crate) read_started: bool,
    pub(crate) blocking: bool,
    pub(crate) pipelined: bool,
    pub(crate) ended: bool,
    pub(crate) completion_fired: bool,
    pub(crate) completion_notified: bool,
}
