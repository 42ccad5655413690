use http::HeaderName;

use super::utf8::Utf8Decoder;

/// Which part of the request head the parser is in.
///
/// Phases only move forward while a request is parsed, [`ParseState::reset`] is the one
/// way back to [`Phase::Verb`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Verb,
    Path,
    PathParameters,
    QueryParameters,
    Version,
    AfterVersion,
    Header,
    HeaderValue,
    ParseComplete,
}

/// Shape of the request target, worked out from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum TargetForm {
    /// nothing seen yet
    #[default]
    Start,
    /// `/path`, or a target that turned out not to be absolute
    Origin,
    /// possibly `scheme://`, collecting the scheme
    Scheme,
    Colon,
    FirstSlash,
    /// between `scheme://` and the first `/` of the path
    Authority { start: usize },
}

/// Progress inside a `%XX` escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Percent {
    #[default]
    None,
    High,
    Low(u8),
}

/// Progress inside one header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Line {
    /// at the start of a line in the header block
    #[default]
    Start,
    /// a CR opened the line, the blank line is expected to finish with LF
    BlankCr,
    /// after the colon, skipping optional whitespace
    BeforeValue,
    Value,
    ValueCr,
    /// a value line ended, the next byte tells a continuation from a new field
    LineEnd,
}

/// Everything the parser has to remember between two reads.
///
/// One `ParseState` is used per connection and reset before each request, it is never
/// shared between connections.
#[derive(Debug, Default)]
pub struct ParseState {
    pub(crate) phase: Phase,
    /// method, version or header name bytes seen so far
    pub(crate) token: Vec<u8>,

    /// the raw request target
    pub(crate) target: Vec<u8>,
    pub(crate) form: TargetForm,
    /// host of an absolute-form target
    pub(crate) authority: Option<String>,
    /// offset of the query string inside `target`
    pub(crate) query_start: Option<usize>,
    /// decoded path without path parameters
    pub(crate) path: String,
    /// decoded name or value of the parameter being read
    pub(crate) component: String,
    pub(crate) parameter_name: Option<String>,
    pub(crate) percent: Percent,
    pub(crate) utf8: Utf8Decoder,
    pub(crate) parameter_count: usize,

    pub(crate) line: Line,
    pub(crate) header_name: Option<HeaderName>,
    pub(crate) header_value: Vec<u8>,
    /// a continuation line is pending, a single space joins it to the value
    pub(crate) fold: bool,
    pub(crate) header_count: usize,
}

impl ParseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::ParseComplete
    }

    /// True while nothing of the next request has been consumed.
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Verb && self.token.is_empty()
    }

    /// Prepares the state for the next request on the same connection.
    ///
    /// Allocations are kept, contents are not.
    pub fn reset(&mut self) {
        self.phase = Phase::Verb;
        self.token.clear();
        self.target.clear();
        self.form = TargetForm::Start;
        self.authority = None;
        self.query_start = None;
        self.path.clear();
        self.component.clear();
        self.parameter_name = None;
        self.percent = Percent::None;
        self.utf8.reset();
        self.parameter_count = 0;
        self.line = Line::Start;
        self.header_name = None;
        self.header_value.clear();
        self.fold = false;
        self.header_count = 0;
    }
}
