//! Incremental HTTP/1.x request head parser.
//!
//! [`RequestParser::handle`] consumes whatever bytes are available, records its progress in
//! a [`ParseState`] and fills an [`HttpServerExchange`] as request-line parts and header
//! fields complete. It returns as soon as the buffer is exhausted or the head is complete,
//! and feeding the same request in any number of pieces gives the same exchange as feeding
//! it at once.
//!
//! The request target is percent-decoded on the fly. Decoded bytes go through an UTF-8
//! automaton so that multi-byte characters spread over several `%XX` escapes, or over
//! several reads, are validated before they are accepted.

use std::mem;

use bytes::{Buf, BytesMut};
use http::{HeaderValue, header};

use super::parse_state::{Line, ParseState, Percent, Phase, TargetForm};
use crate::ensure;
use crate::exchange::HttpServerExchange;
use crate::options::ServerOptions;
use crate::protocol::{ParseError, token};

#[derive(Debug, Clone)]
pub struct RequestParser {
    max_headers: usize,
    max_parameters: usize,
    allow_encoded_slash: bool,
    allow_unescaped_characters: bool,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(&ServerOptions::default())
    }
}

impl RequestParser {
    pub fn new(options: &ServerOptions) -> Self {
        Self {
            max_headers: options.max_headers,
            max_parameters: options.max_parameters,
            allow_encoded_slash: options.allow_encoded_slash,
            allow_unescaped_characters: options.allow_unescaped_characters_in_url,
        }
    }

    /// Parses as much of the request head as `buf` holds.
    ///
    /// Consumed bytes are removed from `buf`. Bytes following a completed head are left in
    /// place for the body decoder or the next request.
    pub fn handle(
        &self,
        buf: &mut BytesMut,
        state: &mut ParseState,
        exchange: &mut HttpServerExchange,
    ) -> Result<(), ParseError> {
        let mut pos = 0;
        let result = self.run(&buf[..], &mut pos, state, exchange);
        buf.advance(pos);
        result
    }

    fn run(
        &self,
        bytes: &[u8],
        pos: &mut usize,
        state: &mut ParseState,
        exchange: &mut HttpServerExchange,
    ) -> Result<(), ParseError> {
        while *pos < bytes.len() {
            if state.phase == Phase::ParseComplete {
                return Ok(());
            }

            if state.phase == Phase::Verb && state.token.is_empty() {
                if let Some((method, len)) = token::match_method(&bytes[*pos..]) {
                    exchange.set_request_method(method);
                    state.phase = Phase::Path;
                    *pos += len;
                    continue;
                }
            }

            let b = bytes[*pos];
            *pos += 1;

            match state.phase {
                Phase::Verb => self.verb(b, state, exchange)?,
                Phase::Path | Phase::PathParameters | Phase::QueryParameters => self.target(b, state, exchange)?,
                Phase::Version => Self::version(b, state, exchange)?,
                Phase::AfterVersion => Self::after_version(b, state)?,
                Phase::Header => self.header_name(b, state, exchange)?,
                Phase::HeaderValue => self.header_value(b, state, exchange)?,
                Phase::ParseComplete => {}
            }
        }
        Ok(())
    }

    fn verb(&self, b: u8, state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        match b {
            // empty lines ahead of the request line are ignored, RFC 7230 §3.5
            b'\r' | b'\n' if state.token.is_empty() => Ok(()),
            b' ' => {
                let method = token::method(&state.token).ok_or(ParseError::InvalidMethod)?;
                exchange.set_request_method(method);
                state.token.clear();
                state.phase = Phase::Path;
                Ok(())
            }
            b if token::is_token_char(b) => {
                state.token.push(b);
                Ok(())
            }
            _ => Err(ParseError::InvalidMethod),
        }
    }

    fn target(&self, b: u8, state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        if matches!(b, b' ' | b'\t') && state.percent == Percent::None {
            if state.target.is_empty() {
                return Ok(());
            }
            return self.finish_target(state, exchange);
        }
        ensure!(b != b'\r' && b != b'\n', ParseError::invalid_uri("request target contains CR or LF"));

        state.target.push(b);
        let offset = state.target.len();

        match state.form {
            TargetForm::Origin => self.target_byte(b, offset, state, exchange),
            TargetForm::Start => {
                if b.is_ascii_alphabetic() {
                    state.form = TargetForm::Scheme;
                    Ok(())
                } else {
                    state.form = TargetForm::Origin;
                    self.target_byte(b, offset, state, exchange)
                }
            }
            TargetForm::Scheme => match b {
                b':' => {
                    state.form = TargetForm::Colon;
                    Ok(())
                }
                b if b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.') => Ok(()),
                _ => self.replay(state, exchange),
            },
            TargetForm::Colon if b == b'/' => {
                state.form = TargetForm::FirstSlash;
                Ok(())
            }
            TargetForm::FirstSlash if b == b'/' => {
                state.form = TargetForm::Authority { start: offset };
                Ok(())
            }
            TargetForm::Colon | TargetForm::FirstSlash => self.replay(state, exchange),
            TargetForm::Authority { start } => match b {
                b'/' | b'?' => {
                    Self::leave_authority(start, offset - 1, state, exchange)?;
                    if b == b'?' {
                        state.path.push('/');
                    }
                    self.target_byte(b, offset, state, exchange)
                }
                _ => Ok(()),
            },
        }
    }

    /// The target looked like `scheme://` but wasn't, decode what was held back as a path.
    fn replay(&self, state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        state.form = TargetForm::Origin;
        let pending = state.target.clone();
        for (i, b) in pending.into_iter().enumerate() {
            self.target_byte(b, i + 1, state, exchange)?;
        }
        Ok(())
    }

    fn leave_authority(
        start: usize,
        end: usize,
        state: &mut ParseState,
        exchange: &mut HttpServerExchange,
    ) -> Result<(), ParseError> {
        let authority = std::str::from_utf8(&state.target[start..end]).map_err(ParseError::invalid_uri)?;
        ensure!(!authority.is_empty(), ParseError::invalid_uri("absolute request target without host"));
        state.authority = Some(authority.to_owned());

        // `start` points past "://"
        let scheme = std::str::from_utf8(&state.target[..start - 3]).map_err(ParseError::invalid_uri)?;
        exchange.set_request_scheme(scheme.to_ascii_lowercase());
        state.form = TargetForm::Origin;
        Ok(())
    }

    /// Decodes one byte of an origin-form target, `offset` is its end inside the raw target.
    fn target_byte(
        &self,
        b: u8,
        offset: usize,
        state: &mut ParseState,
        exchange: &mut HttpServerExchange,
    ) -> Result<(), ParseError> {
        match state.percent {
            Percent::High => {
                state.percent = Percent::Low(hex(b)?);
                return Ok(());
            }
            Percent::Low(high) => {
                state.percent = Percent::None;
                let decoded = (high << 4) | hex(b)?;
                if decoded == b'/' && state.phase == Phase::Path && !self.allow_encoded_slash {
                    ensure!(state.utf8.is_complete(), invalid_utf8());
                    state.path.push_str("%2F");
                    return Ok(());
                }
                return Self::push_decoded(decoded, state);
            }
            Percent::None => {}
        }

        match (b, state.phase) {
            (b'%', _) => {
                state.percent = Percent::High;
                Ok(())
            }
            (b'+', _) => Self::push_decoded(b' ', state),
            (b'?', Phase::Path | Phase::PathParameters) => {
                if state.phase == Phase::PathParameters {
                    self.end_parameter(state, exchange)?;
                }
                ensure!(state.utf8.is_complete(), invalid_utf8());
                state.query_start = Some(offset);
                state.phase = Phase::QueryParameters;
                Ok(())
            }
            (b';', Phase::Path) => {
                ensure!(state.utf8.is_complete(), invalid_utf8());
                state.phase = Phase::PathParameters;
                Ok(())
            }
            (b';' | b'&', Phase::PathParameters) | (b'&', Phase::QueryParameters) => self.end_parameter(state, exchange),
            (b'/', Phase::PathParameters) => {
                self.end_parameter(state, exchange)?;
                state.phase = Phase::Path;
                Self::push_decoded(b'/', state)
            }
            (b'=', Phase::PathParameters | Phase::QueryParameters) if state.parameter_name.is_none() => {
                ensure!(state.utf8.is_complete(), invalid_utf8());
                state.parameter_name = Some(mem::take(&mut state.component));
                Ok(())
            }
            (0..=0x1f | 0x7f, _) => Err(ParseError::invalid_uri("control character in request target")),
            (0x80..=0xff, _) if !self.allow_unescaped_characters => {
                Err(ParseError::invalid_uri("unescaped non-ascii character in request target"))
            }
            _ => Self::push_decoded(b, state),
        }
    }

    fn push_decoded(byte: u8, state: &mut ParseState) -> Result<(), ParseError> {
        let decoded = state.utf8.decode(byte).map_err(|_| invalid_utf8())?;
        if let Some(c) = decoded {
            if state.phase == Phase::Path {
                state.path.push(c);
            } else {
                state.component.push(c);
            }
        }
        Ok(())
    }

    fn end_parameter(&self, state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        ensure!(state.percent == Percent::None, ParseError::invalid_uri("incomplete percent escape"));
        ensure!(state.utf8.is_complete(), invalid_utf8());

        let text = mem::take(&mut state.component);
        let (name, value) = match state.parameter_name.take() {
            Some(name) => (name, text),
            None => (text, String::new()),
        };
        if name.is_empty() && value.is_empty() {
            return Ok(());
        }

        state.parameter_count += 1;
        ensure!(state.parameter_count <= self.max_parameters, ParseError::too_many_parameters(self.max_parameters));

        if state.phase == Phase::QueryParameters {
            exchange.add_query_param(name, value);
        } else {
            exchange.add_path_param(name, value);
        }
        Ok(())
    }

    fn finish_target(&self, state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        ensure!(state.percent == Percent::None, ParseError::invalid_uri("incomplete percent escape"));

        match state.form {
            TargetForm::Start | TargetForm::Origin => {}
            TargetForm::Scheme | TargetForm::Colon | TargetForm::FirstSlash => self.replay(state, exchange)?,
            TargetForm::Authority { start } => {
                Self::leave_authority(start, state.target.len(), state, exchange)?;
                state.path.push('/');
            }
        }

        if matches!(state.phase, Phase::PathParameters | Phase::QueryParameters) {
            self.end_parameter(state, exchange)?;
        }
        ensure!(state.utf8.is_complete(), invalid_utf8());

        let uri = String::from_utf8(mem::take(&mut state.target)).map_err(ParseError::invalid_uri)?;
        let query = match state.query_start {
            Some(start) => uri[start..].to_owned(),
            None => String::new(),
        };
        let path = mem::take(&mut state.path);

        exchange.set_request_uri(uri, state.authority.is_some());
        exchange.set_relative_path(path.clone());
        exchange.set_request_path(path);
        exchange.set_query_string(query);

        state.phase = Phase::Version;
        Ok(())
    }

    fn version(b: u8, state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        match b {
            b' ' | b'\t' if state.token.is_empty() => Ok(()),
            b' ' | b'\t' | b'\r' | b'\n' => {
                let version = token::version(&state.token)
                    .ok_or_else(|| ParseError::invalid_version(String::from_utf8_lossy(&state.token)))?;
                exchange.set_protocol(version);
                state.token.clear();
                state.line = Line::Start;
                state.phase = if b == b'\n' { Phase::Header } else { Phase::AfterVersion };
                Ok(())
            }
            _ => {
                ensure!(state.token.len() < token::MAX_VERSION_LEN, ParseError::invalid_version("protocol token too long"));
                state.token.push(b);
                Ok(())
            }
        }
    }

    fn after_version(b: u8, state: &mut ParseState) -> Result<(), ParseError> {
        match b {
            b' ' | b'\t' | b'\r' => Ok(()),
            b'\n' => {
                state.phase = Phase::Header;
                Ok(())
            }
            _ => Err(ParseError::invalid_version("unexpected character after protocol")),
        }
    }

    fn header_name(&self, b: u8, state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        if state.line == Line::BlankCr {
            ensure!(b == b'\n', ParseError::invalid_header("expect LF after CR"));
            return Self::complete(state, exchange);
        }

        match b {
            b'\r' if state.token.is_empty() => {
                state.line = Line::BlankCr;
                Ok(())
            }
            b'\n' if state.token.is_empty() => Self::complete(state, exchange),
            b':' => {
                ensure!(!state.token.is_empty(), ParseError::invalid_header("empty header name"));
                let name = token::header_name(&mut state.token)
                    .ok_or_else(|| ParseError::invalid_header(String::from_utf8_lossy(&state.token)))?;

                state.header_count += 1;
                ensure!(state.header_count <= self.max_headers, ParseError::too_many_headers(self.max_headers));

                state.token.clear();
                state.header_name = Some(name);
                state.header_value.clear();
                state.fold = false;
                state.line = Line::BeforeValue;
                state.phase = Phase::HeaderValue;
                Ok(())
            }
            b if token::is_token_char(b) => {
                state.token.push(b);
                Ok(())
            }
            _ => Err(ParseError::invalid_header("invalid character in header name")),
        }
    }

    fn header_value(&self, b: u8, state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        match state.line {
            Line::BeforeValue => match b {
                b' ' | b'\t' => {}
                b'\r' => state.line = Line::ValueCr,
                b'\n' => state.line = Line::LineEnd,
                _ => {
                    if state.fold && !state.header_value.is_empty() {
                        state.header_value.push(b' ');
                    }
                    state.fold = false;
                    Self::value_byte(b, state)?;
                    state.line = Line::Value;
                }
            },
            Line::Value => match b {
                b'\r' => state.line = Line::ValueCr,
                b'\n' => state.line = Line::LineEnd,
                _ => Self::value_byte(b, state)?,
            },
            Line::ValueCr => {
                ensure!(b == b'\n', ParseError::invalid_header("expect LF after CR"));
                state.line = Line::LineEnd;
            }
            Line::LineEnd => match b {
                // obsolete line folding, RFC 7230 §3.2.4
                b' ' | b'\t' => {
                    trim_end(&mut state.header_value);
                    state.fold = true;
                    state.line = Line::BeforeValue;
                }
                _ => {
                    Self::store_header(state, exchange)?;
                    state.phase = Phase::Header;
                    state.line = Line::Start;
                    return self.header_name(b, state, exchange);
                }
            },
            Line::Start | Line::BlankCr => return Err(ParseError::invalid_header("unexpected header line state")),
        }
        Ok(())
    }

    fn value_byte(b: u8, state: &mut ParseState) -> Result<(), ParseError> {
        ensure!(
            b == b'\t' || (b >= 0x20 && b != 0x7f),
            ParseError::invalid_header("control character in header value")
        );
        state.header_value.push(b);
        Ok(())
    }

    fn store_header(state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        trim_end(&mut state.header_value);
        let name = state.header_name.take().ok_or_else(|| ParseError::invalid_header("value without header name"))?;
        let value = HeaderValue::from_bytes(&state.header_value).map_err(ParseError::invalid_header)?;
        state.header_value.clear();
        exchange.request_headers_mut().append(name, value);
        Ok(())
    }

    fn complete(state: &mut ParseState, exchange: &mut HttpServerExchange) -> Result<(), ParseError> {
        // an absolute-form target overrides any Host field, RFC 7230 §5.4
        if let Some(authority) = state.authority.take() {
            let host = HeaderValue::from_str(&authority).map_err(ParseError::invalid_uri)?;
            exchange.request_headers_mut().insert(header::HOST, host);
        }
        state.phase = Phase::ParseComplete;
        Ok(())
    }
}

fn hex(b: u8) -> Result<u8, ParseError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(ParseError::invalid_uri("invalid percent escape")),
    }
}

fn invalid_utf8() -> ParseError {
    ParseError::invalid_uri("invalid utf-8 sequence in request target")
}

fn trim_end(value: &mut Vec<u8>) {
    while matches!(value.last(), Some(b' ' | b'\t')) {
        value.pop();
    }
}
