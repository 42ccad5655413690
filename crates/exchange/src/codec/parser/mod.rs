//! The request head parser and the state it resumes from.

mod parse_state;
mod request_parser;
mod utf8;

pub use parse_state::{ParseState, Phase};
pub use request_parser::RequestParser;
