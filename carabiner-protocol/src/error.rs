//! Error types for carabiner-protocol.

use thiserror::Error;

/// A line that does not follow the Carabiner message grammar.
///
/// Every variant carries the full offending line so callers can log it
/// without keeping their own copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    /// The line is empty or its first token is not a symbol.
    #[error("Carabiner messages must begin with a symbol. Received: {line:?}")]
    MissingTag { line: String },

    /// The text could not be tokenized.
    #[error("syntax error at byte {offset}: {detail}. Received: {line:?}")]
    Syntax {
        line: String,
        offset: usize,
        detail: String,
    },

    /// A known message type arrived with the wrong kind of payload, or none.
    #[error("'{tag}' messages must carry {expected}. Received: {line:?}")]
    PayloadShape {
        line: String,
        tag: String,
        expected: &'static str,
    },

    /// The map payload is structurally invalid (bad key, odd count, ...).
    #[error("invalid map payload: {detail}. Received: {line:?}")]
    InvalidMap { line: String, detail: String },

    /// Extra tokens followed the payload.
    #[error("Carabiner messages must consist of a symbol optionally followed by a payload. Received: {line:?}")]
    TrailingContent { line: String },
}

impl MalformedMessage {
    /// The line that failed to decode.
    pub fn line(&self) -> &str {
        match self {
            MalformedMessage::MissingTag { line }
            | MalformedMessage::Syntax { line, .. }
            | MalformedMessage::PayloadShape { line, .. }
            | MalformedMessage::InvalidMap { line, .. }
            | MalformedMessage::TrailingContent { line } => line,
        }
    }
}
