//! Typed Carabiner messages and the line decoder.
//!
//! Carabiner answers in EDN: a type symbol, optionally followed by a payload.
//! For example `status { :peers 0 :bpm 120.000000 :start 73743731220 :beat 597.737570 }`
//! decodes to a [`Message`] of type `"status"` whose details map holds
//! `peers` as [`Value::Integer`], `bpm` as [`Value::Float`], and so on.
//! `bad-beat` decodes to type `"bad-beat"` with [`Details::Absent`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::MalformedMessage;
use crate::lexer::{tokenize, Token};

/// Message types whose payload shape is fixed by the protocol.
pub mod tags {
    pub const STATUS: &str = "status";
    pub const BEAT_AT_TIME: &str = "beat-at-time";
    pub const PHASE_AT_TIME: &str = "phase-at-time";
    pub const VERSION: &str = "version";
    pub const UNSUPPORTED: &str = "unsupported";
}

/// A scalar held in a details map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    /// Strings, and symbols or keywords used as values.
    Text(String),
    Boolean(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Whatever followed the message type.
///
/// `Text` and `Symbol` are kept apart: `version "1.2.0"` and
/// `unsupported frobnicate` carry different kinds of payload even though both
/// are plain text once decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Details {
    Absent,
    Map(BTreeMap<String, Value>),
    Text(String),
    Symbol(String),
}

impl Details {
    pub fn is_absent(&self) -> bool {
        matches!(self, Details::Absent)
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Details::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Details::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Details::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

/// One decoded line of Carabiner output. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    #[serde(rename = "type")]
    message_type: String,
    details: Details,
}

impl Message {
    /// Decode one line of Carabiner output. Same as [`decode`].
    pub fn decode(line: &str) -> Result<Self, MalformedMessage> {
        decode(line)
    }

    /// The symbol the message started with.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn into_details(self) -> Details {
        self.details
    }

    /// True if this message has the given type.
    pub fn is(&self, tag: &str) -> bool {
        self.message_type == tag
    }

    /// Look up a key in the details map, if there is one.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.details.as_map().and_then(|map| map.get(key))
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(Value::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(Value::Float(x)) => Some(*x),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(Value::Boolean(b)) => Some(*b),
            _ => None,
        }
    }
}

impl FromStr for Message {
    type Err = MalformedMessage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Map,
    Text,
    Symbol,
    OptionalMap,
}

impl Expected {
    fn for_tag(tag: &str) -> Self {
        match tag {
            tags::STATUS | tags::BEAT_AT_TIME | tags::PHASE_AT_TIME => Expected::Map,
            tags::VERSION => Expected::Text,
            tags::UNSUPPORTED => Expected::Symbol,
            _ => Expected::OptionalMap,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Expected::Map => "a map",
            Expected::Text => "a string",
            Expected::Symbol => "a symbol",
            Expected::OptionalMap => "a map or nothing",
        }
    }
}

/// Decode one line of Carabiner output into a [`Message`].
///
/// Fails if the line does not start with a symbol, if a known message type
/// carries the wrong payload, or if anything follows the payload.
pub fn decode(line: &str) -> Result<Message, MalformedMessage> {
    let tokens = tokenize(line).map_err(|err| MalformedMessage::Syntax {
        line: line.to_owned(),
        offset: err.offset,
        detail: err.detail,
    })?;
    let mut tokens = tokens.into_iter().map(|(_, token)| token);

    let message_type = match tokens.next() {
        Some(Token::Symbol(name)) => name,
        _ => {
            return Err(MalformedMessage::MissingTag {
                line: line.to_owned(),
            })
        }
    };

    let expected = Expected::for_tag(&message_type);
    let shape_error = || MalformedMessage::PayloadShape {
        line: line.to_owned(),
        tag: message_type.clone(),
        expected: expected.describe(),
    };

    let payload = match tokens.next() {
        None => None,
        Some(Token::MapOpen) => Some(Details::Map(read_map(&mut tokens, line)?)),
        Some(Token::Str(text)) => Some(Details::Text(text)),
        Some(Token::Symbol(name)) => Some(Details::Symbol(name)),
        Some(_) => return Err(shape_error()),
    };

    let details = match (expected, payload) {
        (Expected::Map | Expected::OptionalMap, Some(details @ Details::Map(_)))
        | (Expected::Text, Some(details @ Details::Text(_)))
        | (Expected::Symbol, Some(details @ Details::Symbol(_))) => details,
        (Expected::OptionalMap, None) => Details::Absent,
        _ => return Err(shape_error()),
    };

    if tokens.next().is_some() {
        return Err(MalformedMessage::TrailingContent {
            line: line.to_owned(),
        });
    }

    Ok(Message {
        message_type,
        details,
    })
}

fn read_map(
    tokens: &mut impl Iterator<Item = Token>,
    line: &str,
) -> Result<BTreeMap<String, Value>, MalformedMessage> {
    let invalid = |detail: String| MalformedMessage::InvalidMap {
        line: line.to_owned(),
        detail,
    };

    let mut map = BTreeMap::new();
    loop {
        let key = match tokens.next() {
            Some(Token::MapClose) => return Ok(map),
            Some(Token::Keyword(name)) => name,
            Some(other) => {
                return Err(invalid(format!(
                    "keys must be keywords, found {}",
                    other.describe()
                )))
            }
            None => return Err(invalid("unterminated map".to_owned())),
        };

        let value = match tokens.next() {
            Some(Token::Integer(n)) => Value::Integer(n),
            Some(Token::Float(x)) => Value::Float(x),
            Some(Token::Str(s) | Token::Symbol(s) | Token::Keyword(s)) => Value::Text(s),
            Some(Token::Boolean(b)) => Value::Boolean(b),
            Some(Token::MapClose) | None => {
                return Err(invalid(format!("key :{key} has no value")));
            }
            Some(other) => {
                return Err(invalid(format!(
                    "unsupported value {} for key :{key}",
                    other.describe()
                )))
            }
        };

        match map.entry(key) {
            Entry::Occupied(entry) => {
                return Err(invalid(format!("duplicate key :{}", entry.key())));
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }
}
