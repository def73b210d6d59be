//! Carabiner protocol: decoding of the lines the helper prints on stdout.
//!
//! Public API surface:
//! - [`decode`] / [`Message`]: one line in, one typed message out
//! - [`Details`] / [`Value`]: the payload variants
//! - [`MalformedMessage`]: everything that does not follow the grammar

pub mod error;
mod lexer;
pub mod message;

pub use error::MalformedMessage;
pub use message::{decode, tags, Details, Message, Value};
