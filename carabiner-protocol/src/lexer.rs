//! Tokenizer for the EDN subset Carabiner prints.
//!
//! Whitespace and commas separate tokens, `;` comments run to end of line.
//! Only the forms the helper can emit are recognised; anything else (vectors,
//! lists, tagged literals, characters) is a syntax error.

use std::iter::Peekable;
use std::str::CharIndices;

type Chars<'a> = Peekable<CharIndices<'a>>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Symbol(String),
    Keyword(String),
    Str(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Nil,
    MapOpen,
    MapClose,
}

impl Token {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Token::Symbol(_) => "a symbol",
            Token::Keyword(_) => "a keyword",
            Token::Str(_) => "a string",
            Token::Integer(_) => "an integer",
            Token::Float(_) => "a float",
            Token::Boolean(_) => "a boolean",
            Token::Nil => "nil",
            Token::MapOpen => "'{'",
            Token::MapClose => "'}'",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub offset: usize,
    pub detail: String,
}

impl LexError {
    fn new(offset: usize, detail: impl Into<String>) -> Self {
        Self {
            offset,
            detail: detail.into(),
        }
    }
}

/// Split `input` into tokens, each paired with its starting byte offset.
pub(crate) fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if is_separator(c) {
            chars.next();
            continue;
        }

        match c {
            ';' => skip_comment(&mut chars),
            '{' => {
                chars.next();
                tokens.push((offset, Token::MapOpen));
            }
            '}' => {
                chars.next();
                tokens.push((offset, Token::MapClose));
            }
            '"' => {
                chars.next();
                let text = read_string(&mut chars, offset)?;
                tokens.push((offset, Token::Str(text)));
            }
            ':' => {
                chars.next();
                let name = read_atom(&mut chars);
                if name.is_empty() {
                    return Err(LexError::new(offset, "keyword has no name"));
                }
                validate_symbol(&name, offset)?;
                tokens.push((offset, Token::Keyword(name)));
            }
            c if c.is_ascii_digit() || is_symbol_start(c) => {
                let atom = read_atom(&mut chars);
                tokens.push((offset, classify_atom(atom, offset)?));
            }
            other => {
                return Err(LexError::new(
                    offset,
                    format!("unexpected character {other:?}"),
                ));
            }
        }
    }

    Ok(tokens)
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn is_symbol_start(c: char) -> bool {
    c.is_alphabetic() || "*+!-_?$%&=<>/.".contains(c)
}

fn is_atom_char(c: char) -> bool {
    c.is_alphanumeric() || ".*+!-_?$%&=<>/'#:".contains(c)
}

fn skip_comment(chars: &mut Chars<'_>) {
    for (_, c) in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

fn read_atom(chars: &mut Chars<'_>) -> String {
    let mut atom = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !is_atom_char(c) {
            break;
        }
        atom.push(c);
        chars.next();
    }
    atom
}

fn classify_atom(atom: String, offset: usize) -> Result<Token, LexError> {
    let mut leading = atom.chars();
    let first = leading.next();
    let second = leading.next();

    let numeric = match (first, second) {
        (Some(c), _) if c.is_ascii_digit() => true,
        (Some('+' | '-'), Some(c)) => c.is_ascii_digit(),
        _ => false,
    };
    if numeric {
        return parse_number(&atom, offset);
    }

    validate_symbol(&atom, offset)?;
    Ok(match atom.as_str() {
        "nil" => Token::Nil,
        "true" => Token::Boolean(true),
        "false" => Token::Boolean(false),
        _ => Token::Symbol(atom),
    })
}

fn validate_symbol(name: &str, offset: usize) -> Result<(), LexError> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), _) if !is_symbol_start(c) => Err(LexError::new(
            offset,
            format!("invalid symbol {name:?}"),
        )),
        (Some('.' | '+' | '-'), Some(c)) if c.is_ascii_digit() => Err(LexError::new(
            offset,
            format!("invalid symbol {name:?}"),
        )),
        _ => Ok(()),
    }
}

fn parse_number(text: &str, offset: usize) -> Result<Token, LexError> {
    let invalid = || LexError::new(offset, format!("invalid number {text:?}"));

    if let Some(digits) = text.strip_suffix('N') {
        return digits.parse().map(Token::Integer).map_err(|_| invalid());
    }

    let (body, exact_decimal) = match text.strip_suffix('M') {
        Some(body) => (body, true),
        None => (text, false),
    };

    if exact_decimal || body.contains(['.', 'e', 'E']) {
        let well_formed = body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
        if !well_formed {
            return Err(invalid());
        }
        return body.parse().map(Token::Float).map_err(|_| invalid());
    }

    body.parse().map(Token::Integer).map_err(|_| invalid())
}

fn read_string(chars: &mut Chars<'_>, start: usize) -> Result<String, LexError> {
    let mut text = String::new();
    loop {
        let Some((offset, c)) = chars.next() else {
            return Err(LexError::new(start, "unterminated string"));
        };
        match c {
            '"' => return Ok(text),
            '\\' => text.push(read_escape(chars, offset, start)?),
            c => text.push(c),
        }
    }
}

fn read_escape(chars: &mut Chars<'_>, offset: usize, start: usize) -> Result<char, LexError> {
    let Some((_, escaped)) = chars.next() else {
        return Err(LexError::new(start, "unterminated string"));
    };
    match escaped {
        'n' => Ok('\n'),
        't' => Ok('\t'),
        'r' => Ok('\r'),
        'b' => Ok('\u{8}'),
        'f' => Ok('\u{c}'),
        '"' | '\\' | '/' => Ok(escaped),
        'u' => {
            let mut code = 0u32;
            for _ in 0..4 {
                let digit = chars
                    .next()
                    .and_then(|(_, c)| c.to_digit(16))
                    .ok_or_else(|| LexError::new(offset, "invalid unicode escape"))?;
                code = code * 16 + digit;
            }
            char::from_u32(code).ok_or_else(|| LexError::new(offset, "invalid unicode escape"))
        }
        other => Err(LexError::new(
            offset,
            format!("invalid escape sequence \\{other}"),
        )),
    }
}
