//! Hand-rolled lexer over a `Peekable<CharIndices>` cursor, producing this
//! crate's simpler [`Token`] set and [`crate::error::Location`]-based
//! positions.

use std::iter::Peekable;
use std::str::CharIndices;

use derive_more::{Display, Error as DeriveError};

use crate::error::Location;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bang,
    Dollar,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    CurlyOpen,
    CurlyClose,
    Colon,
    Equals,
    At,
    Ellipsis,
    Eof,
}

#[derive(Clone, Debug, Display, DeriveError, PartialEq)]
pub enum LexError {
    #[display("unknown character {_0:?}")]
    UnknownCharacter(#[error(not(source))] char),
    #[display("unterminated string literal")]
    UnterminatedString,
    #[display("invalid number literal")]
    InvalidNumber,
    #[display("unexpected end of file")]
    UnexpectedEof,
}

pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    source: &'a str,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, ch) = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn skip_ignored(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() || c == ',' => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Produces the next token and the location it started at.
    pub fn next_token(&mut self) -> Result<(Token, Location), (LexError, Location)> {
        self.skip_ignored();
        let start = self.location();
        let Some(c) = self.peek() else {
            return Ok((Token::Eof, start));
        };

        let tok = match c {
            '!' => {
                self.bump();
                Token::Bang
            }
            '$' => {
                self.bump();
                Token::Dollar
            }
            '(' => {
                self.bump();
                Token::ParenOpen
            }
            ')' => {
                self.bump();
                Token::ParenClose
            }
            '[' => {
                self.bump();
                Token::BracketOpen
            }
            ']' => {
                self.bump();
                Token::BracketClose
            }
            '{' => {
                self.bump();
                Token::CurlyOpen
            }
            '}' => {
                self.bump();
                Token::CurlyClose
            }
            ':' => {
                self.bump();
                Token::Colon
            }
            '=' => {
                self.bump();
                Token::Equals
            }
            '@' => {
                self.bump();
                Token::At
            }
            '.' => {
                self.bump();
                if self.peek() == Some('.') {
                    self.bump();
                    if self.peek() == Some('.') {
                        self.bump();
                        Token::Ellipsis
                    } else {
                        return Err((LexError::UnknownCharacter('.'), start));
                    }
                } else {
                    return Err((LexError::UnknownCharacter('.'), start));
                }
            }
            '"' => return self.lex_string(start),
            c if c == '-' || c.is_ascii_digit() => return self.lex_number(start),
            c if c.is_ascii_alphabetic() || c == '_' => return self.lex_name(start),
            other => return Err((LexError::UnknownCharacter(other), start)),
        };
        Ok((tok, start))
    }

    fn lex_name(&mut self, start: Location) -> Result<(Token, Location), (LexError, Location)> {
        let mut buf = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                buf.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok((Token::Name(buf), start))
    }

    fn lex_number(&mut self, start: Location) -> Result<(Token, Location), (LexError, Location)> {
        let mut buf = String::new();
        if self.peek() == Some('-') {
            buf.push('-');
            self.bump();
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                buf.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            is_float = true;
            buf.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    buf.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            buf.push('e');
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                buf.push(self.bump().unwrap());
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    buf.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if is_float {
            let v: f64 = buf.parse().map_err(|_| (LexError::InvalidNumber, start))?;
            Ok((Token::Float(v), start))
        } else {
            let v: i64 = buf.parse().map_err(|_| (LexError::InvalidNumber, start))?;
            Ok((Token::Int(v), start))
        }
    }

    fn lex_string(&mut self, start: Location) -> Result<(Token, Location), (LexError, Location)> {
        self.bump(); // opening quote
        let mut buf = String::new();
        loop {
            match self.bump() {
                None => return Err((LexError::UnexpectedEof, start)),
                Some('"') => break,
                Some('\n') => return Err((LexError::UnterminatedString, start)),
                Some('\\') => match self.bump() {
                    Some('n') => buf.push('\n'),
                    Some('t') => buf.push('\t'),
                    Some('r') => buf.push('\r'),
                    Some('"') => buf.push('"'),
                    Some('\\') => buf.push('\\'),
                    Some('/') => buf.push('/'),
                    Some(other) => buf.push(other),
                    None => return Err((LexError::UnexpectedEof, start)),
                },
                Some(c) => buf.push(c),
            }
        }
        Ok((Token::Str(buf), start))
    }

    /// Total length of the original source, for bounds diagnostics.
    pub fn source_len(&self) -> usize {
        self.source.len()
    }
}
