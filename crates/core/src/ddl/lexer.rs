//! Tokenizer for the metadata text format.
//!
//! The format is whitespace-insensitive: keywords, double-quoted strings
//! (with `\n \t \r \" \\` escapes), and unsigned integers. `#` starts a
//! line comment. Line and column are tracked for error reporting.

use crate::error::{Result, SyncError};

/// Token kinds in the metadata text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    File,
    Hash,
    Size,
    Modified,
    Created,
    State,
    Replica,
    Version,

    // State names (MODIFIED doubles as the attribute keyword above)
    Synced,
    Syncing,
    Conflict,
    Deleted,

    // Literals
    Str,
    Number,

    Eof,
}

/// A token with its text and source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text; for `Str` this is the unescaped contents.
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

/// Character-by-character tokenizer.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scan the next token, skipping whitespace and comments.
    ///
    /// # Errors
    /// Returns a parse error for unterminated strings or stray characters.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let (line, column) = (self.line, self.column);

        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                line,
                column,
            });
        };

        if c == b'"' {
            return self.scan_string(line, column);
        }
        if c.is_ascii_digit() {
            return Ok(self.scan_number(line, column));
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.scan_word(line, column);
        }

        Err(self.error_at(line, column, format!("unexpected character '{}'", c as char)))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.advance();
            } else if c == b'#' {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn scan_string(&mut self, line: usize, column: usize) -> Result<Token> {
        self.advance(); // opening quote
        let mut value = String::new();

        loop {
            match self.advance() {
                None | Some(b'\n') => {
                    return Err(self.error_at(line, column, "unterminated string".to_string()));
                }
                Some(b'"') => break,
                Some(b'\\') => {
                    let escaped = self
                        .advance()
                        .ok_or_else(|| self.error_at(line, column, "unterminated string".to_string()))?;
                    match escaped {
                        b'n' => value.push('\n'),
                        b't' => value.push('\t'),
                        b'r' => value.push('\r'),
                        b'"' => value.push('"'),
                        b'\\' => value.push('\\'),
                        other => value.push(other as char),
                    }
                }
                Some(c) => value.push(c as char),
            }
        }

        Ok(Token {
            kind: TokenKind::Str,
            lexeme: value,
            line,
            column,
        })
    }

    fn scan_number(&mut self, line: usize, column: usize) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        Token {
            kind: TokenKind::Number,
            lexeme: String::from_utf8_lossy(&self.input[start..self.pos]).into_owned(),
            line,
            column,
        }
    }

    fn scan_word(&mut self, line: usize, column: usize) -> Result<Token> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.advance();
        }
        let word = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();

        let kind = match word.as_str() {
            "FILE" => TokenKind::File,
            "HASH" => TokenKind::Hash,
            "SIZE" => TokenKind::Size,
            "MODIFIED" => TokenKind::Modified,
            "CREATED" => TokenKind::Created,
            "STATE" => TokenKind::State,
            "REPLICA" => TokenKind::Replica,
            "VERSION" => TokenKind::Version,
            "SYNCED" => TokenKind::Synced,
            "SYNCING" => TokenKind::Syncing,
            "CONFLICT" => TokenKind::Conflict,
            "DELETED" => TokenKind::Deleted,
            _ => return Err(self.error_at(line, column, format!("unknown keyword '{word}'"))),
        };

        Ok(Token {
            kind,
            lexeme: word,
            line,
            column,
        })
    }

    fn error_at(&self, line: usize, column: usize, message: String) -> SyncError {
        SyncError::Parse {
            line,
            column,
            message,
        }
    }
}
