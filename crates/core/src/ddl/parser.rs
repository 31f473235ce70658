//! Recursive-descent parser for the metadata text format.
//!
//! Grammar:
//!
//! ```text
//! record   ::= FILE <string> clause*
//! clause   ::= HASH <string>
//!            | SIZE <number>
//!            | MODIFIED <number>
//!            | CREATED <number>
//!            | STATE <state>
//!            | REPLICA <string> VERSION <number> MODIFIED <number>
//! state    ::= SYNCED | MODIFIED | SYNCING | CONFLICT | DELETED
//! ```
//!
//! Clauses may appear in any order. A new `FILE` keyword delimits the next
//! record, so multiple records concatenate without separators.

use crate::error::{Result, SyncError};
use crate::types::{FileMetadata, ReplicaInfo, SyncState};

use super::lexer::{Lexer, Token, TokenKind};

/// Parser over a single input buffer.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Create a parser and prime it with the first token.
    ///
    /// # Errors
    /// Returns a parse error if the input starts with an invalid token.
    pub fn new(input: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Parse a single record starting at the current position.
    ///
    /// # Errors
    /// Returns a parse error describing the offending token and position.
    pub fn parse_record(&mut self) -> Result<FileMetadata> {
        self.expect(TokenKind::File, "expected FILE keyword")?;
        let path = self.expect(TokenKind::Str, "expected file path string after FILE")?;

        let mut metadata = FileMetadata::new(path.lexeme);

        loop {
            match self.current.kind {
                TokenKind::Hash => {
                    self.bump()?;
                    metadata.hash = self
                        .expect(TokenKind::Str, "expected hash string after HASH")?
                        .lexeme;
                }
                TokenKind::Size => {
                    self.bump()?;
                    metadata.size = self.number("expected size after SIZE")?;
                }
                TokenKind::Modified => {
                    self.bump()?;
                    metadata.modified_time =
                        self.number("expected timestamp after MODIFIED")? as i64;
                }
                TokenKind::Created => {
                    self.bump()?;
                    metadata.created_time =
                        self.number("expected timestamp after CREATED")? as i64;
                }
                TokenKind::State => {
                    self.bump()?;
                    metadata.sync_state = self.state()?;
                }
                TokenKind::Replica => {
                    metadata.replicas.push(self.replica()?);
                }
                // Next record, or end of input
                TokenKind::File | TokenKind::Eof => break,
                _ => {
                    return Err(self.error(format!(
                        "unexpected token '{}'",
                        self.current.lexeme
                    )));
                }
            }
        }

        Ok(metadata)
    }

    /// Parse every record in the input.
    ///
    /// # Errors
    /// Returns the first parse error encountered.
    pub fn parse_all(&mut self) -> Result<Vec<FileMetadata>> {
        let mut records = Vec::new();
        while self.current.kind != TokenKind::Eof {
            records.push(self.parse_record()?);
        }
        Ok(records)
    }

    fn replica(&mut self) -> Result<ReplicaInfo> {
        self.expect(TokenKind::Replica, "expected REPLICA keyword")?;
        let id = self.expect(TokenKind::Str, "expected replica id string after REPLICA")?;
        self.expect(TokenKind::Version, "expected VERSION keyword")?;
        let version = self.number("expected version number after VERSION")?;
        self.expect(TokenKind::Modified, "expected MODIFIED keyword")?;
        let modified = self.number("expected timestamp after MODIFIED")? as i64;

        Ok(ReplicaInfo::new(id.lexeme, version as u32, modified))
    }

    fn state(&mut self) -> Result<SyncState> {
        let state = match self.current.kind {
            TokenKind::Synced => SyncState::Synced,
            TokenKind::Modified => SyncState::Modified,
            TokenKind::Syncing => SyncState::Syncing,
            TokenKind::Conflict => SyncState::Conflict,
            TokenKind::Deleted => SyncState::Deleted,
            // Tolerate a quoted state name
            TokenKind::Str => self
                .current
                .lexeme
                .parse()
                .map_err(|_| self.error(format!("unknown sync state '{}'", self.current.lexeme)))?,
            _ => return Err(self.error("expected sync state after STATE".to_string())),
        };
        self.bump()?;
        Ok(state)
    }

    fn number(&mut self, message: &str) -> Result<u64> {
        let token = self.expect(TokenKind::Number, message)?;
        token
            .lexeme
            .parse()
            .map_err(|_| self.error(format!("number out of range: {}", token.lexeme)))
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token> {
        if self.current.kind != kind {
            return Err(self.error(message.to_string()));
        }
        let token = self.current.clone();
        self.bump()?;
        Ok(token)
    }

    fn bump(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn error(&self, message: String) -> SyncError {
        SyncError::Parse {
            line: self.current.line,
            column: self.current.column,
            message,
        }
    }
}

/// Parse every record in `input`.
///
/// # Errors
/// Returns the first parse error encountered.
pub fn parse_records(input: &str) -> Result<Vec<FileMetadata>> {
    Parser::new(input)?.parse_all()
}
