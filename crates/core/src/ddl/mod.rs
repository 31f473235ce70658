//! Text format for metadata records: lexer and recursive-descent parser.

pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{parse_records, Parser};

use crate::types::FileMetadata;

/// Render a record in the text format, suitable for [`parse_records`].
#[must_use]
pub fn format_record(metadata: &FileMetadata) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = write!(out, "FILE \"{}\"", escape(&metadata.file_path));
    let _ = write!(out, " HASH \"{}\"", escape(&metadata.hash));
    let _ = write!(out, " SIZE {}", metadata.size);
    let _ = write!(out, " MODIFIED {}", metadata.modified_time);
    let _ = write!(out, " CREATED {}", metadata.created_time);
    let _ = write!(out, " STATE {}", metadata.sync_state);
    for replica in &metadata.replicas {
        let _ = write!(
            out,
            " REPLICA \"{}\" VERSION {} MODIFIED {}",
            escape(&replica.replica_id),
            replica.version,
            replica.modified_time
        );
    }
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}
