//! Error types for the language front end.
//!
//! Both errors carry the 1-based line and column of the offending input so
//! hosts can point at the exact character. They implement `std::error::Error`
//! via the `thiserror` crate.

use thiserror::Error;

/// Lexical error: the character stream could not be tokenized.
///
/// Raised on unterminated strings, unknown characters and malformed numbers
/// (a second decimal point). Lexing aborts at the first error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lex error at {line}:{column}: {reason}")]
pub struct LexError {
    /// Line of the offending character (1-based).
    pub line: u32,
    /// Column of the offending character (1-based).
    pub column: u32,
    /// Human-readable description of what went wrong.
    pub reason: String,
}

impl LexError {
    pub fn new(line: u32, column: u32, reason: impl Into<String>) -> Self {
        Self {
            line,
            column,
            reason: reason.into(),
        }
    }
}

/// Syntax error: the token stream does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {line}:{column}: expected {expected}, found {found}")]
pub struct ParseError {
    /// Line of the unexpected token (1-based).
    pub line: u32,
    /// Column of the unexpected token (1-based).
    pub column: u32,
    /// What the parser was looking for.
    pub expected: String,
    /// What it found instead.
    pub found: String,
}

impl ParseError {
    pub fn new(
        line: u32,
        column: u32,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self {
            line,
            column,
            expected: expected.into(),
            found: found.into(),
        }
    }
}
