//! Lexer for the pipeline language.
//!
//! Transforms source text into a stream of [`Token`]s terminated by
//! [`TokenKind::Eof`]. Whitespace separates tokens; `#` starts a comment
//! that runs to the end of the line. Multi-character operators are
//! recognized before their single-character prefixes (`->` before `-`,
//! `=>` before `=`, and so on).
//!
//! # Example
//!
//! ```
//! use vidflow_lang::lexer::tokenize;
//! use vidflow_lang::token::TokenKind;
//!
//! let tokens = tokenize("camera -> blur @ 3s").unwrap();
//! let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
//! assert_eq!(
//!     kinds,
//!     vec![
//!         TokenKind::Ident,
//!         TokenKind::Arrow,
//!         TokenKind::Ident,
//!         TokenKind::At,
//!         TokenKind::Number,
//!         TokenKind::Ident, // the "s" suffix; the parser consumes it
//!         TokenKind::Eof,
//!     ]
//! );
//! ```

use crate::cursor::Cursor;
use crate::error::LexError;
use crate::token::{keyword_from_ident, Token, TokenKind};

/// Tokenizes a whole source string.
///
/// Stops at the first lexical error. The returned list always ends with a
/// single [`TokenKind::Eof`] token carrying the position past the last
/// character.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

/// The lexer proper. Most callers want [`tokenize`].
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    /// Start position of the current token.
    token_start: usize,
    /// Start line of the current token.
    token_line: u32,
    /// Start column of the current token.
    token_column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
            token_start: 0,
            token_line: 1,
            token_column: 1,
        }
    }

    /// Returns the next token, or a [`LexError`] at the offending character.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        self.token_start = self.cursor.position();
        self.token_line = self.cursor.line();
        self.token_column = self.cursor.column();

        if self.cursor.is_at_end() {
            return Ok(self.make(TokenKind::Eof, ""));
        }

        match self.cursor.current() {
            '(' => Ok(self.single(TokenKind::LParen)),
            ')' => Ok(self.single(TokenKind::RParen)),
            '[' => Ok(self.single(TokenKind::LBracket)),
            ']' => Ok(self.single(TokenKind::RBracket)),
            ',' => Ok(self.single(TokenKind::Comma)),
            ':' => Ok(self.single(TokenKind::Colon)),
            '@' => Ok(self.single(TokenKind::At)),
            '|' => Ok(self.single(TokenKind::Pipe)),

            '-' => self.lex_operator(TokenKind::Arrow, "->"),
            '~' => self.lex_operator(TokenKind::AsyncArrow, "~>"),
            // Deprecated alias spellings, normalized at the token level.
            '&' => self.lex_operator(TokenKind::Pipe, "&>"),
            '+' => self.lex_operator(TokenKind::AsyncArrow, "+>"),
            '=' => {
                if self.cursor.char_at(1) == '>' {
                    self.cursor.advance();
                    self.cursor.advance();
                    Ok(self.make(TokenKind::Arrow, "=>"))
                } else {
                    Ok(self.single(TokenKind::Eq))
                }
            }

            '"' | '\'' => self.lex_string(),
            c if c.is_ascii_digit() => self.lex_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.lex_identifier()),
            c => Err(self.error_here(format!("unknown character '{}'", c))),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let c = self.cursor.current();
            if c.is_whitespace() {
                self.cursor.advance();
            } else if c == '#' {
                while !self.cursor.is_at_end() && self.cursor.current() != '\n' {
                    self.cursor.advance();
                }
            } else {
                return;
            }
        }
    }

    /// A two-character operator whose first character is not a token on its
    /// own. `kind` is the normalized kind, `spelling` the accepted text.
    fn lex_operator(&mut self, kind: TokenKind, spelling: &str) -> Result<Token, LexError> {
        if self.cursor.char_at(1) == '>' {
            self.cursor.advance();
            self.cursor.advance();
            Ok(self.make(kind, spelling))
        } else {
            Err(self.error_here(format!(
                "unknown character '{}'",
                self.cursor.current()
            )))
        }
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let mut seen_dot = false;
        loop {
            let c = self.cursor.current();
            if c.is_ascii_digit() {
                self.cursor.advance();
            } else if c == '.' && self.cursor.char_at(1).is_ascii_digit() {
                if seen_dot {
                    return Err(LexError::new(
                        self.cursor.line(),
                        self.cursor.column(),
                        "malformed number: second decimal point",
                    ));
                }
                seen_dot = true;
                self.cursor.advance();
            } else {
                break;
            }
        }
        let text = self
            .cursor
            .slice(self.token_start, self.cursor.position())
            .to_string();
        Ok(self.make(TokenKind::Number, text))
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        let quote = self.cursor.current();
        self.cursor.advance();
        let mut value = String::new();
        loop {
            if self.cursor.is_at_end() || self.cursor.current() == '\n' {
                return Err(LexError::new(
                    self.token_line,
                    self.token_column,
                    "unterminated string",
                ));
            }
            let c = self.cursor.current();
            if c == quote {
                self.cursor.advance();
                return Ok(self.make(TokenKind::Str, value));
            }
            if c == '\\' {
                self.cursor.advance();
                if self.cursor.is_at_end() {
                    return Err(LexError::new(
                        self.token_line,
                        self.token_column,
                        "unterminated string",
                    ));
                }
                let escaped = self.cursor.current();
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    '\\' => '\\',
                    // Any other escaped character passes through.
                    other => other,
                });
                self.cursor.advance();
            } else {
                value.push(c);
                self.cursor.advance();
            }
        }
    }

    fn lex_identifier(&mut self) -> Token {
        loop {
            let c = self.cursor.current();
            if c.is_alphanumeric() || c == '_' || c == '-' {
                // `-` continues an identifier only when not starting `->`.
                if c == '-' && self.cursor.char_at(1) == '>' {
                    break;
                }
                self.cursor.advance();
            } else {
                break;
            }
        }
        let text = self
            .cursor
            .slice(self.token_start, self.cursor.position())
            .to_string();
        match keyword_from_ident(&text) {
            Some(kind) => self.make(kind, text),
            None => self.make(TokenKind::Ident, text),
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let c = self.cursor.current();
        self.cursor.advance();
        self.make(kind, c.to_string())
    }

    fn make(&self, kind: TokenKind, text: impl Into<String>) -> Token {
        Token::new(kind, text, self.token_line, self.token_column)
    }

    fn error_here(&self, reason: String) -> LexError {
        LexError::new(self.token_line, self.token_column, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n\t # only a comment"), vec![TokenKind::Eof]);
    }

    #[test]
    fn operators_and_punctuation() {
        assert_eq!(
            kinds("-> ~> | ( ) [ ] , : @ ="),
            vec![
                TokenKind::Arrow,
                TokenKind::AsyncArrow,
                TokenKind::Pipe,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Comma,
                TokenKind::Colon,
                TokenKind::At,
                TokenKind::Eq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn deprecated_operator_aliases_normalize() {
        let tokens = tokenize("a => b +> c &> d").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Arrow);
        assert_eq!(tokens[1].text, "=>");
        assert_eq!(tokens[3].kind, TokenKind::AsyncArrow);
        assert_eq!(tokens[3].text, "+>");
        assert_eq!(tokens[5].kind, TokenKind::Pipe);
        assert_eq!(tokens[5].text, "&>");
    }

    #[test]
    fn keywords_only_from_identifiers() {
        assert_eq!(
            kinds("pipeline edges with withers"),
            vec![
                TokenKind::Pipeline,
                TokenKind::Ident,
                TokenKind::With,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn identifiers_may_contain_dashes() {
        let tokens = tokenize("to-gray->sink").unwrap();
        assert_eq!(tokens[0].text, "to-gray");
        assert_eq!(tokens[1].kind, TokenKind::Arrow);
        assert_eq!(tokens[2].text, "sink");
    }

    #[test]
    fn numbers_integer_and_decimal() {
        let tokens = tokenize("3 1.5 0.25").unwrap();
        assert_eq!(tokens[0].text, "3");
        assert_eq!(tokens[1].text, "1.5");
        assert_eq!(tokens[2].text, "0.25");
    }

    #[test]
    fn number_followed_by_suffix_splits() {
        let tokens = tokenize("3s").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].text, "3");
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[1].text, "s");
    }

    #[test]
    fn malformed_number_reports_position() {
        let err = tokenize("1.2.3").unwrap_err();
        assert!(err.reason.contains("second decimal point"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn strings_with_escapes() {
        let tokens = tokenize(r#""a\nb" 'c\td' "back\\slash" "\q""#).unwrap();
        assert_eq!(tokens[0].text, "a\nb");
        assert_eq!(tokens[1].text, "c\td");
        assert_eq!(tokens[2].text, "back\\slash");
        // Unknown escapes pass the character through.
        assert_eq!(tokens[3].text, "q");
    }

    #[test]
    fn unterminated_string_errors_at_opening_quote() {
        let err = tokenize("x -> \"oops").unwrap_err();
        assert_eq!(err.reason, "unterminated string");
        assert_eq!(err.column, 6);
    }

    #[test]
    fn unknown_character_errors() {
        let err = tokenize("a $ b").unwrap_err();
        assert!(err.reason.contains("unknown character"));
        assert_eq!(err.column, 3);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            kinds("a # -> ignored\n-> b"),
            vec![
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_track_lines() {
        let tokens = tokenize("a\n  b").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn lone_dash_is_an_error() {
        // `-` only exists as part of `->` or inside an identifier.
        let err = tokenize("a - b").unwrap_err();
        assert_eq!(err.column, 3);
    }
}
