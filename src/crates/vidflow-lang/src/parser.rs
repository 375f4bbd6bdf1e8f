//! Recursive-descent parser for the pipeline language.
//!
//! Grammar, precedence low to high (each rule loops instead of
//! left-recursing):
//!
//! ```text
//! Program       := (Definition | Expression)*
//! Definition    := "pipeline" Name "=" Expression
//! Expression    := Parallel
//! Parallel      := Sequence ( "|" Sequence )*
//! Sequence      := Timed ( ("->" | "~>") Timed )*
//! Timed         := Primary ( "@" Number "s" )?
//! Primary       := "(" Expression ")"
//!                | Name ( "with" "(" ParamList? ")" )?
//! ParamList     := Param ("," Param)*
//! Param         := Name ":" Literal
//! Literal       := Number | String | "[" Number ("," Number)* "]" | Name
//! ```
//!
//! `|` binds loosest, `@` binds tightest to its immediate left primary or
//! group. The deprecated `=>`/`+>`/`&>` spellings never reach the parser;
//! the lexer normalizes them.

use crate::ast::{ChannelClass, Def, Expr, Literal, Program};
use crate::error::{LexError, ParseError};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

/// Front-end error: either phase of source → syntax tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrontendError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Tokenizes and parses a whole source string.
pub fn parse(source: &str) -> Result<Program, FrontendError> {
    let tokens = tokenize(source)?;
    let program = Parser::new(tokens).parse_program()?;
    Ok(program)
}

/// The parser proper. Most callers want [`parse`].
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut program = Program::default();
        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Pipeline) {
                program.defs.push(self.parse_definition()?);
            } else {
                // The executable tail is the last bare expression.
                program.body = Some(self.parse_expression()?);
            }
        }
        Ok(program)
    }

    fn parse_definition(&mut self) -> Result<Def, ParseError> {
        self.expect(TokenKind::Pipeline, "'pipeline'")?;
        let name = self.expect(TokenKind::Ident, "pipeline name")?.text.clone();
        self.expect(TokenKind::Eq, "'=' after pipeline name")?;
        let body = self.parse_expression()?;
        Ok(Def { name, body })
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_parallel()
    }

    fn parse_parallel(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_sequence()?;
        if !self.check(TokenKind::Pipe) {
            return Ok(first);
        }
        let mut branches = vec![first];
        while self.eat(TokenKind::Pipe) {
            branches.push(self.parse_sequence()?);
        }
        Ok(Expr::Par { branches })
    }

    fn parse_sequence(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_timed()?;
        loop {
            let channel = if self.check(TokenKind::Arrow) {
                ChannelClass::Sync
            } else if self.check(TokenKind::AsyncArrow) {
                ChannelClass::Buffered
            } else {
                return Ok(left);
            };
            self.advance();
            let right = self.parse_timed()?;
            left = Expr::Seq {
                left: Box::new(left),
                right: Box::new(right),
                channel,
            };
        }
    }

    fn parse_timed(&mut self) -> Result<Expr, ParseError> {
        let inner = self.parse_primary()?;
        if !self.eat(TokenKind::At) {
            return Ok(inner);
        }
        let number = self
            .expect(TokenKind::Number, "positive duration after '@'")?
            .clone();
        let seconds: f64 = number
            .text
            .parse()
            .map_err(|_| Self::err_at(&number, "positive duration after '@'"))?;
        if seconds <= 0.0 {
            return Err(Self::err_at(&number, "positive duration after '@'"));
        }
        // The lexer splits `3s` into a number and an `s` identifier.
        let suffix = self.expect(TokenKind::Ident, "'s' after duration")?.clone();
        if suffix.text != "s" {
            return Err(Self::err_at(&suffix, "'s' after duration"));
        }
        Ok(Expr::Timed {
            inner: Box::new(inner),
            seconds,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(TokenKind::LParen) {
            let inner = self.parse_expression()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(Expr::Group {
                inner: Box::new(inner),
            });
        }
        let name = self
            .expect(TokenKind::Ident, "function or pipeline name")?
            .text
            .clone();
        let params = if self.eat(TokenKind::With) {
            self.expect(TokenKind::LParen, "'(' after 'with'")?;
            let params = self.parse_param_list()?;
            self.expect(TokenKind::RParen, "')'")?;
            params
        } else {
            Vec::new()
        };
        Ok(Expr::Call { name, params })
    }

    fn parse_param_list(&mut self) -> Result<Vec<(String, Literal)>, ParseError> {
        let mut params = Vec::new();
        if self.check(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let name = self.expect(TokenKind::Ident, "parameter name")?.text.clone();
            self.expect(TokenKind::Colon, "':' after parameter name")?;
            let value = self.parse_literal()?;
            params.push((name, value));
            if !self.eat(TokenKind::Comma) {
                return Ok(params);
            }
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                Ok(Self::number_literal(&token.text))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Literal::Str(token.text))
            }
            TokenKind::Ident => {
                self.advance();
                Ok(match token.text.as_str() {
                    "true" => Literal::Bool(true),
                    "false" => Literal::Bool(false),
                    _ => Literal::Symbol(token.text),
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut parts = Vec::new();
                loop {
                    let number = self.expect(TokenKind::Number, "number in array literal")?;
                    let value: f64 = number
                        .text
                        .parse()
                        .map_err(|_| Self::err_at(number, "number in array literal"))?;
                    parts.push(value);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Literal::Rgb(parts))
            }
            _ => Err(Self::err_at(&token, "literal value")),
        }
    }

    fn number_literal(text: &str) -> Literal {
        if text.contains('.') {
            Literal::Float(text.parse().unwrap_or(0.0))
        } else {
            // Integers too large for i64 degrade to floats.
            match text.parse::<i64>() {
                Ok(n) => Literal::Int(n),
                Err(_) => Literal::Float(text.parse().unwrap_or(0.0)),
            }
        }
    }

    // Token-stream helpers.

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            let index = self.pos;
            self.advance();
            Ok(&self.tokens[index])
        } else {
            Err(Self::err_at(self.peek(), expected))
        }
    }

    fn err_at(token: &Token, expected: &str) -> ParseError {
        let found = match token.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", token.text),
        };
        ParseError::new(token.line, token.column, expected, found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(source: &str) -> Expr {
        parse(source).unwrap().body.unwrap()
    }

    #[test]
    fn linear_sequence_is_left_associative() {
        let expr = parse_expr("a -> b -> c");
        match expr {
            Expr::Seq { left, right, channel } => {
                assert_eq!(channel, ChannelClass::Sync);
                assert_eq!(*right, Expr::call("c"));
                match *left {
                    Expr::Seq { left, right, .. } => {
                        assert_eq!(*left, Expr::call("a"));
                        assert_eq!(*right, Expr::call("b"));
                    }
                    other => panic!("expected nested seq, got {:?}", other),
                }
            }
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[test]
    fn async_arrow_marks_buffered_channel() {
        match parse_expr("a ~> b") {
            Expr::Seq { channel, .. } => assert_eq!(channel, ChannelClass::Buffered),
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[test]
    fn pipe_binds_looser_than_arrow() {
        // a | b -> c parses as a | (b -> c)
        match parse_expr("a | b -> c") {
            Expr::Par { branches } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0], Expr::call("a"));
                assert!(matches!(branches[1], Expr::Seq { .. }));
            }
            other => panic!("expected par, got {:?}", other),
        }
    }

    #[test]
    fn grouping_changes_precedence() {
        // (a | b) -> c: the par feeds c
        match parse_expr("(a | b) -> c") {
            Expr::Seq { left, right, .. } => {
                assert!(matches!(left.unwrap_groups(), Expr::Par { .. }));
                assert_eq!(*right, Expr::call("c"));
            }
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[test]
    fn timed_binds_to_immediate_primary() {
        // a -> b @ 3s: only b is timed
        match parse_expr("a -> b @ 3s") {
            Expr::Seq { right, .. } => match *right {
                Expr::Timed { inner, seconds } => {
                    assert_eq!(*inner, Expr::call("b"));
                    assert_eq!(seconds, 3.0);
                }
                other => panic!("expected timed, got {:?}", other),
            },
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[test]
    fn timed_group_with_fractional_seconds() {
        match parse_expr("(a -> b) @ 2.5s") {
            Expr::Timed { inner, seconds } => {
                assert_eq!(seconds, 2.5);
                assert!(matches!(inner.unwrap_groups(), Expr::Seq { .. }));
            }
            other => panic!("expected timed, got {:?}", other),
        }
    }

    #[test]
    fn with_clause_literals() {
        match parse_expr(
            "blur with (kernel: 5, sigma: 1.5, label: \"soft\", fast: true, tint: [255, 128, 0], mode: mirror)",
        ) {
            Expr::Call { name, params } => {
                assert_eq!(name, "blur");
                assert_eq!(params[0], ("kernel".into(), Literal::Int(5)));
                assert_eq!(params[1], ("sigma".into(), Literal::Float(1.5)));
                assert_eq!(params[2], ("label".into(), Literal::Str("soft".into())));
                assert_eq!(params[3], ("fast".into(), Literal::Bool(true)));
                assert_eq!(
                    params[4],
                    ("tint".into(), Literal::Rgb(vec![255.0, 128.0, 0.0]))
                );
                assert_eq!(params[5], ("mode".into(), Literal::Symbol("mirror".into())));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn empty_with_clause() {
        match parse_expr("blur with ()") {
            Expr::Call { params, .. } => assert!(params.is_empty()),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn definitions_and_tail_expression() {
        let program = parse("pipeline p = a -> b\npipeline q = p -> c\nq -> sink").unwrap();
        assert_eq!(program.defs.len(), 2);
        assert_eq!(program.defs[0].name, "p");
        assert_eq!(program.defs[1].name, "q");
        assert!(program.body.is_some());
    }

    #[test]
    fn program_of_only_definitions_has_no_body() {
        let program = parse("pipeline p = a -> b").unwrap();
        assert_eq!(program.defs.len(), 1);
        assert!(program.body.is_none());
    }

    #[test]
    fn last_bare_expression_wins() {
        let program = parse("a -> b\nc -> d").unwrap();
        match program.body.unwrap() {
            Expr::Seq { left, .. } => assert_eq!(*left, Expr::call("c")),
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[test]
    fn missing_eq_in_definition() {
        let err = match parse("pipeline p a -> b") {
            Err(FrontendError::Parse(err)) => err,
            other => panic!("expected parse error, got {:?}", other),
        };
        assert!(err.expected.contains("'='"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn missing_close_paren() {
        let err = match parse("(a -> b") {
            Err(FrontendError::Parse(err)) => err,
            other => panic!("expected parse error, got {:?}", other),
        };
        assert_eq!(err.expected, "')'");
        assert_eq!(err.found, "end of input");
    }

    #[test]
    fn at_requires_positive_number_and_suffix() {
        assert!(parse("a @ 0s").is_err());
        assert!(parse("a @ s").is_err());
        assert!(parse("a @ 3").is_err());
        assert!(parse("a @ 3 seconds").is_err());
        assert!(parse("a @ 3s").is_ok());
        // Whitespace between number and suffix is accepted.
        assert!(parse("a @ 3 s").is_ok());
    }

    #[test]
    fn deprecated_aliases_parse_like_canonical_forms() {
        assert_eq!(parse_expr("a => b"), parse_expr("a -> b"));
        assert_eq!(parse_expr("a +> b"), parse_expr("a ~> b"));
        assert_eq!(parse_expr("a &> b"), parse_expr("a | b"));
    }
}
