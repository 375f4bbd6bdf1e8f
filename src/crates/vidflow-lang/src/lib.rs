//! # vidflow-lang - Pipeline Language Front End
//!
//! The textual language for describing vidflow processing graphs: a lexer,
//! a recursive-descent parser, the syntax tree, and a canonical
//! pretty-printer.
//!
//! The language is small by design. A program is a list of named pipeline
//! definitions followed by the expression to run:
//!
//! ```text
//! # doubled edge view, written to a window
//! pipeline edges = to-gray -> sobel with (threshold: 40)
//!
//! camera -> (edges | blur with (kernel: 5)) -> display with (window_name: "out")
//! ```
//!
//! | Construct | Form | Meaning |
//! |-----------|------|---------|
//! | Call | `name` or `name with (k: v, …)` | Invoke a function or named pipeline |
//! | Sequence | `A -> B` | Output of A feeds input of B |
//! | Async sequence | `A ~> B` | As above, over a deeper queue |
//! | Parallel | `(A \| B) -> C` | A and B each feed C (merge at C) |
//! | Timing | `E @ 3s` | Run E for 3 wall-clock seconds |
//! | Definition | `pipeline name = E` | Bind a name for later reference |
//! | Comment | `# to end of line` | Ignored |
//!
//! This crate stops at the syntax tree. Lowering to an execution graph and
//! running it live in `vidflow-core`.
//!
//! ## Quick start
//!
//! ```
//! use vidflow_lang::parse;
//!
//! let program = parse("pipeline p = camera -> blur\np -> display").unwrap();
//! assert_eq!(program.defs.len(), 1);
//! assert!(program.body.is_some());
//!
//! // The printer emits canonical text.
//! assert_eq!(
//!     program.to_string(),
//!     "pipeline p = camera -> blur\np -> display\n"
//! );
//! ```

pub mod ast;
pub mod cursor;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod pretty;
pub mod token;

pub use ast::{ChannelClass, Def, Expr, Literal, Program};
pub use error::{LexError, ParseError};
pub use lexer::tokenize;
pub use parser::{parse, FrontendError, Parser};
pub use token::{Token, TokenKind};
