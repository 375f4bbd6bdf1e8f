//! Abstract syntax for pipeline programs.
//!
//! The syntax tree is a tagged union ([`Expr`]) plus a top-level
//! [`Program`] of definitions and an optional executable expression. Syntax
//! trees only live between parsing and compilation; the compiler lowers
//! them into an execution graph and drops them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which queue class a sequential edge asked for.
///
/// `->` and `~>` compose identically; the only difference is the capacity
/// the compiler later assigns to the connecting edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelClass {
    /// `->`: the default bounded queue.
    Sync,
    /// `~>`: a deeper bounded queue.
    Buffered,
}

/// A literal parameter value in a `with (...)` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// `[R, G, B]` style numeric triple (any length is stored).
    Rgb(Vec<f64>),
    /// A bare identifier, forwarded verbatim as a symbolic constant.
    Symbol(String),
}

impl Literal {
    /// Converts to the JSON value handed to transforms.
    ///
    /// Symbols become plain strings; transforms that care about the
    /// difference receive the original spelling either way.
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Int(n) => Value::from(*n),
            Literal::Float(x) => Value::from(*x),
            Literal::Str(s) => Value::from(s.clone()),
            Literal::Bool(b) => Value::from(*b),
            Literal::Rgb(parts) => Value::from(parts.clone()),
            Literal::Symbol(s) => Value::from(s.clone()),
        }
    }
}

/// A pipeline expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a registered function or a previously defined pipeline,
    /// with optional keyword parameters.
    Call {
        name: String,
        /// Parameters in source order.
        params: Vec<(String, Literal)>,
    },
    /// Sequential composition: output of `left` feeds input of `right`.
    Seq {
        left: Box<Expr>,
        right: Box<Expr>,
        channel: ChannelClass,
    },
    /// Parallel fan-out with implicit merge; always two or more branches.
    Par { branches: Vec<Expr> },
    /// Bound `inner` to a wall-clock duration in seconds (positive).
    Timed { inner: Box<Expr>, seconds: f64 },
    /// Parenthesized expression.
    Group { inner: Box<Expr> },
}

impl Expr {
    /// Unwraps any number of `Group` layers.
    pub fn unwrap_groups(&self) -> &Expr {
        let mut expr = self;
        while let Expr::Group { inner } = expr {
            expr = inner;
        }
        expr
    }

    pub fn call(name: impl Into<String>) -> Expr {
        Expr::Call {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn seq(left: Expr, right: Expr) -> Expr {
        Expr::Seq {
            left: Box::new(left),
            right: Box::new(right),
            channel: ChannelClass::Sync,
        }
    }

    /// Structural copy with every `Group` layer removed.
    ///
    /// Grouping only exists to steer the parser; compilation and
    /// equivalence checks treat `(e)` and `e` identically.
    pub fn without_groups(&self) -> Expr {
        match self {
            Expr::Group { inner } => inner.without_groups(),
            Expr::Call { name, params } => Expr::Call {
                name: name.clone(),
                params: params.clone(),
            },
            Expr::Seq {
                left,
                right,
                channel,
            } => Expr::Seq {
                left: Box::new(left.without_groups()),
                right: Box::new(right.without_groups()),
                channel: *channel,
            },
            Expr::Par { branches } => Expr::Par {
                branches: branches.iter().map(Expr::without_groups).collect(),
            },
            Expr::Timed { inner, seconds } => Expr::Timed {
                inner: Box::new(inner.without_groups()),
                seconds: *seconds,
            },
        }
    }
}

/// A top-level `pipeline name = body` binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Def {
    pub name: String,
    pub body: Expr,
}

/// A whole program: zero or more definitions plus an optional executable
/// tail expression.
///
/// When the source contains several bare expressions, the last one is the
/// executable tail; earlier ones are parsed and discarded. A program that
/// ends with only definitions has `body: None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// Definitions in source order. Later definitions of the same name
    /// shadow earlier ones.
    pub defs: Vec<Def>,
    pub body: Option<Expr>,
}
