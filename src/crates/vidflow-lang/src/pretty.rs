//! Deterministic pretty-printer for pipeline programs.
//!
//! The printer emits canonical source text: parentheses appear exactly
//! where the structure requires them, parameters keep their source order,
//! and `print(parse(text))` is stable. Round-trip tests and graph debugging
//! both lean on this.

use std::fmt::{self, Write as _};

use crate::ast::{ChannelClass, Expr, Literal, Program};

/// Precedence levels, loosest to tightest. A child whose own level is
/// below the level its position requires gets wrapped in parentheses.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
enum Level {
    Parallel = 1,
    Sequence = 2,
    Timed = 3,
    Primary = 4,
}

fn level_of(expr: &Expr) -> Level {
    match expr {
        Expr::Par { .. } => Level::Parallel,
        Expr::Seq { .. } => Level::Sequence,
        Expr::Timed { .. } => Level::Timed,
        Expr::Call { .. } | Expr::Group { .. } => Level::Primary,
    }
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, min: Level) -> fmt::Result {
    if level_of(expr) < min {
        f.write_char('(')?;
        write_expr(f, expr, Level::Parallel)?;
        return f.write_char(')');
    }
    match expr {
        Expr::Call { name, params } => {
            f.write_str(name)?;
            if !params.is_empty() {
                f.write_str(" with (")?;
                for (i, (key, value)) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_char(')')?;
            }
            Ok(())
        }
        Expr::Seq {
            left,
            right,
            channel,
        } => {
            write_expr(f, left, Level::Sequence)?;
            f.write_str(match channel {
                ChannelClass::Sync => " -> ",
                ChannelClass::Buffered => " ~> ",
            })?;
            // The right side of a sequence is a Timed in the grammar; a
            // right-nested sequence needs explicit parentheses.
            write_expr(f, right, Level::Timed)
        }
        Expr::Par { branches } => {
            for (i, branch) in branches.iter().enumerate() {
                if i > 0 {
                    f.write_str(" | ")?;
                }
                write_expr(f, branch, Level::Sequence)?;
            }
            Ok(())
        }
        Expr::Timed { inner, seconds } => {
            write_expr(f, inner, Level::Primary)?;
            write!(f, " @ {}s", format_seconds(*seconds))
        }
        Expr::Group { inner } => {
            f.write_char('(')?;
            write_expr(f, inner, Level::Parallel)?;
            f.write_char(')')
        }
    }
}

fn format_seconds(seconds: f64) -> String {
    // 3.0 prints as "3"; 2.5 stays "2.5". Either spelling reparses to the
    // same Timed value.
    if seconds.fract() == 0.0 {
        format!("{}", seconds as i64)
    } else {
        format!("{}", seconds)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, Level::Parallel)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(x) => {
                if x.fract() == 0.0 {
                    // Keep the decimal point so the value reparses as a float.
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Literal::Str(s) => {
                f.write_char('"')?;
                for c in s.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        other => f.write_char(other)?,
                    }
                }
                f.write_char('"')
            }
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Rgb(parts) => {
                f.write_char('[')?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if part.fract() == 0.0 {
                        write!(f, "{}", *part as i64)?;
                    } else {
                        write!(f, "{}", part)?;
                    }
                }
                f.write_char(']')
            }
            Literal::Symbol(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for def in &self.defs {
            writeln!(f, "pipeline {} = {}", def.name, def.body)?;
        }
        if let Some(body) = &self.body {
            writeln!(f, "{}", body)?;
        }
        Ok(())
    }
}
