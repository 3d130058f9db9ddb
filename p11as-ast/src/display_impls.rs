// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

use itertools::Itertools;

use super::{BinOperator, Block, Expr, Instruction, Statement, UnaryOperator};

use std::fmt::{self, Display};

impl Display for BinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOperator::Add => "+",
            BinOperator::Sub => "-",
            BinOperator::Mul => "*",
            BinOperator::Div => "/",
            BinOperator::Rem => "%",
            BinOperator::And => "&",
            BinOperator::Or => "|",
            BinOperator::Xor => "^",
            BinOperator::Shl => "<<",
            BinOperator::Shr => ">>",
        })
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::Complement => "~",
        })
    }
}

struct EscapedByte(u8);
impl Display for EscapedByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            b'\0' => write!(f, "\\0"),
            c => write!(f, "{}", c.escape_ascii()),
        }
    }
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // octal is the default radix, so it round-trips without a suffix
            Expr::Number(n) if *n < 0 => write!(f, "-{:o}", n.unsigned_abs()),
            Expr::Number(n) => write!(f, "{n:o}"),
            Expr::Char(c) => write!(f, "'{}", char::from(*c)),
            Expr::Str(s) => write!(f, "\"{}\"", s.iter().copied().map(EscapedByte).format("")),
            Expr::Ident(id) => f.write_str(id),
            Expr::Unary(op, e) => write!(f, "{}{}", op.inner, e.inner),
            Expr::BinOp { lhs, op, rhs } => {
                write!(f, "{} {} {}", lhs.inner, op.inner, rhs.inner)
            }
            Expr::Parenthesized(e) => write!(f, "({})", e.inner),
            Expr::PostIncrement(e) => write!(f, "{}+", e.inner),
            Expr::Immediate(e) => write!(f, "#{}", e.inner),
            Expr::Deferred(e) => write!(f, "@{}", e.inner),
            Expr::Call { index, base } => write!(f, "{}{}", index.inner, base.inner),
        }
    }
}

const INDENT: &str = "        ";

/// A [`Block`] rendered at a given nesting depth
struct Nested<'b, 'a>(&'b Block<'a>, usize);

impl Display for Nested<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Nested(block, depth) = *self;
        for stmt in &block.0 {
            let indent = INDENT.repeat(depth);
            match &stmt.inner {
                Statement::Label(name) => writeln!(f, "{}{}:", INDENT.repeat(depth.saturating_sub(1)), name.inner)?,
                Statement::Assignment { name, value } => {
                    writeln!(f, "{indent}{} = {}", name.inner, value.inner)?;
                }
                Statement::Instruction(Instruction {
                    name,
                    operands,
                    body,
                }) => {
                    write!(f, "{indent}{}", name.inner)?;
                    if !operands.is_empty() {
                        write!(f, " {}", operands.iter().map(|o| &o.inner).format(", "))?;
                    }
                    if let Some(body) = body {
                        writeln!(f, " {{")?;
                        write!(f, "{}", Nested(&body.inner, depth + 1))?;
                        write!(f, "{indent}}}")?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

impl Display for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Nested(self, 1).fmt(f)
    }
}
