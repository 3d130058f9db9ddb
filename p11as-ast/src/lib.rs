// SPDX-FileCopyrightText: 2025 - 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Abstract syntax tree for PDP-11 assembly source, powered by [chumsky]
//!
//! A source file is a [`Block`] of [statements](Statement). Each statement is a label, a
//! constant assignment, or an instruction. Instructions cover both machine instructions and
//! metacommands (names starting with a `.`), and may carry a `{ ... }` body block.
//!
//! ```text
//! start:  mov #10., r0    ; labels end with a colon
//! count = 3               ; constant assignment
//!         .repeat count {
//!             nop
//!         }
//! ```
//!
//! Operands are parsed into a closed set of [expression](Expr) shapes, so that the encoder can
//! pick an addressing mode by matching on the shape alone.
#![warn(missing_docs)]

use chumsky::error::Rich;
pub use chumsky::span::SimpleSpan;

mod display_impls;
pub mod parsers;
pub mod util;

/// A small module re-exporting the types needed to build or inspect an AST
pub mod prelude {
    pub use crate::{
        BinOperator, Block, Expr, Instruction, SimpleSpan, Spanned, Statement, UnaryOperator,
    };
}

/// A value along with the span of source text it was parsed from
#[derive(Debug, PartialEq, Clone)]
pub struct Spanned<T> {
    /// The parsed value
    pub inner: T,
    /// Where in the source the value came from
    pub span: SimpleSpan,
}

impl<T> Spanned<T> {
    /// The span as a [`Range<usize>`](std::ops::Range)
    #[must_use]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.span.start..self.span.end
    }
}

/// A binary operator
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[allow(missing_docs, reason = "self-explanatory")]
pub enum BinOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// A prefix operator
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOperator {
    /// `-`
    Negate,
    /// `+`
    Plus,
    /// `~`
    Complement,
}

/// An expression
///
/// Operand syntax is folded into the same tree: `#` and `@` prefixes, `(R)+` and `X(R)` each
/// produce their own node, so an operand's addressing mode can be read straight off its shape.
#[derive(Debug, PartialEq, Clone)]
pub enum Expr<'a> {
    /// An integer literal
    Number(i64),
    /// A character literal, `'c`
    Char(u8),
    /// A string literal
    Str(Box<[u8]>),
    /// A symbol, register name, or `.` for the current address
    Ident(&'a str),
    /// A prefix operator applied to an expression
    Unary(Spanned<UnaryOperator>, Box<Spanned<Expr<'a>>>),
    /// A binary operation
    BinOp {
        /// left-hand side
        lhs: Box<Spanned<Expr<'a>>>,
        /// the operator
        op: Spanned<BinOperator>,
        /// right-hand side
        rhs: Box<Spanned<Expr<'a>>>,
    },
    /// `(e)`
    Parenthesized(Box<Spanned<Expr<'a>>>),
    /// `(e)+` - the inner node is the parenthesized part
    PostIncrement(Box<Spanned<Expr<'a>>>),
    /// `#e`
    Immediate(Box<Spanned<Expr<'a>>>),
    /// `@e`
    Deferred(Box<Spanned<Expr<'a>>>),
    /// `index(base)` - `base` is the parenthesized part
    Call {
        /// the expression before the parentheses
        index: Box<Spanned<Expr<'a>>>,
        /// the parenthesized node
        base: Box<Spanned<Expr<'a>>>,
    },
}

impl<'a> Expr<'a> {
    /// If this is a negated parenthesized node (`-(e)`), return the inner expression
    #[must_use]
    pub fn as_autodecrement(&self) -> Option<&Spanned<Expr<'a>>> {
        match self {
            Expr::Unary(
                Spanned {
                    inner: UnaryOperator::Negate,
                    ..
                },
                inner,
            ) => match &inner.inner {
                Expr::Parenthesized(e) => Some(e),
                _ => None,
            },
            _ => None,
        }
    }

    /// If this is a parenthesized node, return the inner expression
    #[must_use]
    pub fn as_parenthesized(&self) -> Option<&Spanned<Expr<'a>>> {
        match self {
            Expr::Parenthesized(e) => Some(e),
            _ => None,
        }
    }
}

/// A machine instruction or metacommand, with its operands and optional body
#[derive(Debug, PartialEq, Clone)]
pub struct Instruction<'a> {
    /// The mnemonic, as written
    pub name: Spanned<&'a str>,
    /// Comma-separated operands
    pub operands: Vec<Spanned<Expr<'a>>>,
    /// A `{ ... }` block following the operands
    pub body: Option<Spanned<Block<'a>>>,
}

/// A single statement
#[derive(Debug, PartialEq, Clone)]
pub enum Statement<'a> {
    /// `name:`
    Label(Spanned<&'a str>),
    /// `name = value`
    Assignment {
        /// The symbol being defined
        name: Spanned<&'a str>,
        /// The value it's bound to
        value: Spanned<Expr<'a>>,
    },
    /// An instruction or metacommand
    Instruction(Instruction<'a>),
}

/// A flat, ordered list of statements
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Block<'a>(pub Vec<Spanned<Statement<'a>>>);

/// Parse a source file into a [`Block`]
///
/// # Errors
///
/// If the source fails to parse, every parser error is returned.
///
/// # Example
///
/// ```
/// use p11as_ast::{parse, Statement};
/// let block = parse("start: tst r0\n").unwrap();
/// assert_eq!(block.0.len(), 2);
/// assert!(matches!(block.0[0].inner, Statement::Label(_)));
/// ```
pub fn parse(code: &str) -> Result<Block<'_>, Vec<Rich<'_, char>>> {
    use chumsky::Parser;
    parsers::program().parse(code).into_result()
}

/// Parse and reformat a source file
///
/// Comments are dropped, and each statement is placed on its own line, with labels flush left,
/// everything else indented, and body blocks indented one level further.
///
/// # Errors
///
/// If the source fails to parse, every parser error is returned.
///
/// ```
/// assert_eq!(
///     p11as_ast::format("lbl:  mov  #1,r0 ; hi").unwrap(),
///     "lbl:\n        mov #1, r0\n"
/// );
/// ```
pub fn format(code: &str) -> Result<String, Vec<Rich<'_, char>>> {
    parse(code).map(|block| block.to_string())
}
