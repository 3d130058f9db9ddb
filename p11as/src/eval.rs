// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Expression evaluation

use crate::compiler::FilePass;
use crate::deferred::{Bytes, Deferred, Int, Value};
use p11as_ast::prelude::*;
use p11as_core::{Accumulator, ErrorCode, Register};

use std::ops::Range;

impl FilePass<'_> {
    /// The value of `.`
    fn dot(&self) -> Int {
        self.state
            .operand_base
            .clone()
            .unwrap_or_else(|| self.state.here.clone())
    }

    /// Evaluate an expression
    ///
    /// Problems are reported and replaced with `0`, so the result is always usable.
    pub(crate) fn eval(&mut self, e: &Spanned<Expr<'_>>) -> Value {
        match &e.inner {
            Expr::Number(n) => Value::Int(Int::Settled(*n)),
            Expr::Char(c) => Value::Int(Int::Settled(i64::from(*c))),
            Expr::Str(s) => Value::Bytes(Bytes::Settled(s.to_vec())),
            Expr::Ident(".") => Value::Int(self.dot()),
            Expr::Ident(name) => {
                if Register::from_name(name).is_some() || Accumulator::from_name(name).is_some() {
                    self.reporter.error(
                        ErrorCode::TypeMismatch,
                        e.range(),
                        format!("`{name}` is a register, and has no value"),
                    );
                    return Value::Int(Int::Settled(0));
                }
                let key = self.qualify(name);
                self.c.symbols.lookup(&key, self.state.file, e.range())
            }
            Expr::Parenthesized(inner) => self.eval(inner),
            Expr::Unary(op, inner) => {
                let value = self.eval_int(inner);
                Value::Int(match op.inner {
                    UnaryOperator::Negate => -value,
                    UnaryOperator::Plus => value,
                    UnaryOperator::Complement => value.map("complement", |v| !v),
                })
            }
            Expr::BinOp { lhs, op, rhs } => {
                let (l, r) = (self.eval(lhs), self.eval(rhs));
                match (op.inner, l, r) {
                    (BinOperator::Add, Value::Bytes(a), Value::Bytes(b)) => Value::Bytes(a + b),
                    (op_kind, l, r) => {
                        let a = self.expect_int(l, lhs.range());
                        let b = self.expect_int(r, rhs.range());
                        Value::Int(self.arithmetic(op_kind, a, b, op.range()))
                    }
                }
            }
            Expr::PostIncrement(_) | Expr::Immediate(_) | Expr::Deferred(_) | Expr::Call { .. } => {
                self.reporter.error(
                    ErrorCode::BadAddressingMode,
                    e.range(),
                    "addressing syntax is only meaningful in a machine instruction operand",
                );
                Value::Int(Int::Settled(0))
            }
        }
    }

    fn expect_int(&self, value: Value, span: Range<usize>) -> Int {
        match value {
            Value::Int(i) => i,
            Value::Bytes(_) => {
                self.reporter
                    .error(ErrorCode::TypeMismatch, span, "expected an integer, found a string");
                Int::Settled(0)
            }
        }
    }

    /// Evaluate an expression that must be an integer
    pub(crate) fn eval_int(&mut self, e: &Spanned<Expr<'_>>) -> Int {
        let value = self.eval(e);
        self.expect_int(value, e.range())
    }

    /// Evaluate an expression that must be an integer known right now
    pub(crate) fn eval_constant(&mut self, e: &Spanned<Expr<'_>>, what: &str) -> Option<i64> {
        let value = self.eval_int(e).simplify().known();
        if value.is_none() {
            self.c.symbols.take_touched();
            self.reporter.error(
                ErrorCode::NotConstant,
                e.range(),
                format!("{what} must be known at this point in the file"),
            );
        }
        value
    }

    fn arithmetic(&self, op: BinOperator, a: Int, b: Int, span: Range<usize>) -> Int {
        match op {
            BinOperator::Add => a + b,
            BinOperator::Sub => a - b,
            BinOperator::Mul => match (a.simplify().known(), b.simplify().known()) {
                (Some(k), _) => b * k,
                (_, Some(k)) => a * k,
                _ => Int::zip_with("product", a, b, i64::wrapping_mul),
            },
            BinOperator::Div | BinOperator::Rem => {
                let reporter = self.reporter.clone();
                let f = if op == BinOperator::Div {
                    i64::wrapping_div
                } else {
                    i64::wrapping_rem
                };
                Int::zip_with("quotient", a, b, move |x, y| {
                    if y == 0 {
                        reporter.error(ErrorCode::DivisionByZero, span.clone(), "division by zero");
                        0
                    } else {
                        f(x, y)
                    }
                })
            }
            BinOperator::And => Int::zip_with("and", a, b, |x, y| x & y),
            BinOperator::Or => Int::zip_with("or", a, b, |x, y| x | y),
            BinOperator::Xor => Int::zip_with("xor", a, b, |x, y| x ^ y),
            BinOperator::Shl => Int::zip_with("shift", a, b, |x, y| {
                u32::try_from(y).ok().and_then(|y| x.checked_shl(y)).unwrap_or(0)
            }),
            BinOperator::Shr => Int::zip_with("shift", a, b, |x, y| {
                u32::try_from(y).ok().and_then(|y| x.checked_shr(y)).unwrap_or(0)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{Compiler, Options};
    use crate::deferred::Deferred;
    use p11as_core::ErrorCode;

    /// Compile `src` and return its words, if they can be resolved without a link base, along
    /// with diagnostic codes
    fn words(src: &str) -> (Option<Vec<u16>>, Vec<ErrorCode>) {
        let block = p11as_ast::parse(src).unwrap();
        let mut c = Compiler::new(Options::default());
        let _ = c.compile_file("eval.s", &block);
        let codes = c.diagnostics().iter().map(|d| d.code).collect();
        let words = c.code[0].resolve().ok().map(|code| {
            code.chunks(2)
                .map(|w| u16::from_le_bytes([w[0], w.get(1).copied().unwrap_or(0)]))
                .collect()
        });
        (words, codes)
    }

    macro_rules! assert_words {
        ($src: literal, [$($w: expr),*]) => {
            assert_eq!(words($src), (Some(vec![$($w),*]), vec![]), "{}", $src);
        };
    }

    #[test]
    fn operators() {
        assert_words!(".word 1+2*3", [7]);
        assert_words!(".word (1+2)*3", [9]);
        assert_words!(".word 7/2, 7%2", [3, 1]);
        assert_words!(".word 1<<4|3, 100>>3", [0o23, 0o10]);
        assert_words!(".word 0xff & ~0x0f", [0xf0]);
        assert_words!(".word 6^3", [5]);
        assert_words!(".word -1, +1", [0xffff, 1]);
        assert_words!(".word 'A+1", [0x42]);
        assert_words!(".word 10.", [10]);
    }

    #[test]
    fn constants_and_forward_references() {
        assert_words!("x = 3\n.word x*2", [6]);
        assert_words!(".word y*2\ny = 4", [8]);
        assert_words!(".word y/2\ny = 4", [2]);
        assert_words!("X = 5\n.word x", [5]);
    }

    #[test]
    fn errors_yield_zero() {
        assert_eq!(words(".word 1/0"), (Some(vec![0]), vec![ErrorCode::DivisionByZero]));
        assert_eq!(words(".word r0"), (Some(vec![0]), vec![ErrorCode::TypeMismatch]));
        assert_eq!(words(".word \"ab\""), (Some(vec![0]), vec![ErrorCode::TypeMismatch]));
        assert_eq!(words(".word 1 + \"ab\""), (Some(vec![1]), vec![ErrorCode::TypeMismatch]));
        assert_eq!(words(".word #1"), (Some(vec![0]), vec![ErrorCode::BadAddressingMode]));
    }

    #[test]
    fn dot_is_position_dependent() {
        // the link base hasn't been settled, but distances between addresses are known
        assert_words!("a: .blkw 2\n.word . - a", [0, 0, 4]);
        assert_words!(".word 0, a - .\na:", [0, 4]);
        assert!(words(".word .").0.is_none());
    }
}
