// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Encoding of machine instructions
//!
//! The addressing mode of each operand is read off the shape of its expression, before any
//! value inside it is known:
//!
//! | shape      | mode | register | extension word                    |
//! |------------|------|----------|-----------------------------------|
//! | `R`        | 0    | R        |                                   |
//! | `(R)`      | 1    | R        |                                   |
//! | `(R)+`     | 2    | R        |                                   |
//! | `-(R)`     | 4    | R        |                                   |
//! | `X(R)`     | 6    | R        | `X`                               |
//! | `#X`       | 2    | pc       | `X`                               |
//! | `@#X`      | 3    | pc       | `X`                               |
//! | `A`        | 6    | pc       | `A - (address of the word + 2)`   |
//!
//! A leading `@` on any of the register shapes selects the deferred mode, one higher. `@R` is
//! mode 1, `@(R)` is treated as `@0(R)`, and `@A` is relative deferred.

use crate::deferred::{Bytes, Deferred, Int, Readiness};
use crate::diagnostics::Reporter;
use crate::isa::{Opcode, Operand};
use crate::ready;
use p11as_ast::prelude::*;
use p11as_core::{Accumulator, AddressingMode, ErrorCode, Register};

use std::ops::Range;

/// What the encoder needs from the compiler
pub(crate) trait Context {
    /// Evaluate an expression to an integer, reporting problems and substituting `0`
    fn eval_int(&mut self, expr: &Spanned<Expr<'_>>) -> Int;
    /// Where diagnostics go
    fn reporter(&self) -> &Reporter;
}

/// The low 16 bits of a value
pub(crate) fn low_word(v: i64) -> u16 {
    u16::try_from(v & 0xffff).unwrap_or_default()
}

/// A word-sized check that reports values outside `-32768..=65535` and stores `0` instead
pub(crate) fn checked_word(
    reporter: &Reporter,
    span: Range<usize>,
    what: &'static str,
) -> impl Fn(i64) -> u16 + 'static {
    let reporter = reporter.clone();
    move |v| {
        if (-0x8000..=0xffff).contains(&v) {
            low_word(v)
        } else {
            reporter.error(
                ErrorCode::ValueOutOfBounds,
                span.clone(),
                format!("{what} {v} does not fit in a word"),
            );
            0
        }
    }
}

enum Extension {
    /// Stored as-is
    Value(Int, Range<usize>),
    /// Stored relative to the address after the extension word
    Relative(Int),
}

enum Shape<'e, 'a> {
    Reg(Register),
    Acc(Accumulator),
    RegDeferred(Register),
    AutoIncrement(Register),
    AutoDecrement(Register),
    Index(&'e Spanned<Expr<'a>>, Register),
    Immediate(&'e Spanned<Expr<'a>>),
    Plain(&'e Spanned<Expr<'a>>),
    Bad(&'static str),
}

fn register_of(expr: &Expr<'_>) -> Option<Register> {
    match expr {
        Expr::Ident(name) => Register::from_name(name),
        _ => None,
    }
}

fn classify<'e, 'a>(e: &'e Spanned<Expr<'a>>) -> Shape<'e, 'a> {
    match &e.inner {
        Expr::Ident(name) => {
            if let Some(reg) = Register::from_name(name) {
                Shape::Reg(reg)
            } else if let Some(acc) = Accumulator::from_name(name) {
                Shape::Acc(acc)
            } else {
                Shape::Plain(e)
            }
        }
        Expr::Parenthesized(inner) => {
            register_of(&inner.inner).map_or(Shape::Plain(e), Shape::RegDeferred)
        }
        Expr::PostIncrement(inner) => inner
            .inner
            .as_parenthesized()
            .and_then(|r| register_of(&r.inner))
            .map_or(Shape::Bad("autoincrement needs a register"), Shape::AutoIncrement),
        Expr::Unary(..) => match e.inner.as_autodecrement() {
            Some(inner) => register_of(&inner.inner).map_or(Shape::Plain(e), Shape::AutoDecrement),
            None => Shape::Plain(e),
        },
        Expr::Call { index, base } => base
            .inner
            .as_parenthesized()
            .and_then(|r| register_of(&r.inner))
            .map_or(Shape::Bad("an index base must be a register"), |reg| {
                Shape::Index(index, reg)
            }),
        Expr::Immediate(inner) => Shape::Immediate(inner),
        Expr::Deferred(_) => Shape::Bad("an operand can only be deferred once"),
        _ => Shape::Plain(e),
    }
}

struct ModeOperand {
    field: u16,
    extension: Option<Extension>,
}

fn mode_operand<C: Context>(ctx: &mut C, op: &Opcode, operand: &Spanned<Expr<'_>>) -> ModeOperand {
    use AddressingMode as M;
    let (deferred, inner) = match &operand.inner {
        Expr::Deferred(inner) => (true, &**inner),
        _ => (false, operand),
    };
    let with = |mode: M| {
        if deferred {
            mode.deferred().unwrap_or(mode)
        } else {
            mode
        }
    };
    let (mode, reg, extension) = match classify(inner) {
        Shape::Reg(reg) => (with(M::Register), reg, None),
        Shape::Acc(acc) if !deferred && op.is_floating() => {
            return ModeOperand {
                field: u16::from(acc.number()),
                extension: None,
            };
        }
        Shape::Acc(_) => {
            ctx.reporter().error(
                ErrorCode::BadAddressingMode,
                inner.range(),
                "a floating accumulator can only be used directly, by a floating-point instruction",
            );
            (M::Register, Register::R0, None)
        }
        Shape::RegDeferred(reg) if deferred => (
            M::IndexDeferred,
            reg,
            Some(Extension::Value(Int::Settled(0), inner.range())),
        ),
        Shape::RegDeferred(reg) => (M::RegisterDeferred, reg, None),
        Shape::AutoIncrement(reg) => (with(M::Autoincrement), reg, None),
        Shape::AutoDecrement(reg) => (with(M::Autodecrement), reg, None),
        Shape::Index(index, reg) => {
            let value = ctx.eval_int(index);
            (with(M::Index), reg, Some(Extension::Value(value, index.range())))
        }
        Shape::Immediate(e) => {
            let value = ctx.eval_int(e);
            (with(M::Autoincrement), Register::PC, Some(Extension::Value(value, e.range())))
        }
        Shape::Plain(e) => {
            let target = ctx.eval_int(e);
            (with(M::Index), Register::PC, Some(Extension::Relative(target)))
        }
        Shape::Bad(why) => {
            ctx.reporter()
                .error(ErrorCode::BadAddressingMode, operand.range(), why);
            (M::Register, Register::R0, None)
        }
    };
    ModeOperand {
        field: mode.field(reg),
        extension,
    }
}

fn register_operand<C: Context>(ctx: &mut C, operand: &Spanned<Expr<'_>>) -> u16 {
    if let Some(reg) = register_of(&operand.inner) {
        u16::from(reg.number())
    } else {
        ctx.reporter()
            .error(ErrorCode::BadAddressingMode, operand.range(), "expected a register");
        0
    }
}

fn accumulator_operand<C: Context>(ctx: &mut C, operand: &Spanned<Expr<'_>>) -> u16 {
    let acc = match &operand.inner {
        Expr::Ident(name) => Accumulator::from_name(name),
        _ => None,
    };
    match acc {
        Some(acc) if acc.number() < 4 => u16::from(acc.number()),
        Some(acc) => {
            ctx.reporter().error(
                ErrorCode::ValueOutOfBounds,
                operand.range(),
                format!("ac{} can't be used here, only ac0 through ac3", acc.number()),
            );
            0
        }
        None => {
            ctx.reporter().error(
                ErrorCode::BadAddressingMode,
                operand.range(),
                "expected a floating accumulator",
            );
            0
        }
    }
}

/// Turn a byte distance into a word offset field of the given width
fn offset_field(reporter: &Reporter, span: Range<usize>, delta: Int, width: u32, signed: bool) -> Int {
    let reporter = reporter.clone();
    let (min, max) = if signed {
        (-(1 << (width - 1)), (1 << (width - 1)) - 1)
    } else {
        (0, (1 << width) - 1)
    };
    delta.map("branch offset", move |d| {
        if d % 2 != 0 {
            reporter.error(
                ErrorCode::OddOffset,
                span.clone(),
                format!("branch target is an odd distance ({d} bytes) away"),
            );
            return 0;
        }
        let words = d / 2;
        if (min..=max).contains(&words) {
            words & ((1 << width) - 1)
        } else {
            reporter.error(
                ErrorCode::ValueOutOfBounds,
                span.clone(),
                format!("branch target is {words} words away, but must be within {min}..={max}"),
            );
            0
        }
    })
}

fn immediate_field(reporter: &Reporter, span: Range<usize>, value: Int, width: u32) -> Int {
    let reporter = reporter.clone();
    let max = (1_i64 << width) - 1;
    value.map("immediate", move |v| {
        if (0..=max).contains(&v) {
            v
        } else {
            reporter.error(
                ErrorCode::ValueOutOfBounds,
                span.clone(),
                format!("{v} does not fit in {width} unsigned bits (0..={max})"),
            );
            0
        }
    })
}

fn opcode_word(op: Opcode, fields: Vec<Int>) -> Bytes {
    let known: Option<Vec<u16>> = fields
        .iter()
        .map(|f| f.simplify().known().map(low_word))
        .collect();
    if let Some(values) = known {
        return Bytes::Settled(op.encode(&values).to_le_bytes().to_vec());
    }
    Bytes::sized(op.name, 2, move || {
        let mut values = Vec::with_capacity(fields.len());
        for field in &fields {
            values.push(low_word(ready!(field.try_value())));
        }
        Readiness::Ready(op.encode(&values).to_le_bytes().to_vec())
    })
}

/// Encode a machine instruction placed at `here`
///
/// Returns [`None`] if the operand count is wrong. Any other problem is reported and encoded as
/// a zero field, keeping the instruction's size intact.
pub(crate) fn encode<C: Context>(
    ctx: &mut C,
    op: &Opcode,
    instr: &Instruction<'_>,
    here: &Int,
) -> Option<Bytes> {
    if instr.operands.len() != op.operands.len() {
        let span = match (instr.operands.first(), instr.operands.last()) {
            (Some(first), Some(last)) => first.span.start..last.span.end,
            _ => instr.name.range(),
        };
        ctx.reporter().error(
            ErrorCode::WrongOperandCount,
            span,
            format!(
                "{} takes {} operand(s), but {} were given",
                op.name,
                op.operands.len(),
                instr.operands.len()
            ),
        );
        return None;
    }

    let next = here.clone() + 2;
    let mut fields = Vec::with_capacity(op.operands.len());
    let mut extensions = Vec::new();
    for (&kind, operand) in op.operands.iter().zip(&instr.operands) {
        let field = match kind {
            Operand::Mode => {
                let m = mode_operand(ctx, op, operand);
                extensions.extend(m.extension);
                Int::Settled(i64::from(m.field))
            }
            Operand::Register => Int::Settled(i64::from(register_operand(ctx, operand))),
            Operand::FloatAcc => Int::Settled(i64::from(accumulator_operand(ctx, operand))),
            Operand::Offset => {
                let delta = ctx.eval_int(operand) - next.clone();
                offset_field(ctx.reporter(), operand.range(), delta, op.width(kind), true)
            }
            Operand::BackwardOffset => {
                let delta = next.clone() - ctx.eval_int(operand);
                offset_field(ctx.reporter(), operand.range(), delta, op.width(kind), false)
            }
            Operand::Immediate => {
                let inner = match &operand.inner {
                    Expr::Immediate(inner) => &**inner,
                    _ => operand,
                };
                let value = ctx.eval_int(inner);
                immediate_field(ctx.reporter(), inner.range(), value, op.width(kind))
            }
        };
        fields.push(field);
    }

    let mut words = vec![opcode_word(*op, fields)];
    for (i, ext) in (0_i64..).zip(extensions) {
        let after = next.clone() + (2 * i + 2);
        words.push(match ext {
            Extension::Value(value, span) => {
                Bytes::word("extension word", value, checked_word(ctx.reporter(), span, "value"))
            }
            Extension::Relative(target) => Bytes::word("relative address", target - after, low_word),
        });
    }
    Some(Bytes::concat(words))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticLog;
    use crate::isa::InstructionTable;
    use std::collections::HashMap;

    struct TestContext {
        log: DiagnosticLog,
        reporter: Reporter,
        symbols: HashMap<String, Int>,
    }

    impl TestContext {
        fn new(symbols: &[(&'static str, Int)]) -> Self {
            let log = DiagnosticLog::default();
            let reporter = log.reporter(0);
            Self {
                log,
                reporter,
                symbols: symbols.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect(),
            }
        }

        fn codes(&self) -> Vec<ErrorCode> {
            self.log.snapshot().iter().map(|d| d.code).collect()
        }
    }

    impl Context for TestContext {
        fn eval_int(&mut self, expr: &Spanned<Expr<'_>>) -> Int {
            match &expr.inner {
                Expr::Number(n) => Int::Settled(*n),
                Expr::Unary(_, inner) => -self.eval_int(inner),
                Expr::Ident(name) => self.symbols[*name].clone(),
                Expr::BinOp { lhs, rhs, .. } => self.eval_int(lhs) + self.eval_int(rhs),
                other => panic!("unsupported in test: {other:?}"),
            }
        }

        fn reporter(&self) -> &Reporter {
            &self.reporter
        }
    }

    fn words(bytes: &Bytes) -> Vec<u16> {
        bytes
            .resolve()
            .unwrap()
            .chunks(2)
            .map(|w| u16::from_le_bytes([w[0], w[1]]))
            .collect()
    }

    fn encode_at(ctx: &mut TestContext, line: &str, here: i64) -> Option<Vec<u16>> {
        let block = p11as_ast::parse(line).unwrap();
        let Statement::Instruction(instr) = &block.0[0].inner else {
            panic!("not an instruction: {line}");
        };
        let table = InstructionTable::new();
        let op = table.get(instr.name.inner).unwrap();
        encode(ctx, op, instr, &Int::Settled(here)).map(|b| words(&b))
    }

    macro_rules! assert_encodes {
        ($line: literal, [$($w: expr),*]) => {{
            let mut ctx = TestContext::new(&[]);
            assert_eq!(encode_at(&mut ctx, $line, 0o1000), Some(vec![$($w),*]), "{}", $line);
            assert!(ctx.codes().is_empty(), "{}: {:?}", $line, ctx.codes());
        }};
    }

    #[test]
    fn addressing_modes() {
        assert_encodes!("mov r1, -(sp)", [0o010146]);
        assert_encodes!("mov #1, r0", [0o012700, 1]);
        assert_encodes!("mov @#177560, (r2)+", [0o013722, 0o177560]);
        assert_encodes!("clr 4(r3)", [0o005063, 4]);
        assert_encodes!("clr @4(r3)", [0o005073, 4]);
        assert_encodes!("tst @(r1)", [0o005771, 0]);
        assert_encodes!("tst @r1", [0o005711]);
        assert_encodes!("tst (r1)", [0o005711]);
        assert_encodes!("tst @(r1)+", [0o005731]);
        assert_encodes!("tst @-(r1)", [0o005751]);
        assert_encodes!("jmp 1000", [0o000167, 0o177774]);
        assert_encodes!("rts pc", [0o000207]);
        assert_encodes!("jsr pc, @#2000", [0o004737, 0o2000]);
        assert_encodes!("ldf ac1, ac2", [0o172601]);
        assert_encodes!("nop", [0o000240]);
    }

    #[test]
    fn relative_words_follow_their_position() {
        let mut ctx = TestContext::new(&[("a", Int::Settled(0o1100)), ("b", Int::Settled(0o1200))]);
        // the source word is at 1002 and the destination word at 1004
        assert_eq!(
            encode_at(&mut ctx, "mov a, b", 0o1000),
            Some(vec![0o016767, 0o1100 - 0o1004, 0o1200 - 0o1006])
        );
    }

    #[test]
    fn branch_offsets() {
        let mut ctx = TestContext::new(&[("fwd", Int::Settled(0o1006)), ("odd", Int::Settled(0o1003))]);
        assert_eq!(encode_at(&mut ctx, "br fwd", 0o1000), Some(vec![0o000402]));
        assert_eq!(encode_at(&mut ctx, "bne 1000", 0o1000), Some(vec![0o001377]));
        assert_eq!(encode_at(&mut ctx, "sob r2, 1000", 0o1010), Some(vec![0o077205]));
        assert!(ctx.codes().is_empty());

        assert_eq!(encode_at(&mut ctx, "br odd", 0o1000), Some(vec![0o000400]));
        assert_eq!(ctx.codes(), [ErrorCode::OddOffset]);
        assert_eq!(encode_at(&mut ctx, "br 3000", 0o1000), Some(vec![0o000400]));
        assert_eq!(ctx.codes(), [ErrorCode::OddOffset, ErrorCode::ValueOutOfBounds]);
    }

    #[test]
    fn deferred_operands_resolve_later() {
        let target = crate::deferred::Lazy::<Int>::promise("lbl");
        let mut ctx = TestContext::new(&[("lbl", Int::Lazy(target.clone()))]);
        let block = p11as_ast::parse("br lbl").unwrap();
        let Statement::Instruction(instr) = &block.0[0].inner else {
            unreachable!()
        };
        let table = InstructionTable::new();
        let bytes = encode(&mut ctx, table.get("br").unwrap(), instr, &Int::Settled(0o1000)).unwrap();
        assert_eq!(bytes.len(), Some(2));
        assert_eq!(bytes.try_value(), Readiness::Pending);
        target.settle(Int::Settled(0o1000)).unwrap();
        assert_eq!(words(&bytes), [0o000777]);
    }

    #[test]
    fn immediate_range() {
        let mut ctx = TestContext::new(&[]);
        assert_eq!(encode_at(&mut ctx, "emt 0", 0o1000), Some(vec![0o104000]));
        assert_eq!(encode_at(&mut ctx, "trap 255.", 0o1000), Some(vec![0o104777]));
        assert!(ctx.codes().is_empty());
        assert_eq!(encode_at(&mut ctx, "emt 256.", 0o1000), Some(vec![0o104000]));
        assert_eq!(encode_at(&mut ctx, "emt -1", 0o1000), Some(vec![0o104000]));
        assert_eq!(ctx.codes(), [ErrorCode::ValueOutOfBounds; 2]);
    }

    #[test]
    fn bad_operands() {
        let mut ctx = TestContext::new(&[]);
        assert_eq!(encode_at(&mut ctx, "mov r0", 0o1000), None);
        assert_eq!(encode_at(&mut ctx, "rts 4", 0o1000), Some(vec![0o000200]));
        assert_eq!(encode_at(&mut ctx, "tst @@r0", 0o1000), Some(vec![0o005700]));
        assert_eq!(encode_at(&mut ctx, "tst ac0", 0o1000), Some(vec![0o005700]));
        assert_eq!(
            ctx.codes(),
            [
                ErrorCode::WrongOperandCount,
                ErrorCode::BadAddressingMode,
                ErrorCode::BadAddressingMode,
                ErrorCode::BadAddressingMode,
            ]
        );
    }
}
