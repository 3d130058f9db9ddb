// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Metacommands: data, layout, repetition, linkage and output requests

use crate::compiler::{ADDRESS_SPACE, BlockKind, EmitRequest, FilePass};
use crate::deferred::{Bytes, Deferred, Int, Readiness, Value};
use crate::diagnostics::{Fatal, Reporter};
use crate::encoder::{checked_word, low_word};
use crate::formats::Format;
use crate::symbols::Symbol;
use p11as_ast::prelude::*;
use p11as_core::{ErrorCode, Register};

use std::ops::{Range, RangeInclusive};

const METACOMMANDS: &[&str] = &[
    ".byte", ".word", ".dword", ".ascii", ".asciz", ".rad50", ".blkb", ".blkw", ".even", ".odd",
    ".link", ".end", ".repeat", ".extern",
];

/// Whether `name` (lowercase, with its dot) is a metacommand
pub(crate) fn is_metacommand(name: &str) -> bool {
    METACOMMANDS.contains(&name) || name.starts_with(".make_")
}

const RAD50: &[u8; 40] = b" ABCDEFGHIJKLMNOPQRSTUVWXYZ$.%0123456789";

/// Pack text three characters to a word
///
/// Characters outside the RADIX-50 set are reported and packed as spaces.
fn rad50(text: &[u8], reporter: &Reporter, span: &Range<usize>) -> Vec<u8> {
    let index = |c: u8| {
        let c = c.to_ascii_uppercase();
        RAD50.iter().position(|&r| r == c).map_or_else(
            || {
                reporter.error(
                    ErrorCode::ValueOutOfBounds,
                    span.clone(),
                    format!("{:?} can't be packed into RADIX-50", char::from(c)),
                );
                0
            },
            |i| i as u16,
        )
    };
    text.chunks(3)
        .flat_map(|chunk| {
            let mut padded = [b' '; 3];
            padded[..chunk.len()].copy_from_slice(chunk);
            let word = padded.iter().fold(0_u16, |w, &c| w * 40 + index(c));
            word.to_le_bytes()
        })
        .collect()
}

fn byte_check(reporter: &Reporter, span: Range<usize>) -> impl Fn(i64) -> u8 + 'static {
    let reporter = reporter.clone();
    move |v| {
        if (-0x80..=0xff).contains(&v) {
            u8::try_from(v & 0xff).unwrap_or_default()
        } else {
            reporter.error(
                ErrorCode::ValueOutOfBounds,
                span.clone(),
                format!("{v} does not fit in a byte"),
            );
            0
        }
    }
}

/// High word first, each word little-endian
fn dword_bytes(reporter: &Reporter, span: Range<usize>) -> impl Fn(i64) -> Vec<u8> + 'static {
    let reporter = reporter.clone();
    move |v| {
        let v = if (-0x8000_0000..=0xffff_ffff).contains(&v) {
            v
        } else {
            reporter.error(
                ErrorCode::ValueOutOfBounds,
                span.clone(),
                format!("{v} does not fit in a double word"),
            );
            0
        };
        let (high, low) = (low_word(v >> 16), low_word(v));
        [high.to_le_bytes(), low.to_le_bytes()].concat()
    }
}

/// Build a fixed-size chunk from an integer, now if possible and otherwise once it's known
fn sized_from(name: &'static str, value: Int, len: usize, f: impl Fn(i64) -> Vec<u8> + 'static) -> Bytes {
    match value.simplify() {
        Int::Settled(v) => Bytes::Settled(f(v)),
        value => Bytes::sized(name, len, move || match value.try_value() {
            Readiness::Ready(v) => Readiness::Ready(f(v)),
            Readiness::Pending => Readiness::Pending,
        }),
    }
}

impl FilePass<'_> {
    fn expect_operands(&self, name: &str, instr: &Instruction<'_>, count: RangeInclusive<usize>) -> bool {
        if count.contains(&instr.operands.len()) {
            return true;
        }
        let expected = if count.start() == count.end() {
            count.start().to_string()
        } else if *count.end() == usize::MAX {
            format!("at least {}", count.start())
        } else {
            format!("{} to {}", count.start(), count.end())
        };
        self.reporter.error(
            ErrorCode::WrongOperandCount,
            instr.name.range(),
            format!("`{name}` takes {expected} operand(s), but {} were given", instr.operands.len()),
        );
        false
    }

    /// Evaluate a count of items `unit` bytes long, which must fit in the address space
    fn eval_count(&mut self, e: &Spanned<Expr<'_>>, what: &str, unit: usize) -> Option<usize> {
        let n = self.eval_constant(e, what)?;
        let Ok(count) = usize::try_from(n) else {
            self.reporter.error(
                ErrorCode::ValueOutOfBounds,
                e.range(),
                format!("{what} can't be negative, but is {n}"),
            );
            return None;
        };
        if count.saturating_mul(unit) > ADDRESS_SPACE {
            self.reporter.error(
                ErrorCode::ValueOutOfBounds,
                e.range(),
                format!("{what} of {n:o} doesn't fit in the 16-bit address space"),
            );
            return None;
        }
        Some(count)
    }

    /// Evaluate an operand that must be a string
    fn eval_string(&mut self, e: &Spanned<Expr<'_>>) -> Option<Bytes> {
        match self.eval(e) {
            Value::Bytes(b) => Some(b),
            Value::Int(_) => {
                self.reporter
                    .error(ErrorCode::TypeMismatch, e.range(), "expected a string, found an integer");
                None
            }
        }
    }

    /// Run a metacommand, returning `false` if `name` isn't one
    pub(crate) fn metacommand(
        &mut self,
        name: &str,
        instr: &Instruction<'_>,
        span: Range<usize>,
        out: &mut Vec<Bytes>,
    ) -> Result<bool, Fatal> {
        if name != ".repeat" && is_metacommand(name) {
            if let Some(body) = &instr.body {
                self.reporter.error(
                    ErrorCode::WrongOperandCount,
                    body.range(),
                    format!("`{name}` does not take a body"),
                );
            }
        }
        match name {
            ".byte" => {
                if self.expect_operands(name, instr, 1..=usize::MAX) {
                    let mut parts = Vec::with_capacity(instr.operands.len());
                    for operand in &instr.operands {
                        parts.push(match self.eval(operand) {
                            Value::Bytes(b) => b,
                            Value::Int(v) => {
                                let check = byte_check(&self.reporter, operand.range());
                                sized_from(".byte", v, 1, move |v| vec![check(v)])
                            }
                        });
                    }
                    self.emit(out, Bytes::concat(parts), span)?;
                }
            }
            ".word" => {
                if self.expect_operands(name, instr, 1..=usize::MAX) {
                    self.align(out, instr.name.range())?;
                    let mut parts = Vec::with_capacity(instr.operands.len());
                    for operand in &instr.operands {
                        let value = self.eval_int(operand);
                        let check = checked_word(&self.reporter, operand.range(), "value");
                        parts.push(Bytes::word(".word", value, check));
                    }
                    self.emit(out, Bytes::concat(parts), span)?;
                }
            }
            ".dword" => {
                if self.expect_operands(name, instr, 1..=usize::MAX) {
                    self.align(out, instr.name.range())?;
                    let mut parts = Vec::with_capacity(instr.operands.len());
                    for operand in &instr.operands {
                        let value = self.eval_int(operand);
                        let f = dword_bytes(&self.reporter, operand.range());
                        parts.push(sized_from(".dword", value, 4, f));
                    }
                    self.emit(out, Bytes::concat(parts), span)?;
                }
            }
            ".ascii" | ".asciz" => {
                if self.expect_operands(name, instr, 1..=usize::MAX) {
                    let mut parts = Vec::with_capacity(instr.operands.len() * 2);
                    for operand in &instr.operands {
                        parts.extend(self.eval_string(operand));
                        if name == ".asciz" {
                            parts.push(Bytes::Settled(vec![0]));
                        }
                    }
                    self.emit(out, Bytes::concat(parts), span)?;
                }
            }
            ".rad50" => {
                if self.expect_operands(name, instr, 1..=usize::MAX) {
                    self.align(out, instr.name.range())?;
                    let mut packed = Vec::new();
                    for operand in &instr.operands {
                        let Some(text) = self.eval_string(operand) else {
                            continue;
                        };
                        match text.simplify() {
                            Bytes::Settled(text) => {
                                packed.extend(rad50(&text, &self.reporter, &operand.range()));
                            }
                            _ => self.reporter.error(
                                ErrorCode::NotConstant,
                                operand.range(),
                                "RADIX-50 text must be known at this point in the file",
                            ),
                        }
                    }
                    self.emit(out, Bytes::Settled(packed), span)?;
                }
            }
            ".blkb" | ".blkw" => {
                if self.expect_operands(name, instr, 1..=1) {
                    if name == ".blkw" {
                        self.align(out, instr.name.range())?;
                    }
                    let unit = if name == ".blkw" { 2 } else { 1 };
                    if let Some(n) = self.eval_count(&instr.operands[0], "a block size", unit) {
                        self.emit(out, Bytes::Settled(vec![0; n * unit]), span)?;
                    }
                }
            }
            ".even" | ".odd" => {
                if self.expect_operands(name, instr, 0..=0) {
                    self.pad_to_parity(name == ".odd", out, span)?;
                }
            }
            ".link" => {
                if self.expect_operands(name, instr, 1..=1) {
                    self.link(&instr.operands[0], span)?;
                }
            }
            ".end" => {
                if self.expect_operands(name, instr, 0..=0) {
                    log::debug!("file {}: .end", self.state.file);
                    self.state.ended = true;
                }
            }
            ".repeat" => self.repeat(instr, span, out)?,
            ".extern" => {
                if self.expect_operands(name, instr, 1..=usize::MAX) {
                    for operand in &instr.operands {
                        self.declare_extern(operand);
                    }
                }
            }
            _ => match name.strip_prefix(".make_") {
                Some(format) => self.queue_emit(name, format, instr, span),
                None => return Ok(false),
            },
        }
        Ok(true)
    }

    fn link(&mut self, operand: &Spanned<Expr<'_>>, span: Range<usize>) -> Result<(), Fatal> {
        let Some(base) = self.eval_constant(operand, "the link base") else {
            return Ok(());
        };
        if !(0..=0xffff).contains(&base) || base % 2 != 0 {
            self.reporter.error(
                ErrorCode::AddressConflict,
                operand.range(),
                format!("the link base must be an even 16-bit address, not {base:o}"),
            );
            return Ok(());
        }
        if self.c.link_base.settle(Int::Settled(base)).is_err() {
            let mut diag = p11as_core::Diagnostic::new(
                p11as_core::Severity::Critical,
                ErrorCode::AddressConflict,
                self.state.file,
                span,
                "the link base was already set",
            );
            if let Some((file, prev)) = &self.c.link_set_at {
                if *file == self.state.file {
                    diag = diag.with_label(prev.clone(), "previously set here");
                }
            }
            self.reporter.push(diag);
            return Err(Fatal);
        }
        log::debug!("link base set to {base:o}");
        self.c.link_set_at = Some((self.state.file, span));
        Ok(())
    }

    fn repeat(&mut self, instr: &Instruction<'_>, span: Range<usize>, out: &mut Vec<Bytes>) -> Result<(), Fatal> {
        if !self.expect_operands(".repeat", instr, 1..=1) {
            return Ok(());
        }
        let Some(body) = &instr.body else {
            self.reporter.error(
                ErrorCode::WrongOperandCount,
                span,
                "`.repeat` needs a `{ ... }` body",
            );
            return Ok(());
        };
        let Some(count) = self.eval_count(&instr.operands[0], "a repeat count", 1) else {
            return Ok(());
        };
        log::debug!("repeating {} statement(s) {count} times", body.inner.0.len());
        for _ in 0..count {
            self.compile_block(&body.inner, BlockKind::Repeat, out)?;
            if self.state.ended {
                break;
            }
            if self.c.size > ADDRESS_SPACE {
                // the rest of the file is skipped, so nested loops report this once
                self.reporter.error(
                    ErrorCode::ValueOutOfBounds,
                    instr.operands[0].range(),
                    "repeated code runs past the end of the 16-bit address space",
                );
                self.state.ended = true;
                break;
            }
        }
        Ok(())
    }

    fn declare_extern(&mut self, operand: &Spanned<Expr<'_>>) {
        let name = match &operand.inner {
            Expr::Ident(name) if *name != "." && Register::from_name(name).is_none() => *name,
            _ => {
                self.reporter
                    .error(ErrorCode::TypeMismatch, operand.range(), "expected a symbol name");
                return;
            }
        };
        if crate::symbols::is_local(name) {
            self.reporter.error(
                ErrorCode::TypeMismatch,
                operand.range(),
                format!("local label `{name}` can't be shared between files"),
            );
            return;
        }
        if let Some(internal) = self.c.symbols.declare_extern(name, self.state.file) {
            let symbol = Symbol {
                span: operand.range(),
                ..internal
            };
            self.bind(name.to_ascii_lowercase(), symbol, name);
        }
    }

    fn queue_emit(&mut self, name: &str, format: &str, instr: &Instruction<'_>, span: Range<usize>) {
        let Some(format) = Format::from_name(format) else {
            self.reporter.error(
                ErrorCode::UndefinedFormat,
                instr.name.range(),
                format!("there is no output format called `{format}`"),
            );
            return;
        };
        if !self.expect_operands(name, instr, 0..=1) {
            return;
        }
        let destination = match instr.operands.first() {
            None => format!("{}.{}", self.file_stem(), format.name()),
            Some(operand) => match self.eval_string(operand).map(|b| b.simplify()) {
                Some(Bytes::Settled(dest)) => String::from_utf8_lossy(&dest).into_owned(),
                Some(_) => {
                    self.reporter.error(
                        ErrorCode::NotConstant,
                        operand.range(),
                        "output file names must be known at this point in the file",
                    );
                    return;
                }
                None => return,
            },
        };
        log::debug!("queued {format} output to {destination}");
        self.c.emits.push(EmitRequest {
            format,
            destination,
            file: self.state.file,
            span,
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{Compiler, Options};
    use crate::deferred::Deferred;
    use p11as_core::ErrorCode;

    fn compile(src: &str) -> (Option<Vec<u8>>, Vec<ErrorCode>, Compiler) {
        let block = p11as_ast::parse(src).unwrap();
        let mut c = Compiler::new(Options::default());
        let _ = c.compile_file("dir/meta.s", &block);
        let codes = c.diagnostics().iter().map(|d| d.code).collect();
        (c.code.first().and_then(|b| b.resolve().ok()), codes, c)
    }

    macro_rules! assert_bytes {
        ($src: literal, [$($b: expr),*]) => {{
            let (bytes, codes, _) = compile($src);
            assert_eq!((bytes, codes), (Some(vec![$($b),*]), vec![]), "{}", $src);
        }};
    }

    #[test]
    fn data() {
        assert_bytes!(".byte 1, -1, 377", [1, 0xff, 0xff]);
        assert_bytes!(".byte \"hi\", 0", [b'h', b'i', 0]);
        assert_bytes!(".word 1, 177777", [1, 0, 0xff, 0xff]);
        assert_bytes!(".dword 0x12345678", [0x34, 0x12, 0x78, 0x56]);
        assert_bytes!(".ascii \"ab\", \"c\"", [b'a', b'b', b'c']);
        assert_bytes!(".asciz \"ab\"", [b'a', b'b', 0]);
        assert_bytes!(".blkb 3", [0, 0, 0]);
        assert_bytes!(".blkw 2", [0, 0, 0, 0]);
    }

    #[test]
    fn rad50_packing() {
        // ABC = 1*40*40 + 2*40 + 3
        assert_bytes!(".rad50 \"ABC\"", [0o223, 0o6]);
        assert_bytes!(".rad50 \"a\"", [0x40, 0x06]);
        let (_, codes, _) = compile(".rad50 \"a!\"");
        assert_eq!(codes, [ErrorCode::ValueOutOfBounds]);
    }

    #[test]
    fn layout() {
        assert_bytes!(".byte 1\n.even\n.byte 2\n.odd", [1, 0, 2]);
        assert_bytes!(".odd\n.byte 1", [0, 1]);
        assert_bytes!(".byte 1\n.end\n.byte 2", [1]);
    }

    #[test]
    fn odd_address_warning() {
        let (bytes, codes, _) = compile(".byte 1\n.word 2");
        assert_eq!(bytes, Some(vec![1, 0, 2, 0]));
        assert_eq!(codes, [ErrorCode::OddAddress]);
    }

    #[test]
    fn out_of_range_data() {
        let (bytes, codes, _) = compile(".byte 400\n.byte -201\n.even\n.word 200000");
        assert_eq!(bytes, Some(vec![0, 0, 0, 0]));
        assert_eq!(codes, [ErrorCode::ValueOutOfBounds; 3]);
    }

    #[test]
    fn counts_must_be_constant() {
        let (_, codes, _) = compile(".blkb n\nn = 2\n.blkw -1\n.repeat 1");
        assert_eq!(
            codes,
            [ErrorCode::NotConstant, ErrorCode::ValueOutOfBounds, ErrorCode::WrongOperandCount]
        );
    }

    #[test]
    fn huge_counts_are_rejected() {
        let (_, codes, _) = compile(".blkw 777777777777777777777");
        assert_eq!(codes, [ErrorCode::ValueOutOfBounds]);
        let (_, codes, _) = compile(".blkb 7777777777777");
        assert_eq!(codes, [ErrorCode::ValueOutOfBounds]);
        let (_, codes, _) = compile(".blkb 200001
.blkw 100001");
        assert_eq!(codes, [ErrorCode::ValueOutOfBounds; 2]);
        let (_, codes, _) = compile(".repeat 777777777777 { nop }");
        assert_eq!(codes, [ErrorCode::ValueOutOfBounds]);
    }

    #[test]
    fn repeat_stops_at_end_of_address_space() {
        let (_, codes, c) = compile(".repeat 200000 { .repeat 200000 { .word 0 } }
.byte 1");
        assert_eq!(codes, [ErrorCode::ValueOutOfBounds]);
        assert_eq!(c.size, 0x1_0002);
    }

    #[test]
    fn strings_must_be_defined_first() {
        let (_, codes, _) = compile(".ascii s\ns = \"ab\"");
        assert_eq!(codes, [ErrorCode::TypeMismatch; 2]);
        assert_bytes!("s = \"ab\"\n.ascii s", [b'a', b'b']);
    }

    #[test]
    fn repeat_sees_advancing_address() {
        assert_bytes!("a: .repeat 3 { .word . - a }", [0, 0, 2, 0, 4, 0]);
        assert_bytes!(".repeat 2 { .repeat 2 { .byte 7 } }", [7, 7, 7, 7]);
        assert_bytes!(".repeat 0 { .byte 7 }", []);
    }

    #[test]
    fn link_twice_is_critical() {
        let (_, codes, _) = compile(".link 2000\n.link 2000\n.byte 1");
        assert_eq!(codes, [ErrorCode::AddressConflict]);
        let (_, codes, _) = compile(".link 2001");
        assert_eq!(codes, [ErrorCode::AddressConflict]);
    }

    #[test]
    fn emission_requests() {
        let (_, codes, c) = compile(".make_bin\n.make_raw \"x.img\"\n.make_tape");
        assert_eq!(codes, [ErrorCode::UndefinedFormat]);
        let dests: Vec<_> = c.emits.iter().map(|e| e.destination.as_str()).collect();
        assert_eq!(dests, ["meta.bin", "x.img"]);
    }
}
