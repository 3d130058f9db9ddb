// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! The PDP-11 instruction table
//!
//! Each instruction is described by a 16-character template, most significant bit first, in
//! which `0` and `1` are fixed bits and letters are placeholders for operand fields:
//!
//! | letter | field                                  | width     |
//! |--------|----------------------------------------|-----------|
//! | `a`    | addressing mode and register           | 6 per use |
//! | `r`    | register                               | 3         |
//! | `o`    | branch offset, in words                | varies    |
//! | `i`    | immediate literal                      | varies    |
//! | `f`    | floating accumulator `ac0`..`ac3`      | 2         |
//!
//! Operands fill placeholders in order, so in `mov`'s `0001aaaaaaaaaaaa` the source operand
//! takes the first six `a`s and the destination the last six.

use std::collections::HashMap;

/// The kind of field an operand is encoded into
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operand {
    /// A general addressing-mode operand, possibly with an extension word
    Mode,
    /// A bare register
    Register,
    /// A branch target, encoded as a signed word offset from the following instruction
    Offset,
    /// A branch target behind the instruction, encoded as an unsigned word offset (`sob`)
    BackwardOffset,
    /// An unsigned literal
    Immediate,
    /// A floating accumulator
    FloatAcc,
}

impl Operand {
    /// The template letter for this kind of field
    #[must_use]
    pub const fn placeholder(self) -> u8 {
        match self {
            Operand::Mode => b'a',
            Operand::Register => b'r',
            Operand::Offset | Operand::BackwardOffset => b'o',
            Operand::Immediate => b'i',
            Operand::FloatAcc => b'f',
        }
    }
}

/// An instruction table entry
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Opcode {
    /// The mnemonic
    pub name: &'static str,
    template: &'static [u8; 16],
    /// The operands, in source order
    pub operands: &'static [Operand],
}

impl Opcode {
    /// The number of bits a given operand's field takes up
    #[must_use]
    pub fn width(&self, operand: Operand) -> u32 {
        match operand {
            Operand::Mode => 6,
            Operand::Register => 3,
            Operand::FloatAcc => 2,
            Operand::Offset | Operand::BackwardOffset | Operand::Immediate => self.count(operand),
        }
    }

    fn count(&self, operand: Operand) -> u32 {
        let letter = operand.placeholder();
        // a template has 16 characters, so this can't truncate
        self.template.iter().filter(|&&c| c == letter).count() as u32
    }

    /// Whether this is a floating-point processor instruction, whose mode 0 operands name
    /// accumulators instead of registers
    #[must_use]
    pub fn is_floating(&self) -> bool {
        self.template.starts_with(b"1111")
    }

    /// Fill the template's placeholders with field values, given in operand order
    ///
    /// Each value is truncated to its field's width.
    ///
    /// # Panics
    ///
    /// Panics if `fields` doesn't have exactly one value per operand.
    #[must_use]
    pub fn encode(&self, fields: &[u16]) -> u16 {
        assert_eq!(fields.len(), self.operands.len(), "wrong field count for {}", self.name);
        let mut bits = *self.template;
        for (&operand, &value) in self.operands.iter().zip(fields) {
            let letter = operand.placeholder();
            let width = self.width(operand);
            let positions = bits.iter_mut().filter(|c| **c == letter).take(width as usize);
            for (i, c) in positions.enumerate() {
                let shift = width as usize - 1 - i;
                *c = if (value >> shift) & 1 == 1 { b'1' } else { b'0' };
            }
        }
        assert!(
            bits.iter().all(|c| matches!(c, b'0' | b'1')),
            "unfilled placeholder in {}",
            self.name
        );
        bits.iter().fold(0, |word, &c| (word << 1) | u16::from(c - b'0'))
    }

    /// Check a template against its operand list
    fn validate(&self) {
        let uses = |operand: Operand| {
            let n = self.operands.iter().filter(|&&o| o == operand).count();
            u32::try_from(n).unwrap_or(u32::MAX)
        };
        let a = self.count(Operand::Mode);
        let r = self.count(Operand::Register);
        let f = self.count(Operand::FloatAcc);
        assert!(matches!(a, 0 | 6 | 12), "{}: bad mode field width {a}", self.name);
        assert!(matches!(r, 0 | 3), "{}: bad register field width {r}", self.name);
        assert!(matches!(f, 0 | 2), "{}: bad accumulator field width {f}", self.name);
        assert_eq!(a, 6 * uses(Operand::Mode), "{}: mode operands", self.name);
        assert_eq!(r, 3 * uses(Operand::Register), "{}: register operands", self.name);
        assert_eq!(f, 2 * uses(Operand::FloatAcc), "{}: accumulator operands", self.name);
        let offsets = uses(Operand::Offset) + uses(Operand::BackwardOffset);
        assert_eq!(offsets, u32::from(self.count(Operand::Offset) > 0), "{}", self.name);
        assert_eq!(
            uses(Operand::Immediate),
            u32::from(self.count(Operand::Immediate) > 0),
            "{}",
            self.name
        );
        assert!(
            self.template.iter().all(|c| b"01arofi".contains(c)),
            "{}: stray template character",
            self.name
        );
    }
}

macro_rules! opcodes {
    ($(($name: literal, $template: literal, $operands: expr),)*) => {
        &[$(Opcode { name: $name, template: $template, operands: $operands },)*]
    };
}

/// Every instruction the assembler knows
#[rustfmt::skip]
const OPCODES: &[Opcode] = opcodes![
    ("halt", b"0000000000000000", &[]),
    ("wait", b"0000000000000001", &[]),
    ("rti", b"0000000000000010", &[]),
    ("bpt", b"0000000000000011", &[]),
    ("iot", b"0000000000000100", &[]),
    ("reset", b"0000000000000101", &[]),
    ("rtt", b"0000000000000110", &[]),
    ("mfpt", b"0000000000000111", &[]),
    ("nop", b"0000000010100000", &[]),
    ("clc", b"0000000010100001", &[]),
    ("clv", b"0000000010100010", &[]),
    ("clz", b"0000000010100100", &[]),
    ("cln", b"0000000010101000", &[]),
    ("ccc", b"0000000010101111", &[]),
    ("sec", b"0000000010110001", &[]),
    ("sev", b"0000000010110010", &[]),
    ("sez", b"0000000010110100", &[]),
    ("sen", b"0000000010111000", &[]),
    ("scc", b"0000000010111111", &[]),
    ("cfcc", b"1111000000000000", &[]),
    ("setf", b"1111000000000001", &[]),
    ("seti", b"1111000000000010", &[]),
    ("setd", b"1111000000001001", &[]),
    ("setl", b"1111000000001010", &[]),
    ("rts", b"0000000010000rrr", &[Operand::Register]),
    ("spl", b"0000000010011iii", &[Operand::Immediate]),
    ("jmp", b"0000000001aaaaaa", &[Operand::Mode]),
    ("swab", b"0000000011aaaaaa", &[Operand::Mode]),
    ("br", b"00000001oooooooo", &[Operand::Offset]),
    ("bne", b"00000010oooooooo", &[Operand::Offset]),
    ("beq", b"00000011oooooooo", &[Operand::Offset]),
    ("bge", b"00000100oooooooo", &[Operand::Offset]),
    ("blt", b"00000101oooooooo", &[Operand::Offset]),
    ("bgt", b"00000110oooooooo", &[Operand::Offset]),
    ("ble", b"00000111oooooooo", &[Operand::Offset]),
    ("bpl", b"10000000oooooooo", &[Operand::Offset]),
    ("bmi", b"10000001oooooooo", &[Operand::Offset]),
    ("bhi", b"10000010oooooooo", &[Operand::Offset]),
    ("blos", b"10000011oooooooo", &[Operand::Offset]),
    ("bvc", b"10000100oooooooo", &[Operand::Offset]),
    ("bvs", b"10000101oooooooo", &[Operand::Offset]),
    ("bcc", b"10000110oooooooo", &[Operand::Offset]),
    ("bhis", b"10000110oooooooo", &[Operand::Offset]),
    ("bcs", b"10000111oooooooo", &[Operand::Offset]),
    ("blo", b"10000111oooooooo", &[Operand::Offset]),
    ("jsr", b"0000100rrraaaaaa", &[Operand::Register, Operand::Mode]),
    ("clr", b"0000101000aaaaaa", &[Operand::Mode]),
    ("com", b"0000101001aaaaaa", &[Operand::Mode]),
    ("inc", b"0000101010aaaaaa", &[Operand::Mode]),
    ("dec", b"0000101011aaaaaa", &[Operand::Mode]),
    ("neg", b"0000101100aaaaaa", &[Operand::Mode]),
    ("adc", b"0000101101aaaaaa", &[Operand::Mode]),
    ("sbc", b"0000101110aaaaaa", &[Operand::Mode]),
    ("tst", b"0000101111aaaaaa", &[Operand::Mode]),
    ("ror", b"0000110000aaaaaa", &[Operand::Mode]),
    ("rol", b"0000110001aaaaaa", &[Operand::Mode]),
    ("asr", b"0000110010aaaaaa", &[Operand::Mode]),
    ("asl", b"0000110011aaaaaa", &[Operand::Mode]),
    ("mark", b"0000110100iiiiii", &[Operand::Immediate]),
    ("mfpi", b"0000110101aaaaaa", &[Operand::Mode]),
    ("mtpi", b"0000110110aaaaaa", &[Operand::Mode]),
    ("sxt", b"0000110111aaaaaa", &[Operand::Mode]),
    ("clrb", b"1000101000aaaaaa", &[Operand::Mode]),
    ("comb", b"1000101001aaaaaa", &[Operand::Mode]),
    ("incb", b"1000101010aaaaaa", &[Operand::Mode]),
    ("decb", b"1000101011aaaaaa", &[Operand::Mode]),
    ("negb", b"1000101100aaaaaa", &[Operand::Mode]),
    ("adcb", b"1000101101aaaaaa", &[Operand::Mode]),
    ("sbcb", b"1000101110aaaaaa", &[Operand::Mode]),
    ("tstb", b"1000101111aaaaaa", &[Operand::Mode]),
    ("rorb", b"1000110000aaaaaa", &[Operand::Mode]),
    ("rolb", b"1000110001aaaaaa", &[Operand::Mode]),
    ("asrb", b"1000110010aaaaaa", &[Operand::Mode]),
    ("aslb", b"1000110011aaaaaa", &[Operand::Mode]),
    ("mtps", b"1000110100aaaaaa", &[Operand::Mode]),
    ("mfpd", b"1000110101aaaaaa", &[Operand::Mode]),
    ("mtpd", b"1000110110aaaaaa", &[Operand::Mode]),
    ("mfps", b"1000110111aaaaaa", &[Operand::Mode]),
    ("mov", b"0001aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("cmp", b"0010aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("bit", b"0011aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("bic", b"0100aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("bis", b"0101aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("add", b"0110aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("movb", b"1001aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("cmpb", b"1010aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("bitb", b"1011aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("bicb", b"1100aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("bisb", b"1101aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("sub", b"1110aaaaaaaaaaaa", &[Operand::Mode, Operand::Mode]),
    ("mul", b"0111000rrraaaaaa", &[Operand::Mode, Operand::Register]),
    ("div", b"0111001rrraaaaaa", &[Operand::Mode, Operand::Register]),
    ("ash", b"0111010rrraaaaaa", &[Operand::Mode, Operand::Register]),
    ("ashc", b"0111011rrraaaaaa", &[Operand::Mode, Operand::Register]),
    ("xor", b"0111100rrraaaaaa", &[Operand::Register, Operand::Mode]),
    ("sob", b"0111111rrroooooo", &[Operand::Register, Operand::BackwardOffset]),
    ("fadd", b"0111101000000rrr", &[Operand::Register]),
    ("fsub", b"0111101000001rrr", &[Operand::Register]),
    ("fmul", b"0111101000010rrr", &[Operand::Register]),
    ("fdiv", b"0111101000011rrr", &[Operand::Register]),
    ("emt", b"10001000iiiiiiii", &[Operand::Immediate]),
    ("trap", b"10001001iiiiiiii", &[Operand::Immediate]),
    ("clrf", b"1111000100aaaaaa", &[Operand::Mode]),
    ("tstf", b"1111000101aaaaaa", &[Operand::Mode]),
    ("absf", b"1111000110aaaaaa", &[Operand::Mode]),
    ("negf", b"1111000111aaaaaa", &[Operand::Mode]),
    ("mulf", b"11110010ffaaaaaa", &[Operand::Mode, Operand::FloatAcc]),
    ("modf", b"11110011ffaaaaaa", &[Operand::Mode, Operand::FloatAcc]),
    ("addf", b"11110100ffaaaaaa", &[Operand::Mode, Operand::FloatAcc]),
    ("ldf", b"11110101ffaaaaaa", &[Operand::Mode, Operand::FloatAcc]),
    ("subf", b"11110110ffaaaaaa", &[Operand::Mode, Operand::FloatAcc]),
    ("cmpf", b"11110111ffaaaaaa", &[Operand::Mode, Operand::FloatAcc]),
    ("divf", b"11111001ffaaaaaa", &[Operand::Mode, Operand::FloatAcc]),
    ("ldcif", b"11111110ffaaaaaa", &[Operand::Mode, Operand::FloatAcc]),
    ("stf", b"11111000ffaaaaaa", &[Operand::FloatAcc, Operand::Mode]),
    ("stcfi", b"11111011ffaaaaaa", &[Operand::FloatAcc, Operand::Mode]),
];

/// Lookup table from lowercase mnemonic to [`Opcode`]
#[derive(Debug, Clone)]
pub struct InstructionTable(HashMap<&'static str, Opcode>);

impl InstructionTable {
    /// Build and validate the table
    ///
    /// # Panics
    ///
    /// Panics if an entry's template doesn't match its operand list.
    #[must_use]
    pub fn new() -> Self {
        Self(
            OPCODES
                .iter()
                .inspect(|op| op.validate())
                .map(|op| (op.name, *op))
                .collect(),
        )
    }

    /// Look up a mnemonic, ignoring case
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Opcode> {
        self.0.get(name.to_ascii_lowercase().as_str())
    }
}

impl Default for InstructionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_valid() {
        let table = InstructionTable::new();
        assert_eq!(table.0.len(), OPCODES.len());
    }

    #[test]
    fn two_mode_fields_fill_in_order() {
        let table = InstructionTable::new();
        let mov = table.get("MOV").unwrap();
        // mov #x, r0
        assert_eq!(mov.encode(&[0o27, 0o00]), 0o012700);
    }

    #[test]
    fn field_widths() {
        let table = InstructionTable::new();
        let br = table.get("br").unwrap();
        assert_eq!(br.width(Operand::Offset), 8);
        assert_eq!(br.encode(&[0xfe]), 0o000776);
        let sob = table.get("sob").unwrap();
        assert_eq!(sob.width(Operand::BackwardOffset), 6);
        assert_eq!(sob.encode(&[1, 3]), 0o077103);
        let spl = table.get("spl").unwrap();
        assert_eq!(spl.width(Operand::Immediate), 3);
        assert_eq!(spl.encode(&[7]), 0o000237);
    }

    #[test]
    fn truncates_to_field() {
        let table = InstructionTable::new();
        let emt = table.get("emt").unwrap();
        assert_eq!(emt.encode(&[0x1ff]), 0o104377);
    }

    #[test]
    fn floating() {
        let table = InstructionTable::new();
        let ldf = table.get("ldf").unwrap();
        assert!(ldf.is_floating());
        assert!(!table.get("mov").unwrap().is_floating());
        // ldf (r1), ac2
        assert_eq!(ldf.encode(&[0o11, 2]), 0o172611);
    }
}
