// SPDX-FileCopyrightText: 2024 - 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Core types used throughout the p11as workspace
#![warn(missing_docs)]

use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::ops::Range;

/// A general-purpose register, `r0` through `r7`
///
/// `sp` and `pc` are accepted as aliases for `r6` and `r7` respectively.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub struct Register(u8);

impl Register {
    /// `r0`
    pub const R0: Self = Self(0);
    /// The stack pointer, `r6`
    pub const SP: Self = Self(6);
    /// The program counter, `r7`
    pub const PC: Self = Self(7);

    /// Create a [`Register`] from its number, or [`None`] if `n > 7`
    #[must_use]
    pub const fn new(n: u8) -> Option<Self> {
        if n < 8 { Some(Self(n)) } else { None }
    }

    /// The register number, in `0..8`
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }

    /// Look up a register by name, ignoring case
    ///
    /// ```
    /// use p11as_core::Register;
    /// assert_eq!(Register::from_name("R3"), Register::new(3));
    /// assert_eq!(Register::from_name("sp"), Some(Register::SP));
    /// assert_eq!(Register::from_name("r8"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sp" => Some(Self::SP),
            "pc" => Some(Self::PC),
            s => match s.as_bytes() {
                [b'r', d @ b'0'..=b'7'] => Some(Self(d - b'0')),
                _ => None,
            },
        }
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            6 => write!(f, "sp"),
            7 => write!(f, "pc"),
            n => write!(f, "r{n}"),
        }
    }
}

/// A floating-point accumulator, `ac0` through `ac5`
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub struct Accumulator(u8);

impl Accumulator {
    /// Look up an accumulator by name, ignoring case
    ///
    /// ```
    /// use p11as_core::Accumulator;
    /// assert_eq!(Accumulator::from_name("AC2").map(|ac| ac.number()), Some(2));
    /// assert_eq!(Accumulator::from_name("ac6"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_bytes() {
            [b'a', b'c', d @ b'0'..=b'5'] => Some(Self(d - b'0')),
            _ => None,
        }
    }

    /// The accumulator number, in `0..6`
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }
}

/// Addressing mode of a 6-bit operand field
///
/// The discriminant is the 3-bit mode number placed above the register number.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum AddressingMode {
    /// `R`
    Register = 0,
    /// `(R)` or `@R`
    RegisterDeferred = 1,
    /// `(R)+`, and `#n` when the register is `pc`
    Autoincrement = 2,
    /// `@(R)+`, and `@#n` when the register is `pc`
    AutoincrementDeferred = 3,
    /// `-(R)`
    Autodecrement = 4,
    /// `@-(R)`
    AutodecrementDeferred = 5,
    /// `X(R)`, and plain `A` when the register is `pc`
    Index = 6,
    /// `@X(R)`, and `@A` when the register is `pc`
    IndexDeferred = 7,
}

impl AddressingMode {
    /// The deferred counterpart of a non-deferred mode, or [`None`] if `self` is already deferred
    #[must_use]
    pub const fn deferred(self) -> Option<Self> {
        match self {
            Self::Register => Some(Self::RegisterDeferred),
            Self::Autoincrement => Some(Self::AutoincrementDeferred),
            Self::Autodecrement => Some(Self::AutodecrementDeferred),
            Self::Index => Some(Self::IndexDeferred),
            _ => None,
        }
    }

    /// Combine the mode with a register into the 6-bit field value
    ///
    /// ```
    /// use p11as_core::{AddressingMode, Register};
    /// assert_eq!(AddressingMode::Autoincrement.field(Register::PC), 0o27);
    /// ```
    #[must_use]
    pub const fn field(self, reg: Register) -> u16 {
        ((self as u16) << 3) | reg.0 as u16
    }
}

/// How serious a [`Diagnostic`] is
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
pub enum Severity {
    /// Reported, but does not fail the run
    Warning,
    /// Fails the run, but processing continues
    Error,
    /// Fails the run and aborts processing immediately
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// The kind of problem a [`Diagnostic`] reports
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// A symbol was defined twice in the same scope
    DuplicateSymbol,
    /// A symbol was used but never defined
    UndefinedSymbol,
    /// A value did not fit the field it was placed in
    ValueOutOfBounds,
    /// A word-sized item was placed at an odd address
    OddAddress,
    /// A branch target was an odd number of bytes away
    OddOffset,
    /// An instruction name was neither an instruction nor a metacommand
    UnknownMnemonic,
    /// A symbol was used as an instruction name
    NotCallable,
    /// An instruction was given too few or too many operands
    WrongOperandCount,
    /// An operand's shape can't be encoded for its field
    BadAddressingMode,
    /// A value had the wrong type, such as a string where an integer was needed
    TypeMismatch,
    /// A label or assignment appeared inside a `.repeat` body
    DefinitionInLoop,
    /// The link base was set more than once, or to an unusable address
    AddressConflict,
    /// The size of emitted code depended on a value that was not yet known
    UnresolvedSize,
    /// A metacommand was written without its leading dot
    MissingDot,
    /// A division or remainder by zero
    DivisionByZero,
    /// A value that must be known immediately was not
    NotConstant,
    /// A file emission requested an unknown output format
    UndefinedFormat,
}

impl ErrorCode {
    /// The stable, kebab-case name of the code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ErrorCode::DuplicateSymbol => "duplicate-symbol",
            ErrorCode::UndefinedSymbol => "undefined-symbol",
            ErrorCode::ValueOutOfBounds => "value-out-of-bounds",
            ErrorCode::OddAddress => "odd-address",
            ErrorCode::OddOffset => "odd-offset",
            ErrorCode::UnknownMnemonic => "unknown-mnemonic",
            ErrorCode::NotCallable => "not-callable",
            ErrorCode::WrongOperandCount => "wrong-operand-count",
            ErrorCode::BadAddressingMode => "bad-addressing-mode",
            ErrorCode::TypeMismatch => "type-mismatch",
            ErrorCode::DefinitionInLoop => "definition-in-loop",
            ErrorCode::AddressConflict => "address-conflict",
            ErrorCode::UnresolvedSize => "unresolved-size",
            ErrorCode::MissingDot => "missing-dot",
            ErrorCode::DivisionByZero => "division-by-zero",
            ErrorCode::NotConstant => "not-constant",
            ErrorCode::UndefinedFormat => "undefined-format",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Index of a source file within a single assembler run
pub type FileId = usize;

/// A span of source text with a message attached to it
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DiagLabel {
    /// The byte range within the source file
    pub span: Range<usize>,
    /// The message shown alongside the span
    pub message: String,
}

/// A structured report of a problem found while assembling
///
/// The first label is the primary location; later labels add context, such as where a duplicate
/// symbol was first defined.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Diagnostic {
    /// How serious the problem is
    pub severity: Severity,
    /// What kind of problem it is
    pub code: ErrorCode,
    /// The source file the labels point into
    pub file: FileId,
    /// Spans and messages, primary first
    pub labels: Vec<DiagLabel>,
}

impl Diagnostic {
    /// Create a diagnostic with a single label
    #[must_use]
    pub fn new(
        severity: Severity,
        code: ErrorCode,
        file: FileId,
        span: Range<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code,
            file,
            labels: vec![DiagLabel {
                span,
                message: message.into(),
            }],
        }
    }

    /// Attach an extra label
    #[must_use]
    pub fn with_label(mut self, span: Range<usize>, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            span,
            message: message.into(),
        });
        self
    }

    /// The primary span, or `0..0` if there are no labels
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        self.labels.first().map_or(0..0, |l| l.span.clone())
    }

    /// Whether this diagnostic causes the run to fail
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.severity >= Severity::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.severity, self.code)?;
        if let Some(label) = self.labels.first() {
            write!(f, ": {}", label.message)?;
        }
        Ok(())
    }
}

impl Error for Diagnostic {}
