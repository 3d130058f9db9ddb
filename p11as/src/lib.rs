// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD
#![warn(missing_docs)]

//! A single-pass cross-assembler for the PDP-11
//!
//! Source files are read once, top to bottom. Anything that can't be known yet, such as a label
//! further down the file or the address the program will be loaded at, becomes a node in a graph
//! of [deferred values](deferred), and the machine code that depends on it is filled in once it
//! is known. Instructions and most data never change size because of this, so addresses can be
//! assigned as the file is read.
//!
//! # Basic Example
//!
//! ```rust
//! use p11as::asm::assemble;
//! // mov #1, r0 ; halt
//! let code = assemble("mov #1, r0\nhalt").unwrap();
//! assert_eq!(code, [0o300, 0o25, 1, 0, 0, 0]);
//! ```
//!
//! # Multiple files
//!
//! A [`Compiler`] takes files one at a time, each placed right after the one before it, and
//! [`Compiler::link`] resolves everything once all of them are in. Names declared with `.extern`
//! are shared between files; everything else is private to the file that defines it.
//!
//! ```rust
//! use p11as::asm::assemble_files;
//! use p11as::Options;
//!
//! let main = ".extern putc\njsr pc, putc\nhalt";
//! let lib = ".extern putc\nputc: rts pc";
//! let assembly = assemble_files(&[("main.s", main), ("lib.s", lib)], Options::default()).unwrap();
//! assert_eq!(assembly.base, 0o1000);
//! // jsr pc, putc is relative: putc is at 0o1006, and the word after the extension is 0o1004
//! assert_eq!(&assembly.code[..4], [0o367, 0o11, 2, 0]);
//! ```

#[doc(hidden)]
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod deferred;

/// Collecting diagnostics while compiling
mod diagnostics;
pub use diagnostics::Fatal;

pub mod symbols;

pub mod isa;

/// Operand and instruction word encoding
mod encoder;

pub mod compiler;

/// Expression evaluation, implemented on the per-file compiler pass
mod eval;

mod metacommands;

pub mod formats;

pub mod link;

pub mod asm;

pub use compiler::{Compiler, Options};
pub use link::{Assembly, AssemblyFailure, OutputFile};
pub use p11as_core::{Diagnostic, ErrorCode, FileId, Severity};

/// A small module that re-exports items useful when driving the assembler
pub mod prelude {
    pub use crate::asm::{assemble, assemble_files, build_ast};
    pub use crate::{Assembly, Compiler, Diagnostic, ErrorCode, Options, Severity};
}
