// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Convenience functions for assembling source text
//!
//! These wrap parsing with [`p11as_ast`], compiling with a [`Compiler`], and linking.
//!
//! ```
//! use p11as::asm::assemble;
//! const HELLO: &str = r#"
//! ; print a greeting on the console terminal
//!         mov #msg, r1
//! loop:   movb (r1)+, r0
//!         beq done
//! 1$:     tstb @#177564   ; wait for the transmitter
//!         bpl 1$
//!         movb r0, @#177566
//!         br loop
//! done:   halt
//! msg:    .asciz "Hello, world!\n"
//! "#;
//!
//! let code = assemble(HELLO).unwrap();
//! // mov #msg, r1, with msg right after the 11 words of code
//! assert_eq!(&code[..4], [0o301, 0o25, 0o26, 0o2]);
//! assert!(code.ends_with(b"world!\n\0"));
//! ```

use crate::compiler::{Compiler, Options};
use crate::link::{Assembly, AssemblyFailure};
use chumsky::error::Rich;
use itertools::Itertools;
use p11as_ast::Block;
use std::error::Error;
use std::fmt::{self, Display};

/// Parse source text into a [`Block`]
///
/// # Errors
///
/// If the provided code fails to parse, the parser error/s are returned.
///
/// # Example
///
/// ```
/// use p11as::asm::build_ast;
/// assert!(build_ast("start: mov #1, r0\n.repeat 3 { nop }\n").is_ok());
/// assert!(build_ast("mov #, r0").is_err());
/// ```
pub fn build_ast(code: &str) -> Result<Block<'_>, AstBuildErr<'_>> {
    p11as_ast::parse(code).map_err(AstBuildErr)
}

#[derive(Debug)]
/// One or more parsing errors that occured in [`build_ast`]
pub struct AstBuildErr<'a>(Vec<Rich<'a, char>>);

impl<'a> AstBuildErr<'a> {
    /// Get the underlying [`chumsky::error::Rich<'_, char>`]s in a slice
    #[must_use]
    pub fn inner(&self) -> &[Rich<'a, char>] {
        self.0.as_slice()
    }

    /// Convert the [`AstBuildErr`] into the underlying [`Vec`] of
    /// [`chumsky::error::Rich<'_, char>`]
    #[must_use]
    pub fn into_inner(self) -> Vec<Rich<'a, char>> {
        self.0
    }
}

impl Display for AstBuildErr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().format("\n"))
    }
}

impl Error for AstBuildErr<'_> {}

/// An error that indicates where in the assembly process a failure occured, and wraps around the
/// error type for that part of the process.
#[derive(Debug)]
pub enum GeneralAsmError<'a> {
    /// Failure to parse one of the source files
    BuildAst {
        /// The name of the file that failed to parse
        file: String,
        /// What went wrong
        err: AstBuildErr<'a>,
    },
    /// Failure to compile or link the parsed files
    Assemble(AssemblyFailure),
}

impl Display for GeneralAsmError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildAst { file, err } => write!(f, "failed to parse {file}:\n{err}"),
            Self::Assemble(failure) => write!(f, "{failure}"),
        }
    }
}

impl Error for GeneralAsmError<'_> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BuildAst { .. } => None,
            Self::Assemble(failure) => Some(failure),
        }
    }
}

/// Assemble several `(name, source)` pairs, in order, into one program
///
/// # Errors
///
/// If any file fails to parse, nothing is compiled, and the first parse failure is returned in a
/// [`GeneralAsmError::BuildAst`].
///
/// If compiling or linking reports any errors, every diagnostic is returned in a
/// [`GeneralAsmError::Assemble`].
pub fn assemble_files<'a>(
    files: &[(&str, &'a str)],
    options: Options,
) -> Result<Assembly, GeneralAsmError<'a>> {
    let asts: Vec<_> = files
        .iter()
        .map(|&(name, code)| {
            build_ast(code).map_err(|err| GeneralAsmError::BuildAst {
                file: name.to_owned(),
                err,
            })
        })
        .try_collect()?;

    let mut compiler = Compiler::new(options);
    for (&(name, _), ast) in files.iter().zip(&asts) {
        if compiler.compile_file(name, ast).is_err() {
            log::warn!("stopped at a critical error in {name}");
            return Err(GeneralAsmError::Assemble(compiler.abort()));
        }
    }
    compiler.link().map_err(GeneralAsmError::Assemble)
}

/// Try to assemble a single source file into machine code, loaded at the default address
///
/// This is a thin convenience wrapper around [`assemble_files`].
///
/// # Errors
///
/// See [`assemble_files`].
#[inline]
pub fn assemble(code: &str) -> Result<Vec<u8>, GeneralAsmError<'_>> {
    assemble_files(&[("input.s", code)], Options::default()).map(|assembly| assembly.code)
}
