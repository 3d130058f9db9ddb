// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Tying compiled files together into a program

use crate::compiler::{ADDRESS_SPACE, Compiler};
use crate::deferred::{Deferred, Int};
use crate::formats::Format;
use p11as_core::{Diagnostic, ErrorCode};

use std::error::Error;
use std::fmt::{self, Display};

/// A file the program asked to have written
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OutputFile {
    /// Where to write it, as given by `.make_<format>` or derived from the source file name
    pub path: String,
    /// The format it was rendered in
    pub format: Format,
    /// The rendered file
    pub contents: Vec<u8>,
}

/// A successfully linked program
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Assembly {
    /// The load address
    pub base: u16,
    /// The machine code, starting at `base`
    pub code: Vec<u8>,
    /// Output files requested by the source, in request order
    pub outputs: Vec<OutputFile>,
    /// Warnings produced along the way
    pub diagnostics: Vec<Diagnostic>,
}

/// Assembly failed, for the reasons in `diagnostics`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AssemblyFailure {
    /// Every diagnostic produced, including warnings
    pub diagnostics: Vec<Diagnostic>,
}

impl Display for AssemblyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self.diagnostics.iter().filter(|d| d.is_failure()).count();
        write!(f, "assembly failed with {failures} error(s)")
    }
}

impl Error for AssemblyFailure {}

impl Compiler {
    /// Give up, returning the diagnostics reported so far
    #[must_use]
    pub fn abort(self) -> AssemblyFailure {
        AssemblyFailure {
            diagnostics: self.log.snapshot(),
        }
    }

    /// Resolve everything that was deferred and produce the final program
    ///
    /// Symbols shared with `.extern` that no file defined are reported here. If no file set a
    /// link base, [`Options::default_link_base`](crate::compiler::Options) is used.
    ///
    /// # Errors
    ///
    /// Returns every diagnostic if any of them is an error.
    pub fn link(mut self) -> Result<Assembly, AssemblyFailure> {
        let undefined = self.symbols.close(|key| !key.contains([':', '/']));
        self.report_undefined(undefined);
        // the last file is the best place to hang whole-program diagnostics
        let last = self.files.len().saturating_sub(1);
        let reporter = self.log.reporter(last);

        if !self.link_base.is_settled() {
            let base = self.options.default_link_base;
            if base % 2 != 0 {
                reporter.error(
                    ErrorCode::AddressConflict,
                    0..0,
                    format!("the default link base {base:o} is odd"),
                );
            }
            log::debug!("no .link; using default base {base:o}");
            let _ = self.link_base.settle(Int::Settled(i64::from(base)));
        }
        let base = self
            .link_base
            .try_value()
            .ready()
            .and_then(|b| u16::try_from(b).ok())
            .unwrap_or_default();

        let mut code = Vec::new();
        for (file, chunk) in self.code.iter().enumerate() {
            match chunk.resolve() {
                Ok(bytes) => code.extend(bytes),
                Err(_) => self.log.reporter(file).error(
                    ErrorCode::NotConstant,
                    0..0,
                    format!(
                        "{}: code depends on a circular definition and can't be resolved",
                        self.files[file]
                    ),
                ),
            }
        }
        log::info!("linked {} byte(s) at {base:o}", code.len());
        if usize::from(base) + code.len() > ADDRESS_SPACE {
            reporter.error(
                ErrorCode::AddressConflict,
                0..0,
                format!(
                    "{} byte(s) of code at {base:o} run past the end of the address space",
                    code.len()
                ),
            );
        }

        let mut outputs = Vec::with_capacity(self.emits.len());
        for request in &self.emits {
            match request.format.write(base, &code) {
                Ok(contents) => outputs.push(OutputFile {
                    path: request.destination.clone(),
                    format: request.format,
                    contents,
                }),
                Err(e) => self.log.reporter(request.file).error(
                    ErrorCode::ValueOutOfBounds,
                    request.span.clone(),
                    e.to_string(),
                ),
            }
        }

        if self.log.failed() {
            return Err(self.abort());
        }
        Ok(Assembly {
            base,
            code,
            outputs,
            diagnostics: self.log.snapshot(),
        })
    }
}
