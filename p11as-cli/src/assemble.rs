// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! implementation of `p11as assemble`

use crate::{checked_ast_fn, read_src, report_diagnostic};
use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use p11as::asm::{AstBuildErr, build_ast};
use p11as::formats::Format;
use p11as::{Compiler, Options};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

fn parse_format(s: &str) -> Result<Format, String> {
    Format::from_name(s).ok_or_else(|| format!("unknown format {s:?} (expected bin or raw)"))
}

/// Parse an address the way source code spells numbers: octal, or decimal with a trailing `.`
fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_suffix('.') {
        Some(decimal) => decimal.parse(),
        None => u16::from_str_radix(s, 8),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

#[derive(Debug, Parser)]
pub(crate) struct AssembleArgs {
    /// Source files, assembled in order into one program
    ///
    /// reads STDIN if unset
    #[arg(value_name = "INPUT", value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,
    /// Output file for the assembled program
    ///
    /// If unset, the program is written to STDOUT, unless the source requested its own output
    /// files with `.make_bin` or `.make_raw`.
    #[arg(short, long, value_name = "OUTPUT")]
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
    /// Output format for OUTPUT
    #[arg(short, long, default_value = "bin", value_parser = parse_format)]
    format: Format,
    /// Load address used when no source file sets one with `.link`
    ///
    /// Octal, or decimal with a trailing "."
    #[arg(short, long, value_name = "ADDR", default_value = "1000", value_parser = parse_address)]
    link: u16,
}

impl AssembleArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let mut files = Vec::with_capacity(self.inputs.len().max(1));
        if self.inputs.is_empty() {
            let (name, src) = read_src::<PathBuf>(None)?;
            files.push((name.into_owned(), src));
        } else {
            for path in &self.inputs {
                let (name, src) = read_src(Some(path))?;
                files.push((name.into_owned(), src));
            }
        }

        let asts: Vec<_> = files
            .iter()
            .map(|(name, src)| {
                checked_ast_fn(|s| build_ast(s).map_err(AstBuildErr::into_inner), name, src)
            })
            .collect();

        let mut compiler = Compiler::new(Options {
            default_link_base: self.link,
        });
        let mut aborted = false;
        for ((name, _), ast) in files.iter().zip(&asts) {
            if compiler.compile_file(name, ast).is_err() {
                log::info!("critical error in {name}; not linking");
                aborted = true;
                break;
            }
        }
        let result = if aborted {
            Err(compiler.abort())
        } else {
            compiler.link()
        };

        let assembly = match result {
            Ok(assembly) => assembly,
            Err(failure) => {
                for diag in &failure.diagnostics {
                    report_diagnostic(diag, &files);
                }
                eprintln!("{failure}");
                #[allow(clippy::exit, reason = "diagnostics were already printed")]
                std::process::exit(1);
            }
        };
        for diag in &assembly.diagnostics {
            report_diagnostic(diag, &files);
        }

        for output in &assembly.outputs {
            log::info!("writing {} ({} format)", output.path, output.format);
            fs::write(&output.path, &output.contents)
                .with_context(|| format!("failed to write {}", output.path))?;
        }

        let image = self
            .format
            .write(assembly.base, &assembly.code)
            .context("failed to render the program")?;
        match self.output.as_deref() {
            Some(path) => fs::write(path, image)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None if assembly.outputs.is_empty() => io::stdout().lock().write_all(&image)?,
            None => (),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        assert_eq!(parse_address("1000"), Ok(0o1000));
        assert_eq!(parse_address("512."), Ok(512));
        assert!(parse_address("9").is_err());
        assert!(parse_address("200000").is_err());
    }

    #[test]
    fn formats() {
        assert_eq!(parse_format("raw"), Ok(Format::Raw));
        assert!(parse_format("lda").is_err());
    }
}
