// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

use anyhow::{Context, Result};
use ariadne::{Color, Fmt, Label, Report, ReportKind, Source, sources};
use chumsky::error::{Rich, RichPattern};
use clap::Parser;
use itertools::Itertools;
use p11as::{Diagnostic, Severity};
use std::borrow::Cow;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

mod assemble;
mod format;

#[derive(Parser, Debug)]
#[command(version = p11as::VERSION, about)]
enum Action {
    /// Format PDP-11 assembly source, one statement per line
    #[command(alias = "fmt")]
    Format(format::FormatArgs),
    /// Assemble PDP-11 assembly source into machine code
    #[command(alias = "asm")]
    Assemble(assemble::AssembleArgs),
}

impl Action {
    fn run(&self) -> Result<()> {
        match self {
            Action::Format(format_args) => format_args.run(),
            Action::Assemble(assemble_args) => assemble_args.run(),
        }
    }
}

fn read_src<P: AsRef<Path>>(input: Option<&P>) -> Result<(Cow<'_, str>, String)> {
    Ok(if let Some(path) = input {
        (
            path.as_ref().as_os_str().to_string_lossy(),
            fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.as_ref().display()))?,
        )
    } else {
        let mut s = String::new();
        io::stdin().read_to_string(&mut s)?;
        ("stdin".into(), s)
    })
}

fn report_ast_build_err(err: &Rich<'_, char>, file: &str, source: &str) {
    let span = err.span().into_range();
    let found = err.found().map_or_else(
        || "unexpected end of input".to_owned(),
        |c| format!("unexpected '{}'", c.escape_default().fg(Color::Cyan)),
    );
    let mut builder = Report::build(ReportKind::Error, (file, span.clone()))
        .with_message(format!("failed to parse {}", file.fg(Color::Red)))
        .with_label(Label::new((file, span)).with_message(found).with_color(Color::Yellow));

    // whitespace is accepted between any two tokens, and "something else" sorts last
    let expected = err
        .expected()
        .filter(|pat| !matches!(pat, RichPattern::Label(s) if *s == "whitespace"))
        .sorted_unstable_by_key(|pat| (matches!(pat, RichPattern::SomethingElse), *pat))
        .collect_vec();
    if !expected.is_empty() {
        builder = builder.with_note(format!(
            "expected {}",
            expected.iter().format_with(", ", |p, f| f(&p.fg(Color::Blue)))
        ));
    }

    builder
        .finish()
        .eprint((file, Source::from(source)))
        .unwrap_or_else(|e| panic!("failure to write to stderr: {e}"));
}

fn print_parse_errors(errs: &[Rich<'_, char>], file: &str, src: &str) -> ! {
    for err in errs {
        log::debug!("parse error in {file}: {err:?}");
        report_ast_build_err(err, file, src);
    }
    #[allow(clippy::exit, reason = "explicitly documented in print_parse_errors")]
    std::process::exit(1)
}

/// Wrap around `f(src)` passing errors into [`print_parse_errors`] using the provided `file`
///
/// On error, prints the appropriate errors and [exits][std::process::exit].
fn checked_ast_fn<'a, T, F>(f: F, file: &str, src: &'a str) -> T
where
    F: Fn(&'a str) -> Result<T, Vec<Rich<'a, char>>>,
{
    match f(src) {
        Ok(val) => val,
        Err(errs) => print_parse_errors(&errs, file, src),
    }
}

/// Render a diagnostic against the `(name, source)` of every input file
fn report_diagnostic(diag: &Diagnostic, files: &[(String, String)]) {
    let (kind, color) = match diag.severity {
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
        Severity::Error => (ReportKind::Error, Color::Red),
        Severity::Critical => (ReportKind::Custom("Critical", Color::Red), Color::Red),
    };
    let name = files
        .get(diag.file)
        .map_or_else(|| "<unknown>".to_owned(), |(name, _)| name.clone());
    let mut builder = Report::build(kind, (name.clone(), diag.span())).with_code(diag.code.name());
    for (i, label) in diag.labels.iter().enumerate() {
        if i == 0 {
            builder = builder.with_message(&label.message);
        }
        let color = if i == 0 { color } else { Color::Blue };
        builder = builder.with_label(
            Label::new((name.clone(), label.span.clone()))
                .with_message(&label.message)
                .with_color(color),
        );
    }
    builder
        .finish()
        .eprint(sources(files.iter().cloned()))
        .unwrap_or_else(|e| panic!("failure to write to stderr: {e}"));
}

fn main() -> Result<()> {
    let env = env_logger::Env::default().filter_or("P11AS_LOG", "warn");
    env_logger::init_from_env(env);

    Action::parse().run()
}
