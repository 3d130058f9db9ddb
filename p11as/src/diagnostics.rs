// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Collection of [`Diagnostic`]s during a run
//!
//! Diagnostics are often found long after the statement that caused them was compiled, when a
//! deferred value finally resolves. Every such computation holds its own [`Reporter`], which
//! remembers the file it came from and shares one log with the rest of the run.

use p11as_core::{Diagnostic, ErrorCode, FileId, Severity};

use std::cell::RefCell;
use std::error::Error;
use std::fmt::{self, Display};
use std::ops::Range;
use std::rc::Rc;

/// A critical diagnostic was reported, and the run must stop
///
/// The diagnostic itself has already been logged; this is only a marker to propagate with `?`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Fatal;

impl Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "assembly aborted by a critical error")
    }
}

impl Error for Fatal {}

/// A shared, append-only log of diagnostics
#[derive(Debug, Clone, Default)]
pub(crate) struct DiagnosticLog(Rc<RefCell<Vec<Diagnostic>>>);

impl DiagnosticLog {
    pub(crate) fn reporter(&self, file: FileId) -> Reporter {
        Reporter {
            log: self.clone(),
            file,
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.0.borrow().iter().any(Diagnostic::is_failure)
    }

    pub(crate) fn snapshot(&self) -> Vec<Diagnostic> {
        self.0.borrow().clone()
    }
}

/// A handle for reporting diagnostics against a single file
#[derive(Debug, Clone)]
pub(crate) struct Reporter {
    log: DiagnosticLog,
    file: FileId,
}

impl Reporter {
    pub(crate) fn push(&self, diagnostic: Diagnostic) {
        log::debug!("{diagnostic}");
        self.log.0.borrow_mut().push(diagnostic);
    }

    pub(crate) fn report(
        &self,
        severity: Severity,
        code: ErrorCode,
        span: Range<usize>,
        message: impl Into<String>,
    ) {
        self.push(Diagnostic::new(severity, code, self.file, span, message));
    }

    pub(crate) fn warning(&self, code: ErrorCode, span: Range<usize>, message: impl Into<String>) {
        self.report(Severity::Warning, code, span, message);
    }

    pub(crate) fn error(&self, code: ErrorCode, span: Range<usize>, message: impl Into<String>) {
        self.report(Severity::Error, code, span, message);
    }

    /// Report a critical diagnostic, returning the [`Fatal`] marker to propagate
    #[must_use]
    pub(crate) fn critical(
        &self,
        code: ErrorCode,
        span: Range<usize>,
        message: impl Into<String>,
    ) -> Fatal {
        self.report(Severity::Critical, code, span, message);
        Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_fail() {
        let log = DiagnosticLog::default();
        let r = log.reporter(3);
        r.warning(ErrorCode::MissingDot, 0..4, "missing dot");
        assert!(!log.failed());
        r.error(ErrorCode::OddOffset, 5..6, "odd");
        assert!(log.failed());
        let diags = log.snapshot();
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.file == 3));
    }

    #[test]
    fn critical_returns_marker() {
        let log = DiagnosticLog::default();
        let r = log.reporter(0);
        assert_eq!(r.critical(ErrorCode::AddressConflict, 0..1, "x"), Fatal);
        assert_eq!(log.snapshot()[0].severity, Severity::Critical);
    }
}
