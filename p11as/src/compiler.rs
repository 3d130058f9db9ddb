// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! The compiler driver
//!
//! A [`Compiler`] takes parsed source files one at a time, in a single pass each, and turns them
//! into deferred byte sequences. Nothing needs to be known about the link base or about labels
//! further down the file while this happens; the pieces are tied together by [`Compiler::link`].

use crate::deferred::{Bytes, Deferred, Int, Lazy, Value};
use crate::diagnostics::{DiagnosticLog, Fatal, Reporter};
use crate::encoder::{self, Context};
use crate::formats::Format;
use crate::isa::InstructionTable;
use crate::metacommands::is_metacommand;
use crate::symbols::{Pending, Symbol, SymbolKind, SymbolTable, is_local};
use p11as_ast::prelude::*;
use p11as_core::{Diagnostic, ErrorCode, FileId};

use std::ops::Range;
use std::path::Path;
use std::rc::Rc;

/// Size of the PDP-11's 16-bit address space, in bytes
pub(crate) const ADDRESS_SPACE: usize = 0x1_0000;

/// Settings for a compile run
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Options {
    /// Where the program is loaded, unless a source file says otherwise with `.link`
    pub default_link_base: u16,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_link_base: 0o1000,
        }
    }
}

/// The kind of block being compiled
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BlockKind {
    /// The top level of a source file
    File,
    /// The body of a `.repeat`, where symbols can't be defined
    Repeat,
}

/// A queued request to write the linked program out to a file
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EmitRequest {
    /// The output format
    pub format: Format,
    /// Where to write it
    pub destination: String,
    /// The file that made the request
    pub file: FileId,
    /// The statement that made the request
    pub span: Range<usize>,
}

/// Assembler state that persists across source files
pub struct Compiler {
    pub(crate) options: Options,
    pub(crate) table: InstructionTable,
    pub(crate) symbols: SymbolTable,
    pub(crate) log: DiagnosticLog,
    pub(crate) link_base: Rc<Lazy<Int>>,
    pub(crate) link_set_at: Option<(FileId, Range<usize>)>,
    pub(crate) files: Vec<String>,
    pub(crate) code: Vec<Bytes>,
    pub(crate) here: Int,
    /// Bytes emitted so far, across every file
    pub(crate) size: usize,
    pub(crate) emits: Vec<EmitRequest>,
}

impl Compiler {
    /// Create a compiler with nothing compiled yet
    #[must_use]
    pub fn new(options: Options) -> Self {
        let link_base = Lazy::promise("link base");
        Self {
            options,
            table: InstructionTable::new(),
            symbols: SymbolTable::default(),
            log: DiagnosticLog::default(),
            here: Int::Lazy(Rc::clone(&link_base)),
            size: 0,
            link_base,
            link_set_at: None,
            files: Vec::new(),
            code: Vec::new(),
            emits: Vec::new(),
        }
    }

    /// Compile one source file, placed right after the previous one
    ///
    /// `name` is used for diagnostics and for the default names of output files. Problems are
    /// collected rather than returned, and are available through [`Compiler::diagnostics`].
    ///
    /// # Errors
    ///
    /// Returns [`Fatal`] if a critical diagnostic was reported, after which the compiler should
    /// not be used for anything but reading diagnostics.
    pub fn compile_file(&mut self, name: &str, block: &Block<'_>) -> Result<FileId, Fatal> {
        let file = self.files.len();
        self.files.push(name.to_owned());
        log::debug!("compiling {name} as file {file}");

        let reporter = self.log.reporter(file);
        let state = CompileState {
            file,
            local: 0,
            here: self.here.clone(),
            block: BlockKind::File,
            ended: false,
            operand_base: None,
        };
        let mut pass = FilePass {
            c: self,
            reporter,
            state,
        };
        let mut out = Vec::new();
        pass.compile_block(block, BlockKind::File, &mut out)?;
        pass.close_local_scope();
        let here = pass.state.here;

        let undefined = self
            .symbols
            .close(|key| key.starts_with(&format!("{file}:")) || key.starts_with(&format!("{file}/")));
        self.report_undefined(undefined);
        self.here = here;
        let code = Bytes::concat(out);
        log::debug!("{name}: {:?} bytes", code.len());
        self.code.push(code);
        Ok(file)
    }

    pub(crate) fn report_undefined(&self, undefined: Vec<(String, Pending)>) {
        for (key, pending) in undefined {
            let name = key.rsplit([':', '/']).next().unwrap_or(&key);
            self.log.reporter(pending.file).error(
                ErrorCode::UndefinedSymbol,
                pending.span,
                format!("`{name}` is not defined"),
            );
        }
    }

    /// Every diagnostic reported so far
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.log.snapshot()
    }

    /// The names of the files compiled so far, indexed by [`FileId`]
    #[must_use]
    pub fn file_names(&self) -> &[String] {
        &self.files
    }
}

/// Per-file compilation state
pub(crate) struct CompileState {
    pub(crate) file: FileId,
    /// Number of the current local label scope
    pub(crate) local: usize,
    /// The emit address
    pub(crate) here: Int,
    pub(crate) block: BlockKind,
    /// Set by `.end`
    pub(crate) ended: bool,
    /// What `.` means while a machine instruction's operands are evaluated
    pub(crate) operand_base: Option<Int>,
}

/// A single pass over a single file
pub(crate) struct FilePass<'c> {
    pub(crate) c: &'c mut Compiler,
    pub(crate) reporter: Reporter,
    pub(crate) state: CompileState,
}

impl Context for FilePass<'_> {
    fn eval_int(&mut self, expr: &Spanned<Expr<'_>>) -> Int {
        self.eval_int(expr)
    }

    fn reporter(&self) -> &Reporter {
        &self.reporter
    }
}

impl FilePass<'_> {
    pub(crate) fn qualify(&self, name: &str) -> String {
        self.c
            .symbols
            .qualify(name, self.state.file, self.state.local)
    }

    /// The current file's name without directory or extension
    pub(crate) fn file_stem(&self) -> String {
        Path::new(&self.c.files[self.state.file])
            .file_stem()
            .map_or_else(|| "out".to_owned(), |s| s.to_string_lossy().into_owned())
    }

    pub(crate) fn compile_block(
        &mut self,
        block: &Block<'_>,
        kind: BlockKind,
        out: &mut Vec<Bytes>,
    ) -> Result<(), Fatal> {
        let outer = std::mem::replace(&mut self.state.block, kind);
        for stmt in &block.0 {
            if self.state.ended {
                break;
            }
            self.statement(stmt, out)?;
        }
        self.state.block = outer;
        Ok(())
    }

    fn statement(&mut self, stmt: &Spanned<Statement<'_>>, out: &mut Vec<Bytes>) -> Result<(), Fatal> {
        match &stmt.inner {
            Statement::Label(name) => {
                let here = Value::Int(self.state.here.clone());
                self.define(name, SymbolKind::Label, here);
            }
            Statement::Assignment { name, value } => {
                if self.state.block == BlockKind::Repeat {
                    self.definition_in_loop(name);
                } else {
                    let value = self.eval(value);
                    self.define(name, SymbolKind::Constant, value);
                }
            }
            Statement::Instruction(instr) => self.instruction(instr, stmt.range(), out)?,
        }
        Ok(())
    }

    fn definition_in_loop(&self, name: &Spanned<&str>) {
        self.reporter.error(
            ErrorCode::DefinitionInLoop,
            name.range(),
            format!("`{}` can't be defined inside a `.repeat` body", name.inner),
        );
    }

    /// Bind a label or constant in the current scope
    pub(crate) fn define(&mut self, name: &Spanned<&str>, kind: SymbolKind, value: Value) {
        if self.state.block == BlockKind::Repeat {
            self.definition_in_loop(name);
            return;
        }
        if name.inner == "." {
            self.reporter.error(
                ErrorCode::DuplicateSymbol,
                name.range(),
                "`.` always means the current address, and can't be redefined",
            );
            return;
        }
        let key = self.qualify(name.inner);
        let symbol = Symbol {
            kind,
            value,
            file: self.state.file,
            span: name.range(),
        };
        self.bind(key, symbol, name.inner);
        if kind == SymbolKind::Label && !is_local(name.inner) {
            self.close_local_scope();
            self.state.local += 1;
        }
    }

    /// Add a symbol to the table under `key`, reporting duplicates and retrying anything that
    /// was waiting for it
    pub(crate) fn bind(&mut self, key: String, symbol: Symbol, name: &str) {
        let span = symbol.span.clone();
        match self.c.symbols.define(key, symbol) {
            Err(prev) => {
                let mut diag = Diagnostic::new(
                    p11as_core::Severity::Error,
                    ErrorCode::DuplicateSymbol,
                    self.state.file,
                    span,
                    format!("`{name}` is already defined"),
                );
                if prev.file == self.state.file {
                    diag = diag.with_label(prev.span.clone(), "first defined here");
                }
                self.reporter.push(diag);
            }
            Ok(def) => {
                if !def.listeners.is_empty() {
                    log::trace!("retrying {} listener(s) of `{name}`", def.listeners.len());
                }
                for listener in def.listeners {
                    let _ = listener.simplify();
                }
                if let Some(pending) = def.mismatched {
                    self.c.log.reporter(pending.file).error(
                        ErrorCode::TypeMismatch,
                        pending.span,
                        format!("`{name}` is a string, but was used here as an integer"),
                    );
                }
            }
        }
    }

    pub(crate) fn close_local_scope(&mut self) {
        let prefix = format!("{}/{}/", self.state.file, self.state.local);
        let undefined = self.c.symbols.close(|key| key.starts_with(&prefix));
        if !undefined.is_empty() {
            log::trace!("closing local scope {prefix} with {} undefined", undefined.len());
        }
        self.c.report_undefined(undefined);
    }

    /// Whether the emit address is odd
    fn odd(&self) -> bool {
        // the link base is always even, so a polynomial's parity is that of its constant
        match self.state.here.simplify() {
            Int::Settled(v) => v & 1 == 1,
            Int::Poly(p) => p.constant() & 1 == 1,
            Int::Lazy(_) => false,
        }
    }

    /// Pad to an even address, warning if padding was needed
    pub(crate) fn align(&mut self, out: &mut Vec<Bytes>, span: Range<usize>) -> Result<(), Fatal> {
        if self.odd() {
            self.reporter.warning(
                ErrorCode::OddAddress,
                span.clone(),
                "word-aligned data at an odd address; a zero byte was inserted before it",
            );
            self.emit(out, Bytes::Settled(vec![0]), span)?;
        }
        Ok(())
    }

    /// Pad to an even or odd address without a warning
    pub(crate) fn pad_to_parity(
        &mut self,
        odd: bool,
        out: &mut Vec<Bytes>,
        span: Range<usize>,
    ) -> Result<(), Fatal> {
        if self.odd() != odd {
            self.emit(out, Bytes::Settled(vec![0]), span)?;
        }
        Ok(())
    }

    /// Append code to the output and advance the emit address past it
    pub(crate) fn emit(
        &mut self,
        out: &mut Vec<Bytes>,
        bytes: Bytes,
        span: Range<usize>,
    ) -> Result<(), Fatal> {
        let bytes = bytes.simplify();
        let Some(len) = bytes.len() else {
            return Err(self.reporter.critical(
                ErrorCode::UnresolvedSize,
                span,
                "the size of this statement depends on a value that isn't known yet",
            ));
        };
        let touched = self.c.symbols.take_touched();
        if !matches!(bytes, Bytes::Settled(_)) {
            for key in touched {
                self.c.symbols.listen(key, bytes.clone());
            }
        }
        self.state.here = self.state.here.clone() + i64::try_from(len).unwrap_or(i64::MAX);
        self.c.size = self.c.size.saturating_add(len);
        out.push(bytes);
        Ok(())
    }

    fn instruction(
        &mut self,
        instr: &Instruction<'_>,
        span: Range<usize>,
        out: &mut Vec<Bytes>,
    ) -> Result<(), Fatal> {
        self.c.symbols.take_touched();
        let name = instr.name.inner.to_ascii_lowercase();

        if let Some(op) = self.c.table.get(&name).copied() {
            if let Some(body) = &instr.body {
                self.reporter.error(
                    ErrorCode::WrongOperandCount,
                    body.range(),
                    format!("`{name}` does not take a body"),
                );
            }
            self.align(out, instr.name.range())?;
            let here = self.state.here.clone();
            self.state.operand_base = Some(here.clone() + 2);
            let bytes = encoder::encode(self, &op, instr, &here);
            self.state.operand_base = None;
            if let Some(bytes) = bytes {
                self.emit(out, bytes, span)?;
            }
            return Ok(());
        }

        let meta = if name.starts_with('.') {
            Some(name.clone())
        } else if is_metacommand(&format!(".{name}")) {
            self.reporter.warning(
                ErrorCode::MissingDot,
                instr.name.range(),
                format!("metacommands start with a dot; assuming `.{name}`"),
            );
            Some(format!(".{name}"))
        } else {
            None
        };
        if let Some(meta) = meta {
            if self.metacommand(&meta, instr, span, out)? {
                return Ok(());
            }
        }

        let key = self.qualify(instr.name.inner);
        let diag = if let Some(sym) = self.c.symbols.get(&key) {
            let what = match sym.kind {
                SymbolKind::Label => "a label",
                SymbolKind::Constant => "a constant",
            };
            (ErrorCode::NotCallable, format!("`{}` is {what}, not an instruction", instr.name.inner))
        } else {
            (ErrorCode::UnknownMnemonic, format!("unknown instruction `{}`", instr.name.inner))
        };
        self.reporter.error(diag.0, instr.name.range(), diag.1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Readiness;

    fn compile(src: &str) -> (Compiler, Result<FileId, Fatal>) {
        let block = p11as_ast::parse(src).unwrap();
        let mut c = Compiler::new(Options::default());
        let result = c.compile_file("test.s", &block);
        (c, result)
    }

    fn codes(c: &Compiler) -> Vec<ErrorCode> {
        c.diagnostics().iter().map(|d| d.code).collect()
    }

    #[test]
    fn emit_address_is_relative_to_link_base() {
        let (c, result) = compile("nop\nnop\n");
        assert_eq!(result, Ok(0));
        let Int::Poly(p) = c.here.clone() else {
            panic!("expected a polynomial");
        };
        assert_eq!((p.constant(), p.term_count()), (4, 1));
        assert_eq!(c.here.try_value(), Readiness::Pending);
    }

    #[test]
    fn labels_in_repeat_are_rejected() {
        let (c, _) = compile(".repeat 2 {\nx: nop\ny = 1\n}\n");
        assert_eq!(codes(&c), [ErrorCode::DefinitionInLoop; 4]);
    }

    #[test]
    fn missing_dot_and_unknown() {
        let (c, _) = compile("lbl: word 1\nfoo\nlbl\n");
        assert_eq!(
            codes(&c),
            [ErrorCode::MissingDot, ErrorCode::UnknownMnemonic, ErrorCode::NotCallable]
        );
    }

    #[test]
    fn odd_address_padding() {
        let (c, _) = compile(".byte 1\nnop\n");
        assert_eq!(codes(&c), [ErrorCode::OddAddress]);
        let Int::Poly(p) = c.here.clone() else {
            panic!("expected a polynomial");
        };
        assert_eq!(p.constant(), 4);
    }

    #[test]
    fn local_scopes_close_at_labels() {
        let (c, _) = compile("a: br 1$\nb: 1$: nop\n");
        let diags = c.diagnostics();
        assert_eq!(codes(&c), [ErrorCode::UndefinedSymbol]);
        assert_eq!(diags[0].span(), 6..8);
    }

    #[test]
    fn forward_references_are_checked_when_bound() {
        let (c, _) = compile("br far\n.blkw 200\nfar: nop\n");
        assert_eq!(codes(&c), [ErrorCode::ValueOutOfBounds]);
        let (c, _) = compile(".word x\nx = 200000\n");
        assert_eq!(codes(&c), [ErrorCode::ValueOutOfBounds]);
    }

    #[test]
    fn forward_references_settle_when_bound() {
        let (c, result) = compile("tst far\nfar: nop\n");
        assert_eq!(result, Ok(0));
        assert!(codes(&c).is_empty());
        assert!(matches!(c.code[0].try_value(), Readiness::Ready(_)));
    }

    #[test]
    fn undefined_at_end_of_file() {
        let (c, _) = compile("tst nowhere\n");
        assert_eq!(codes(&c), [ErrorCode::UndefinedSymbol]);
    }
}
