// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

use p11as::asm::{GeneralAsmError, assemble, assemble_files};
use p11as::prelude::*;

fn warnings(src: &str) -> Vec<ErrorCode> {
    let assembly = assemble_files(&[("test.s", src)], Options::default()).unwrap();
    assembly.diagnostics.iter().map(|d| d.code).collect()
}

fn failure(src: &str) -> Vec<Diagnostic> {
    match assemble(src) {
        Err(GeneralAsmError::Assemble(failure)) => failure.diagnostics,
        other => panic!("expected {src:?} to fail, got {other:?}"),
    }
}

fn failure_codes(src: &str) -> Vec<ErrorCode> {
    failure(src)
        .into_iter()
        .filter(Diagnostic::is_failure)
        .map(|d| d.code)
        .collect()
}

macro_rules! same_code {
    ($a: expr, $b: expr) => {{
        let (a, b) = ($a, $b);
        assert_eq!(assemble(a).unwrap(), assemble(b).unwrap(), "{a:?} vs {b:?}");
    }};
}

#[test]
fn forward_references_match_backward_ones() {
    same_code!("tst lbl\nhalt\nlbl = 1234", "lbl = 1234\ntst lbl\nhalt");
    same_code!("mov #lbl, r0\nlbl: halt", "mov #1004, r0\nhalt");
    same_code!("jmp @#fin\nnop\nfin: halt", "jmp @#1006\nnop\nhalt");
    same_code!("x = y + 1\ny = 2\n.word x", ".word 3");
}

#[test]
fn repeat_matches_literal_copies() {
    let literal = "tst #1\n".repeat(8);
    same_code!(".repeat 10 { tst #1 }", literal.as_str());
    same_code!("n = 3\n.repeat n { .byte 1, 2 }", ".byte 1, 2, 1, 2, 1, 2");
}

#[test]
fn branch_to_dot_matches_branch_to_label() {
    same_code!("br .+4\nnop\nnop", "br lbl\nnop\nnop\nlbl:");
    assert_eq!(&assemble("br .+4\nnop\nnop").unwrap()[..2], [2, 1]);
    // `.` in an operand is the address after the opcode word
    same_code!("lbl: nop\nbr lbl", "nop\nbr .-4");
}

#[test]
fn odd_addresses_are_padded() {
    assert_eq!(assemble(".byte 1\n.word 2").unwrap(), [1, 0, 2, 0]);
    assert_eq!(warnings(".byte 1\n.word 2"), [ErrorCode::OddAddress]);
    assert_eq!(
        assemble(".byte 1, 2, 3\n.dword 0x12345678").unwrap(),
        [1, 2, 3, 0, 0x34, 0x12, 0x78, 0x56]
    );
    assert!(warnings(".byte 1\n.even\n.word 2").is_empty());
}

#[test]
fn duplicate_symbols_always_fail() {
    assert_eq!(failure_codes("a: nop\na: nop"), [ErrorCode::DuplicateSymbol]);
    assert_eq!(failure_codes("a = 1\na = 1"), [ErrorCode::DuplicateSymbol]);
    assert_eq!(failure_codes("a = 0\nnop\na: nop"), [ErrorCode::DuplicateSymbol]);
    // the second definition points back at the first
    let diag = &failure("a: nop\na: nop")[0];
    assert_eq!(diag.labels.len(), 2);
    assert_eq!(diag.span(), 7..8);
}

#[test]
fn local_labels_are_scoped() {
    // each non-local label opens a new scope for `1$`
    same_code!(
        "a: 1$: br 1$\nb: 1$: br 1$",
        "a: br a\nb: br b"
    );
    assert_eq!(failure_codes("a: br 1$\nb: 1$: nop"), [ErrorCode::UndefinedSymbol]);
}

#[test]
fn assembling_is_deterministic() {
    let src = "start: mov #msg, r0\n.repeat 4 { tst (r0)+ }\nbr start\nmsg: .ascii \"abc\"";
    assert_eq!(assemble(src).unwrap(), assemble(src).unwrap());
}

#[test]
fn immediate_range() {
    assert_eq!(assemble("emt 0").unwrap(), [0, 0o210]);
    assert_eq!(assemble("emt 377").unwrap(), [0o377, 0o210]);
    assert_eq!(failure_codes("emt 400"), [ErrorCode::ValueOutOfBounds]);
    assert_eq!(failure_codes("emt -1"), [ErrorCode::ValueOutOfBounds]);
}

#[test]
fn errors_are_collected() {
    assert_eq!(
        failure_codes("foo r0\nmov r0\n.word 1/0\nlbl: .repeat 1 { x = 1 }"),
        [
            ErrorCode::UnknownMnemonic,
            ErrorCode::WrongOperandCount,
            ErrorCode::DivisionByZero,
            ErrorCode::DefinitionInLoop
        ]
    );
}

#[test]
fn critical_errors_stop_immediately() {
    let diags = failure(".link 2000\n.link 2000\nfoo");
    assert_eq!(diags.len(), 1);
    assert_eq!((diags[0].severity, diags[0].code), (Severity::Critical, ErrorCode::AddressConflict));
    assert_eq!(failure_codes(".blkb n\nn = 1"), [ErrorCode::NotConstant]);
}

#[test]
fn circular_definitions_fail_at_link() {
    assert_eq!(failure_codes("a = b\nb = a\n.word a"), [ErrorCode::NotConstant]);
}
