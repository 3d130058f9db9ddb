// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

use p11as::asm::assemble_files;
use p11as::prelude::*;
use std::fs::read_to_string;
use std::path::Path;

fn assemble_example(name: &str) -> Assembly {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("asm_examples")
        .join(format!("{name}.s"));
    let src = read_to_string(&path).unwrap();
    let file_name = format!("{name}.s");
    assemble_files(&[(&file_name, &src)], Options::default()).unwrap()
}

fn words(code: &[u8]) -> Vec<u16> {
    code.chunks(2)
        .map(|w| u16::from_le_bytes([w[0], w.get(1).copied().unwrap_or(0)]))
        .collect()
}

#[test]
fn hello() {
    let assembly = assemble_example("hello");
    assert!(assembly.diagnostics.is_empty(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.base, 0o1000);
    // mov #msg, r1 with msg at 0o1026
    assert_eq!(words(&assembly.code[..4]), [0o012701, 0o1026]);
    assert!(assembly.code.ends_with(b"Hello, world!\n\0"));

    assert_eq!(assembly.outputs.len(), 1);
    let output = &assembly.outputs[0];
    assert_eq!(output.path, "hello.bin");
    assert_eq!(output.contents[..4], [0, 2, 37, 0]);
    assert_eq!(output.contents[4..], assembly.code);
}

#[test]
fn odd_numbers() {
    let assembly = assemble_example("odd_numbers");
    let code = &assembly.code;
    assert_eq!(words(&code[..16]), [1, 3, 5, 7, 9, 11, 13, 15]);
    // count, then .even padding
    assert_eq!(code[16..18], [8, 0]);
    // "ODD" packed as RADIX-50
    assert_eq!(words(&code[18..]), [15 * 1600 + 4 * 40 + 4]);
}

#[test]
fn sum() {
    let assembly = assemble_example("sum");
    assert_eq!(
        words(&assembly.code),
        [
            0o005000, // clr r0
            0o012701, 0o1020, // mov #table, r1
            0o012702, 5, // mov #n, r2
            0o062100, // add (r1)+, r0
            0o077202, // sob r2, 1$
            0o000000, // halt
            1, 2, 3, 4, 5,
        ]
    );
}
