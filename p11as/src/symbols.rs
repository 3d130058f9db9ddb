// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Scoped symbol table
//!
//! Symbols live in one of three scopes, told apart by a prefix on the lowercased name:
//!
//! | scope    | names        | key               | lifetime                       |
//! |----------|--------------|-------------------|--------------------------------|
//! | local    | `1$`, `20$`  | `file/scope/name` | until the next non-local label |
//! | internal | anything else| `file:name`       | one source file                |
//! | extern   | `.extern`ed  | `name`            | the whole program              |
//!
//! Looking up a name that isn't defined yet hands out a promise that is settled once the
//! definition shows up. If the scope closes first, the name is reported as undefined.

use crate::deferred::{Bytes, Int, Lazy, Value};
use p11as_core::FileId;

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::rc::Rc;

/// What introduced a symbol
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SymbolKind {
    /// `name:`
    Label,
    /// `name = value`
    Constant,
}

/// A defined symbol
#[derive(Debug, Clone)]
pub struct Symbol {
    /// What introduced it
    pub kind: SymbolKind,
    /// The value it's bound to
    pub value: Value,
    /// The file it was defined in
    pub file: FileId,
    /// Where it was defined
    pub span: Range<usize>,
}

/// A use of a symbol that wasn't defined yet
#[derive(Debug)]
pub(crate) struct Pending {
    pub(crate) slot: Rc<Lazy<Int>>,
    pub(crate) file: FileId,
    pub(crate) span: Range<usize>,
}

/// Whether a name is a local label, like `10$`
#[must_use]
pub fn is_local(name: &str) -> bool {
    name.strip_suffix('$')
        .is_some_and(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
}

/// Everything the compiler needs when a symbol gets defined
#[derive(Debug, Default)]
pub(crate) struct Definition {
    /// Emitted code that referred to the symbol before it was defined
    pub(crate) listeners: Vec<Bytes>,
    /// The forward reference that was waiting for the symbol, if its value was the wrong type
    pub(crate) mismatched: Option<Pending>,
}

#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    defined: HashMap<String, Symbol>,
    forward: HashMap<String, Pending>,
    listeners: HashMap<String, Vec<Bytes>>,
    externs: HashMap<FileId, HashSet<String>>,
    touched: Vec<String>,
}

impl SymbolTable {
    /// The key a name written in `file`, in local scope number `local`, is stored under
    pub(crate) fn qualify(&self, name: &str, file: FileId, local: usize) -> String {
        let name = name.to_ascii_lowercase();
        if is_local(&name) {
            format!("{file}/{local}/{name}")
        } else if self.externs.get(&file).is_some_and(|set| set.contains(&name)) {
            name
        } else {
            format!("{file}:{name}")
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Symbol> {
        self.defined.get(key)
    }

    /// The value of a symbol, or a promise for it if it isn't defined yet
    pub(crate) fn lookup(&mut self, key: &str, file: FileId, span: Range<usize>) -> Value {
        if let Some(sym) = self.defined.get(key) {
            return sym.value.clone();
        }
        let pending = self
            .forward
            .entry(key.to_owned())
            .or_insert_with(|| Pending {
                slot: Lazy::promise(key),
                file,
                span,
            });
        self.touched.push(key.to_owned());
        Value::Int(Int::Lazy(Rc::clone(&pending.slot)))
    }

    /// Names of forward references handed out since the last call
    pub(crate) fn take_touched(&mut self) -> Vec<String> {
        std::mem::take(&mut self.touched)
    }

    /// Have `bytes` retried when `key` is defined
    pub(crate) fn listen(&mut self, key: String, bytes: Bytes) {
        self.listeners.entry(key).or_default().push(bytes);
    }

    /// Bind a symbol
    ///
    /// # Errors
    ///
    /// If the key is already bound, the existing symbol is returned.
    pub(crate) fn define(&mut self, key: String, symbol: Symbol) -> Result<Definition, &Symbol> {
        if self.defined.contains_key(&key) {
            return Err(&self.defined[&key]);
        }
        let mut def = Definition {
            listeners: self.listeners.remove(&key).unwrap_or_default(),
            mismatched: None,
        };
        if let Some(pending) = self.forward.remove(&key) {
            let int = match &symbol.value {
                Value::Int(int) => int.clone(),
                Value::Bytes(_) => Int::Settled(0),
            };
            // the promise was created by this table and is removed from `forward` when settled
            let _ = pending.slot.settle(int);
            if matches!(symbol.value, Value::Bytes(_)) {
                def.mismatched = Some(pending);
            }
        }
        log::trace!("defined {key}, retrying {} listener(s)", def.listeners.len());
        self.defined.insert(key, symbol);
        Ok(def)
    }

    /// Mark `name` as shared between files for everything `file` does from now on
    ///
    /// A forward reference to the file's internal version of the name is redirected to the
    /// shared one. If the file already defined the name internally, that definition is returned
    /// so it can be exported.
    pub(crate) fn declare_extern(&mut self, name: &str, file: FileId) -> Option<Symbol> {
        let name = name.to_ascii_lowercase();
        let internal = format!("{file}:{name}");
        self.externs.entry(file).or_default().insert(name.clone());
        if let Some(sym) = self.defined.get(&internal) {
            return Some(sym.clone());
        }
        if let Some(pending) = self.forward.remove(&internal) {
            let shared = match self.lookup(&name, pending.file, pending.span.clone()) {
                Value::Int(int) => int,
                Value::Bytes(_) => Int::Settled(0),
            };
            let _ = pending.slot.settle(shared);
            if let Some(listeners) = self.listeners.remove(&internal) {
                self.listeners.entry(name).or_default().extend(listeners);
            }
        }
        None
    }

    /// Close every scope whose keys start with `prefix`, returning the references that were
    /// never satisfied
    ///
    /// Each unsatisfied promise is settled to `0` so anything depending on it can still finish.
    pub(crate) fn close(&mut self, prefix: impl Fn(&str) -> bool) -> Vec<(String, Pending)> {
        let keys: Vec<String> = self.forward.keys().filter(|k| prefix(k)).cloned().collect();
        let mut undefined: Vec<(String, Pending)> = keys
            .into_iter()
            .filter_map(|k| self.forward.remove_entry(&k))
            .collect();
        undefined.sort_by_key(|(_, p)| (p.file, p.span.start));
        for (key, pending) in &undefined {
            let _ = pending.slot.settle(Int::Settled(0));
            self.listeners.remove(key);
        }
        undefined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::{Deferred, Readiness};

    fn label(value: i64) -> Symbol {
        Symbol {
            kind: SymbolKind::Label,
            value: Value::Int(Int::Settled(value)),
            file: 0,
            span: 0..1,
        }
    }

    fn int(v: Value) -> Int {
        match v {
            Value::Int(i) => i,
            Value::Bytes(_) => panic!("expected an integer"),
        }
    }

    #[test]
    fn qualification() {
        let mut table = SymbolTable::default();
        assert_eq!(table.qualify("Start", 0, 0), "0:start");
        assert_eq!(table.qualify("10$", 1, 4), "1/4/10$");
        assert_eq!(table.qualify("$x", 1, 4), "1:$x");
        table.declare_extern("PUTC", 1);
        assert_eq!(table.qualify("putc", 1, 0), "putc");
        assert_eq!(table.qualify("putc", 2, 0), "2:putc");
    }

    #[test]
    fn forward_reference_settles() {
        let mut table = SymbolTable::default();
        let fwd = int(table.lookup("0:x", 0, 3..4));
        assert_eq!(table.take_touched(), ["0:x"]);
        assert_eq!(fwd.try_value(), Readiness::Pending);
        table.define("0:x".into(), label(0o1234)).unwrap();
        assert_eq!(fwd.try_value(), Readiness::Ready(0o1234));
        assert!(table.take_touched().is_empty());
        assert!(matches!(table.lookup("0:x", 0, 5..6), Value::Int(Int::Settled(0o1234))));
    }

    #[test]
    fn duplicate_definition() {
        let mut table = SymbolTable::default();
        table.define("0:x".into(), label(1)).unwrap();
        let prev = table.define("0:x".into(), label(1)).unwrap_err();
        assert_eq!(prev.span, 0..1);
    }

    #[test]
    fn closing_reports_and_zeroes() {
        let mut table = SymbolTable::default();
        let a = int(table.lookup("0/0/1$", 0, 7..9));
        let b = int(table.lookup("0:b", 0, 2..3));
        let closed = table.close(|k| k.starts_with("0/0/"));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].1.span, 7..9);
        assert_eq!(a.try_value(), Readiness::Ready(0));
        assert_eq!(b.try_value(), Readiness::Pending);
    }

    #[test]
    fn extern_redirects_forward_reference() {
        let mut table = SymbolTable::default();
        let early = int(table.lookup("0:putc", 0, 0..4));
        assert!(table.declare_extern("putc", 0).is_none());
        table.define("putc".into(), label(0o2000)).unwrap();
        assert_eq!(early.try_value(), Readiness::Ready(0o2000));
    }
}
