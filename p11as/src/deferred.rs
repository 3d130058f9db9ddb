// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Lazily-computed values for single-pass assembly
//!
//! Code is generated top to bottom, so a branch to a label further down is encoded before that
//! label's address exists, and every address depends on the link base, which may never be set
//! until link time. Such values are built as a graph of nodes that become known over time:
//!
//! * a [`Lazy`] promise is filled in exactly once from outside, via [`Lazy::settle`];
//! * a [`Lazy`] computation runs a closure on demand, and remembers the result once it succeeds;
//! * an [`Int::Poly`] is a sum of integer nodes with integer coefficients, so that address
//!   arithmetic like `label - .` cancels out the unknown link base without waiting for it;
//! * a [`Bytes::Concat`] is a sequence of byte chunks whose length can be known long before its
//!   contents are.
//!
//! Reading a node that isn't known yet is not an error: it yields [`Readiness::Pending`], and the
//! caller tries again later.
//!
//! ```
//! use p11as::deferred::{Deferred, Int, Lazy, Readiness};
//!
//! let base = Lazy::<Int>::promise("base");
//! let here = Int::Lazy(base.clone()) + 4;
//! let there = Int::Lazy(base.clone()) + 10;
//!
//! // the distance is known even though neither address is
//! assert!(matches!((there.clone() - here).simplify(), Int::Settled(6)));
//! assert!(matches!(there.try_value(), Readiness::Pending));
//!
//! base.settle(Int::Settled(0o1000)).unwrap();
//! assert!(matches!(there.try_value(), Readiness::Ready(0o1012)));
//! ```

use std::cell::{Cell, OnceCell};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::ops::{Add, Mul, Neg, Sub};
use std::rc::Rc;

/// The result of trying to read a value that may not be known yet
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Readiness<T> {
    /// The value is known
    Ready(T),
    /// Something the value depends on is not known yet
    Pending,
}

impl<T> Readiness<T> {
    /// Map the value, if ready
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Readiness<U> {
        match self {
            Readiness::Ready(v) => Readiness::Ready(f(v)),
            Readiness::Pending => Readiness::Pending,
        }
    }

    /// Convert into an [`Option`]
    pub fn ready(self) -> Option<T> {
        match self {
            Readiness::Ready(v) => Some(v),
            Readiness::Pending => None,
        }
    }
}

/// Unwrap a [`Readiness::Ready`], or return [`Readiness::Pending`] from the enclosing function
#[macro_export]
macro_rules! ready {
    ($e: expr) => {
        match $e {
            $crate::deferred::Readiness::Ready(v) => v,
            $crate::deferred::Readiness::Pending => return $crate::deferred::Readiness::Pending,
        }
    };
}

/// A value was read at a point where everything should have been known, but wasn't
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Unready;

impl Display for Unready {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value depends on something that was never settled")
    }
}

impl Error for Unready {}

/// A promise was settled a second time
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AlreadySettled(pub String);

impl Display for AlreadySettled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise {:?} was already settled", self.0)
    }
}

impl Error for AlreadySettled {}

/// Common interface of the deferred value types, [`Int`] and [`Bytes`]
pub trait Deferred: Clone + 'static {
    /// The plain value type
    type Value: Clone;

    /// Try to compute the plain value, without failing if it's not known yet
    fn try_value(&self) -> Readiness<Self::Value>;

    /// Rewrite the node into an equivalent one, folding in everything that is known so far
    #[must_use]
    fn simplify(&self) -> Self;

    /// Compute the plain value, failing if anything it depends on is still unknown
    ///
    /// # Errors
    ///
    /// Returns [`Unready`] if the value is still [pending](Readiness::Pending).
    fn resolve(&self) -> Result<Self::Value, Unready> {
        self.try_value().ready().ok_or(Unready)
    }
}

enum Source<D> {
    Promise,
    Computation {
        len: Option<usize>,
        compute: Box<dyn Fn() -> Readiness<D>>,
    },
}

/// A node whose value is filled in later, either from outside or by running a closure
///
/// Once a node's underlying value is known, it is remembered, so the closure of a computation
/// succeeds at most once.
pub struct Lazy<D: Deferred> {
    name: String,
    source: Source<D>,
    inner: OnceCell<D>,
    value: OnceCell<D::Value>,
    busy: Cell<bool>,
}

impl<D: Deferred> Debug for Lazy<D>
where
    D::Value: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.source {
            Source::Promise => "Promise",
            Source::Computation { .. } => "Computation",
        };
        f.debug_struct(kind)
            .field("name", &self.name)
            .field("value", &self.value.get())
            .finish_non_exhaustive()
    }
}

impl<D: Deferred> Lazy<D> {
    fn with_source(name: impl Into<String>, source: Source<D>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            source,
            inner: OnceCell::new(),
            value: OnceCell::new(),
            busy: Cell::new(false),
        })
    }

    /// A node that is settled from outside
    pub fn promise(name: impl Into<String>) -> Rc<Self> {
        Self::with_source(name, Source::Promise)
    }

    /// A node computed on demand by `compute`
    pub fn computation(
        name: impl Into<String>,
        compute: impl Fn() -> Readiness<D> + 'static,
    ) -> Rc<Self> {
        Self::with_source(
            name,
            Source::Computation {
                len: None,
                compute: Box::new(compute),
            },
        )
    }

    /// A computation whose result is known in advance to be `len` bytes long
    pub fn sized(
        name: impl Into<String>,
        len: usize,
        compute: impl Fn() -> Readiness<D> + 'static,
    ) -> Rc<Self> {
        Self::with_source(
            name,
            Source::Computation {
                len: Some(len),
                compute: Box::new(compute),
            },
        )
    }

    /// The name given to the node when it was created
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a promise that has been settled
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self.source, Source::Promise) && self.inner.get().is_some()
    }

    /// Settle a promise
    ///
    /// # Errors
    ///
    /// Settling a promise twice, or settling a computation at all, returns [`AlreadySettled`] and
    /// leaves the node unchanged.
    pub fn settle(&self, value: D) -> Result<(), AlreadySettled> {
        match self.source {
            Source::Promise => self
                .inner
                .set(value)
                .map_err(|_| AlreadySettled(self.name.clone())),
            Source::Computation { .. } => Err(AlreadySettled(self.name.clone())),
        }
    }

    /// Run `f` unless this node is already being evaluated further up the stack
    fn guarded<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if self.busy.replace(true) {
            return None;
        }
        let r = f();
        self.busy.set(false);
        Some(r)
    }

    /// The deferred value this node stands for, if known: the settled value of a promise, or
    /// the result of a computation
    fn inner(&self) -> Option<D> {
        if let Some(d) = self.inner.get() {
            return Some(d.clone());
        }
        match &self.source {
            Source::Promise => None,
            Source::Computation { compute, .. } => match compute() {
                Readiness::Ready(d) => Some(self.inner.get_or_init(|| d).clone()),
                Readiness::Pending => None,
            },
        }
    }

    /// Try to compute the plain value
    pub fn try_value(&self) -> Readiness<D::Value> {
        if let Some(v) = self.value.get() {
            return Readiness::Ready(v.clone());
        }
        let result = self
            .guarded(|| match self.inner() {
                Some(d) => d.try_value(),
                None => Readiness::Pending,
            })
            .unwrap_or(Readiness::Pending);
        if let Readiness::Ready(v) = &result {
            let _ = self.value.set(v.clone());
        }
        result
    }

    fn simplified_inner(&self) -> Option<D> {
        self.guarded(|| self.inner().map(|d| d.simplify()))
            .flatten()
    }
}

/// A deferred integer
#[derive(Clone, Debug)]
pub enum Int {
    /// A known integer
    Settled(i64),
    /// A promise or computation
    Lazy(Rc<Lazy<Int>>),
    /// A linear combination of other nodes
    Poly(Rc<Polynomial>),
}

/// `Σ cᵢ·xᵢ + k`, where each `xᵢ` is a distinct [`Lazy`] node
///
/// Terms are keyed by node identity, not by structure: two separate unknowns stay separate
/// variables even if they'd eventually compute the same thing. Zero coefficients are never
/// stored.
#[derive(Clone, Debug, Default)]
pub struct Polynomial {
    terms: BTreeMap<usize, (Rc<Lazy<Int>>, i64)>,
    constant: i64,
}

impl Polynomial {
    /// The constant term
    #[must_use]
    pub fn constant(&self) -> i64 {
        self.constant
    }

    /// The number of variable terms
    #[must_use]
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn add_term(&mut self, var: &Rc<Lazy<Int>>, coeff: i64) {
        use std::collections::btree_map::Entry;
        match self.terms.entry(Rc::as_ptr(var).addr()) {
            Entry::Vacant(e) => {
                if coeff != 0 {
                    e.insert((Rc::clone(var), coeff));
                }
            }
            Entry::Occupied(mut e) => {
                let sum = e.get().1.wrapping_add(coeff);
                if sum == 0 {
                    e.remove();
                } else {
                    e.get_mut().1 = sum;
                }
            }
        }
    }

    fn into_int(self) -> Int {
        if self.terms.is_empty() {
            return Int::Settled(self.constant);
        }
        if self.constant == 0 && self.terms.len() == 1 {
            if let Some((var, 1)) = self.terms.values().next() {
                return Int::Lazy(Rc::clone(var));
            }
        }
        Int::Poly(Rc::new(self))
    }
}

impl Int {
    /// A computation producing an integer
    pub fn computation(
        name: impl Into<String>,
        compute: impl Fn() -> Readiness<i64> + 'static,
    ) -> Self {
        Int::Lazy(Lazy::computation(name, move || compute().map(Int::Settled)))
    }

    /// Combine two integers with an arbitrary function
    ///
    /// If both are already known, `f` runs immediately; otherwise a computation is built that runs
    /// it once both are.
    pub fn zip_with(
        name: impl Into<String>,
        a: Int,
        b: Int,
        f: impl Fn(i64, i64) -> i64 + 'static,
    ) -> Self {
        match (a.simplify(), b.simplify()) {
            (Int::Settled(x), Int::Settled(y)) => Int::Settled(f(x, y)),
            (a, b) => Int::computation(name, move || {
                let x = ready!(a.try_value());
                let y = ready!(b.try_value());
                Readiness::Ready(f(x, y))
            }),
        }
    }

    /// Apply an arbitrary function once the integer is known
    pub fn map(self, name: impl Into<String>, f: impl Fn(i64) -> i64 + 'static) -> Self {
        match self.simplify() {
            Int::Settled(x) => Int::Settled(f(x)),
            a => Int::computation(name, move || a.try_value().map(&f)),
        }
    }

    fn accumulate(&self, poly: &mut Polynomial, scale: i64) {
        match self {
            Int::Settled(v) => poly.constant = poly.constant.wrapping_add(v.wrapping_mul(scale)),
            Int::Lazy(var) => poly.add_term(var, scale),
            Int::Poly(p) => {
                poly.constant = poly.constant.wrapping_add(p.constant.wrapping_mul(scale));
                for (var, coeff) in p.terms.values() {
                    poly.add_term(var, coeff.wrapping_mul(scale));
                }
            }
        }
    }

    fn linear(parts: &[(&Int, i64)], constant: i64) -> Self {
        let mut poly = Polynomial {
            constant,
            ..Polynomial::default()
        };
        for (part, scale) in parts {
            part.accumulate(&mut poly, *scale);
        }
        poly.into_int()
    }

    /// The value if it's already [settled](Int::Settled), without evaluating anything
    #[must_use]
    pub fn known(&self) -> Option<i64> {
        match self {
            Int::Settled(v) => Some(*v),
            _ => None,
        }
    }
}

impl Deferred for Int {
    type Value = i64;

    fn try_value(&self) -> Readiness<i64> {
        match self {
            Int::Settled(v) => Readiness::Ready(*v),
            Int::Lazy(node) => node.try_value(),
            Int::Poly(_) => match self.simplify() {
                Int::Settled(v) => Readiness::Ready(v),
                _ => Readiness::Pending,
            },
        }
    }

    fn simplify(&self) -> Self {
        match self {
            Int::Settled(_) => self.clone(),
            Int::Lazy(node) => match node.try_value() {
                Readiness::Ready(v) => Int::Settled(v),
                Readiness::Pending => node.simplified_inner().unwrap_or_else(|| self.clone()),
            },
            Int::Poly(p) => {
                let mut out = Polynomial {
                    constant: p.constant,
                    ..Polynomial::default()
                };
                for (var, coeff) in p.terms.values() {
                    Int::Lazy(Rc::clone(var)).simplify().accumulate(&mut out, *coeff);
                }
                out.into_int()
            }
        }
    }
}

impl From<i64> for Int {
    fn from(v: i64) -> Self {
        Int::Settled(v)
    }
}

impl Add for Int {
    type Output = Int;
    fn add(self, rhs: Int) -> Int {
        Int::linear(&[(&self, 1), (&rhs, 1)], 0)
    }
}

impl Sub for Int {
    type Output = Int;
    fn sub(self, rhs: Int) -> Int {
        Int::linear(&[(&self, 1), (&rhs, -1)], 0)
    }
}

impl Add<i64> for Int {
    type Output = Int;
    fn add(self, rhs: i64) -> Int {
        Int::linear(&[(&self, 1)], rhs)
    }
}

impl Sub<i64> for Int {
    type Output = Int;
    fn sub(self, rhs: i64) -> Int {
        Int::linear(&[(&self, 1)], rhs.wrapping_neg())
    }
}

impl Mul<i64> for Int {
    type Output = Int;
    fn mul(self, rhs: i64) -> Int {
        Int::linear(&[(&self, rhs)], 0)
    }
}

impl Neg for Int {
    type Output = Int;
    fn neg(self) -> Int {
        self * -1
    }
}

/// A deferred byte sequence
#[derive(Clone, Debug)]
pub enum Bytes {
    /// Known bytes
    Settled(Vec<u8>),
    /// A promise or computation
    Lazy(Rc<Lazy<Bytes>>),
    /// A sequence of chunks
    ///
    /// Never nested, never holding two adjacent [settled](Bytes::Settled) chunks, and never
    /// holding an empty settled chunk.
    Concat(Rc<[Bytes]>),
}

impl Bytes {
    /// An empty sequence
    #[must_use]
    pub fn empty() -> Self {
        Bytes::Settled(Vec::new())
    }

    /// A computation known in advance to produce `len` bytes
    pub fn sized(
        name: impl Into<String>,
        len: usize,
        compute: impl Fn() -> Readiness<Vec<u8>> + 'static,
    ) -> Self {
        Bytes::Lazy(Lazy::sized(name, len, move || {
            compute().map(|v| {
                debug_assert_eq!(v.len(), len, "sized computation produced the wrong length");
                Bytes::Settled(v)
            })
        }))
    }

    /// A little-endian word, computed once `value` is known
    ///
    /// `check` sees the value first and returns the 16 bits to store.
    pub fn word(
        name: impl Into<String>,
        value: Int,
        check: impl Fn(i64) -> u16 + 'static,
    ) -> Self {
        match value.simplify() {
            Int::Settled(v) => Bytes::Settled(check(v).to_le_bytes().to_vec()),
            value => Bytes::sized(name, 2, move || {
                value.try_value().map(|v| check(v).to_le_bytes().to_vec())
            }),
        }
    }

    /// Concatenate chunks, merging adjacent known runs
    pub fn concat(parts: impl IntoIterator<Item = Bytes>) -> Self {
        let mut out: Vec<Bytes> = Vec::new();
        let mut push = |part: Bytes| match part {
            Bytes::Settled(v) if v.is_empty() => (),
            Bytes::Settled(v) => {
                if let Some(Bytes::Settled(last)) = out.last_mut() {
                    last.extend_from_slice(&v);
                } else {
                    out.push(Bytes::Settled(v));
                }
            }
            part => out.push(part),
        };
        for part in parts {
            match part {
                Bytes::Concat(inner) => inner.iter().cloned().for_each(&mut push),
                part => push(part),
            }
        }
        match out.len() {
            0 => Bytes::empty(),
            1 => out.pop().unwrap_or_else(Bytes::empty),
            _ => Bytes::Concat(out.into()),
        }
    }

    /// The length, if it can be known without evaluating anything
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Bytes::Settled(v) => Some(v.len()),
            Bytes::Lazy(node) => match node.source {
                Source::Computation { len: Some(len), .. } => Some(len),
                _ => node
                    .value
                    .get()
                    .map(Vec::len)
                    .or_else(|| node.inner.get().and_then(Bytes::len)),
            },
            Bytes::Concat(parts) => parts.iter().map(Bytes::len).sum(),
        }
    }

    /// Whether the sequence is known to be empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl Deferred for Bytes {
    type Value = Vec<u8>;

    fn try_value(&self) -> Readiness<Vec<u8>> {
        match self {
            Bytes::Settled(v) => Readiness::Ready(v.clone()),
            Bytes::Lazy(node) => node.try_value(),
            Bytes::Concat(parts) => {
                let mut out = Vec::new();
                for part in parts.iter() {
                    out.extend(ready!(part.try_value()));
                }
                Readiness::Ready(out)
            }
        }
    }

    fn simplify(&self) -> Self {
        match self {
            Bytes::Settled(_) => self.clone(),
            Bytes::Lazy(node) => match node.try_value() {
                Readiness::Ready(v) => Bytes::Settled(v),
                Readiness::Pending => node.simplified_inner().unwrap_or_else(|| self.clone()),
            },
            Bytes::Concat(parts) => Bytes::concat(parts.iter().map(Bytes::simplify)),
        }
    }
}

impl Add for Bytes {
    type Output = Bytes;
    fn add(self, rhs: Bytes) -> Bytes {
        Bytes::concat([self, rhs])
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Bytes::Settled(v)
    }
}

/// A deferred value of either type, as produced by evaluating an expression
#[derive(Clone, Debug)]
pub enum Value {
    /// An integer
    Int(Int),
    /// A byte string
    Bytes(Bytes),
}

impl Value {
    /// The name of the value's type, for diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Bytes(_) => "string",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn promise() -> Rc<Lazy<Int>> {
        Lazy::promise("x")
    }

    #[test]
    fn settle_once() {
        let p = promise();
        assert!(!p.is_settled());
        p.settle(Int::Settled(1)).unwrap();
        assert!(p.is_settled());
        assert_eq!(p.settle(Int::Settled(1)), Err(AlreadySettled("x".into())));
        assert_eq!(p.try_value(), Readiness::Ready(1));
    }

    #[test]
    fn polynomial_cancellation() {
        let base = promise();
        let a = Int::Lazy(base.clone()) + 10;
        let b = Int::Lazy(base.clone()) + 4;
        let diff = a.clone() - b;
        assert!(matches!(diff, Int::Settled(6)));
        assert_eq!(a.try_value(), Readiness::Pending);
        let doubled = a * 2;
        let Int::Poly(p) = &doubled else {
            panic!("expected a polynomial");
        };
        assert_eq!((p.constant(), p.term_count()), (20, 1));
    }

    #[test]
    fn distinct_unknowns_stay_distinct() {
        let (x, y) = (promise(), promise());
        let sum = Int::Lazy(x.clone()) + Int::Lazy(y.clone()) - Int::Lazy(x.clone());
        assert!(matches!(&sum, Int::Lazy(node) if Rc::ptr_eq(node, &y)));
    }

    #[test]
    fn substitution_through_promises() {
        let base = promise();
        let label = promise();
        let here = Int::Lazy(base.clone()) + 2;
        let offset = Int::Lazy(label.clone()) - here;
        assert_eq!(offset.try_value(), Readiness::Pending);
        label.settle(Int::Lazy(base.clone()) + 8).unwrap();
        assert!(matches!(offset.simplify(), Int::Settled(6)));
        assert_eq!(offset.try_value(), Readiness::Ready(6));
    }

    #[test]
    fn computation_memoized() {
        let calls = Rc::new(Cell::new(0));
        let p = promise();
        let node = {
            let calls = Rc::clone(&calls);
            let p = Int::Lazy(p.clone());
            Int::computation("double", move || {
                calls.set(calls.get() + 1);
                p.try_value().map(|v| v * 2)
            })
        };
        assert_eq!(node.try_value(), Readiness::Pending);
        p.settle(Int::Settled(21)).unwrap();
        assert_eq!(node.try_value(), Readiness::Ready(42));
        assert_eq!(node.try_value(), Readiness::Ready(42));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn cycles_stay_pending() {
        let p = promise();
        p.settle(Int::Lazy(p.clone()) + 1).unwrap();
        assert_eq!(Int::Lazy(p.clone()).try_value(), Readiness::Pending);
        assert_eq!(Int::Lazy(p).resolve(), Err(Unready));
    }

    #[test]
    fn zip_with_folds_known_values() {
        assert!(matches!(
            Int::zip_with("and", Int::Settled(0o17), Int::Settled(0o5), |a, b| a & b),
            Int::Settled(0o5)
        ));
        let p = promise();
        let masked = Int::zip_with("and", Int::Lazy(p.clone()), Int::Settled(0xff), |a, b| a & b);
        assert_eq!(masked.try_value(), Readiness::Pending);
        p.settle(Int::Settled(0x1234)).unwrap();
        assert_eq!(masked.try_value(), Readiness::Ready(0x34));
    }

    #[test]
    fn concat_merges_known_runs() {
        let joined = Bytes::from(vec![1, 2]) + Bytes::from(vec![]) + Bytes::from(vec![3]);
        assert!(matches!(&joined, Bytes::Settled(v) if v == &[1, 2, 3]));

        let p = promise();
        let word = Bytes::word("w", Int::Lazy(p.clone()), |v| v as u16);
        let seq = Bytes::concat([joined, word.clone(), Bytes::from(vec![4]), Bytes::from(vec![5])]);
        let Bytes::Concat(parts) = &seq else {
            panic!("expected a concatenation");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(seq.len(), Some(7));
        assert_eq!(seq.try_value(), Readiness::Pending);

        p.settle(Int::Settled(0x0102)).unwrap();
        assert_eq!(seq.resolve(), Ok(vec![1, 2, 3, 2, 1, 4, 5]));
        assert!(matches!(seq.simplify(), Bytes::Settled(_)));
    }

    #[test]
    fn resolve_is_idempotent() {
        let p = promise();
        let word = Bytes::word("w", Int::Lazy(p.clone()) + 1, |v| v as u16);
        p.settle(Int::Settled(0o777)).unwrap();
        assert_eq!(word.resolve(), word.resolve());
    }
}
