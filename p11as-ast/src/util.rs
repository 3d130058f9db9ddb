// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD
//! Small utility functions for making it less painful to build an AST by hand

use super::prelude::*;
use std::ops::Range;

#[inline]
/// Wrap a `T` into a [`Spanned<T>`] with the provided range
pub fn span<T>(inner: T, range: Range<usize>) -> Spanned<T> {
    Spanned {
        inner,
        span: SimpleSpan::from(range),
    }
}

#[inline]
/// Move `inner` into a [`Box`]
pub fn boxed<T>(inner: T) -> Box<T> {
    Box::new(inner)
}
