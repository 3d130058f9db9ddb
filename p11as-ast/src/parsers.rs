// SPDX-FileCopyrightText: 2025 - 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! The [chumsky] grammar for PDP-11 assembly source

use super::{BinOperator, Block, Expr, Instruction, Spanned, Statement, UnaryOperator};
use chumsky::prelude::*;

type Extra<'a> = extra::Err<Rich<'a, char>>;

fn spanned<T>(inner: T, span: SimpleSpan) -> Spanned<T> {
    Spanned { inner, span }
}

/// Spaces and tabs, but never a newline
fn inline_ws<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    one_of(" \t").repeated().ignored()
}

/// A `;` comment, up to but not including the end of the line
fn comment<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    just(';').then(none_of("\r\n").repeated()).ignored()
}

/// Any whitespace, including newlines, and comments
fn ws<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    choice((one_of(" \t\r\n").ignored(), comment()))
        .repeated()
        .ignored()
        .labelled("whitespace")
}

/// Symbol names, including local labels like `1$` and the lone `.`
pub fn ident<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    let local = text::digits(10).then(just('$')).to_slice();
    let normal = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || matches!(c, '_' | '.' | '$'))
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
                .repeated(),
        )
        .to_slice();
    choice((local, normal)).labelled("identifier")
}

/// Integer literals: octal by default, decimal with a trailing `.`, or `0x`/`0b` prefixed
fn number<'a>() -> impl Parser<'a, &'a str, i64, Extra<'a>> + Clone {
    fn radix_parse<'a>(
        s: &str,
        radix: u32,
        span: SimpleSpan,
    ) -> Result<i64, Rich<'a, char>> {
        i64::from_str_radix(s, radix)
            .map_err(|e| Rich::custom(span, format!("invalid base-{radix} literal: {e}")))
    }
    let hex = just("0x")
        .or(just("0X"))
        .ignore_then(text::digits(16).to_slice())
        .try_map(|s: &str, span| radix_parse(s, 16, span));
    let bin = just("0b")
        .or(just("0B"))
        .ignore_then(text::digits(2).to_slice())
        .try_map(|s: &str, span| radix_parse(s, 2, span));
    let plain = text::digits(10)
        .to_slice()
        .then(just('.').or_not())
        .try_map(|(s, dot): (&str, Option<char>), span| {
            radix_parse(s, if dot.is_some() { 10 } else { 8 }, span)
        });
    choice((hex, bin, plain)).labelled("number")
}

fn char_literal<'a>() -> impl Parser<'a, &'a str, u8, Extra<'a>> + Clone {
    just('\'')
        .ignore_then(any())
        .try_map(|c: char, span| {
            u8::try_from(c)
                .ok()
                .filter(u8::is_ascii)
                .ok_or_else(|| Rich::custom(span, "character literals must be ASCII"))
        })
        .labelled("character literal")
}

fn string_literal<'a>() -> impl Parser<'a, &'a str, Box<[u8]>, Extra<'a>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        just('0').to('\0'),
        just('\\'),
        just('"'),
        just('\''),
    )));
    none_of("\\\"\r\n")
        .or(escape)
        .repeated()
        .collect::<String>()
        .delimited_by(just('"'), just('"'))
        .map(|s| s.into_bytes().into_boxed_slice())
        .labelled("string literal")
}

fn binary_level<'a, P, O>(
    operand: P,
    ops: O,
) -> impl Parser<'a, &'a str, Spanned<Expr<'a>>, Extra<'a>> + Clone
where
    P: Parser<'a, &'a str, Spanned<Expr<'a>>, Extra<'a>> + Clone,
    O: Parser<'a, &'a str, BinOperator, Extra<'a>> + Clone,
{
    operand.clone().foldl(
        ops.map_with(|op, e| spanned(op, e.span()))
            .padded_by(inline_ws())
            .then(operand)
            .repeated(),
        |lhs, (op, rhs)| {
            let span = SimpleSpan::from(lhs.span.start..rhs.span.end);
            spanned(
                Expr::BinOp {
                    lhs: Box::new(lhs),
                    op,
                    rhs: Box::new(rhs),
                },
                span,
            )
        },
    )
}

/// A plain expression, with no operand syntax
pub fn expr<'a>() -> impl Parser<'a, &'a str, Spanned<Expr<'a>>, Extra<'a>> + Clone {
    recursive(|expr| {
        let atom = choice((
            ident().map(Expr::Ident),
            number().map(Expr::Number),
            char_literal().map(Expr::Char),
            string_literal().map(Expr::Str),
            expr.padded_by(inline_ws())
                .delimited_by(just('('), just(')'))
                .map(|e| Expr::Parenthesized(Box::new(e))),
        ))
        .map_with(|e, x| spanned(e, x.span()))
        .boxed();

        let unary_op = choice((
            just('-').to(UnaryOperator::Negate),
            just('+').to(UnaryOperator::Plus),
            just('~').to(UnaryOperator::Complement),
        ))
        .map_with(|op, x| spanned(op, x.span()))
        .then_ignore(inline_ws());

        let unary = unary_op
            .repeated()
            .foldr(atom, |op: Spanned<UnaryOperator>, e: Spanned<Expr<'a>>| {
                let span = SimpleSpan::from(op.span.start..e.span.end);
                spanned(Expr::Unary(op, Box::new(e)), span)
            })
            .boxed();

        let product = binary_level(
            unary,
            choice((
                just('*').to(BinOperator::Mul),
                just('/').to(BinOperator::Div),
                just('%').to(BinOperator::Rem),
            )),
        )
        .boxed();
        let sum = binary_level(
            product,
            choice((just('+').to(BinOperator::Add), just('-').to(BinOperator::Sub))),
        )
        .boxed();
        let shift = binary_level(
            sum,
            choice((just("<<").to(BinOperator::Shl), just(">>").to(BinOperator::Shr))),
        )
        .boxed();
        let and = binary_level(shift, just('&').to(BinOperator::And)).boxed();
        let xor = binary_level(and, just('^').to(BinOperator::Xor)).boxed();
        binary_level(xor, just('|').to(BinOperator::Or))
    })
    .labelled("expression")
}

/// An instruction operand: a plain expression, or one of the addressing-mode shapes
///
/// * `#e` - [`Expr::Immediate`]
/// * `@operand` - [`Expr::Deferred`]
/// * `e(e)` - [`Expr::Call`]
/// * `(e)+` - [`Expr::PostIncrement`]
pub fn operand<'a>() -> impl Parser<'a, &'a str, Spanned<Expr<'a>>, Extra<'a>> + Clone {
    recursive(|operand| {
        let base = expr()
            .padded_by(inline_ws())
            .delimited_by(just('('), just(')'))
            .map_with(|e, x| spanned(Expr::Parenthesized(Box::new(e)), x.span()));

        let direct = expr()
            .then(base.or_not())
            .then(just('+').or_not())
            .map_with(|((e, base), plus), x| {
                let e = match base {
                    Some(base) => spanned(
                        Expr::Call {
                            index: Box::new(e),
                            base: Box::new(base),
                        },
                        SimpleSpan::from(x.span().start..x.span().end - usize::from(plus.is_some())),
                    ),
                    None => e,
                };
                if plus.is_some() {
                    spanned(Expr::PostIncrement(Box::new(e)), x.span())
                } else {
                    e
                }
            });

        let immediate = just('#')
            .ignore_then(inline_ws())
            .ignore_then(expr())
            .map_with(|e, x| spanned(Expr::Immediate(Box::new(e)), x.span()));

        let deferred = just('@')
            .ignore_then(inline_ws())
            .ignore_then(operand)
            .map_with(|e, x| spanned(Expr::Deferred(Box::new(e)), x.span()));

        choice((immediate, deferred, direct))
    })
    .labelled("operand")
}

/// A block of statements, without the surrounding braces
pub fn block<'a>() -> impl Parser<'a, &'a str, Block<'a>, Extra<'a>> + Clone {
    recursive(|block| {
        let name = ident().map_with(|name, x| spanned(name, x.span()));

        let label = name
            .clone()
            .then_ignore(inline_ws())
            .then_ignore(just(':'))
            .map(Statement::Label);

        let assignment = name
            .clone()
            .then_ignore(just('=').padded_by(inline_ws()))
            .then(expr())
            .map(|(name, value)| Statement::Assignment { name, value });

        let body = block
            .padded_by(ws())
            .delimited_by(just('{'), just('}'))
            .map_with(|b, x| spanned(b, x.span()));

        let operands = operand()
            .separated_by(just(',').padded_by(inline_ws()))
            .collect::<Vec<_>>();

        let instruction = name
            .then(inline_ws().ignore_then(operands))
            .then(ws().ignore_then(body).or_not())
            .map(|((name, operands), body)| {
                Statement::Instruction(Instruction {
                    name,
                    operands,
                    body,
                })
            });

        ws().ignore_then(
            choice((label, assignment, instruction))
                .map_with(|s, x| spanned(s, x.span()))
                .then_ignore(inline_ws())
                .then_ignore(ws())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(Block)
    })
}

/// A whole source file
pub fn program<'a>() -> impl Parser<'a, &'a str, Block<'a>, Extra<'a>> {
    block().then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{boxed, span};

    fn parse_operand(s: &str) -> Expr<'_> {
        operand().then_ignore(end()).parse(s).into_result().unwrap().inner
    }

    fn parse_expr(s: &str) -> Expr<'_> {
        expr().then_ignore(end()).parse(s).into_result().unwrap().inner
    }

    #[test]
    fn number_radixes() {
        assert_eq!(parse_expr("10"), Expr::Number(8));
        assert_eq!(parse_expr("10."), Expr::Number(10));
        assert_eq!(parse_expr("0x1F"), Expr::Number(31));
        assert_eq!(parse_expr("0b101"), Expr::Number(5));
        assert!(expr().then_ignore(end()).parse("19").into_result().is_err());
    }

    #[test]
    fn local_labels_and_dot() {
        assert_eq!(parse_expr("1$"), Expr::Ident("1$"));
        assert_eq!(parse_expr("."), Expr::Ident("."));
        assert_eq!(parse_expr(".word"), Expr::Ident(".word"));
    }

    #[test]
    fn precedence() {
        assert_eq!(
            parse_expr("1+2*3"),
            Expr::BinOp {
                lhs: boxed(span(Expr::Number(1), 0..1)),
                op: span(BinOperator::Add, 1..2),
                rhs: boxed(span(
                    Expr::BinOp {
                        lhs: boxed(span(Expr::Number(2), 2..3)),
                        op: span(BinOperator::Mul, 3..4),
                        rhs: boxed(span(Expr::Number(3), 4..5)),
                    },
                    2..5
                )),
            }
        );
    }

    #[test]
    fn operand_shapes() {
        let r0 = || boxed(span(Expr::Ident("r0"), 1..3));
        assert_eq!(parse_operand("r0"), Expr::Ident("r0"));
        assert_eq!(parse_operand("(r0)"), Expr::Parenthesized(r0()));
        assert_eq!(
            parse_operand("(r0)+"),
            Expr::PostIncrement(boxed(span(Expr::Parenthesized(r0()), 0..4)))
        );
        assert!(parse_operand("-(r0)").as_autodecrement().is_some());
        assert!(matches!(parse_operand("#1"), Expr::Immediate(_)));
        assert!(matches!(parse_operand("@#1"), Expr::Deferred(e) if matches!(e.inner, Expr::Immediate(_))));
        assert!(matches!(parse_operand("@(r1)+"), Expr::Deferred(e) if matches!(e.inner, Expr::PostIncrement(_))));
        let Expr::Call { index, base } = parse_operand("lbl+2(r1)") else {
            panic!("expected index shape");
        };
        assert!(matches!(index.inner, Expr::BinOp { .. }));
        assert!(base.inner.as_parenthesized().is_some());
    }

    #[test]
    fn statements() {
        let block = program()
            .parse("a: b = 3 ; comment\n  mov r0, (r1)+\n.repeat 3 {\n nop\n}\n")
            .into_result()
            .unwrap();
        assert_eq!(block.0.len(), 4);
        assert!(matches!(block.0[0].inner, Statement::Label(_)));
        assert!(matches!(block.0[1].inner, Statement::Assignment { .. }));
        let Statement::Instruction(mov) = &block.0[2].inner else {
            panic!("expected instruction");
        };
        assert_eq!(mov.operands.len(), 2);
        let Statement::Instruction(repeat) = &block.0[3].inner else {
            panic!("expected instruction");
        };
        assert_eq!(repeat.body.as_ref().map(|b| b.inner.0.len()), Some(1));
    }

    #[test]
    fn one_line_body() {
        let block = program().parse(".repeat 10 { tst #1 }").into_result().unwrap();
        let Statement::Instruction(repeat) = &block.0[0].inner else {
            panic!("expected instruction");
        };
        assert_eq!(repeat.operands.len(), 1);
        assert_eq!(repeat.body.as_ref().map(|b| b.inner.0.len()), Some(1));
    }

    #[test]
    fn strings() {
        assert_eq!(
            parse_expr(r#""a\n\"""#),
            Expr::Str(Box::from(&b"a\n\""[..]))
        );
        assert_eq!(parse_expr("'A"), Expr::Char(b'A'));
    }
}
