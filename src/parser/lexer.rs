// Token-level parsers shared by the expression grammar

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0},
    combinator::{map, map_res, opt, recognize, value},
    multi::many0_count,
    sequence::{delimited, pair},
    IResult,
};

/// Wrap a parser so it skips surrounding whitespace
pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Identifier: letter or underscore, then letters, digits, underscores
pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0_count(alt((alphanumeric1, tag("_")))),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// Unsigned decimal number: `12` or `12.5`
pub fn number_literal(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |s: &str| s.parse::<f64>(),
    )(input)
}

/// Bare digits, used for positional access like `values.0`
pub fn index_literal(input: &str) -> IResult<&str, f64> {
    map_res(digit1, |s: &str| s.parse::<f64>())(input)
}

fn escape(input: &str) -> IResult<&str, &str> {
    alt((
        value("\\", tag("\\")),
        value("\"", tag("\"")),
        value("'", tag("'")),
        value("\n", tag("n")),
        value("\t", tag("t")),
    ))(input)
}

/// String literal in double or single quotes, with backslash escapes
pub fn string_literal(input: &str) -> IResult<&str, String> {
    alt((
        delimited(
            char('"'),
            map(opt(escaped_transform(is_not("\\\""), '\\', escape)), Option::unwrap_or_default),
            char('"'),
        ),
        delimited(
            char('\''),
            map(opt(escaped_transform(is_not("\\'"), '\\', escape)), Option::unwrap_or_default),
            char('\''),
        ),
    ))(input)
}
