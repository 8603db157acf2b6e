// Expression grammar: precedence climbing over nom combinators

use super::ast::{BinaryOp, BlockOp, Expr, Method, UnaryOp};
use super::lexer::{identifier, index_literal, number_literal, string_literal, ws};
use crate::value::Value;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, value},
    error::{Error, ErrorKind},
    multi::{fold_many0, separated_list0},
    sequence::{delimited, pair, preceded},
    IResult,
};

/// Parse a full expression (lowest precedence first)
pub fn parse_expr(input: &str) -> IResult<&str, Expr> {
    parse_or(input)
}

fn parse_or(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_and(input)?;
    fold_many0(
        preceded(ws(tag("||")), parse_and),
        move || first.clone(),
        |acc, rhs| Expr::binary(BinaryOp::Or, acc, rhs),
    )(input)
}

fn parse_and(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_comparison(input)?;
    fold_many0(
        preceded(ws(tag("&&")), parse_comparison),
        move || first.clone(),
        |acc, rhs| Expr::binary(BinaryOp::And, acc, rhs),
    )(input)
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    )))(input)
}

fn parse_comparison(input: &str) -> IResult<&str, Expr> {
    let (input, left) = parse_additive(input)?;
    match pair(comparison_op, parse_additive)(input) {
        Ok((rest, (op, right))) => Ok((rest, Expr::binary(op, left, right))),
        Err(nom::Err::Error(_)) => Ok((input, left)),
        Err(e) => Err(e),
    }
}

fn parse_additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_multiplicative(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOp::Add, char('+')),
                value(BinaryOp::Sub, char('-')),
            ))),
            parse_multiplicative,
        ),
        move || first.clone(),
        |acc, (op, rhs)| Expr::binary(op, acc, rhs),
    )(input)
}

fn parse_multiplicative(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_unary(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOp::Mul, char('*')),
                value(BinaryOp::Div, char('/')),
                value(BinaryOp::Rem, char('%')),
            ))),
            parse_unary,
        ),
        move || first.clone(),
        |acc, (op, rhs)| Expr::binary(op, acc, rhs),
    )(input)
}

fn parse_unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), parse_unary), |operand| Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }),
        map(preceded(ws(char('!')), parse_unary), |operand| Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }),
        parse_postfix,
    ))(input)
}

enum Suffix {
    Key(Expr),
    Method(Method),
    Block(BlockOp, Expr),
}

/// `.name`, `.0`, `.sum()`, `.map{...}`
fn dot_suffix(input: &str) -> IResult<&str, Suffix> {
    let (input, _) = ws(char('.'))(input)?;

    if let Ok((rest, index)) = index_literal(input) {
        return Ok((rest, Suffix::Key(Expr::Literal(Value::Number(index)))));
    }

    let (after_name, name) = identifier(input)?;

    if let Ok((rest, _)) = pair(ws(char('(')), ws(char(')')))(after_name) {
        return match Method::from_name(&name) {
            Some(method) => Ok((rest, Suffix::Method(method))),
            None => Err(nom::Err::Failure(Error::new(input, ErrorKind::Verify))),
        };
    }

    if let Ok((body_start, _)) = ws(char('{'))(after_name) {
        let op = BlockOp::from_name(&name)
            .ok_or_else(|| nom::Err::Failure(Error::new(input, ErrorKind::Verify)))?;
        let (rest, body) = parse_expr(body_start)?;
        let (rest, _) = ws(char('}'))(rest)?;
        return Ok((rest, Suffix::Block(op, body)));
    }

    Ok((after_name, Suffix::Key(Expr::Literal(Value::String(name)))))
}

/// `[expr]`
fn index_suffix(input: &str) -> IResult<&str, Suffix> {
    map(delimited(ws(char('[')), parse_expr, ws(char(']'))), Suffix::Key)(input)
}

fn parse_postfix(input: &str) -> IResult<&str, Expr> {
    let (input, base) = parse_primary(input)?;
    fold_many0(
        alt((dot_suffix, index_suffix)),
        move || base.clone(),
        |object, suffix| match suffix {
            Suffix::Key(key) => Expr::Property {
                object: Box::new(object),
                key: Box::new(key),
            },
            Suffix::Method(method) => Expr::Method {
                object: Box::new(object),
                method,
            },
            Suffix::Block(op, body) => Expr::Block {
                object: Box::new(object),
                op,
                body: Box::new(body),
            },
        },
    )(input)
}

fn parse_word(input: &str) -> IResult<&str, Expr> {
    map(identifier, |name| match name.as_str() {
        "this" => Expr::Value,
        "true" => Expr::Literal(Value::Bool(true)),
        "false" => Expr::Literal(Value::Bool(false)),
        "null" => Expr::Literal(Value::Null),
        _ => Expr::property(name),
    })(input)
}

fn parse_primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(number_literal, |n| Expr::Literal(Value::Number(n))),
        map(string_literal, |s| Expr::Literal(Value::String(s))),
        delimited(ws(char('(')), parse_expr, ws(char(')'))),
        map(
            delimited(
                ws(char('[')),
                separated_list0(ws(char(',')), parse_expr),
                ws(char(']')),
            ),
            Expr::Array,
        ),
        map(preceded(char('^'), parse_primary), |inner| {
            Expr::Parent(Box::new(inner))
        }),
        parse_word,
    )))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: f64) -> Expr {
        Expr::Literal(Value::Number(n))
    }

    #[test]
    fn test_parse_identifier_is_property() {
        let (rest, expr) = parse_expr("foo").unwrap();
        assert_eq!(rest, "");
        assert_eq!(expr, Expr::property("foo"));
        assert_eq!(expr.as_simple_property(), Some("foo"));
    }

    #[test]
    fn test_parse_precedence() {
        let (_, expr) = parse_expr("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                lit(1.0),
                Expr::binary(BinaryOp::Mul, lit(2.0), lit(3.0))
            )
        );
    }

    #[test]
    fn test_parse_left_associative() {
        let (_, expr) = parse_expr("8 - 4 - 2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, lit(8.0), lit(4.0)),
                lit(2.0)
            )
        );
    }

    #[test]
    fn test_parse_path_is_not_simple() {
        let (_, expr) = parse_expr("foo.bar").unwrap();
        assert_eq!(expr.as_simple_property(), None);
        match expr {
            Expr::Property { object, key } => {
                assert_eq!(*object, Expr::property("foo"));
                assert_eq!(*key, Expr::Literal(Value::from("bar")));
            }
            _ => panic!("Expected Property node"),
        }
    }

    #[test]
    fn test_parse_map_sum() {
        let (rest, expr) = parse_expr("foo.map{a}.sum()").unwrap();
        assert_eq!(rest, "");
        match expr {
            Expr::Method { object, method } => {
                assert_eq!(method, Method::Sum);
                match *object {
                    Expr::Block { op, body, .. } => {
                        assert_eq!(op, BlockOp::Map);
                        assert_eq!(*body, Expr::property("a"));
                    }
                    _ => panic!("Expected Block node"),
                }
            }
            _ => panic!("Expected Method node"),
        }
    }

    #[test]
    fn test_parse_index_suffix() {
        let (_, expr) = parse_expr("values.0").unwrap();
        match expr {
            Expr::Property { key, .. } => assert_eq!(*key, lit(0.0)),
            _ => panic!("Expected Property node"),
        }
        let (_, expr) = parse_expr("values[1 + 1]").unwrap();
        assert!(matches!(expr, Expr::Property { .. }));
    }

    #[test]
    fn test_parse_parent_scope() {
        let (_, expr) = parse_expr("items.map{a * ^scale}").unwrap();
        match expr {
            Expr::Block { body, .. } => match *body {
                Expr::Binary { right, .. } => {
                    assert_eq!(*right, Expr::Parent(Box::new(Expr::property("scale"))));
                }
                _ => panic!("Expected Binary node"),
            },
            _ => panic!("Expected Block node"),
        }
    }

    #[test]
    fn test_parse_keywords_and_comparison() {
        let (_, expr) = parse_expr("this != null && !false").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_parse_unknown_method_fails() {
        assert!(matches!(parse_expr("foo.bogus()"), Err(nom::Err::Failure(_))));
    }

    #[test]
    fn test_parse_unknown_block_fails() {
        assert!(matches!(parse_expr("foo.bogus{a}"), Err(nom::Err::Failure(_))));
    }

    #[test]
    fn test_parse_unclosed_paren() {
        let result = parse_expr("(1 + 2");
        assert!(result.is_err());
    }
}
