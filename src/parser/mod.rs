// Column expression parser module

pub mod ast;
pub mod expression;
pub mod lexer;

// Public API re-exports
pub use ast::{Expr, ParsedExpression};
pub use expression::parse_expr;

use crate::error::ParseError;
use lexer::ws;
use nom::combinator::all_consuming;

/// Longest accepted expression source, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 8192;
/// Deepest accepted bracket and prefix-operator nesting.
pub const MAX_NESTING_DEPTH: usize = 128;
/// Tallest accepted expression tree, which bounds evaluation recursion.
pub const MAX_TREE_DEPTH: usize = 256;

/// Upper bound on how deeply the parser recurses for `source`: open
/// brackets plus the prefix operators (`-`, `!`, `^`) pending at each level.
/// Quoted strings are skipped.
fn nesting_depth(source: &str) -> usize {
    let mut levels: Vec<usize> = vec![0];
    let mut deepest = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in source.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => levels.push(0),
            ')' | ']' | '}' => {
                if levels.len() > 1 {
                    levels.pop();
                }
                if let Some(run) = levels.last_mut() {
                    *run = 0;
                }
            }
            '-' | '!' | '^' => {
                if let Some(run) = levels.last_mut() {
                    *run += 1;
                }
            }
            c if c.is_whitespace() || c == '=' => {}
            _ => {
                if let Some(run) = levels.last_mut() {
                    *run = 0;
                }
            }
        }
        deepest = deepest.max(levels.len() - 1 + levels.iter().sum::<usize>());
    }
    deepest
}

/// Parse expression source into a tree. The whole input must be consumed.
pub fn parse(source: &str) -> Result<ParsedExpression, ParseError> {
    if source.trim().is_empty() {
        return Err(ParseError::new(source, "expression is empty"));
    }
    if source.len() > MAX_EXPRESSION_LEN {
        return Err(ParseError::new(
            source,
            format!("expression is longer than {} bytes", MAX_EXPRESSION_LEN),
        ));
    }
    if nesting_depth(source) > MAX_NESTING_DEPTH {
        return Err(ParseError::new(
            source,
            format!("expression nests deeper than {} levels", MAX_NESTING_DEPTH),
        ));
    }

    match all_consuming(ws(parse_expr))(source) {
        Ok((_, tree)) if tree.depth() > MAX_TREE_DEPTH => Err(ParseError::new(
            source,
            format!("expression is deeper than {} levels", MAX_TREE_DEPTH),
        )),
        Ok((_, tree)) => Ok(ParsedExpression {
            source: source.to_string(),
            tree,
        }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = source.len() - e.input.len();
            let message = if e.input.is_empty() {
                "unexpected end of expression".to_string()
            } else {
                format!("unexpected input at offset {}: '{}'", offset, e.input)
            };
            Err(ParseError::new(source, message))
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError::new(source, "incomplete expression")),
    }
}
