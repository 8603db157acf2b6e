// Abstract Syntax Tree for the column expression language

use crate::value::Value;

/// A parsed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The current record (`this`, or the element inside a block).
    Value,
    /// Evaluate the inner node in the enclosing scope (`^`).
    Parent(Box<Expr>),
    Literal(Value),
    /// Read `key` off `object`. A bare identifier `foo` is
    /// `Property { object: Value, key: Literal("foo") }`.
    Property { object: Box<Expr>, key: Box<Expr> },
    Array(Vec<Expr>),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Aggregate call with no arguments, e.g. `values.sum()`.
    Method { object: Box<Expr>, method: Method },
    /// Collection operation with a per-element body, e.g. `foo.map{a}`.
    Block {
        object: Box<Expr>,
        op: BlockOp,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Sum,
    Average,
    Min,
    Max,
    Count,
    Reversed,
    Flatten,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Method::Sum),
            "average" => Some(Method::Average),
            "min" => Some(Method::Min),
            "max" => Some(Method::Max),
            "count" => Some(Method::Count),
            "reversed" => Some(Method::Reversed),
            "flatten" => Some(Method::Flatten),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Sum => "sum",
            Method::Average => "average",
            Method::Min => "min",
            Method::Max => "max",
            Method::Count => "count",
            Method::Reversed => "reversed",
            Method::Flatten => "flatten",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp {
    Map,
    Filter,
    Some,
    Every,
    Sorted,
}

impl BlockOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "map" => Some(BlockOp::Map),
            "filter" => Some(BlockOp::Filter),
            "some" => Some(BlockOp::Some),
            "every" => Some(BlockOp::Every),
            "sorted" => Some(BlockOp::Sorted),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockOp::Map => "map",
            BlockOp::Filter => "filter",
            BlockOp::Some => "some",
            BlockOp::Every => "every",
            BlockOp::Sorted => "sorted",
        }
    }
}

impl Expr {
    /// Height of the tree, a lone node being 1. Walks without recursion.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, level)) = pending.pop() {
            deepest = deepest.max(level);
            match expr {
                Expr::Value | Expr::Literal(_) => {}
                Expr::Parent(inner) => pending.push((inner, level + 1)),
                Expr::Property { object, key } => {
                    pending.push((object, level + 1));
                    pending.push((key, level + 1));
                }
                Expr::Array(items) => pending.extend(items.iter().map(|item| (item, level + 1))),
                Expr::Unary { operand, .. } => pending.push((operand, level + 1)),
                Expr::Binary { left, right, .. } => {
                    pending.push((left, level + 1));
                    pending.push((right, level + 1));
                }
                Expr::Method { object, .. } => pending.push((object, level + 1)),
                Expr::Block { object, body, .. } => {
                    pending.push((object, level + 1));
                    pending.push((body, level + 1));
                }
            }
        }
        deepest
    }

    pub fn property(name: impl Into<String>) -> Self {
        Expr::Property {
            object: Box::new(Expr::Value),
            key: Box::new(Expr::Literal(Value::String(name.into()))),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The key of a plain `record[key]` read, if this node is exactly that.
    pub fn as_simple_property(&self) -> Option<&str> {
        match self {
            Expr::Property { object, key } => match (object.as_ref(), key.as_ref()) {
                (Expr::Value, Expr::Literal(Value::String(name))) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Source text together with its parsed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    pub source: String,
    pub tree: Expr,
}

impl ParsedExpression {
    pub fn simple_property(&self) -> Option<&str> {
        self.tree.as_simple_property()
    }
}
