use std::fmt;

use num_bigint::BigInt;

use crate::diagnostics::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Neg => write!(f, "-"),
            PrefixOp::Not => write!(f, "!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    NotEq,
    And,
    Or,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Mod => "%",
            InfixOp::Lt => "<",
            InfixOp::Lte => "<=",
            InfixOp::Gt => ">",
            InfixOp::Gte => ">=",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::And => "and",
            InfixOp::Or => "or",
        };
        write!(f, "{}", s)
    }
}

/// One entry of a key-value collection literal.
///
/// `Return` makes the enclosing block evaluate to the given expression
/// instead of the collection itself.
#[derive(Debug, Clone, PartialEq)]
pub enum KvcEntry {
    Pair {
        key: String,
        value: Expression,
        position: Position,
    },
    Return {
        value: Expression,
        position: Position,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    IntLiteral {
        value: i64,
        position: Position,
    },
    BigIntLiteral {
        value: BigInt,
        position: Position,
    },
    FloatLiteral {
        value: f64,
        position: Position,
    },
    StringLiteral {
        value: String,
        position: Position,
    },
    BoolLiteral {
        value: bool,
        position: Position,
    },
    NilLiteral {
        position: Position,
    },
    Identifier {
        name: String,
        position: Position,
    },
    ListLiteral {
        elements: Vec<Expression>,
        position: Position,
    },
    KvcLiteral {
        entries: Vec<KvcEntry>,
        position: Position,
    },
    Prefix {
        operator: PrefixOp,
        right: Box<Expression>,
        position: Position,
    },
    Infix {
        operator: InfixOp,
        left: Box<Expression>,
        right: Box<Expression>,
        position: Position,
    },
    If {
        condition: Box<Expression>,
        consequence: Box<Expression>,
        alternative: Box<Expression>,
        position: Position,
    },
    Lambda {
        parameters: Vec<String>,
        body: Box<Expression>,
        position: Position,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
        position: Position,
    },
    Index {
        receiver: Box<Expression>,
        index: Box<Expression>,
        position: Position,
    },
    Member {
        receiver: Box<Expression>,
        key: String,
        position: Position,
    },
}

impl Expression {
    pub fn position(&self) -> Position {
        match self {
            Expression::IntLiteral { position, .. }
            | Expression::BigIntLiteral { position, .. }
            | Expression::FloatLiteral { position, .. }
            | Expression::StringLiteral { position, .. }
            | Expression::BoolLiteral { position, .. }
            | Expression::NilLiteral { position }
            | Expression::Identifier { position, .. }
            | Expression::ListLiteral { position, .. }
            | Expression::KvcLiteral { position, .. }
            | Expression::Prefix { position, .. }
            | Expression::Infix { position, .. }
            | Expression::If { position, .. }
            | Expression::Lambda { position, .. }
            | Expression::Call { position, .. }
            | Expression::Index { position, .. }
            | Expression::Member { position, .. } => *position,
        }
    }
}
