//! Formula syntax tree.

use crate::store::VarId;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

/// Which aspect of a referenced variable is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Value,
    Enabled,
    Hidden,
}

/// What a name resolved to when the formula was compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Unresolved,
    Variable(VarId),
    /// A bare word naming no variable: evaluates to its own text.
    Symbol,
    /// A `/`-path naming no variable.
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub modifier: Modifier,
    pub target: Target,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Value),
    Ref(Reference),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Ternary(Box<Node>, Box<Node>, Box<Node>),
}

impl Node {
    /// Visit every reference in the tree.
    pub fn visit_references_mut(&mut self, f: &mut impl FnMut(&mut Reference)) {
        match self {
            Node::Literal(_) => {}
            Node::Ref(r) => f(r),
            Node::Unary(_, operand) => operand.visit_references_mut(f),
            Node::Binary(_, lhs, rhs) => {
                lhs.visit_references_mut(f);
                rhs.visit_references_mut(f);
            }
            Node::Ternary(cond, then, otherwise) => {
                cond.visit_references_mut(f);
                then.visit_references_mut(f);
                otherwise.visit_references_mut(f);
            }
        }
    }
}
