//! Formula language: syntax tree, nom parser and evaluator.

pub mod ast;
pub mod eval;
pub mod parser;

pub use ast::{BinaryOp, Modifier, Node, Reference, Target, UnaryOp};
pub use eval::{evaluate, ValueSource};
pub use parser::parse_formula;
