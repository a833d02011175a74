//! Tree-walking evaluator.

use super::ast::{BinaryOp, Modifier, Node, Target, UnaryOp};
use crate::error::EvalError;
use crate::store::VarId;
use crate::value::Value;

/// Supplies the current value of referenced variables.
pub trait ValueSource {
    fn reference_value(&self, id: VarId, modifier: Modifier) -> Value;
}

pub fn evaluate(node: &Node, source: &dyn ValueSource) -> Result<Value, EvalError> {
    match node {
        Node::Literal(v) => Ok(v.clone()),
        Node::Ref(r) => match r.target {
            Target::Variable(id) => Ok(source.reference_value(id, r.modifier)),
            Target::Symbol => Ok(Value::Str(r.name.clone())),
            Target::Missing | Target::Unresolved => Err(EvalError::MissingVariable(r.name.clone())),
        },
        Node::Unary(op, operand) => unary(*op, evaluate(operand, source)?),
        Node::Binary(BinaryOp::And, lhs, rhs) => {
            Ok(Value::Bool(truthy(&evaluate(lhs, source)?, "&&")? && truthy(&evaluate(rhs, source)?, "&&")?))
        }
        Node::Binary(BinaryOp::Or, lhs, rhs) => {
            Ok(Value::Bool(truthy(&evaluate(lhs, source)?, "||")? || truthy(&evaluate(rhs, source)?, "||")?))
        }
        Node::Binary(op, lhs, rhs) => binary(*op, evaluate(lhs, source)?, evaluate(rhs, source)?),
        Node::Ternary(cond, then, otherwise) => {
            if truthy(&evaluate(cond, source)?, "?:")? {
                evaluate(then, source)
            } else {
                evaluate(otherwise, source)
            }
        }
    }
}

fn truthy(value: &Value, op: &'static str) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Long(v) => Ok(*v != 0),
        other => Err(EvalError::BadOperand {
            op,
            operand: other.type_name(),
        }),
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value, EvalError> {
    match (op, &operand) {
        (UnaryOp::Plus, Value::Long(_) | Value::Double(_)) => Ok(operand),
        (UnaryOp::Neg, Value::Long(v)) => Ok(Value::Long(v.wrapping_neg())),
        (UnaryOp::Neg, Value::Double(v)) => Ok(Value::Double(-v)),
        (UnaryOp::BitNot, Value::Long(v)) => Ok(Value::Long(!v)),
        (UnaryOp::Not, Value::Bool(_) | Value::Long(_)) => Ok(Value::Bool(!truthy(&operand, "!")?)),
        _ => Err(EvalError::BadOperand {
            op: op.symbol(),
            operand: operand.type_name(),
        }),
    }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    use BinaryOp::*;
    match op {
        Eq | Ne => {
            let equal = match (&lhs, &rhs) {
                (Value::Long(a), Value::Long(b)) => a == b,
                (a, b) if a.is_numeric() && b.is_numeric() => a.as_double() == b.as_double(),
                (a, b) => a.to_string() == b.to_string(),
            };
            Ok(Value::Bool(equal == (op == Eq)))
        }
        Lt | Le | Gt | Ge => {
            let ordering = match (&lhs, &rhs) {
                (Value::Long(a), Value::Long(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                (a, b) if a.is_numeric() && b.is_numeric() => a.as_double().partial_cmp(&b.as_double()),
                _ => return Err(mismatch(op, &lhs, &rhs)),
            };
            let result = ordering.map_or(false, |o| match op {
                Lt => o.is_lt(),
                Le => o.is_le(),
                Gt => o.is_gt(),
                _ => o.is_ge(),
            });
            Ok(Value::Bool(result))
        }
        BitAnd | BitOr | BitXor => match (&lhs, &rhs) {
            (Value::Long(a), Value::Long(b)) => Ok(Value::Long(match op {
                BitAnd => a & b,
                BitOr => a | b,
                _ => a ^ b,
            })),
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
                BitAnd => a & b,
                BitOr => a | b,
                _ => a ^ b,
            })),
            _ => Err(mismatch(op, &lhs, &rhs)),
        },
        Shl | Shr => match (&lhs, &rhs) {
            (Value::Long(a), Value::Long(b)) => {
                let amount = u32::try_from(*b)
                    .ok()
                    .filter(|n| *n < 64)
                    .ok_or(EvalError::ShiftOutOfRange(*b))?;
                Ok(Value::Long(if op == Shl { a << amount } else { a >> amount }))
            }
            _ => Err(mismatch(op, &lhs, &rhs)),
        },
        Add if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) => Ok(Value::Str(format!("{lhs}{rhs}"))),
        Add | Sub | Mul | Div | Rem => arithmetic(op, &lhs, &rhs),
        And => Ok(Value::Bool(truthy(&lhs, "&&")? && truthy(&rhs, "&&")?)),
        Or => Ok(Value::Bool(truthy(&lhs, "||")? || truthy(&rhs, "||")?)),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    use BinaryOp::*;
    match (lhs, rhs) {
        (Value::Long(a), Value::Long(b)) => {
            let (a, b) = (*a, *b);
            Ok(Value::Long(match op {
                Add => a.wrapping_add(b),
                Sub => a.wrapping_sub(b),
                Mul => a.wrapping_mul(b),
                Div | Rem if b == 0 => return Err(EvalError::DivisionByZero),
                Div => a.wrapping_div(b),
                _ => a.wrapping_rem(b),
            }))
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let (a, b) = (a.as_double().unwrap_or(f64::NAN), b.as_double().unwrap_or(f64::NAN));
            Ok(Value::Double(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                _ => a % b,
            }))
        }
        _ => Err(mismatch(op, lhs, rhs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse_formula;

    struct NoVars;

    impl ValueSource for NoVars {
        fn reference_value(&self, _: VarId, _: Modifier) -> Value {
            Value::Bool(false)
        }
    }

    fn eval(src: &str) -> Result<Value, EvalError> {
        let mut node = parse_formula(src).unwrap();
        node.visit_references_mut(&mut |r| {
            r.target = if r.name.starts_with('/') { Target::Missing } else { Target::Symbol }
        });
        evaluate(&node, &NoVars)
    }

    #[test]
    fn arithmetic_and_promotion() {
        assert_eq!(eval("1 + 2 * 3"), Ok(Value::Long(7)));
        assert_eq!(eval("7 / 2"), Ok(Value::Long(3)));
        assert_eq!(eval("7 % 4"), Ok(Value::Long(3)));
        assert_eq!(eval("7 / 2.0"), Ok(Value::Double(3.5)));
        assert_eq!(eval("1 << 4 | 1"), Ok(Value::Long(17)));
        assert_eq!(eval("~0 & 0xF"), Ok(Value::Long(15)));
        assert_eq!(eval("-(3 - 5)"), Ok(Value::Long(2)));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(eval("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1 % 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1.0 / 0"), Ok(Value::Double(f64::INFINITY)));
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("3 > 2 && 2 >= 2"), Ok(Value::Bool(true)));
        assert_eq!(eval("1 == 1.0"), Ok(Value::Bool(true)));
        assert_eq!(eval("'a' < 'b'"), Ok(Value::Bool(true)));
        assert_eq!(eval("PLL == 'PLL'"), Ok(Value::Bool(true)));
        assert_eq!(eval("!(1 != 1) ? 'yes' : 'no'"), Ok(Value::from("yes")));
        assert_eq!(eval("'x' + 1"), Ok(Value::from("x1")));
    }

    #[test]
    fn evaluation_errors() {
        assert_eq!(eval("/ADC0/missing"), Err(EvalError::MissingVariable("/ADC0/missing".into())));
        assert!(matches!(eval("true + 1"), Err(EvalError::TypeMismatch { .. })));
        assert!(matches!(eval("'a' && true"), Err(EvalError::BadOperand { .. })));
        assert_eq!(eval("1 << 64"), Err(EvalError::ShiftOutOfRange(64)));
        assert!(matches!(eval("'a' < 1"), Err(EvalError::TypeMismatch { .. })));
    }
}
