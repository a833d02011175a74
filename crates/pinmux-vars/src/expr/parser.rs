//! Nom parser for formulas.
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, `|`, `^`, `&`, `== !=`,
//! `< <= > >=`, `<< >>`, `+ -`, `* / %`, then the unary operators.
//! Identifiers are word characters plus `/`, `[` and `]`; a `/` only
//! continues an identifier when a word character follows it, so `x/2`
//! divides while `/ADC0/clockSource` is a single name.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, hex_digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    error::{Error, ErrorKind},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::ast::{BinaryOp, Modifier, Node, Reference, Target, UnaryOp};
use crate::value::Value;

/// Parse a complete formula.
pub fn parse_formula(input: &str) -> Result<Node, String> {
    match all_consuming(terminated(ternary, multispace0))(input) {
        Ok((_, node)) => Ok(node),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = input.len() - e.input.len();
            Err(format!("unexpected input at offset {offset}: {:?}", e.input))
        }
        Err(nom::Err::Incomplete(_)) => Err("incomplete formula".to_string()),
    }
}

fn ternary(input: &str) -> IResult<&str, Node> {
    let (input, cond) = logical_or(input)?;
    let (input, branches) = opt(pair(
        preceded(preceded(multispace0, char('?')), ternary),
        preceded(preceded(multispace0, char(':')), ternary),
    ))(input)?;
    Ok(match branches {
        Some((then, otherwise)) => (input, Node::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise))),
        None => (input, cond),
    })
}

/// Left-associative chain of `operand (op operand)*`.
fn fold_binary<'a, P, O>(mut operand: P, mut op: O) -> impl FnMut(&'a str) -> IResult<&'a str, Node>
where
    P: FnMut(&'a str) -> IResult<&'a str, Node>,
    O: FnMut(&'a str) -> IResult<&'a str, BinaryOp>,
{
    move |input: &'a str| {
        let (mut input, mut lhs) = operand(input)?;
        loop {
            let (rest, _) = multispace0(input)?;
            let (rest, operator) = match op(rest) {
                Ok(ok) => ok,
                Err(nom::Err::Error(_)) => break,
                Err(e) => return Err(e),
            };
            let (rest, rhs) = operand(rest)?;
            lhs = Node::Binary(operator, Box::new(lhs), Box::new(rhs));
            input = rest;
        }
        Ok((input, lhs))
    }
}

fn logical_or(input: &str) -> IResult<&str, Node> {
    fold_binary(logical_and, value(BinaryOp::Or, tag("||")))(input)
}

fn logical_and(input: &str) -> IResult<&str, Node> {
    fold_binary(bit_or, value(BinaryOp::And, tag("&&")))(input)
}

fn bit_or(input: &str) -> IResult<&str, Node> {
    fold_binary(bit_xor, value(BinaryOp::BitOr, terminated(tag("|"), not(char('|')))))(input)
}

fn bit_xor(input: &str) -> IResult<&str, Node> {
    fold_binary(bit_and, value(BinaryOp::BitXor, tag("^")))(input)
}

fn bit_and(input: &str) -> IResult<&str, Node> {
    fold_binary(equality, value(BinaryOp::BitAnd, terminated(tag("&"), not(char('&')))))(input)
}

fn equality(input: &str) -> IResult<&str, Node> {
    fold_binary(
        comparison,
        alt((value(BinaryOp::Eq, tag("==")), value(BinaryOp::Ne, tag("!=")))),
    )(input)
}

fn comparison(input: &str) -> IResult<&str, Node> {
    fold_binary(
        shift,
        alt((
            value(BinaryOp::Le, tag("<=")),
            value(BinaryOp::Ge, tag(">=")),
            value(BinaryOp::Lt, terminated(tag("<"), not(char('<')))),
            value(BinaryOp::Gt, terminated(tag(">"), not(char('>')))),
        )),
    )(input)
}

fn shift(input: &str) -> IResult<&str, Node> {
    fold_binary(
        sum,
        alt((value(BinaryOp::Shl, tag("<<")), value(BinaryOp::Shr, tag(">>")))),
    )(input)
}

fn sum(input: &str) -> IResult<&str, Node> {
    fold_binary(
        term,
        alt((value(BinaryOp::Add, tag("+")), value(BinaryOp::Sub, tag("-")))),
    )(input)
}

fn term(input: &str) -> IResult<&str, Node> {
    fold_binary(
        factor,
        alt((
            value(BinaryOp::Mul, tag("*")),
            value(BinaryOp::Div, tag("/")),
            value(BinaryOp::Rem, tag("%")),
        )),
    )(input)
}

fn factor(input: &str) -> IResult<&str, Node> {
    let (input, _) = multispace0(input)?;
    alt((
        map(pair(unary_op, factor), |(op, operand)| Node::Unary(op, Box::new(operand))),
        delimited(char('('), ternary, preceded(multispace0, char(')'))),
        literal,
        reference,
    ))(input)
}

fn unary_op(input: &str) -> IResult<&str, UnaryOp> {
    alt((
        value(UnaryOp::Neg, char('-')),
        value(UnaryOp::Plus, char('+')),
        value(UnaryOp::Not, terminated(char('!'), not(char('=')))),
        value(UnaryOp::BitNot, char('~')),
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Node> {
    map(
        alt((hex_literal, binary_literal, float_literal, integer_literal, string_literal, bool_literal)),
        Node::Literal,
    )(input)
}

fn hex_literal(input: &str) -> IResult<&str, Value> {
    map_res(preceded(alt((tag("0x"), tag("0X"))), hex_digit1), |digits: &str| {
        u64::from_str_radix(digits, 16).map(|v| Value::Long(v as i64))
    })(input)
}

fn binary_literal(input: &str) -> IResult<&str, Value> {
    map_res(
        preceded(alt((tag("0b"), tag("0B"))), take_while1(|c| c == '0' || c == '1')),
        |digits: &str| u64::from_str_radix(digits, 2).map(|v| Value::Long(v as i64)),
    )(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn float_literal(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(pair(
            digit1,
            alt((recognize(tuple((char('.'), digit0, opt(exponent)))), exponent)),
        )),
        |text: &str| text.parse::<f64>().map(Value::Double),
    )(input)
}

fn integer_literal(input: &str) -> IResult<&str, Value> {
    map_res(terminated(digit1, not(satisfy(is_word_char))), |digits: &str| {
        digits.parse::<i64>().map(Value::Long)
    })(input)
}

fn string_literal(input: &str) -> IResult<&str, Value> {
    map(
        alt((
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        )),
        |text: &str| Value::Str(text.to_string()),
    )(input)
}

fn bool_literal(input: &str) -> IResult<&str, Value> {
    terminated(
        alt((value(Value::Bool(true), tag("true")), value(Value::Bool(false), tag("false")))),
        not(satisfy(is_ident_char)),
    )(input)
}

fn reference(input: &str) -> IResult<&str, Node> {
    let (input, name) = identifier(input)?;
    let (input, modifier) = opt(preceded(
        char('.'),
        alt((
            value(Modifier::Enabled, tag("enabled")),
            value(Modifier::Hidden, tag("hidden")),
        )),
    ))(input)?;
    Ok((
        input,
        Node::Ref(Reference {
            name: name.to_string(),
            modifier: modifier.unwrap_or(Modifier::Value),
            target: Target::Unresolved,
        }),
    ))
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    is_word_char(c) || c == '/' || c == '[' || c == ']'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    let starts_word = |c: char| c.is_ascii_alphabetic() || c == '_';
    let mut end = 0;
    let mut after_slash = false;
    for (idx, c) in input.char_indices() {
        let accepted = if idx == 0 {
            starts_word(c) || c == '/'
        } else if after_slash {
            starts_word(c)
        } else {
            is_ident_char(c)
        };
        if !accepted {
            break;
        }
        after_slash = c == '/';
        end = idx + c.len_utf8();
    }
    // a trailing '/' is the division operator
    if after_slash {
        end -= 1;
    }
    if end == 0 {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Alpha)));
    }
    Ok((&input[end..], &input[..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Node {
        parse_formula(s).unwrap_or_else(|e| panic!("{s}: {e}"))
    }

    fn name(node: &Node) -> &str {
        match node {
            Node::Ref(r) => &r.name,
            other => panic!("not a reference: {other:?}"),
        }
    }

    #[test]
    fn path_identifiers() {
        assert_eq!(name(&parse("/ADC0/clockSource")), "/ADC0/clockSource");
        assert_eq!(name(&parse("/FTM0/ch[2]/mode")), "/FTM0/ch[2]/mode");
        assert_eq!(name(&parse("  PLL ")), "PLL");
    }

    #[test]
    fn slash_before_digit_divides() {
        match parse("x/2") {
            Node::Binary(BinaryOp::Div, lhs, rhs) => {
                assert_eq!(name(&lhs), "x");
                assert_eq!(*rhs, Node::Literal(Value::Long(2)));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn precedence() {
        // 1 + 2 * 3 == 7 parses as (1 + (2 * 3)) == 7
        match parse("1 + 2 * 3 == 7") {
            Node::Binary(BinaryOp::Eq, lhs, _) => match *lhs {
                Node::Binary(BinaryOp::Add, _, rhs) => {
                    assert!(matches!(*rhs, Node::Binary(BinaryOp::Mul, _, _)))
                }
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }
        assert!(matches!(parse("a || b && c"), Node::Binary(BinaryOp::Or, _, _)));
        assert!(matches!(parse("a | b & c"), Node::Binary(BinaryOp::BitOr, _, _)));
        assert!(matches!(parse("1 << 2 < 8"), Node::Binary(BinaryOp::Lt, _, _)));
    }

    #[test]
    fn ternary_and_grouping() {
        let node = parse("(/ADC0/clockSource==PLL)?1:0");
        match node {
            Node::Ternary(cond, then, otherwise) => {
                assert!(matches!(*cond, Node::Binary(BinaryOp::Eq, _, _)));
                assert_eq!(*then, Node::Literal(Value::Long(1)));
                assert_eq!(*otherwise, Node::Literal(Value::Long(0)));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn literals() {
        assert_eq!(parse("0x1F"), Node::Literal(Value::Long(31)));
        assert_eq!(parse("0b101"), Node::Literal(Value::Long(5)));
        assert_eq!(parse("2.5"), Node::Literal(Value::Double(2.5)));
        assert_eq!(parse("1e3"), Node::Literal(Value::Double(1000.0)));
        assert_eq!(parse("'text'"), Node::Literal(Value::from("text")));
        assert_eq!(parse("true"), Node::Literal(Value::Bool(true)));
        assert_eq!(name(&parse("trueValue")), "trueValue");
    }

    #[test]
    fn unary_and_modifiers() {
        assert!(matches!(parse("!a"), Node::Unary(UnaryOp::Not, _)));
        assert!(matches!(parse("-~3"), Node::Unary(UnaryOp::Neg, _)));
        match parse("/SPI0/enable.enabled") {
            Node::Ref(r) => assert_eq!(r.modifier, Modifier::Enabled),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn syntax_errors() {
        assert!(parse_formula("1 +").is_err());
        assert!(parse_formula("(a").is_err());
        assert!(parse_formula("a b").is_err());
        assert!(parse_formula("").is_err());
    }
}
