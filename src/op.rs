use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    value::{to_int32, to_uint32, Value},
};

/// Every operator the expression language knows about, infix and prefix alike.
///
/// `Plus` and `Minus` appear in both positions; the parser rewrites a prefix
/// `Minus` into `Negate` and drops a prefix `Plus` before reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Comma,
    Question,
    Colon,
    Nullish,
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Expt,
    Not,
    BitNot,
    Negate,
    Typeof,
    Void,
    Dot,
}

/// Infix symbols in the order the lexer tries them: longer forms first.
pub(crate) const INFIX_SYMBOLS: &[(&str, Op)] = &[
    ("===", Op::StrictEqual),
    ("!==", Op::StrictNotEqual),
    (">>>", Op::UnsignedShiftRight),
    ("**", Op::Expt),
    ("??", Op::Nullish),
    ("&&", Op::And),
    ("||", Op::Or),
    ("==", Op::Equal),
    ("!=", Op::NotEqual),
    ("<=", Op::LessEqual),
    (">=", Op::GreaterEqual),
    ("<<", Op::ShiftLeft),
    (">>", Op::ShiftRight),
    ("+", Op::Plus),
    ("-", Op::Minus),
    ("*", Op::Star),
    ("/", Op::Slash),
    ("%", Op::Percent),
    ("&", Op::BitAnd),
    ("|", Op::BitOr),
    ("^", Op::BitXor),
    ("<", Op::Less),
    (">", Op::Greater),
    (",", Op::Comma),
    (":", Op::Colon),
    (".", Op::Dot),
    ("?", Op::Question),
];

impl Op {
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Comma => ",",
            Op::Question => "?",
            Op::Colon => ":",
            Op::Nullish => "??",
            Op::Or => "||",
            Op::And => "&&",
            Op::BitOr => "|",
            Op::BitXor => "^",
            Op::BitAnd => "&",
            Op::Equal => "==",
            Op::NotEqual => "!=",
            Op::StrictEqual => "===",
            Op::StrictNotEqual => "!==",
            Op::Less => "<",
            Op::Greater => ">",
            Op::LessEqual => "<=",
            Op::GreaterEqual => ">=",
            Op::ShiftLeft => "<<",
            Op::ShiftRight => ">>",
            Op::UnsignedShiftRight => ">>>",
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Star => "*",
            Op::Slash => "/",
            Op::Percent => "%",
            Op::Expt => "**",
            Op::Not => "!",
            Op::BitNot => "~",
            Op::Negate => "+/-",
            Op::Typeof => "typeof",
            Op::Void => "void",
            Op::Dot => ".",
        }
    }

    /// Binding strength, lowest first. Function calls rank above all of these.
    pub fn precedence(self) -> u8 {
        match self {
            Op::Comma => 0,
            Op::Question | Op::Colon => 1,
            Op::Nullish => 2,
            Op::Or => 3,
            Op::And => 4,
            Op::BitOr => 5,
            Op::BitXor => 6,
            Op::BitAnd => 7,
            Op::Equal | Op::NotEqual | Op::StrictEqual | Op::StrictNotEqual => 8,
            Op::Less | Op::Greater | Op::LessEqual | Op::GreaterEqual => 9,
            Op::ShiftLeft | Op::ShiftRight | Op::UnsignedShiftRight => 10,
            Op::Plus | Op::Minus => 11,
            Op::Star | Op::Slash | Op::Percent => 12,
            Op::Expt => 13,
            Op::Not | Op::BitNot | Op::Negate | Op::Typeof | Op::Void => 14,
            Op::Dot => 15,
        }
    }

    pub fn is_right_associative(self) -> bool {
        matches!(
            self,
            Op::Question
                | Op::Colon
                | Op::Expt
                | Op::Not
                | Op::BitNot
                | Op::Negate
                | Op::Typeof
                | Op::Void
        )
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

fn type_error(op: Op, message: impl Into<String>) -> Error {
    Error::OperatorType {
        op,
        message: message.into(),
    }
}

fn number(op: Op, value: &Value) -> Result<f64> {
    value
        .to_number()
        .ok_or_else(|| type_error(op, format!("cannot convert {} to a number", value.kind_name())))
}

fn int32(op: Op, value: &Value) -> Result<i32> {
    number(op, value).map(to_int32)
}

fn uint32(op: Op, value: &Value) -> Result<u32> {
    number(op, value).map(to_uint32)
}

/// `**` with the JS edge cases that `f64::powf` answers differently.
fn expt(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exponent)
    }
}

fn compare(op: Op, left: &Value, right: &Value) -> Result<Option<Ordering>> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Ok(Some(a.encode_utf16().cmp(b.encode_utf16())));
    }
    Ok(number(op, left)?.partial_cmp(&number(op, right)?))
}

/// Applies a binary operator to two finished values.
///
/// `,`, `:` and `?` shape the evaluator's stack rather than compute a value,
/// so they never reach this function.
pub(crate) fn apply_infix(op: Op, left: Value, right: Value) -> Result<Value> {
    let value = match op {
        Op::Nullish => match left {
            Value::Null | Value::Undefined => right,
            _ => left,
        },
        Op::Or => {
            if left.is_truthy() {
                left
            } else {
                right
            }
        }
        Op::And => {
            if left.is_truthy() {
                right
            } else {
                left
            }
        }
        Op::BitOr => Value::Number((int32(op, &left)? | int32(op, &right)?) as f64),
        Op::BitXor => Value::Number((int32(op, &left)? ^ int32(op, &right)?) as f64),
        Op::BitAnd => Value::Number((int32(op, &left)? & int32(op, &right)?) as f64),
        Op::Equal => Value::Bool(left.loose_equals(&right)),
        Op::NotEqual => Value::Bool(!left.loose_equals(&right)),
        Op::StrictEqual => Value::Bool(left == right),
        Op::StrictNotEqual => Value::Bool(left != right),
        Op::Less => Value::Bool(compare(op, &left, &right)? == Some(Ordering::Less)),
        Op::Greater => Value::Bool(compare(op, &left, &right)? == Some(Ordering::Greater)),
        Op::LessEqual => Value::Bool(matches!(
            compare(op, &left, &right)?,
            Some(Ordering::Less | Ordering::Equal)
        )),
        Op::GreaterEqual => Value::Bool(matches!(
            compare(op, &left, &right)?,
            Some(Ordering::Greater | Ordering::Equal)
        )),
        Op::ShiftLeft => {
            let shift = uint32(op, &right)? & 31;
            Value::Number(int32(op, &left)?.wrapping_shl(shift) as f64)
        }
        Op::ShiftRight => {
            let shift = uint32(op, &right)? & 31;
            Value::Number((int32(op, &left)? >> shift) as f64)
        }
        Op::UnsignedShiftRight => {
            let shift = uint32(op, &right)? & 31;
            Value::Number((uint32(op, &left)? >> shift) as f64)
        }
        Op::Plus => match (&left, &right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{left}{right}"))
            }
            _ => Value::Number(number(op, &left)? + number(op, &right)?),
        },
        Op::Minus => Value::Number(number(op, &left)? - number(op, &right)?),
        Op::Star => Value::Number(number(op, &left)? * number(op, &right)?),
        Op::Slash => Value::Number(number(op, &left)? / number(op, &right)?),
        Op::Percent => Value::Number(number(op, &left)? % number(op, &right)?),
        Op::Expt => Value::Number(expt(number(op, &left)?, number(op, &right)?)),
        Op::Dot => left.member(&right).map_err(|message| type_error(op, message))?,
        Op::Comma | Op::Question | Op::Colon => {
            return Err(Error::Malformed(format!("`{op}` cannot be applied to plain values")))
        }
        Op::Not | Op::BitNot | Op::Negate | Op::Typeof | Op::Void => {
            return Err(Error::Malformed(format!("`{op}` used as an infix operator")))
        }
    };
    Ok(value)
}

/// Applies a prefix operator to one finished value.
pub(crate) fn apply_prefix(op: Op, operand: Value) -> Result<Value> {
    let value = match op {
        Op::Not => Value::Bool(!operand.is_truthy()),
        Op::BitNot => Value::Number(!int32(op, &operand)? as f64),
        Op::Negate | Op::Minus => Value::Number(-number(op, &operand)?),
        Op::Plus => Value::Number(number(op, &operand)?),
        Op::Typeof => Value::String(operand.type_of().to_string()),
        Op::Void => Value::Undefined,
        _ => return Err(Error::Malformed(format!("`{op}` used as a prefix operator"))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_precedence_bands() {
        assert!(Op::Comma.precedence() < Op::Question.precedence());
        assert_eq!(Op::Question.precedence(), Op::Colon.precedence());
        assert!(Op::Nullish.precedence() < Op::Or.precedence());
        assert!(Op::Plus.precedence() < Op::Star.precedence());
        assert!(Op::Star.precedence() < Op::Expt.precedence());
        assert!(Op::Expt.precedence() < Op::Negate.precedence());
        assert!(Op::Typeof.precedence() < Op::Dot.precedence());
        assert!(Op::Expt.is_right_associative());
        assert!(!Op::Minus.is_right_associative());
    }

    #[test]
    fn test_infix_symbols_prefer_longer_forms() {
        let position = |sym: &str| INFIX_SYMBOLS.iter().position(|(s, _)| *s == sym).unwrap();
        assert!(position("===") < position("=="));
        assert!(position(">>>") < position(">>"));
        assert!(position(">>") < position(">"));
        assert!(position("**") < position("*"));
        assert!(position("??") < position("?"));
        assert!(position("!=") < position("=="));
    }

    #[test]
    fn test_plus_concatenates_with_strings() {
        assert_eq!(apply_infix(Op::Plus, string("a"), num(1.0)).unwrap(), string("a1"));
        assert_eq!(apply_infix(Op::Plus, num(1.5), string("b")).unwrap(), string("1.5b"));
        assert_eq!(apply_infix(Op::Plus, num(1.0), num(2.0)).unwrap(), num(3.0));
        assert_eq!(apply_infix(Op::Plus, Value::Bool(true), num(1.0)).unwrap(), num(2.0));
    }

    #[test]
    fn test_arithmetic_on_containers_is_a_type_error() {
        let err = apply_infix(Op::Star, Value::Array(vec![]), num(1.0)).unwrap_err();
        assert!(matches!(err, Error::OperatorType { op: Op::Star, .. }));
    }

    #[test]
    fn test_bitwise_truncates_to_32_bits() {
        assert_eq!(apply_infix(Op::BitOr, num(2.0), num(1.0)).unwrap(), num(3.0));
        assert_eq!(apply_infix(Op::BitXor, num(12.0), num(9.0)).unwrap(), num(5.0));
        assert_eq!(apply_infix(Op::BitOr, num(4294967297.0), num(0.0)).unwrap(), num(1.0));
        assert_eq!(apply_infix(Op::ShiftLeft, num(1.0), num(33.0)).unwrap(), num(2.0));
        assert_eq!(apply_infix(Op::ShiftRight, num(-8.0), num(1.0)).unwrap(), num(-4.0));
        assert_eq!(
            apply_infix(Op::UnsignedShiftRight, num(-1.0), num(0.0)).unwrap(),
            num(4294967295.0)
        );
        assert_eq!(apply_prefix(Op::BitNot, num(1.0)).unwrap(), num(-2.0));
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(apply_infix(Op::Or, num(0.0), string("x")).unwrap(), string("x"));
        assert_eq!(apply_infix(Op::And, num(2.0), string("")).unwrap(), string(""));
        assert_eq!(apply_infix(Op::And, num(0.0), string("x")).unwrap(), num(0.0));
        assert_eq!(apply_infix(Op::Nullish, Value::Null, num(2.0)).unwrap(), num(2.0));
        assert_eq!(apply_infix(Op::Nullish, num(0.0), num(2.0)).unwrap(), num(0.0));
    }

    #[test]
    fn test_relational_ordering() {
        assert_eq!(apply_infix(Op::Less, string("a"), string("b")).unwrap(), Value::Bool(true));
        assert_eq!(apply_infix(Op::Less, string("10"), num(9.0)).unwrap(), Value::Bool(false));
        assert_eq!(apply_infix(Op::LessEqual, num(f64::NAN), num(1.0)).unwrap(), Value::Bool(false));
        assert_eq!(apply_infix(Op::GreaterEqual, num(2.0), num(2.0)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_expt_edge_cases() {
        assert_eq!(apply_infix(Op::Expt, num(2.0), num(10.0)).unwrap(), num(1024.0));
        let Value::Number(n) = apply_infix(Op::Expt, num(1.0), num(f64::NAN)).unwrap() else {
            panic!("expected a number");
        };
        assert!(n.is_nan());
    }

    #[test]
    fn test_prefix_operators() {
        assert_eq!(apply_prefix(Op::Not, string("")).unwrap(), Value::Bool(true));
        assert_eq!(apply_prefix(Op::Negate, string("3")).unwrap(), num(-3.0));
        assert_eq!(apply_prefix(Op::Typeof, Value::Null).unwrap(), string("object"));
        assert_eq!(apply_prefix(Op::Void, num(1.0)).unwrap(), Value::Undefined);
        assert!(apply_prefix(Op::Star, num(1.0)).is_err());
    }
}
