//! Expression trees and their column-at-a-time evaluation.
//!
//! Leaves name columns through [`ColumnRef`]; the caller supplies the
//! resolution from a reference to an actual column of the table, so the same
//! tree can be evaluated before and after aliases or aggregates exist.

use crate::error::{SqlError, TableError};
use crate::plan::ColumnRef;
use crate::table::Table;
use crate::value::{
    numeric_to_f64, numeric_value, value_to_bool, value_to_text, value_to_truth_value, NumericValue,
    Value,
};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOperator {
    pub fn from_arithmetic(text: &str) -> Option<Self> {
        match text {
            "+" => Some(BinaryOperator::Plus),
            "-" => Some(BinaryOperator::Minus),
            "*" => Some(BinaryOperator::Multiply),
            "/" => Some(BinaryOperator::Divide),
            "%" => Some(BinaryOperator::Modulo),
            _ => None,
        }
    }

    pub fn from_comparison(text: &str) -> Option<Self> {
        match text {
            "=" | "==" => Some(BinaryOperator::Eq),
            "!=" | "<>" => Some(BinaryOperator::NotEq),
            "<" => Some(BinaryOperator::Lt),
            "<=" => Some(BinaryOperator::LtEq),
            ">" => Some(BinaryOperator::Gt),
            ">=" => Some(BinaryOperator::GtEq),
            _ => None,
        }
    }

    pub fn is_multiplicative(self) -> bool {
        matches!(
            self,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo
        )
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => 3,
            BinaryOperator::Plus | BinaryOperator::Minus => 4,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 5,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => " AND ",
            BinaryOperator::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary minus.
    Negate(Box<Expr>),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(name))
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn negate(operand: Expr) -> Self {
        Expr::Negate(Box::new(operand))
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: BinaryOperator, right: bool) -> fmt::Result {
        match self {
            Expr::BinaryOp { op, .. }
                if op.precedence() < parent.precedence()
                    || (right && op.precedence() == parent.precedence()) =>
            {
                write!(f, "({})", self)
            }
            _ => write!(f, "{}", self),
        }
    }
}

/// Compact surface form, e.g. `t.a+t.b*2`. Used to name unaliased
/// operations.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(column) => write!(f, "{}", column),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::BinaryOp { left, op, right } => {
                left.fmt_operand(f, *op, false)?;
                f.write_str(op.symbol())?;
                right.fmt_operand(f, *op, true)
            }
            Expr::Negate(operand) => match operand.as_ref() {
                Expr::BinaryOp { .. } => write!(f, "-({})", operand),
                _ => write!(f, "-{}", operand),
            },
        }
    }
}

/// Evaluates `expr` over every row of `table`, producing one value per row.
///
/// `resolve` maps each column reference to the name of a column of `table`.
pub fn evaluate<F>(expr: &Expr, table: &Table, resolve: &F) -> Result<Vec<Value>, SqlError>
where
    F: Fn(&ColumnRef) -> Result<String, SqlError>,
{
    match expr {
        Expr::Column(column) => {
            let name = resolve(column)?;
            Ok(table.column(&name)?.values().to_vec())
        }
        Expr::Literal(value) => Ok(vec![value.clone(); table.row_count()]),
        Expr::BinaryOp { left, op, right } => {
            let left = evaluate(left, table, resolve)?;
            let right = evaluate(right, table, resolve)?;
            let values = left
                .into_iter()
                .zip(right)
                .map(|(left, right)| apply_binary_op(*op, left, right))
                .collect::<Result<Vec<_>, TableError>>()?;
            Ok(values)
        }
        Expr::Negate(operand) => {
            let values = evaluate(operand, table, resolve)?
                .into_iter()
                .map(negate_value)
                .collect::<Result<Vec<_>, TableError>>()?;
            Ok(values)
        }
    }
}

/// Evaluates a condition to a row mask. NULL counts as false.
pub fn mask<F>(condition: &Expr, table: &Table, resolve: &F) -> Result<Vec<bool>, SqlError>
where
    F: Fn(&ColumnRef) -> Result<String, SqlError>,
{
    Ok(evaluate(condition, table, resolve)?
        .iter()
        .map(value_to_bool)
        .collect())
}

pub(crate) fn apply_binary_op(
    op: BinaryOperator,
    left: Value,
    right: Value,
) -> Result<Value, TableError> {
    match op {
        BinaryOperator::Plus
        | BinaryOperator::Minus
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => apply_numeric_op(op, left, right),
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq => Ok(compare_values(op, &left, &right)),
        BinaryOperator::And => Ok(apply_logical_and(&left, &right)),
        BinaryOperator::Or => Ok(apply_logical_or(&left, &right)),
    }
}

/// Integer arithmetic stays integral (division truncates) unless it
/// overflows; anything involving a real is computed in floating point.
/// Division or modulo by zero yields NULL.
fn apply_numeric_op(op: BinaryOperator, left: Value, right: Value) -> Result<Value, TableError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let left_num =
        numeric_value(&left).ok_or_else(|| TableError::NonNumericOperand(value_to_text(&left)))?;
    let right_num =
        numeric_value(&right).ok_or_else(|| TableError::NonNumericOperand(value_to_text(&right)))?;

    if let (NumericValue::Integer(l), NumericValue::Integer(r)) = (left_num, right_num) {
        let result = match op {
            BinaryOperator::Plus => l.checked_add(r),
            BinaryOperator::Minus => l.checked_sub(r),
            BinaryOperator::Multiply => l.checked_mul(r),
            BinaryOperator::Divide | BinaryOperator::Modulo if r == 0 => return Ok(Value::Null),
            BinaryOperator::Divide => l.checked_div(r),
            BinaryOperator::Modulo => l.checked_rem(r),
            _ => None,
        };
        if let Some(result) = result {
            return Ok(Value::Integer(result));
        }
    }

    let (left_num, _) = numeric_to_f64(left_num);
    let (right_num, _) = numeric_to_f64(right_num);
    let result = match op {
        BinaryOperator::Plus => left_num + right_num,
        BinaryOperator::Minus => left_num - right_num,
        BinaryOperator::Multiply => left_num * right_num,
        BinaryOperator::Divide => {
            if right_num == 0.0 {
                return Ok(Value::Null);
            }
            left_num / right_num
        }
        BinaryOperator::Modulo => {
            if right_num == 0.0 {
                return Ok(Value::Null);
            }
            left_num % right_num
        }
        _ => return Ok(Value::Null),
    };
    Ok(Value::Real(result))
}

fn negate_value(value: Value) -> Result<Value, TableError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Integer(v) => Ok(v
            .checked_neg()
            .map_or(Value::Real(-(v as f64)), Value::Integer)),
        Value::Real(v) => Ok(Value::Real(-v)),
        Value::Text(text) => Err(TableError::NonNumericOperand(text)),
    }
}

fn compare_values(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    let ordering = if let (Some(left_num), Some(right_num)) =
        (numeric_value(left), numeric_value(right))
    {
        let (left_num, _) = numeric_to_f64(left_num);
        let (right_num, _) = numeric_to_f64(right_num);
        left_num.partial_cmp(&right_num).unwrap_or(Ordering::Equal)
    } else {
        left.sort_cmp(right)
    };
    let result = match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::NotEq => ordering != Ordering::Equal,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::LtEq => ordering != Ordering::Greater,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::GtEq => ordering != Ordering::Less,
        _ => false,
    };
    Value::Integer(result as i64)
}

fn apply_logical_and(left: &Value, right: &Value) -> Value {
    match (value_to_truth_value(left), value_to_truth_value(right)) {
        (Some(false), _) | (_, Some(false)) => Value::Integer(0),
        (Some(true), Some(true)) => Value::Integer(1),
        _ => Value::Null,
    }
}

fn apply_logical_or(left: &Value, right: &Value) -> Value {
    match (value_to_truth_value(left), value_to_truth_value(right)) {
        (Some(true), _) | (_, Some(true)) => Value::Integer(1),
        (Some(false), Some(false)) => Value::Integer(0),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_needed_parentheses_only() {
        let sum = Expr::binary(Expr::column("t.a"), BinaryOperator::Plus, Expr::column("t.b"));
        let product = Expr::binary(sum.clone(), BinaryOperator::Multiply, Expr::Literal(Value::Integer(2)));
        assert_eq!(sum.to_string(), "t.a+t.b");
        assert_eq!(product.to_string(), "(t.a+t.b)*2");
        let nested = Expr::binary(
            Expr::column("a"),
            BinaryOperator::Minus,
            Expr::binary(Expr::column("b"), BinaryOperator::Minus, Expr::column("c")),
        );
        assert_eq!(nested.to_string(), "a-(b-c)");
    }

    #[test]
    fn integer_division_truncates_and_zero_divisor_is_null() {
        assert_eq!(
            apply_numeric_op(BinaryOperator::Divide, Value::Integer(7), Value::Integer(2)).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            apply_numeric_op(BinaryOperator::Divide, Value::Integer(7), Value::Integer(0)).unwrap(),
            Value::Null
        );
        assert_eq!(
            apply_numeric_op(BinaryOperator::Divide, Value::Real(7.0), Value::Integer(2)).unwrap(),
            Value::Real(3.5)
        );
    }

    #[test]
    fn negation_names_and_values() {
        let negated = Expr::negate(Expr::column("t.a"));
        assert_eq!(negated.to_string(), "-t.a");
        let grouped = Expr::negate(Expr::binary(
            Expr::column("a"),
            BinaryOperator::Plus,
            Expr::column("b"),
        ));
        assert_eq!(grouped.to_string(), "-(a+b)");
        assert_eq!(negate_value(Value::Integer(3)).unwrap(), Value::Integer(-3));
        assert_eq!(negate_value(Value::Null).unwrap(), Value::Null);
        assert_eq!(
            negate_value(Value::Integer(i64::MIN)).unwrap(),
            Value::Real(-(i64::MIN as f64))
        );
        assert!(negate_value(Value::Text("x".into())).is_err());
    }

    #[test]
    fn reals_and_integers_name_differently() {
        let times = |value| {
            Expr::binary(Expr::column("t.a"), BinaryOperator::Multiply, Expr::Literal(value))
        };
        assert_eq!(times(Value::Integer(2)).to_string(), "t.a*2");
        assert_eq!(times(Value::Real(2.0)).to_string(), "t.a*2.0");
    }

    #[test]
    fn text_operands_are_rejected() {
        let err = apply_numeric_op(BinaryOperator::Plus, Value::Text("x".into()), Value::Integer(1))
            .unwrap_err();
        assert!(matches!(err, TableError::NonNumericOperand(_)));
    }

    #[test]
    fn comparisons_with_null_are_unknown() {
        assert_eq!(
            compare_values(BinaryOperator::Eq, &Value::Null, &Value::Integer(1)),
            Value::Null
        );
        assert_eq!(
            apply_logical_or(&Value::Null, &Value::Integer(1)),
            Value::Integer(1)
        );
        assert_eq!(apply_logical_and(&Value::Null, &Value::Integer(1)), Value::Null);
    }
}
