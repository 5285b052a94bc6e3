//! # Scalar Values
//!
//! Constant values that appear in predicates (`WHERE x > 5`), in the bounds of a
//! `SelectableRange`, and in sampled column statistics.
//!
//! Two orderings live here:
//!
//! - **Total order** (`Ord`): NULL sorts first, numbers compare across integer and
//!   float representations, and otherwise values order by type rank. This is the
//!   comparator of range bounds and of the temporary sort index used to sample
//!   column statistics, so it must never fail.
//! - **SQL comparison** (`sql_compare`): three-valued. Any comparison involving
//!   NULL, or between values of incompatible types, is unknown (`None`). Constant
//!   folding goes through this one.

use crate::expr::{ArithOp, CompareOp};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Scalar value for expressions, range bounds and statistics.
///
/// Uses `OrderedFloat` for `f64` so that floating-point values have a total order
/// and can be hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL value.
    Null,
    /// Boolean true/false.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(OrderedFloat<f64>),
    /// UTF-8 string.
    Utf8(String),
    /// Date as days since Unix epoch (1970-01-01).
    Date(i32),
}

/// Comparison class of a value. Ranges may only be merged when the values they
/// were built from belong to the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueClass {
    Null,
    Bool,
    Numeric,
    Text,
    Date,
}

impl ScalarValue {
    pub fn float(v: f64) -> Self {
        ScalarValue::Float64(OrderedFloat(v))
    }

    pub fn utf8(v: impl Into<String>) -> Self {
        ScalarValue::Utf8(v.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn class(&self) -> ValueClass {
        match self {
            ScalarValue::Null => ValueClass::Null,
            ScalarValue::Bool(_) => ValueClass::Bool,
            ScalarValue::Int64(_) | ScalarValue::Float64(_) => ValueClass::Numeric,
            ScalarValue::Utf8(_) => ValueClass::Text,
            ScalarValue::Date(_) => ValueClass::Date,
        }
    }

    /// True only for the boolean `true`. NULL and `false` both reject a row.
    pub fn is_true(&self) -> bool {
        matches!(self, ScalarValue::Bool(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, ScalarValue::Bool(false))
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int64(v) => Some(*v as f64),
            ScalarValue::Float64(v) => Some(v.0),
            _ => None,
        }
    }

    /// SQL comparison: `None` when either side is NULL or the types differ.
    pub fn sql_compare(&self, other: &ScalarValue) -> Option<Ordering> {
        if self.is_null() || other.is_null() || self.class() != other.class() {
            return None;
        }
        Some(self.cmp(other))
    }

    /// Evaluate `self OP other` with SQL three-valued semantics.
    ///
    /// `IS` / `IS NOT` are the only operators that treat NULL as an ordinary value.
    pub fn compare_with(&self, op: CompareOp, other: &ScalarValue) -> ScalarValue {
        match op {
            CompareOp::Is => ScalarValue::Bool(self.is_identical(other)),
            CompareOp::IsNot => ScalarValue::Bool(!self.is_identical(other)),
            _ => match self.sql_compare(other) {
                None => ScalarValue::Null,
                Some(ord) => ScalarValue::Bool(op.holds(ord)),
            },
        }
    }

    fn is_identical(&self, other: &ScalarValue) -> bool {
        match (self.is_null(), other.is_null()) {
            (true, true) => true,
            (false, false) => self.class() == other.class() && self.cmp(other) == Ordering::Equal,
            _ => false,
        }
    }

    /// Evaluate an arithmetic operator. NULL operands, non-numeric operands,
    /// overflow and division by zero all fold to NULL.
    pub fn arith(&self, op: ArithOp, other: &ScalarValue) -> ScalarValue {
        match (self, other) {
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => {
                let result = match op {
                    ArithOp::Add => a.checked_add(*b),
                    ArithOp::Sub => a.checked_sub(*b),
                    ArithOp::Mul => a.checked_mul(*b),
                    ArithOp::Div => a.checked_div(*b),
                };
                result.map(ScalarValue::Int64).unwrap_or(ScalarValue::Null)
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => {
                    let result = match op {
                        ArithOp::Add => a + b,
                        ArithOp::Sub => a - b,
                        ArithOp::Mul => a * b,
                        ArithOp::Div if b == 0.0 => return ScalarValue::Null,
                        ArithOp::Div => a / b,
                    };
                    ScalarValue::float(result)
                }
                _ => ScalarValue::Null,
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self.class() {
            ValueClass::Null => 0,
            ValueClass::Bool => 1,
            ValueClass::Numeric => 2,
            ValueClass::Text => 3,
            ValueClass::Date => 4,
        }
    }
}

fn cmp_int_float(i: i64, f: OrderedFloat<f64>) -> Ordering {
    if f.0.is_nan() {
        // OrderedFloat puts NaN above every number.
        return Ordering::Less;
    }
    match OrderedFloat(i as f64).cmp(&f) {
        // Equal as f64 means f is integral; settle precision loss exactly.
        Ordering::Equal => (i as i128).cmp(&(f.0 as i128)),
        other => other,
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use ScalarValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int64(a), Int64(b)) => a.cmp(b),
            (Float64(a), Float64(b)) => a.cmp(b),
            (Int64(a), Float64(b)) => cmp_int_float(*a, *b),
            (Float64(a), Int64(b)) => cmp_int_float(*b, *a).reverse(),
            (Utf8(a), Utf8(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            ScalarValue::Null => {}
            ScalarValue::Bool(v) => v.hash(state),
            // Int64(1) == Float64(1.0), so both hash through the float form.
            ScalarValue::Int64(v) => OrderedFloat(*v as f64).hash(state),
            ScalarValue::Float64(v) => v.hash(state),
            ScalarValue::Utf8(v) => v.hash(state),
            ScalarValue::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v.0),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v.replace('\'', "''")),
            ScalarValue::Date(v) => write!(f, "DATE({})", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_first() {
        let mut values = vec![
            ScalarValue::Int64(3),
            ScalarValue::Null,
            ScalarValue::float(1.5),
            ScalarValue::Int64(-2),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                ScalarValue::Null,
                ScalarValue::Int64(-2),
                ScalarValue::float(1.5),
                ScalarValue::Int64(3),
            ]
        );
    }

    #[test]
    fn test_int_float_equality_is_exact() {
        assert_eq!(ScalarValue::Int64(4), ScalarValue::float(4.0));
        let big = 1_i64 << 53;
        assert!(ScalarValue::Int64(big + 1) > ScalarValue::float(big as f64));
    }

    #[test]
    fn test_sql_compare_with_null_is_unknown() {
        let five = ScalarValue::Int64(5);
        assert!(five.compare_with(CompareOp::Eq, &ScalarValue::Null).is_null());
        assert!(five.compare_with(CompareOp::IsNot, &ScalarValue::Null).is_true());
        assert!(ScalarValue::Null.compare_with(CompareOp::Is, &ScalarValue::Null).is_true());
        assert!(five.compare_with(CompareOp::Lt, &ScalarValue::utf8("a")).is_null());
    }

    #[test]
    fn test_arith_folding() {
        let a = ScalarValue::Int64(7);
        assert_eq!(a.arith(ArithOp::Mul, &ScalarValue::Int64(6)), ScalarValue::Int64(42));
        assert!(a.arith(ArithOp::Div, &ScalarValue::Int64(0)).is_null());
        assert_eq!(a.arith(ArithOp::Add, &ScalarValue::float(0.5)), ScalarValue::float(7.5));
        assert!(ScalarValue::Int64(i64::MAX).arith(ArithOp::Add, &a).is_null());
    }
}
