//! Numeric coercion and typed running sums for SUM / AVERAGE and the sample-based statistics.

use crate::error::CoercionError;
use crate::value::{epoch_millis, Value, ValueType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// A numeric contribution, keeping the precision of the subject column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Number(f64),
    BigNumber(Decimal),
}

impl Numeric {
    pub fn to_f64(self) -> f64 {
        match self {
            Numeric::Integer(i) => i as f64,
            Numeric::Number(n) => n,
            Numeric::BigNumber(d) => decimal_to_f64(&d),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Numeric::Integer(i) => Value::Integer(i),
            Numeric::Number(n) => Value::Number(n),
            Numeric::BigNumber(d) => Value::BigNumber(d),
        }
    }

    /// Adds two contributions. `None` on integer or decimal overflow.
    ///
    /// Mixed kinds widen: integer + decimal stays decimal, anything + float is float.
    pub fn checked_add(self, other: Numeric) -> Option<Numeric> {
        match (self, other) {
            (Numeric::Integer(a), Numeric::Integer(b)) => a.checked_add(b).map(Numeric::Integer),
            (Numeric::BigNumber(a), Numeric::BigNumber(b)) => {
                a.checked_add(b).map(Numeric::BigNumber)
            }
            (Numeric::Integer(a), Numeric::BigNumber(b))
            | (Numeric::BigNumber(b), Numeric::Integer(a)) => {
                Decimal::from(a).checked_add(b).map(Numeric::BigNumber)
            }
            (a, b) => Some(Numeric::Number(a.to_f64() + b.to_f64())),
        }
    }

    /// `sum / count`, in the sum's own type. Integer division truncates toward zero.
    pub fn divide(self, count: u64) -> Value {
        if count == 0 {
            return Value::Null;
        }
        match self {
            Numeric::Integer(sum) => match i64::try_from(count) {
                Ok(count) => Value::Integer(sum / count),
                Err(_) => Value::Integer(0),
            },
            Numeric::Number(sum) => Value::Number(sum / count as f64),
            Numeric::BigNumber(sum) => Value::BigNumber(sum / Decimal::from(count)),
        }
    }
}

pub fn decimal_to_f64(d: &Decimal) -> f64 {
    d.to_f64().unwrap_or(f64::NAN)
}

/// Converts a normalized subject value for numeric aggregation; `Ok(None)` for null.
///
/// Dates count as their epoch milliseconds and booleans as 1/0, both as floats. Strings must
/// parse as a number.
pub fn coerce_numeric(value: &Value, column: &str) -> Result<Option<Numeric>, CoercionError> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(Numeric::Integer(*i))),
        Value::Number(n) => Ok(Some(Numeric::Number(*n))),
        Value::BigNumber(d) => Ok(Some(Numeric::BigNumber(*d))),
        Value::Date(d) => Ok(Some(Numeric::Number(epoch_millis(d) as f64))),
        Value::Boolean(b) => Ok(Some(Numeric::Number(if *b { 1.0 } else { 0.0 }))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|n| Some(Numeric::Number(n)))
            .map_err(|_| CoercionError::not_numeric(column, ValueType::String)),
        Value::Binary(_) => Err(CoercionError::not_numeric(column, ValueType::Binary)),
    }
}

/// Output type of SUM / AVERAGE for a subject of type `subject`.
pub fn sum_result_type(subject: ValueType, legacy_numeric_return_type: bool) -> ValueType {
    if legacy_numeric_return_type || !subject.is_numeric() {
        ValueType::Number
    } else {
        subject
    }
}
