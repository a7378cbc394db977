use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Default textual date layout for binary-string date columns and date display.
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// Logical type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    String,
    Integer,
    Number,
    BigNumber,
    Date,
    Boolean,
    Binary,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueType::Integer | ValueType::Number | ValueType::BigNumber
        )
    }

    /// Zero of this type, for the numeric types only.
    pub fn zero(self) -> Option<Value> {
        match self {
            ValueType::Integer => Some(Value::Integer(0)),
            ValueType::Number => Some(Value::Number(0.0)),
            ValueType::BigNumber => Some(Value::BigNumber(Decimal::ZERO)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "String",
            ValueType::Integer => "Integer",
            ValueType::Number => "Number",
            ValueType::BigNumber => "BigNumber",
            ValueType::Date => "Date",
            ValueType::Boolean => "Boolean",
            ValueType::Binary => "Binary",
        };
        f.write_str(name)
    }
}

/// A decoded, canonical column value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(Arc<str>),
    Integer(i64),
    Number(f64),
    BigNumber(Decimal),
    Date(NaiveDateTime),
    Boolean(bool),
    Binary(Arc<[u8]>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The logical type of a non-null value.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(ValueType::String),
            Value::Integer(_) => Some(ValueType::Integer),
            Value::Number(_) => Some(ValueType::Number),
            Value::BigNumber(_) => Some(ValueType::BigNumber),
            Value::Date(_) => Some(ValueType::Date),
            Value::Boolean(_) => Some(ValueType::Boolean),
            Value::Binary(_) => Some(ValueType::Binary),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Number(_) | Value::BigNumber(_) => 2,
            Value::Date(_) => 3,
            Value::String(_) => 4,
            Value::Binary(_) => 5,
        }
    }
}

/// Milliseconds since the Unix epoch, treating the date as UTC.
pub fn epoch_millis(date: &NaiveDateTime) -> i64 {
    date.and_utc().timestamp_millis()
}

/// Total order used by MIN/MAX. Nulls sort first.
///
/// Values of one column share a type; mixed numeric types compare numerically and anything
/// else falls back to a fixed type rank.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::String(a), Value::String(b)) => a.as_ref().cmp(b.as_ref()),
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
        (Value::BigNumber(a), Value::BigNumber(b)) => a.cmp(b),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        // Shorter binaries sort first; equal lengths compare bytewise.
        (Value::Binary(a), Value::Binary(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        (Value::Integer(a), Value::Number(b)) => (*a as f64).total_cmp(b),
        (Value::Number(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
        (Value::BigNumber(a), Value::Integer(b)) => a.cmp(&Decimal::from(*b)),
        (Value::Integer(a), Value::BigNumber(b)) => Decimal::from(*a).cmp(b),
        (Value::BigNumber(a), Value::Number(b)) => {
            crate::numeric::decimal_to_f64(a).total_cmp(b)
        }
        (Value::Number(a), Value::BigNumber(b)) => {
            a.total_cmp(&crate::numeric::decimal_to_f64(b))
        }
        _ => a.type_rank().cmp(&b.type_rank()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::BigNumber(d) => write!(f, "{d}"),
            Value::Date(d) => write!(f, "{}", d.format(DEFAULT_DATE_FORMAT)),
            Value::Boolean(b) => f.write_str(if *b { "Y" } else { "N" }),
            Value::Binary(bytes) => {
                for b in bytes.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::BigNumber(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Date(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
