use crate::error::{CoercionError, ErrorCode};
use crate::meta::RowMeta;
use crate::storage::{Normalizer, StoredValue};
use crate::value::Value;
use chrono::NaiveDateTime;
use ordered_float::OrderedFloat;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Hashable form of a normalized value.
///
/// Used for group keys and for the per-group sets behind COUNT_DISTINCT.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    BigNumber(Decimal),
    Date(NaiveDateTime),
    String(Arc<str>),
    Binary(Arc<[u8]>),
}

impl KeyPart {
    /// `-0.0` folds into `0.0` and every NaN payload into one NaN.
    pub fn canonical_number(n: f64) -> OrderedFloat<f64> {
        if n == 0.0 {
            return OrderedFloat(0.0);
        }
        if n.is_nan() {
            return OrderedFloat(f64::NAN);
        }
        OrderedFloat(n)
    }

    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Boolean(b) => KeyPart::Boolean(*b),
            Value::Integer(i) => KeyPart::Integer(*i),
            Value::Number(n) => KeyPart::Number(Self::canonical_number(*n)),
            // 1.50 and 1.5 are one value.
            Value::BigNumber(d) => KeyPart::BigNumber(d.normalize()),
            Value::Date(d) => KeyPart::Date(*d),
            Value::String(s) => KeyPart::String(s.clone()),
            Value::Binary(b) => KeyPart::Binary(b.clone()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            KeyPart::Null => Value::Null,
            KeyPart::Boolean(b) => Value::Boolean(*b),
            KeyPart::Integer(i) => Value::Integer(*i),
            KeyPart::Number(n) => Value::Number(n.0),
            KeyPart::BigNumber(d) => Value::BigNumber(*d),
            KeyPart::Date(d) => Value::Date(*d),
            KeyPart::String(s) => Value::String(s.clone()),
            KeyPart::Binary(b) => Value::Binary(b.clone()),
        }
    }
}

/// Snapshot of a row's grouping columns.
///
/// Equality and hashing only see normalized values, never the storage a cell arrived in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(Box<[KeyPart]>);

impl GroupKey {
    /// The key every row maps to when there are no grouping columns.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts.into_boxed_slice())
    }

    /// Builds the key from the cells at `columns`, in that order.
    ///
    /// A column index missing from `input` or from `row` is a [`ErrorCode::BadIndex`] error.
    pub fn build(
        row: &[StoredValue],
        columns: &[usize],
        input: &RowMeta,
        normalizer: &Normalizer,
    ) -> Result<Self, CoercionError> {
        let mut parts = Vec::with_capacity(columns.len());
        for &idx in columns {
            let (Some(meta), Some(cell)) = (input.field(idx), row.get(idx)) else {
                return Err(CoercionError::new(
                    ErrorCode::BadIndex,
                    input.field(idx).map_or_else(|| format!("#{idx}"), |m| m.name.clone()),
                    format!(
                        "column {idx} outside row of {} cells and {} fields",
                        row.len(),
                        input.len()
                    ),
                ));
            };
            let value = normalizer.normalize(meta, cell)?;
            parts.push(KeyPart::from_value(&value));
        }
        Ok(Self::new(parts))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_values(&self) -> Vec<Value> {
        self.0.iter().map(KeyPart::to_value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{BinaryStorage, ValueMeta};
    use crate::value::ValueType;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &GroupKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn binary_and_decoded_cells_build_the_same_key() {
        let binary = RowMeta::new(vec![
            ValueMeta::new("name", ValueType::String).with_binary_storage(BinaryStorage::default()),
            ValueMeta::new("qty", ValueType::Integer).with_binary_storage(BinaryStorage::default()),
        ]);
        let plain = RowMeta::new(vec![
            ValueMeta::new("name", ValueType::String),
            ValueMeta::new("qty", ValueType::Integer),
        ]);
        let normalizer = Normalizer::default();

        let a = GroupKey::build(
            &[StoredValue::binary("widget"), StoredValue::binary("7")],
            &[0, 1],
            &binary,
            &normalizer,
        )
        .unwrap();
        let b = GroupKey::build(
            &[Value::from("widget").into(), Value::Integer(7).into()],
            &[0, 1],
            &plain,
            &normalizer,
        )
        .unwrap();

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn numbers_and_decimals_are_canonicalized() {
        assert_eq!(
            KeyPart::from_value(&Value::Number(-0.0)),
            KeyPart::from_value(&Value::Number(0.0))
        );
        let a: Decimal = "1.50".parse().unwrap();
        let b: Decimal = "1.5".parse().unwrap();
        assert_eq!(
            KeyPart::from_value(&Value::BigNumber(a)),
            KeyPart::from_value(&Value::BigNumber(b))
        );
    }

    #[test]
    fn short_rows_and_unknown_columns_are_errors() {
        let input = RowMeta::new(vec![
            ValueMeta::new("k", ValueType::String),
            ValueMeta::new("v", ValueType::Integer),
        ]);
        let normalizer = Normalizer::default();

        let err = GroupKey::build(&[Value::from("a").into()], &[0, 1], &input, &normalizer)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BadIndex);
        assert_eq!(err.column, "v");

        let err = GroupKey::build(
            &[Value::from("a").into(), Value::Integer(1).into()],
            &[2],
            &input,
            &normalizer,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::BadIndex);
        assert_eq!(err.column, "#2");
    }

    #[test]
    fn no_group_columns_yield_the_empty_key() {
        let key = GroupKey::build(
            &[Value::Integer(1).into()],
            &[],
            &RowMeta::new(vec![ValueMeta::new("v", ValueType::Integer)]),
            &Normalizer::default(),
        )
        .unwrap();
        assert_eq!(key, GroupKey::empty());
        assert!(key.is_empty());
    }
}
