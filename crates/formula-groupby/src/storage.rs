//! Row cells as they arrive from upstream, and the normalizer that turns them into canonical
//! [`Value`]s.
//!
//! A cell may still be in its on-the-wire form: raw bytes of a text file column, or an index
//! into a per-column dictionary. Everything that compares, hashes, or accumulates values goes
//! through [`Normalizer::normalize`], so two encodings of the same logical value always meet as
//! the same canonical value.

use crate::error::{CoercionError, ErrorCode};
use crate::meta::{BinaryStorage, StorageType, ValueMeta};
use crate::value::{Value, ValueType, DEFAULT_DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

/// A cell of an input row.
#[derive(Clone, Debug, PartialEq)]
pub enum StoredValue {
    Normal(Value),
    Binary(Arc<[u8]>),
    Index(u32),
}

impl StoredValue {
    pub fn null() -> Self {
        StoredValue::Normal(Value::Null)
    }

    pub fn binary(bytes: impl AsRef<[u8]>) -> Self {
        StoredValue::Binary(Arc::from(bytes.as_ref()))
    }

    /// Decodes the cell into the column's logical type.
    ///
    /// Empty byte strings decode to an empty string for string columns and to null otherwise.
    pub fn decode(&self, meta: &ValueMeta) -> Result<Value, CoercionError> {
        match self {
            StoredValue::Normal(value) => Ok(value.clone()),
            StoredValue::Binary(bytes) => match &meta.storage {
                StorageType::BinaryString(storage) => decode_binary_string(meta, storage, bytes),
                _ if meta.value_type == ValueType::Binary => Ok(Value::Binary(bytes.clone())),
                _ => decode_binary_string(meta, &BinaryStorage::default(), bytes),
            },
            StoredValue::Index(idx) => {
                let StorageType::Indexed(dictionary) = &meta.storage else {
                    return Err(CoercionError::new(
                        ErrorCode::BadIndex,
                        &meta.name,
                        "column is not dictionary-encoded",
                    ));
                };
                dictionary.get(*idx as usize).cloned().ok_or_else(|| {
                    CoercionError::new(
                        ErrorCode::BadIndex,
                        &meta.name,
                        format!(
                            "index {idx} outside dictionary of {} entries",
                            dictionary.len()
                        ),
                    )
                })
            }
        }
    }
}

impl From<Value> for StoredValue {
    fn from(value: Value) -> Self {
        StoredValue::Normal(value)
    }
}

fn decode_binary_string(
    meta: &ValueMeta,
    storage: &BinaryStorage,
    bytes: &Arc<[u8]>,
) -> Result<Value, CoercionError> {
    match meta.value_type {
        ValueType::Binary => Ok(Value::Binary(bytes.clone())),
        ValueType::String => Ok(Value::String(Arc::from(decode_text(storage, bytes).as_ref()))),
        ValueType::Integer
        | ValueType::Number
        | ValueType::BigNumber
        | ValueType::Date
        | ValueType::Boolean => parse_text(meta, storage, &decode_text(storage, bytes)),
    }
}

fn decode_text<'a>(storage: &BinaryStorage, bytes: &'a [u8]) -> Cow<'a, str> {
    let (text, _) = storage.encoding.decode_without_bom_handling(bytes);
    if !storage.trim {
        return text;
    }
    match text {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
        Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
    }
}

/// Converts decoded text into a non-string logical type.
fn parse_text(
    meta: &ValueMeta,
    storage: &BinaryStorage,
    text: &str,
) -> Result<Value, CoercionError> {
    // "5 spaces" is null once trimmed, whatever the target type.
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }

    let undecodable = || {
        CoercionError::new(
            ErrorCode::Undecodable,
            &meta.name,
            format!("cannot convert {text:?} to {}", meta.value_type),
        )
    };

    match meta.value_type {
        ValueType::Integer => text
            .strip_prefix('+')
            .unwrap_or(text)
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| undecodable()),
        ValueType::Number => text
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| undecodable()),
        ValueType::BigNumber => parse_decimal(text)
            .map(Value::BigNumber)
            .ok_or_else(undecodable),
        ValueType::Date => {
            let format = storage.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
            parse_date(text, format)
                .map(Value::Date)
                .ok_or_else(undecodable)
        }
        ValueType::Boolean => Ok(Value::Boolean(parse_boolean(text))),
        ValueType::String => Ok(Value::from(text)),
        ValueType::Binary => Ok(Value::Binary(Arc::from(text.as_bytes()))),
    }
}

pub(crate) fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn parse_date(text: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// `Y`, `YES`, `TRUE` (any case) and `1` are true; anything else is false.
pub fn parse_boolean(text: &str) -> bool {
    text.eq_ignore_ascii_case("y")
        || text.eq_ignore_ascii_case("yes")
        || text.eq_ignore_ascii_case("true")
        || text == "1"
}

/// Decodes cells and applies the run's null rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Normalizer {
    empty_string_differs_from_null: bool,
}

impl Normalizer {
    pub fn new(empty_string_differs_from_null: bool) -> Self {
        Self {
            empty_string_differs_from_null,
        }
    }

    pub fn normalize(&self, meta: &ValueMeta, cell: &StoredValue) -> Result<Value, CoercionError> {
        let value = cell.decode(meta)?;
        Ok(match value {
            Value::String(s) if s.is_empty() && !self.empty_string_differs_from_null => Value::Null,
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{UTF_16LE, WINDOWS_1252};
    use pretty_assertions::assert_eq;

    #[test]
    fn binary_string_decodes_with_column_encoding() {
        let meta = ValueMeta::new("city", ValueType::String)
            .with_binary_storage(BinaryStorage::new(WINDOWS_1252));
        let cell = StoredValue::binary([b'Z', 0xFC, b'r', b'i', b'c', b'h']);
        assert_eq!(cell.decode(&meta).unwrap(), Value::from("Zürich"));

        let utf16 = ValueMeta::new("city", ValueType::String)
            .with_binary_storage(BinaryStorage::new(UTF_16LE));
        let wide: Vec<u8> = "Zürich".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(
            StoredValue::binary(wide).decode(&utf16).unwrap(),
            Value::from("Zürich")
        );
    }

    #[test]
    fn binary_string_text_and_raw_columns() {
        let raw = ValueMeta::new("blob", ValueType::Binary)
            .with_binary_storage(BinaryStorage::default().with_trim(true));
        assert_eq!(
            StoredValue::binary([0xFF, b' ', 0x00]).decode(&raw).unwrap(),
            Value::Binary(Arc::from(&[0xFF, b' ', 0x00][..]))
        );

        let text = ValueMeta::new("s", ValueType::String)
            .with_binary_storage(BinaryStorage::default().with_trim(true));
        assert_eq!(StoredValue::binary("  a b  ").decode(&text).unwrap(), Value::from("a b"));
        assert_eq!(StoredValue::binary("   ").decode(&text).unwrap(), Value::from(""));

        let untrimmed = ValueMeta::new("s", ValueType::String)
            .with_binary_storage(BinaryStorage::default());
        assert_eq!(
            StoredValue::binary(" a ").decode(&untrimmed).unwrap(),
            Value::from(" a ")
        );
    }

    #[test]
    fn binary_string_parses_logical_type() {
        let int = ValueMeta::new("n", ValueType::Integer)
            .with_binary_storage(BinaryStorage::default().with_trim(true));
        assert_eq!(StoredValue::binary(" +42 ").decode(&int).unwrap(), Value::Integer(42));
        assert_eq!(StoredValue::binary("   ").decode(&int).unwrap(), Value::Null);

        let err = StoredValue::binary("4x2").decode(&int).unwrap_err();
        assert_eq!(err.code, ErrorCode::Undecodable);

        let date = ValueMeta::new("d", ValueType::Date)
            .with_binary_storage(BinaryStorage::default().with_date_format("%Y-%m-%d"));
        let expected = NaiveDate::from_ymd_opt(2021, 6, 30)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            StoredValue::binary("2021-06-30").decode(&date).unwrap(),
            Value::Date(expected)
        );

        let flag = ValueMeta::new("b", ValueType::Boolean)
            .with_binary_storage(BinaryStorage::default());
        assert_eq!(StoredValue::binary("yes").decode(&flag).unwrap(), Value::Boolean(true));
        assert_eq!(StoredValue::binary("0").decode(&flag).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn indexed_cells_resolve_through_dictionary() {
        let meta = ValueMeta::new("k", ValueType::String)
            .with_dictionary(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(StoredValue::Index(1).decode(&meta).unwrap(), Value::from("b"));
        assert_eq!(
            StoredValue::Index(2).decode(&meta).unwrap_err().code,
            ErrorCode::BadIndex
        );
    }

    #[test]
    fn empty_string_is_null_unless_configured() {
        let meta = ValueMeta::new("s", ValueType::String);
        let cell = StoredValue::Normal(Value::from(""));
        assert_eq!(Normalizer::default().normalize(&meta, &cell).unwrap(), Value::Null);
        assert_eq!(
            Normalizer::new(true).normalize(&meta, &cell).unwrap(),
            Value::from("")
        );
    }
}
