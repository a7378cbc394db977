//! Column metadata: logical type plus the way values of the column are stored in rows.

use crate::value::{Value, ValueType};
use ahash::AHashMap;
use encoding_rs::{Encoding, UTF_8};
use std::sync::Arc;

/// Decoding rule for columns whose values arrive as raw (not yet converted) bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryStorage {
    pub encoding: &'static Encoding,
    /// Trim surrounding whitespace before converting.
    pub trim: bool,
    /// `chrono` format used for date columns; `None` means [`crate::value::DEFAULT_DATE_FORMAT`].
    pub date_format: Option<String>,
}

impl BinaryStorage {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            trim: false,
            date_format: None,
        }
    }

    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }
}

impl Default for BinaryStorage {
    fn default() -> Self {
        Self::new(UTF_8)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum StorageType {
    /// Cells hold decoded values.
    #[default]
    Normal,
    /// Cells hold raw bytes, decoded lazily.
    BinaryString(BinaryStorage),
    /// Cells hold an index into this dictionary.
    Indexed(Arc<[Value]>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueMeta {
    pub name: String,
    pub value_type: ValueType,
    pub storage: StorageType,
}

impl ValueMeta {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            storage: StorageType::Normal,
        }
    }

    pub fn with_binary_storage(mut self, storage: BinaryStorage) -> Self {
        self.storage = StorageType::BinaryString(storage);
        self
    }

    pub fn with_dictionary(mut self, dictionary: impl Into<Arc<[Value]>>) -> Self {
        self.storage = StorageType::Indexed(dictionary.into());
        self
    }

    pub fn is_storage_normal(&self) -> bool {
        matches!(self.storage, StorageType::Normal)
    }

    /// Same column, renamed.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// The metadata a decoded copy of this column carries.
    pub fn to_normal_storage(&self) -> Self {
        Self::new(self.name.clone(), self.value_type)
    }

    /// True when both describe the same type and storage (names are not compared).
    pub fn same_shape(&self, other: &ValueMeta) -> bool {
        self.value_type == other.value_type && self.storage == other.storage
    }
}

/// Ordered row schema with name lookup.
#[derive(Clone, Debug, Default)]
pub struct RowMeta {
    fields: Vec<ValueMeta>,
    index: AHashMap<String, usize>,
}

impl RowMeta {
    pub fn new(fields: Vec<ValueMeta>) -> Self {
        let mut meta = Self::default();
        for field in fields {
            meta.push(field);
        }
        meta
    }

    /// Appends a column. On a duplicate name, lookups resolve to the first column.
    pub fn push(&mut self, field: ValueMeta) {
        let idx = self.fields.len();
        self.index.entry(field.name.clone()).or_insert(idx);
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[ValueMeta] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Option<&ValueMeta> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&ValueMeta> {
        self.index_of(name).map(|idx| &self.fields[idx])
    }

    /// Swaps the metadata of the column called `meta.name`. Returns false when no column matches.
    pub(crate) fn replace_by_name(&mut self, meta: ValueMeta) -> bool {
        match self.index_of(&meta.name) {
            Some(idx) => {
                self.fields[idx] = meta;
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl PartialEq for RowMeta {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_resolve_to_the_first_column() {
        let mut meta = RowMeta::new(vec![
            ValueMeta::new("a", ValueType::Integer),
            ValueMeta::new("b", ValueType::String),
            ValueMeta::new("a", ValueType::Number),
        ]);
        assert_eq!(meta.index_of("a"), Some(0));
        assert_eq!(meta.index_of("b"), Some(1));
        assert_eq!(meta.index_of("c"), None);

        assert!(meta.replace_by_name(ValueMeta::new("a", ValueType::BigNumber)));
        assert_eq!(meta.field(0).unwrap().value_type, ValueType::BigNumber);
        assert_eq!(meta.field(2).unwrap().value_type, ValueType::Number);
        assert!(!meta.replace_by_name(ValueMeta::new("c", ValueType::Integer)));
    }
}
