//! Reconciles the declared output schema with what finalization actually produced.
//!
//! Group columns are declared with the input column's metadata, which may describe binary or
//! dictionary storage; the emitted values are always decoded. Aggregates can also produce a
//! runtime type that differs from the declared placeholder. Before rows go downstream, each
//! mismatching column is replaced by the metadata observed at runtime, matched by name.

use crate::meta::{RowMeta, ValueMeta};
use crate::value::Value;

/// Metadata for each output column as the finalized rows show it.
///
/// A column takes the type of its first non-null value; an all-null column keeps its declared
/// type. Emitted values are always in normal storage.
pub fn observe_output(declared: &RowMeta, rows: &[Vec<Value>]) -> Vec<ValueMeta> {
    declared
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, meta)| {
            let observed_type = rows
                .iter()
                .filter_map(|row| row.get(idx))
                .find_map(Value::value_type);
            match observed_type {
                Some(ty) => ValueMeta::new(meta.name.clone(), ty),
                None => meta.to_normal_storage(),
            }
        })
        .collect()
}

/// Replaces every entry of `declared` whose type or storage differs from the observed entry of
/// the same name. Observed entries without a matching name are ignored.
///
/// Returns how many entries were replaced.
pub fn update_value_meta(declared: &mut RowMeta, observed: &[ValueMeta]) -> usize {
    let mut replaced = 0;
    for meta in observed {
        let Some(current) = declared.field_by_name(&meta.name) else {
            log::trace!("no output column named {:?}; leaving schema as declared", meta.name);
            continue;
        };
        if current.same_shape(meta) {
            continue;
        }
        log::debug!(
            "output column {:?}: declared {} ({:?}), produced {}",
            meta.name,
            current.value_type,
            current.storage,
            meta.value_type
        );
        if declared.replace_by_name(meta.clone()) {
            replaced += 1;
        }
    }
    replaced
}
