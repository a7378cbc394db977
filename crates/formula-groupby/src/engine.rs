//! The group-by operator.
//!
//! [`GroupByEngine`] is a full-barrier aggregation: it consumes every input row, keeping one
//! [`Accumulator`] per distinct [`GroupKey`], and emits one row per group only once the input
//! has ended. The whole table lives in memory; its size is bounded by the number of distinct
//! groups, not by the number of rows.
//!
//! Lifecycle (`EngineState`):
//!
//! ```text
//! Idle --first row--> Accumulating --end of input--> Finalizing --rows emitted--> Done
//!   \                      |
//!    +------abort()--------+--> Aborted   (table discarded, nothing emitted)
//! ```
//!
//! Rows that fail conversion are diverted to the [`ErrorSink`] and leave the table untouched.

use crate::accumulator::{Accumulator, SlotInput};
use crate::config::{AggregateFunction, BoundAggregate, BoundSpec, EngineConfig, GroupBySpec};
use crate::error::{CoercionError, ErrorRow, GroupByError, GroupByResult};
use crate::key::{GroupKey, KeyPart};
use crate::meta::{RowMeta, ValueMeta};
use crate::numeric::sum_result_type;
use crate::reconcile::{observe_output, update_value_meta};
use crate::storage::{Normalizer, StoredValue};
use crate::value::{Value, ValueType};
use ahash::AHashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Accumulating,
    Finalizing,
    Done,
    Aborted,
}

impl EngineState {
    pub fn name(self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Accumulating => "accumulating",
            EngineState::Finalizing => "finalizing",
            EngineState::Done => "done",
            EngineState::Aborted => "aborted",
        }
    }
}

/// Pull-style upstream.
pub trait RowSource {
    /// Next row, or `None` at end of input.
    fn next_row(&mut self) -> GroupByResult<Option<Vec<StoredValue>>>;

    /// Set when the surrounding pipeline wants the run cancelled.
    fn is_stopped(&self) -> bool {
        false
    }
}

/// Push-style downstream.
pub trait RowSink {
    fn put_row(&mut self, meta: &RowMeta, row: Vec<Value>) -> GroupByResult<()>;
}

/// Side channel for rejected rows.
pub trait ErrorSink {
    fn put_error(&mut self, error: ErrorRow);
}

impl ErrorSink for Vec<ErrorRow> {
    fn put_error(&mut self, error: ErrorRow) {
        self.push(error);
    }
}

/// In-memory upstream over prepared rows.
#[derive(Debug, Default)]
pub struct VecRowSource {
    rows: std::vec::IntoIter<Vec<StoredValue>>,
}

impl VecRowSource {
    pub fn new(rows: Vec<Vec<StoredValue>>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }

    /// Rows of already-decoded values.
    pub fn from_values(rows: Vec<Vec<Value>>) -> Self {
        Self::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(StoredValue::Normal).collect())
                .collect(),
        )
    }
}

impl RowSource for VecRowSource {
    fn next_row(&mut self) -> GroupByResult<Option<Vec<StoredValue>>> {
        Ok(self.rows.next())
    }
}

/// In-memory downstream; keeps the schema it was handed along with the rows.
#[derive(Debug, Default)]
pub struct VecRowSink {
    pub meta: Option<RowMeta>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSink for VecRowSink {
    fn put_row(&mut self, meta: &RowMeta, row: Vec<Value>) -> GroupByResult<()> {
        if self.meta.is_none() {
            self.meta = Some(meta.clone());
        }
        self.rows.push(row);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupByStats {
    pub rows_read: u64,
    pub rows_rejected: u64,
    pub groups: u64,
    pub rows_written: u64,
}

/// Accumulators by group key, in first-seen order.
#[derive(Debug, Default)]
struct GroupTable {
    index: AHashMap<GroupKey, usize>,
    entries: Vec<(GroupKey, Accumulator)>,
}

impl GroupTable {
    fn get_mut(&mut self, key: &GroupKey) -> Option<&mut Accumulator> {
        let idx = *self.index.get(key)?;
        Some(&mut self.entries[idx].1)
    }

    fn insert(&mut self, key: GroupKey, accumulator: Accumulator) {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, accumulator));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_entries(self) -> Vec<(GroupKey, Accumulator)> {
        self.entries
    }
}

pub struct GroupByEngine {
    input: RowMeta,
    bound: BoundSpec,
    always_giving_back_one_row: bool,
    config: EngineConfig,
    normalizer: Normalizer,
    declared: RowMeta,
    result_types: Vec<ValueType>,
    table: GroupTable,
    state: EngineState,
    stats: GroupByStats,
}

impl GroupByEngine {
    /// Binds `spec` against the input schema. Unknown columns and bad parameters fail here,
    /// before any row is read.
    pub fn new(spec: &GroupBySpec, input: RowMeta, config: EngineConfig) -> GroupByResult<Self> {
        let bound = spec.bind(&input)?;
        let declared = declare_output(&input, &bound, &config);
        let result_types = declared
            .fields()
            .iter()
            .skip(bound.group_indices.len())
            .map(|m| m.value_type)
            .collect();

        log::debug!(
            "group by [{}] with {} aggregates ({config:?})",
            spec.group_fields.join(", "),
            bound.aggregates.len()
        );

        Ok(Self {
            input,
            bound,
            always_giving_back_one_row: spec.always_giving_back_one_row,
            normalizer: Normalizer::new(config.empty_string_differs_from_null),
            config,
            declared,
            result_types,
            table: GroupTable::default(),
            state: EngineState::Idle,
            stats: GroupByStats::default(),
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> GroupByStats {
        self.stats
    }

    pub fn group_count(&self) -> usize {
        self.table.len()
    }

    /// The output schema as declared before any row is seen: group columns, then aggregates.
    pub fn output_row_meta(&self) -> &RowMeta {
        &self.declared
    }

    /// Adds one row to its group, seeding the group on first sight.
    ///
    /// A row that fails conversion goes to `errors` and changes nothing. Only a malformed row
    /// or a call outside the accumulating phase is an error.
    pub fn process_row(
        &mut self,
        row: &[StoredValue],
        errors: &mut dyn ErrorSink,
    ) -> GroupByResult<()> {
        match self.state {
            EngineState::Idle => self.state = EngineState::Accumulating,
            EngineState::Accumulating => {}
            other => {
                return Err(GroupByError::InvalidState {
                    action: "accept rows",
                    state: other.name(),
                })
            }
        }
        if row.len() != self.input.len() {
            return Err(GroupByError::RowWidthMismatch {
                expected: self.input.len(),
                actual: row.len(),
            });
        }
        self.stats.rows_read += 1;

        if let Err(err) = self.add_to_aggregate(row) {
            self.stats.rows_rejected += 1;
            log::warn!("rejected row {}: {err} ({})", self.stats.rows_read, err.code);
            errors.put_error(ErrorRow::new(row, &err));
        }
        Ok(())
    }

    fn add_to_aggregate(&mut self, row: &[StoredValue]) -> Result<(), CoercionError> {
        let key = GroupKey::build(row, &self.bound.group_indices, &self.input, &self.normalizer)?;

        let mut inputs = Vec::with_capacity(self.bound.aggregates.len());
        for aggregate in &self.bound.aggregates {
            inputs.push(self.slot_input(aggregate, row)?);
        }

        let aggregates = &self.bound.aggregates;
        if let Some(accumulator) = self.table.get_mut(&key) {
            return accumulator.update(aggregates, inputs, &self.config);
        }

        let mut accumulator = Accumulator::seed(aggregates);
        accumulator.update(aggregates, inputs, &self.config)?;
        log::trace!("new group #{}: {:?}", self.table.len() + 1, key);
        self.table.insert(key, accumulator);
        Ok(())
    }

    fn slot_input(
        &self,
        aggregate: &BoundAggregate,
        row: &[StoredValue],
    ) -> Result<SlotInput, CoercionError> {
        let Some(idx) = aggregate.subject else {
            return Ok(SlotInput::Value(Value::Null));
        };
        let meta = &self.input.fields()[idx];
        let value = self.normalizer.normalize(meta, &row[idx])?;
        SlotInput::prepare(aggregate.function, value, &meta.name)
    }

    /// Ends the input: finalizes every group, reconciles the output schema and pushes the rows.
    ///
    /// Returns the schema the rows were emitted with.
    pub fn finish(&mut self, sink: &mut dyn RowSink) -> GroupByResult<RowMeta> {
        match self.state {
            EngineState::Idle | EngineState::Accumulating => self.state = EngineState::Finalizing,
            other => {
                return Err(GroupByError::InvalidState {
                    action: "finish",
                    state: other.name(),
                })
            }
        }

        let mut entries = std::mem::take(&mut self.table).into_entries();
        if entries.is_empty() && self.always_giving_back_one_row {
            let key = GroupKey::new(vec![KeyPart::Null; self.bound.group_indices.len()]);
            entries.push((key, Accumulator::seed(&self.bound.aggregates)));
        }
        self.stats.groups = entries.len() as u64;

        let rows: Vec<Vec<Value>> = entries
            .into_iter()
            .map(|(key, accumulator)| {
                let mut row = key.to_values();
                row.extend(accumulator.finalize(&self.result_types, &self.config));
                row
            })
            .collect();

        let mut meta = self.declared.clone();
        update_value_meta(&mut meta, &observe_output(&self.declared, &rows));

        for row in rows {
            if let Err(err) = sink.put_row(&meta, row) {
                self.state = EngineState::Aborted;
                return Err(err);
            }
            self.stats.rows_written += 1;
        }

        self.state = EngineState::Done;
        log::debug!(
            "group by finished: {} rows read, {} rejected, {} groups",
            self.stats.rows_read,
            self.stats.rows_rejected,
            self.stats.groups
        );
        Ok(meta)
    }

    /// Stops the run and drops all partial totals. Nothing is emitted afterwards.
    pub fn abort(&mut self) {
        if self.state != EngineState::Aborted {
            log::debug!(
                "group by aborted in state {} with {} groups",
                self.state.name(),
                self.table.len()
            );
        }
        self.table = GroupTable::default();
        self.state = EngineState::Aborted;
    }

    /// Drives the whole protocol: pull every row, then finalize into `sink`.
    ///
    /// A stop request or an upstream error aborts without emitting anything.
    pub fn run(
        &mut self,
        source: &mut dyn RowSource,
        sink: &mut dyn RowSink,
        errors: &mut dyn ErrorSink,
    ) -> GroupByResult<GroupByStats> {
        loop {
            if source.is_stopped() {
                self.abort();
                return Ok(self.stats);
            }
            let row = match source.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(err) => {
                    self.abort();
                    return Err(err);
                }
            };
            if let Err(err) = self.process_row(&row, errors) {
                self.abort();
                return Err(err);
            }
        }
        self.finish(sink)?;
        Ok(self.stats)
    }
}

fn declare_output(input: &RowMeta, bound: &BoundSpec, config: &EngineConfig) -> RowMeta {
    let mut out = RowMeta::default();
    for &idx in &bound.group_indices {
        out.push(input.fields()[idx].clone());
    }
    for aggregate in &bound.aggregates {
        out.push(declare_aggregate(input, aggregate, config));
    }
    out
}

fn declare_aggregate(
    input: &RowMeta,
    aggregate: &BoundAggregate,
    config: &EngineConfig,
) -> ValueMeta {
    let name = aggregate.output_name.clone();
    let subject = aggregate.subject.map(|idx| &input.fields()[idx]);
    let subject_type = subject.map_or(ValueType::Number, |m| m.value_type);

    match aggregate.function {
        AggregateFunction::CountAll
        | AggregateFunction::CountAny
        | AggregateFunction::CountDistinct => ValueMeta::new(name, ValueType::Integer),
        AggregateFunction::ConcatComma | AggregateFunction::ConcatString => {
            ValueMeta::new(name, ValueType::String)
        }
        AggregateFunction::Median
        | AggregateFunction::Percentile
        | AggregateFunction::StandardDeviation => ValueMeta::new(name, ValueType::Number),
        AggregateFunction::Sum | AggregateFunction::Average => ValueMeta::new(
            name,
            sum_result_type(subject_type, config.legacy_numeric_return_type),
        ),
        AggregateFunction::Min | AggregateFunction::Max if subject_type == ValueType::Date => {
            ValueMeta::new(name, ValueType::Number)
        }
        AggregateFunction::Min
        | AggregateFunction::Max
        | AggregateFunction::First
        | AggregateFunction::FirstIncludingNull
        | AggregateFunction::Last
        | AggregateFunction::LastIncludingNull => match subject {
            Some(meta) => meta.renamed(name),
            None => ValueMeta::new(name, ValueType::Number),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregateSpec;
    use pretty_assertions::assert_eq;

    fn engine(group: &[&str]) -> GroupByEngine {
        let input = RowMeta::new(vec![
            ValueMeta::new("k", ValueType::String),
            ValueMeta::new("v", ValueType::Integer),
        ]);
        let spec = GroupBySpec::new(
            group.iter().map(|s| s.to_string()).collect(),
            vec![AggregateSpec::new("v", "total", AggregateFunction::Sum)],
        );
        GroupByEngine::new(&spec, input, EngineConfig::default()).unwrap()
    }

    fn row(key: &str, v: i64) -> Vec<StoredValue> {
        vec![Value::from(key).into(), Value::Integer(v).into()]
    }

    #[test]
    fn no_rows_after_finalizing() {
        let mut engine = engine(&["k"]);
        let mut errors: Vec<ErrorRow> = Vec::new();
        let mut sink = VecRowSink::default();
        assert_eq!(engine.state(), EngineState::Idle);

        engine.process_row(&row("a", 1), &mut errors).unwrap();
        assert_eq!(engine.state(), EngineState::Accumulating);

        engine.finish(&mut sink).unwrap();
        assert_eq!(engine.state(), EngineState::Done);

        let err = engine.process_row(&row("a", 1), &mut errors).unwrap_err();
        assert!(matches!(err, GroupByError::InvalidState { state: "done", .. }));
        assert!(engine.finish(&mut sink).is_err());
    }

    #[test]
    fn abort_discards_partial_groups() {
        let mut engine = engine(&["k"]);
        let mut errors: Vec<ErrorRow> = Vec::new();
        engine.process_row(&row("a", 1), &mut errors).unwrap();
        assert_eq!(engine.group_count(), 1);

        engine.abort();
        assert_eq!(engine.group_count(), 0);
        assert_eq!(engine.state(), EngineState::Aborted);

        let mut sink = VecRowSink::default();
        assert!(engine.finish(&mut sink).is_err());
        assert!(sink.rows.is_empty());
    }

    #[test]
    fn row_width_mismatch_is_fatal() {
        let mut engine = engine(&[]);
        let err = engine
            .process_row(
                &[StoredValue::from(Value::Integer(1))],
                &mut Vec::<ErrorRow>::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            GroupByError::RowWidthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn declared_output_lists_groups_then_aggregates() {
        let engine = engine(&["k"]);
        assert_eq!(
            engine.output_row_meta().names().collect::<Vec<_>>(),
            vec!["k", "total"]
        );
        assert_eq!(
            engine.output_row_meta().field(1).unwrap().value_type,
            ValueType::Integer
        );
    }
}
