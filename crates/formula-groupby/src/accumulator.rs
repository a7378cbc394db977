//! Per-group aggregate state.
//!
//! Each configured aggregate owns one [`AccumulatorSlot`], chosen by its
//! [`AggregateFunction`] when the group is seeded. A row is applied in two steps: the engine
//! first turns every subject cell into a [`SlotInput`] (which is where coercion can fail), then
//! [`Accumulator::update`] applies all inputs at once. Running sums are staged before anything
//! is written, so a row that overflows one sum leaves every slot untouched.

use crate::config::{AggregateFunction, BoundAggregate, EngineConfig};
use crate::error::CoercionError;
use crate::key::KeyPart;
use crate::numeric::{coerce_numeric, Numeric};
use crate::stats;
use crate::value::{compare_values, epoch_millis, Value, ValueType};
use ahash::AHashSet;
use std::sync::Arc;

/// A subject cell, prepared for the slot that will consume it.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotInput {
    Value(Value),
    Numeric(Option<Numeric>),
}

impl SlotInput {
    /// Converts a normalized subject value into what `function` consumes.
    pub fn prepare(
        function: AggregateFunction,
        value: Value,
        column: &str,
    ) -> Result<Self, CoercionError> {
        match function {
            AggregateFunction::Sum
            | AggregateFunction::Average
            | AggregateFunction::Median
            | AggregateFunction::Percentile
            | AggregateFunction::StandardDeviation => {
                Ok(SlotInput::Numeric(coerce_numeric(&value, column)?))
            }
            // Dates take part in MIN/MAX as their epoch milliseconds.
            AggregateFunction::Min | AggregateFunction::Max => Ok(SlotInput::Value(match value {
                Value::Date(d) => Value::Number(epoch_millis(&d) as f64),
                other => other,
            })),
            AggregateFunction::CountAll
            | AggregateFunction::CountAny
            | AggregateFunction::CountDistinct
            | AggregateFunction::ConcatComma
            | AggregateFunction::ConcatString
            | AggregateFunction::First
            | AggregateFunction::FirstIncludingNull
            | AggregateFunction::Last
            | AggregateFunction::LastIncludingNull => Ok(SlotInput::Value(value)),
        }
    }

    fn is_null(&self) -> bool {
        match self {
            SlotInput::Value(v) => v.is_null(),
            SlotInput::Numeric(n) => n.is_none(),
        }
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            SlotInput::Numeric(n) => *n,
            SlotInput::Value(_) => None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            SlotInput::Value(v) => v,
            SlotInput::Numeric(n) => n.map_or(Value::Null, Numeric::into_value),
        }
    }
}

#[derive(Clone, Debug)]
pub enum AccumulatorSlot {
    Min {
        current: Option<Value>,
        /// Set once a null is seen while nulls count for MIN.
        null_seen: bool,
    },
    Max {
        current: Option<Value>,
    },
    Sum {
        sum: Option<Numeric>,
    },
    Average {
        sum: Option<Numeric>,
        count: u64,
    },
    CountAll(u64),
    CountAny(u64),
    CountDistinct(AHashSet<KeyPart>),
    Concat {
        separator: Arc<str>,
        text: Option<String>,
    },
    First(Option<Value>),
    /// `None` until the first row; `Some(Value::Null)` once a null was recorded.
    FirstIncludingNull(Option<Value>),
    Last(Option<Value>),
    LastIncludingNull(Option<Value>),
    Median(Vec<f64>),
    Percentile {
        fraction: f64,
        samples: Vec<f64>,
    },
    StandardDeviation(Vec<f64>),
}

impl AccumulatorSlot {
    pub(crate) fn seed(aggregate: &BoundAggregate) -> Self {
        match aggregate.function {
            AggregateFunction::Min => AccumulatorSlot::Min {
                current: None,
                null_seen: false,
            },
            AggregateFunction::Max => AccumulatorSlot::Max { current: None },
            AggregateFunction::Sum => AccumulatorSlot::Sum { sum: None },
            AggregateFunction::Average => AccumulatorSlot::Average {
                sum: None,
                count: 0,
            },
            AggregateFunction::CountAll => AccumulatorSlot::CountAll(0),
            AggregateFunction::CountAny => AccumulatorSlot::CountAny(0),
            AggregateFunction::CountDistinct => AccumulatorSlot::CountDistinct(AHashSet::new()),
            AggregateFunction::ConcatComma | AggregateFunction::ConcatString => {
                AccumulatorSlot::Concat {
                    separator: aggregate.separator.clone(),
                    text: None,
                }
            }
            AggregateFunction::First => AccumulatorSlot::First(None),
            AggregateFunction::FirstIncludingNull => AccumulatorSlot::FirstIncludingNull(None),
            AggregateFunction::Last => AccumulatorSlot::Last(None),
            AggregateFunction::LastIncludingNull => AccumulatorSlot::LastIncludingNull(None),
            AggregateFunction::Median => AccumulatorSlot::Median(Vec::new()),
            AggregateFunction::Percentile => AccumulatorSlot::Percentile {
                fraction: aggregate.fraction,
                samples: Vec::new(),
            },
            AggregateFunction::StandardDeviation => AccumulatorSlot::StandardDeviation(Vec::new()),
        }
    }

    /// The running sum this slot would hold after `input`, without writing it.
    fn stage_sum(&self, input: &SlotInput, column: &str) -> Result<Option<Numeric>, CoercionError> {
        let (AccumulatorSlot::Sum { sum } | AccumulatorSlot::Average { sum, .. }) = self else {
            return Ok(None);
        };
        let Some(x) = input.numeric() else {
            return Ok(*sum);
        };
        match sum {
            None => Ok(Some(x)),
            Some(s) => s
                .checked_add(x)
                .map(Some)
                .ok_or_else(|| CoercionError::overflow(column)),
        }
    }

    fn apply(&mut self, input: SlotInput, staged_sum: Option<Numeric>, config: &EngineConfig) {
        let is_null = input.is_null();
        match self {
            AccumulatorSlot::Min { current, null_seen } => {
                if is_null {
                    if config.min_null_is_valued {
                        *null_seen = true;
                    }
                    return;
                }
                let value = input.into_value();
                // The first contribution seeds the slot without comparing.
                let replace = current
                    .as_ref()
                    .map_or(true, |cur| compare_values(&value, cur).is_lt());
                if replace {
                    *current = Some(value);
                }
            }
            AccumulatorSlot::Max { current } => {
                if is_null {
                    return;
                }
                let value = input.into_value();
                let replace = current
                    .as_ref()
                    .map_or(true, |cur| compare_values(&value, cur).is_gt());
                if replace {
                    *current = Some(value);
                }
            }
            AccumulatorSlot::Sum { sum } => *sum = staged_sum,
            AccumulatorSlot::Average { sum, count } => {
                if !is_null {
                    *sum = staged_sum;
                    *count += 1;
                }
            }
            AccumulatorSlot::CountAll(n) => {
                if !is_null {
                    *n += 1;
                }
            }
            AccumulatorSlot::CountAny(n) => *n += 1,
            AccumulatorSlot::CountDistinct(set) => {
                if !is_null {
                    set.insert(KeyPart::from_value(&input.into_value()));
                }
            }
            AccumulatorSlot::Concat { separator, text } => {
                if is_null {
                    return;
                }
                let value = input.into_value();
                match text {
                    None => *text = Some(value.to_string()),
                    Some(buf) => {
                        buf.push_str(separator);
                        buf.push_str(&value.to_string());
                    }
                }
            }
            AccumulatorSlot::First(first) => {
                if first.is_none() && !is_null {
                    *first = Some(input.into_value());
                }
            }
            AccumulatorSlot::FirstIncludingNull(first) => {
                if first.is_none() {
                    *first = Some(input.into_value());
                }
            }
            AccumulatorSlot::Last(last) => {
                if !is_null {
                    *last = Some(input.into_value());
                }
            }
            AccumulatorSlot::LastIncludingNull(last) => *last = Some(input.into_value()),
            AccumulatorSlot::Median(samples)
            | AccumulatorSlot::Percentile { samples, .. }
            | AccumulatorSlot::StandardDeviation(samples) => {
                if let Some(x) = input.numeric() {
                    samples.push(x.to_f64());
                }
            }
        }
    }

    /// Produces the output value. `result_type` is the declared type of the output column.
    pub(crate) fn finalize(self, result_type: ValueType, config: &EngineConfig) -> Value {
        let zero_when_null = matches!(
            self,
            AccumulatorSlot::Min { .. }
                | AccumulatorSlot::Max { .. }
                | AccumulatorSlot::Sum { .. }
                | AccumulatorSlot::Average { .. }
                | AccumulatorSlot::Median(_)
                | AccumulatorSlot::Percentile { .. }
                | AccumulatorSlot::StandardDeviation(_)
        );

        let value = match self {
            AccumulatorSlot::Min { current, null_seen } => {
                if null_seen {
                    Value::Null
                } else {
                    current.unwrap_or(Value::Null)
                }
            }
            AccumulatorSlot::Max { current } => current.unwrap_or(Value::Null),
            AccumulatorSlot::Sum { sum } => match sum {
                None => Value::Null,
                Some(s) if config.legacy_numeric_return_type => Value::Number(s.to_f64()),
                Some(s) => s.into_value(),
            },
            AccumulatorSlot::Average { sum, count } => match sum {
                None => Value::Null,
                Some(s) if config.legacy_numeric_return_type => {
                    Value::Number(s.to_f64() / count as f64)
                }
                Some(s) => s.divide(count),
            },
            AccumulatorSlot::CountAll(n) | AccumulatorSlot::CountAny(n) => count_value(n),
            AccumulatorSlot::CountDistinct(set) => count_value(set.len() as u64),
            AccumulatorSlot::Concat { text, .. } => text.map_or(Value::Null, Value::from),
            AccumulatorSlot::First(v)
            | AccumulatorSlot::FirstIncludingNull(v)
            | AccumulatorSlot::Last(v)
            | AccumulatorSlot::LastIncludingNull(v) => v.unwrap_or(Value::Null),
            AccumulatorSlot::Median(mut samples) => stats::median(&mut samples).into(),
            AccumulatorSlot::Percentile {
                fraction,
                mut samples,
            } => stats::percentile(&mut samples, fraction).into(),
            AccumulatorSlot::StandardDeviation(samples) => {
                stats::standard_deviation(&samples).into()
            }
        };

        if value.is_null() && zero_when_null && config.all_nulls_are_zero {
            return result_type.zero().unwrap_or(Value::Null);
        }
        value
    }
}

fn count_value(n: u64) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// All slots of one group, in aggregate order.
#[derive(Clone, Debug)]
pub struct Accumulator {
    slots: Vec<AccumulatorSlot>,
}

impl Accumulator {
    pub(crate) fn seed(aggregates: &[BoundAggregate]) -> Self {
        Self {
            slots: aggregates.iter().map(AccumulatorSlot::seed).collect(),
        }
    }

    /// Applies one row. On error no slot has changed.
    pub(crate) fn update(
        &mut self,
        aggregates: &[BoundAggregate],
        inputs: Vec<SlotInput>,
        config: &EngineConfig,
    ) -> Result<(), CoercionError> {
        debug_assert_eq!(inputs.len(), self.slots.len());

        let mut staged = Vec::with_capacity(self.slots.len());
        for ((slot, input), aggregate) in self.slots.iter().zip(&inputs).zip(aggregates) {
            staged.push(slot.stage_sum(input, &aggregate.output_name)?);
        }

        for ((slot, input), sum) in self.slots.iter_mut().zip(inputs).zip(staged) {
            slot.apply(input, sum, config);
        }
        Ok(())
    }

    pub(crate) fn finalize(self, result_types: &[ValueType], config: &EngineConfig) -> Vec<Value> {
        self.slots
            .into_iter()
            .zip(result_types)
            .map(|(slot, ty)| slot.finalize(*ty, config))
            .collect()
    }
}
