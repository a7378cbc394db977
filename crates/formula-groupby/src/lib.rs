#![forbid(unsafe_code)]

mod accumulator;
mod config;
mod engine;
mod error;
mod key;
mod meta;
mod numeric;
mod reconcile;
mod storage;
mod value;

pub mod stats;

pub use crate::engine::{
    EngineState, ErrorSink, GroupByEngine, GroupByStats, RowSink, RowSource, VecRowSink,
    VecRowSource,
};
pub use crate::value::{compare_values, epoch_millis, Value, ValueType, DEFAULT_DATE_FORMAT};

pub use crate::config::{
    AggregateFunction, AggregateSpec, EngineConfig, GroupBySpec, UnknownFunction,
    ENV_ALL_NULLS_ARE_ZERO, ENV_EMPTY_STRING_DIFFERS_FROM_NULL, ENV_MIN_NULL_IS_VALUED,
    ENV_SUM_AVERAGE_RETURN_NUMBER_TYPE,
};
pub use crate::meta::{BinaryStorage, RowMeta, StorageType, ValueMeta};
pub use crate::storage::{parse_boolean, Normalizer, StoredValue};

pub use crate::accumulator::{Accumulator, AccumulatorSlot, SlotInput};
pub use crate::key::{GroupKey, KeyPart};
pub use crate::numeric::{coerce_numeric, sum_result_type, Numeric};
pub use crate::reconcile::{observe_output, update_value_meta};

pub use crate::error::{CoercionError, ErrorCode, ErrorRow, GroupByError, GroupByResult};
