//! Operator descriptor and run-wide compatibility switches.
//!
//! The descriptor ([`GroupBySpec`]) is produced and persisted elsewhere; this crate only reads
//! it. It is serde-friendly so it can cross process boundaries as JSON:
//!
//! ```json
//! {
//!   "groupFields": ["region"],
//!   "aggregates": [
//!     { "subject": "amount", "outputName": "total", "function": "SUM" },
//!     { "subject": "amount", "outputName": "p90", "function": "PERCENTILE", "parameter": "0.9" }
//!   ],
//!   "alwaysGivingBackOneRow": false
//! }
//! ```

use crate::error::{GroupByError, GroupByResult};
use crate::meta::RowMeta;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Min,
    Max,
    Sum,
    Average,
    /// Non-null subject values.
    CountAll,
    /// Rows, whatever the subject holds.
    CountAny,
    CountDistinct,
    ConcatComma,
    ConcatString,
    First,
    FirstIncludingNull,
    Last,
    LastIncludingNull,
    Median,
    Percentile,
    StandardDeviation,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 16] = [
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::Sum,
        AggregateFunction::Average,
        AggregateFunction::CountAll,
        AggregateFunction::CountAny,
        AggregateFunction::CountDistinct,
        AggregateFunction::ConcatComma,
        AggregateFunction::ConcatString,
        AggregateFunction::First,
        AggregateFunction::FirstIncludingNull,
        AggregateFunction::Last,
        AggregateFunction::LastIncludingNull,
        AggregateFunction::Median,
        AggregateFunction::Percentile,
        AggregateFunction::StandardDeviation,
    ];

    pub fn code(self) -> &'static str {
        match self {
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Average => "AVERAGE",
            AggregateFunction::CountAll => "COUNT_ALL",
            AggregateFunction::CountAny => "COUNT_ANY",
            AggregateFunction::CountDistinct => "COUNT_DISTINCT",
            AggregateFunction::ConcatComma => "CONCAT_COMMA",
            AggregateFunction::ConcatString => "CONCAT_STRING",
            AggregateFunction::First => "FIRST",
            AggregateFunction::FirstIncludingNull => "FIRST_INCLUDING_NULL",
            AggregateFunction::Last => "LAST",
            AggregateFunction::LastIncludingNull => "LAST_INCLUDING_NULL",
            AggregateFunction::Median => "MEDIAN",
            AggregateFunction::Percentile => "PERCENTILE",
            AggregateFunction::StandardDeviation => "STANDARD_DEVIATION",
        }
    }

    /// COUNT_ANY counts rows and may be configured without a subject column.
    pub fn requires_subject(self) -> bool {
        !matches!(self, AggregateFunction::CountAny)
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown aggregate function: {0}")]
pub struct UnknownFunction(pub String);

impl FromStr for AggregateFunction {
    type Err = UnknownFunction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        AggregateFunction::ALL
            .into_iter()
            .find(|f| f.code() == upper)
            .ok_or_else(|| UnknownFunction(s.to_string()))
    }
}

/// One output aggregate. List order is output column order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSpec {
    #[serde(default)]
    pub subject: Option<String>,
    pub output_name: String,
    pub function: AggregateFunction,
    /// Separator for CONCAT_STRING, fraction for PERCENTILE.
    #[serde(default)]
    pub parameter: Option<String>,
}

impl AggregateSpec {
    pub fn new(
        subject: impl Into<String>,
        output_name: impl Into<String>,
        function: AggregateFunction,
    ) -> Self {
        Self {
            subject: Some(subject.into()),
            output_name: output_name.into(),
            function,
            parameter: None,
        }
    }

    /// A COUNT_ANY that does not look at any column.
    pub fn count_rows(output_name: impl Into<String>) -> Self {
        Self {
            subject: None,
            output_name: output_name.into(),
            function: AggregateFunction::CountAny,
            parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBySpec {
    #[serde(default)]
    pub group_fields: Vec<String>,
    #[serde(default)]
    pub aggregates: Vec<AggregateSpec>,
    /// Emit one summary row when the input is empty.
    #[serde(default)]
    pub always_giving_back_one_row: bool,
}

impl GroupBySpec {
    pub fn new(group_fields: Vec<String>, aggregates: Vec<AggregateSpec>) -> Self {
        Self {
            group_fields,
            aggregates,
            always_giving_back_one_row: false,
        }
    }

    pub fn with_always_giving_back_one_row(mut self, on: bool) -> Self {
        self.always_giving_back_one_row = on;
        self
    }

    pub fn from_json(json: &str) -> GroupByResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> GroupByResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolves every column against the input schema and parses aggregate parameters.
    pub(crate) fn bind(&self, input: &RowMeta) -> GroupByResult<BoundSpec> {
        let mut outputs: AHashSet<&str> = AHashSet::new();

        let mut group_indices = Vec::with_capacity(self.group_fields.len());
        for name in &self.group_fields {
            let idx = input
                .index_of(name)
                .ok_or_else(|| GroupByError::UnknownColumn(name.clone()))?;
            if !outputs.insert(name.as_str()) {
                return Err(GroupByError::DuplicateOutput(name.clone()));
            }
            group_indices.push(idx);
        }

        let mut aggregates = Vec::with_capacity(self.aggregates.len());
        for spec in &self.aggregates {
            if !outputs.insert(spec.output_name.as_str()) {
                return Err(GroupByError::DuplicateOutput(spec.output_name.clone()));
            }
            aggregates.push(BoundAggregate::bind(spec, input)?);
        }

        Ok(BoundSpec {
            group_indices,
            aggregates,
        })
    }

    /// Checks the descriptor against an input schema without building an engine.
    pub fn validate(&self, input: &RowMeta) -> GroupByResult<()> {
        self.bind(input).map(|_| ())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BoundSpec {
    pub(crate) group_indices: Vec<usize>,
    pub(crate) aggregates: Vec<BoundAggregate>,
}

#[derive(Clone, Debug)]
pub(crate) struct BoundAggregate {
    pub(crate) output_name: String,
    pub(crate) function: AggregateFunction,
    pub(crate) subject: Option<usize>,
    pub(crate) separator: Arc<str>,
    pub(crate) fraction: f64,
}

impl BoundAggregate {
    fn bind(spec: &AggregateSpec, input: &RowMeta) -> GroupByResult<Self> {
        let subject = match spec.subject.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => Some(
                input
                    .index_of(name)
                    .ok_or_else(|| GroupByError::UnknownColumn(name.to_string()))?,
            ),
            None if spec.function.requires_subject() => {
                return Err(GroupByError::MissingSubject {
                    output: spec.output_name.clone(),
                    function: spec.function.to_string(),
                });
            }
            None => None,
        };

        let separator: Arc<str> = match spec.function {
            AggregateFunction::ConcatComma => Arc::from(", "),
            AggregateFunction::ConcatString => {
                Arc::from(spec.parameter.as_deref().unwrap_or_default())
            }
            _ => Arc::from(""),
        };

        let fraction = match spec.function {
            AggregateFunction::Median => 0.5,
            AggregateFunction::Percentile => parse_fraction(spec)?,
            _ => 0.0,
        };

        Ok(Self {
            output_name: spec.output_name.clone(),
            function: spec.function,
            subject,
            separator,
            fraction,
        })
    }
}

fn parse_fraction(spec: &AggregateSpec) -> GroupByResult<f64> {
    let invalid = |message: String| GroupByError::InvalidParameter {
        output: spec.output_name.clone(),
        message,
    };
    let raw = spec
        .parameter
        .as_deref()
        .ok_or_else(|| invalid("PERCENTILE needs a fraction parameter".to_string()))?;
    let fraction: f64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("{raw:?} is not a number")))?;
    if !(0.0..=1.0).contains(&fraction) {
        return Err(invalid(format!("fraction {fraction} outside [0, 1]")));
    }
    Ok(fraction)
}

pub const ENV_MIN_NULL_IS_VALUED: &str = "GROUPBY_MIN_NULL_IS_VALUED";
pub const ENV_ALL_NULLS_ARE_ZERO: &str = "GROUPBY_ALL_NULLS_ARE_ZERO";
pub const ENV_SUM_AVERAGE_RETURN_NUMBER_TYPE: &str = "GROUPBY_SUM_AVERAGE_RETURN_NUMBER_TYPE";
pub const ENV_EMPTY_STRING_DIFFERS_FROM_NULL: &str = "GROUPBY_EMPTY_STRING_DIFFERS_FROM_NULL";

/// Compatibility switches, fixed for the lifetime of an engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// A null subject forces MIN to null for the rest of the group.
    pub min_null_is_valued: bool,
    /// Numeric aggregates that would finalize to null yield zero instead.
    pub all_nulls_are_zero: bool,
    /// SUM and AVERAGE always produce a Number, whatever the subject type.
    pub legacy_numeric_return_type: bool,
    /// Keep empty strings distinct from null.
    pub empty_string_differs_from_null: bool,
}

impl EngineConfig {
    /// Reads the switches from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|v| parse_flag(&v));
        Self {
            min_null_is_valued: flag(ENV_MIN_NULL_IS_VALUED),
            all_nulls_are_zero: flag(ENV_ALL_NULLS_ARE_ZERO),
            legacy_numeric_return_type: flag(ENV_SUM_AVERAGE_RETURN_NUMBER_TYPE),
            empty_string_differs_from_null: flag(ENV_EMPTY_STRING_DIFFERS_FROM_NULL),
        }
    }

    pub fn with_min_null_is_valued(mut self, on: bool) -> Self {
        self.min_null_is_valued = on;
        self
    }

    pub fn with_all_nulls_are_zero(mut self, on: bool) -> Self {
        self.all_nulls_are_zero = on;
        self
    }

    pub fn with_legacy_numeric_return_type(mut self, on: bool) -> Self {
        self.legacy_numeric_return_type = on;
        self
    }

    pub fn with_empty_string_differs_from_null(mut self, on: bool) -> Self {
        self.empty_string_differs_from_null = on;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    crate::storage::parse_boolean(value.trim())
}
