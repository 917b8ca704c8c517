//! Pipeline stages and the policies that govern bad input.

use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::shuffle::Combiner;
use crate::window::WindowSpec;

/// Record filter.
///
/// A record whose referenced field is missing, or not an integer where an
/// integer comparison is asked for, does not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Field is present and not blank.
    NonEmpty { field: usize },
    /// Field equals `value` exactly.
    Equals { field: usize, value: String },
    /// Field parses as an integer within `min..=max`.
    IntRange { field: usize, min: i64, max: i64 },
    /// Field parses as an integer strictly greater than `threshold`.
    IntGreaterThan { field: usize, threshold: i64 },
}

impl Predicate {
    pub fn test(&self, record: &Record) -> bool {
        match self {
            Predicate::NonEmpty { field } => record
                .get(*field)
                .is_some_and(|value| !value.trim().is_empty()),
            Predicate::Equals { field, value } => record.get(*field) == Some(value.as_str()),
            Predicate::IntRange { field, min, max } => {
                parse_int(record.get(*field)).is_some_and(|v| (*min..=*max).contains(&v))
            }
            Predicate::IntGreaterThan { field, threshold } => {
                parse_int(record.get(*field)).is_some_and(|v| v > *threshold)
            }
        }
    }

    pub fn field(&self) -> usize {
        match self {
            Predicate::NonEmpty { field }
            | Predicate::Equals { field, .. }
            | Predicate::IntRange { field, .. }
            | Predicate::IntGreaterThan { field, .. } => *field,
        }
    }
}

fn parse_int(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// What happens to a record that is too short for the fields a stage reads,
/// or that cannot be parsed at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortRecordPolicy {
    /// Drop the record and count it.
    #[default]
    Drop,
    /// Abort the run.
    Fail,
}

/// What happens when a value (or event time) does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPolicy {
    /// Drop the record and count it.
    #[default]
    Drop,
    /// Use zero as the value. Unparseable event times are still dropped.
    Zero,
    /// Abort the run.
    Fail,
}

impl std::str::FromStr for ConversionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(ConversionPolicy::Drop),
            "zero" => Ok(ConversionPolicy::Zero),
            "fail" | "error" => Ok(ConversionPolicy::Fail),
            other => Err(format!("unknown conversion policy '{}'", other)),
        }
    }
}

/// Where the value folded per key comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Integer parsed from a field.
    Field(usize),
    /// The constant 1, for occurrence counts.
    One,
}

/// Grouping and folding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub key_fields: Vec<usize>,
    pub value: ValueSource,
    #[serde(default)]
    pub combiner: Combiner,
    #[serde(default)]
    pub window: Option<WindowSpec>,
    #[serde(default)]
    pub conversion: ConversionPolicy,
}

impl AggregateSpec {
    /// Sum of the integer in `value_field` per key.
    pub fn sum<I: IntoIterator<Item = usize>>(key_fields: I, value_field: usize) -> Self {
        Self {
            key_fields: key_fields.into_iter().collect(),
            value: ValueSource::Field(value_field),
            combiner: Combiner::Sum,
            window: None,
            conversion: ConversionPolicy::default(),
        }
    }

    /// Number of records per key.
    pub fn count<I: IntoIterator<Item = usize>>(key_fields: I) -> Self {
        Self {
            key_fields: key_fields.into_iter().collect(),
            value: ValueSource::One,
            combiner: Combiner::Sum,
            window: None,
            conversion: ConversionPolicy::default(),
        }
    }

    pub fn with_combiner(mut self, combiner: Combiner) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn with_window(mut self, window: WindowSpec) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_conversion(mut self, conversion: ConversionPolicy) -> Self {
        self.conversion = conversion;
        self
    }
}

/// Re-aggregation of an existing aggregate by a subset of its key parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegroupSpec {
    pub key_parts: Vec<usize>,
    #[serde(default)]
    pub combiner: Combiner,
}

/// One step of a pipeline description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Filter(Predicate),
    Select { fields: Vec<usize> },
    Aggregate(AggregateSpec),
    Regroup(RegroupSpec),
    /// Order by total, descending.
    Sort,
    Limit { n: usize },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Filter(_) => "filter",
            Stage::Select { .. } => "select",
            Stage::Aggregate(_) => "aggregate",
            Stage::Regroup(_) => "regroup",
            Stage::Sort => "sort",
            Stage::Limit { .. } => "limit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: &str) -> Record {
        Record::split(line, ',')
    }

    #[test]
    fn test_non_empty() {
        let p = Predicate::NonEmpty { field: 1 };
        assert!(p.test(&record("US,CA")));
        assert!(!p.test(&record("DE,")));
        assert!(!p.test(&record("DE, ")));
        assert!(!p.test(&record("DE")));
    }

    #[test]
    fn test_int_range() {
        let p = Predicate::IntRange {
            field: 0,
            min: 2000,
            max: 2010,
        };
        assert!(p.test(&record("2000")));
        assert!(p.test(&record("2010")));
        assert!(!p.test(&record("1999")));
        assert!(!p.test(&record("unknown")));
    }

    #[test]
    fn test_greater_than_and_equals() {
        assert!(Predicate::IntGreaterThan { field: 0, threshold: 100_000 }.test(&record("100001")));
        assert!(!Predicate::IntGreaterThan { field: 0, threshold: 100_000 }.test(&record("100000")));
        assert!(Predicate::Equals { field: 1, value: "x".into() }.test(&record("a,x")));
    }

    #[test]
    fn test_stage_serde() {
        let stages: Vec<Stage> = serde_json::from_str(
            r#"[
                {"filter": {"op": "non_empty", "field": 10}},
                {"aggregate": {"key_fields": [3, 11], "value": {"field": 5}}},
                "sort",
                {"limit": {"n": 25}}
            ]"#,
        )
        .unwrap();
        assert_eq!(stages[0], Stage::Filter(Predicate::NonEmpty { field: 10 }));
        assert_eq!(stages[1], Stage::Aggregate(AggregateSpec::sum([3, 11], 5)));
        assert_eq!(stages[2], Stage::Sort);
        assert_eq!(stages[3], Stage::Limit { n: 25 });
    }

    #[test]
    fn test_conversion_policy_from_str() {
        assert_eq!("zero".parse::<ConversionPolicy>().unwrap(), ConversionPolicy::Zero);
        assert_eq!("error".parse::<ConversionPolicy>().unwrap(), ConversionPolicy::Fail);
        assert!("ignore".parse::<ConversionPolicy>().is_err());
    }
}
