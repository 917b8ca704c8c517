//! Record aggregation pipelines.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s plus the format raw lines
//! are parsed with. Building a pipeline only validates it; nothing runs until
//! one of the terminal calls in [`execute`] is made against a
//! [`TallyContext`](crate::context::TallyContext).
//!
//! Per-record stages (`filter`, `select`) come first, then at most one
//! `aggregate`, then result stages (`regroup`, `sort`, `limit`) that run once
//! on the merged aggregate.

pub mod builder;
pub mod execute;
pub mod output;
pub mod stage;

pub use builder::PipelineBuilder;
pub use output::{render_table, Output, PipelineOutput, RunStats};
pub use stage::{
    AggregateSpec, ConversionPolicy, Predicate, RegroupSpec, ShortRecordPolicy, Stage, ValueSource,
};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::record::RecordFormat;

/// A validated pipeline description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unset means delimited on the context's default delimiter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<RecordFormat>,
    #[serde(default)]
    short_records: ShortRecordPolicy,
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Create and validate a pipeline from its parts.
    pub fn new(format: Option<RecordFormat>, short_records: ShortRecordPolicy, stages: Vec<Stage>) -> Result<Self> {
        let pipeline = Self {
            format,
            short_records,
            stages,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Parse and validate a JSON pipeline description.
    pub fn from_json(text: &str) -> Result<Self> {
        let pipeline: Pipeline = serde_json::from_str(text)?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The format set on the pipeline, if any.
    pub fn format(&self) -> Option<&RecordFormat> {
        self.format.as_ref()
    }

    /// The format lines are parsed with, falling back to records delimited
    /// by `default_delimiter`.
    pub fn record_format(&self, default_delimiter: char) -> RecordFormat {
        self.format
            .clone()
            .unwrap_or_else(|| RecordFormat::delimited(default_delimiter))
    }

    pub fn short_records(&self) -> ShortRecordPolicy {
        self.short_records
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_aggregating(&self) -> bool {
        self.aggregate_spec().is_some()
    }

    pub fn aggregate_spec(&self) -> Option<&AggregateSpec> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Aggregate(spec) => Some(spec),
            _ => None,
        })
    }

    pub fn has_sort(&self) -> bool {
        self.stages.iter().any(|stage| matches!(stage, Stage::Sort))
    }

    /// Stages applied to individual records, in order.
    pub(crate) fn record_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|stage| matches!(stage, Stage::Filter(_) | Stage::Select { .. }))
    }

    /// Stages applied to the merged result, in order.
    pub(crate) fn result_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|stage| {
            matches!(stage, Stage::Regroup(_) | Stage::Sort | Stage::Limit { .. })
        })
    }

    /// Check stage order and field references.
    pub fn validate(&self) -> Result<()> {
        if let Some(format) = &self.format {
            format.validate()?;
        }

        let mut aggregated = false;
        let mut limited = false;
        let mut key_arity = 0;
        // Record width after the last `select`; unknown before any.
        let mut width: Option<usize> = None;

        for stage in &self.stages {
            match stage {
                Stage::Filter(predicate) => {
                    ensure_per_record(stage, aggregated, limited)?;
                    check_field(width, predicate.field(), "filter")?;
                }
                Stage::Select { fields } => {
                    ensure_per_record(stage, aggregated, limited)?;
                    if fields.is_empty() {
                        return Err(invalid("select needs at least one field"));
                    }
                    for &field in fields {
                        check_field(width, field, "select")?;
                    }
                    width = Some(fields.len());
                }
                Stage::Aggregate(spec) => {
                    if aggregated {
                        return Err(invalid("a pipeline can aggregate at most once; use regroup"));
                    }
                    if limited {
                        return Err(invalid("limit must come after the aggregation"));
                    }
                    if spec.key_fields.is_empty() {
                        return Err(invalid("aggregate needs at least one key field"));
                    }
                    for &field in &spec.key_fields {
                        check_field(width, field, "aggregate key")?;
                    }
                    if let ValueSource::Field(field) = spec.value {
                        check_field(width, field, "aggregate value")?;
                    }
                    if let Some(window) = &spec.window {
                        window.validate()?;
                        check_field(width, window.time_field, "window time")?;
                    }
                    aggregated = true;
                    key_arity = spec.key_fields.len();
                }
                Stage::Regroup(spec) => {
                    if !aggregated {
                        return Err(invalid("regroup needs a preceding aggregation"));
                    }
                    if spec.key_parts.is_empty() {
                        return Err(invalid("regroup needs at least one key part"));
                    }
                    if let Some(&part) = spec.key_parts.iter().find(|&&p| p >= key_arity) {
                        return Err(invalid(format!(
                            "regroup key part {} is out of range for a key with {} parts",
                            part, key_arity
                        )));
                    }
                    key_arity = spec.key_parts.len();
                }
                Stage::Sort => {
                    if !aggregated {
                        return Err(invalid("sort needs a preceding aggregation"));
                    }
                }
                Stage::Limit { n } => {
                    if *n == 0 {
                        return Err(invalid("limit must be greater than zero"));
                    }
                    limited = true;
                }
            }
        }
        Ok(())
    }
}

fn ensure_per_record(stage: &Stage, aggregated: bool, limited: bool) -> Result<()> {
    if aggregated || limited {
        return Err(invalid(format!(
            "{} must come before aggregate and limit stages",
            stage.name()
        )));
    }
    Ok(())
}

fn check_field(width: Option<usize>, field: usize, what: &str) -> Result<()> {
    match width {
        Some(width) if field >= width => Err(invalid(format!(
            "{} field {} is out of range after select ({} fields)",
            what, field, width
        ))),
        _ => Ok(()),
    }
}

fn invalid(message: impl Into<String>) -> TallyError {
    TallyError::InvalidPlan(message.into())
}
