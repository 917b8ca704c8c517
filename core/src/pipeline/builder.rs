use crate::error::Result;
use crate::pipeline::stage::{
    AggregateSpec, Predicate, RegroupSpec, ShortRecordPolicy, Stage,
};
use crate::pipeline::Pipeline;
use crate::record::RecordFormat;
use crate::shuffle::Combiner;

/// Builder for [`Pipeline`]. Stages are appended in call order and the
/// result is validated by [`PipelineBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    format: Option<RecordFormat>,
    short_records: ShortRecordPolicy,
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: RecordFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Delimited records split on `delimiter`.
    pub fn delimiter(mut self, delimiter: char) -> Self {
        let skip_header = self.format.as_ref().is_some_and(RecordFormat::skip_header);
        self.format = Some(RecordFormat::Delimited {
            delimiter,
            skip_header,
        });
        self
    }

    /// Skip the first line of every input file. Pins the delimiter to `,`
    /// unless one was set before.
    pub fn skip_header(mut self, skip: bool) -> Self {
        let delimiter = self.format.as_ref().map_or(',', RecordFormat::delimiter);
        self.format = Some(RecordFormat::Delimited {
            delimiter,
            skip_header: skip,
        });
        self
    }

    pub fn short_records(mut self, policy: ShortRecordPolicy) -> Self {
        self.short_records = policy;
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn filter(self, predicate: Predicate) -> Self {
        self.stage(Stage::Filter(predicate))
    }

    pub fn select<I: IntoIterator<Item = usize>>(self, fields: I) -> Self {
        self.stage(Stage::Select {
            fields: fields.into_iter().collect(),
        })
    }

    pub fn aggregate(self, spec: AggregateSpec) -> Self {
        self.stage(Stage::Aggregate(spec))
    }

    /// Sum the integer in `value_field` per key.
    pub fn sum_by<I: IntoIterator<Item = usize>>(self, key_fields: I, value_field: usize) -> Self {
        self.aggregate(AggregateSpec::sum(key_fields, value_field))
    }

    /// Count records per key.
    pub fn count_by<I: IntoIterator<Item = usize>>(self, key_fields: I) -> Self {
        self.aggregate(AggregateSpec::count(key_fields))
    }

    pub fn regroup<I: IntoIterator<Item = usize>>(self, key_parts: I, combiner: Combiner) -> Self {
        self.stage(Stage::Regroup(RegroupSpec {
            key_parts: key_parts.into_iter().collect(),
            combiner,
        }))
    }

    pub fn sort(self) -> Self {
        self.stage(Stage::Sort)
    }

    pub fn limit(self, n: usize) -> Self {
        self.stage(Stage::Limit { n })
    }

    /// Sort by total descending and keep the first `n` rows.
    pub fn top(self, n: usize) -> Self {
        self.sort().limit(n)
    }

    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.format, self.short_records, self.stages)
    }
}
