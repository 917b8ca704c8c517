//! Running pipelines.
//!
//! Input lines are split into partitions; each partition is folded into a
//! partial [`Aggregate`] on the context's worker pool, and the partials are
//! merged through the local shuffle. Result stages then run once on the
//! merged totals.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::aggregate::{sort_by_total_desc, Aggregate};
use crate::context::TallyContext;
use crate::dataset::Dataset;
use crate::error::{Result, TallyError};
use crate::key::Key;
use crate::pipeline::output::{Output, PipelineOutput, RunStats};
use crate::pipeline::stage::{
    AggregateSpec, ConversionPolicy, ShortRecordPolicy, Stage, ValueSource,
};
use crate::pipeline::Pipeline;
use crate::record::{Record, RecordFormat};
use crate::scheduler::Task;
use crate::shuffle::merge_partials;
use crate::source::Source;
use crate::window::WindowSpec;
use crate::writer::{write_rows, WriteOptions, WriteSummary};

impl Pipeline {
    /// Run the pipeline over `source` and collect the result.
    pub fn collect(&self, ctx: &TallyContext, source: &Source) -> Result<PipelineOutput> {
        let dataset = ctx.load(source, &self.record_format(ctx.default_delimiter()))?;
        self.collect_dataset(ctx, &dataset)
    }

    /// Run the pipeline over an already partitioned dataset.
    pub fn collect_dataset(&self, ctx: &TallyContext, dataset: &Dataset) -> Result<PipelineOutput> {
        info!(
            "Running pipeline [{}] over {} lines in {} partitions",
            self.describe(),
            dataset.len(),
            dataset.num_partitions()
        );

        let (output, stats) = if self.is_aggregating() {
            let (merged, stats) = self.aggregate_dataset(ctx, dataset, None)?;
            (Output::Ranked(self.finish(merged)?), stats)
        } else {
            let (mut records, stats) = self.transform_dataset(ctx, dataset)?;
            if let Some(n) = self.limit() {
                records.truncate(n);
            }
            (Output::Records(records), stats)
        };

        log_stats(&stats);
        info!("Pipeline produced {} rows", output.len());
        Ok(PipelineOutput { output, stats })
    }

    /// Run the pipeline and write its rows.
    pub fn write(
        &self,
        ctx: &TallyContext,
        source: &Source,
        options: &WriteOptions,
    ) -> Result<WriteSummary> {
        let result = self.collect(ctx, source)?;
        let columns = result.output.default_columns();
        write_rows(&result.output.to_rows(), &columns, options)
    }

    /// Fold `lines` into an aggregate without splitting them into
    /// partitions. Result stages are not applied.
    pub fn aggregate_lines(&self, lines: &[String]) -> Result<(Aggregate, RunStats)> {
        let spec = self.require_aggregate()?;
        PartitionFold::new(self, None).aggregate(spec, lines)
    }

    /// Apply the per-record stages to `lines`.
    pub fn transform_lines(&self, lines: &[String]) -> Result<(Vec<Record>, RunStats)> {
        PartitionFold::new(self, None).transform(lines)
    }

    /// Fold every partition of `dataset` in parallel and merge the partial
    /// aggregates. Windows ending at or before `watermark` are skipped.
    pub(crate) fn aggregate_dataset(
        &self,
        ctx: &TallyContext,
        dataset: &Dataset,
        watermark: Option<i64>,
    ) -> Result<(Aggregate, RunStats)> {
        let spec = self.require_aggregate()?;
        let pipeline = Arc::new(self.resolved(ctx));
        let tasks = (0..dataset.num_partitions())
            .map(|index| {
                let pipeline = Arc::clone(&pipeline);
                let partition = dataset.partition_handle(index);
                Task::new(index, move |index| {
                    let spec = pipeline.require_aggregate()?;
                    let result = PartitionFold::new(&pipeline, watermark)
                        .aggregate(spec, partition.lines());
                    if let Ok((partial, _)) = &result {
                        debug!("Partition {} folded into {} keys", index, partial.len());
                    }
                    result
                })
            })
            .collect();

        let mut stats = RunStats::default();
        let mut partials = Vec::with_capacity(dataset.num_partitions());
        for (partial, partition_stats) in ctx.scheduler().execute_tasks(tasks)? {
            stats.merge(&partition_stats);
            partials.push(partial);
        }
        let merged = merge_partials(ctx.scheduler(), partials, spec.combiner, ctx.parallelism())?;
        Ok((merged, stats))
    }

    /// Apply the per-record stages to every partition in parallel; records
    /// keep their input order.
    pub(crate) fn transform_dataset(
        &self,
        ctx: &TallyContext,
        dataset: &Dataset,
    ) -> Result<(Vec<Record>, RunStats)> {
        let pipeline = Arc::new(self.resolved(ctx));
        let tasks = (0..dataset.num_partitions())
            .map(|index| {
                let pipeline = Arc::clone(&pipeline);
                let partition = dataset.partition_handle(index);
                Task::new(index, move |_| {
                    PartitionFold::new(&pipeline, None).transform(partition.lines())
                })
            })
            .collect();

        ctx.scheduler().execute_and_reduce(
            tasks,
            || (Vec::new(), RunStats::default()),
            |(mut records, mut stats), (more, more_stats)| {
                records.extend(more);
                stats.merge(&more_stats);
                Ok((records, stats))
            },
        )
    }

    /// Apply result stages to a merged aggregate. Without a sort the rows
    /// come out in key order.
    pub(crate) fn finish(&self, merged: Aggregate) -> Result<Vec<(Key, i64)>> {
        let mut rows = merged.into_sorted_by_key();
        for stage in self.result_stages() {
            match stage {
                Stage::Regroup(spec) => {
                    rows = Aggregate::from_entries(rows)
                        .regroup(&spec.key_parts, spec.combiner)?
                        .into_sorted_by_key();
                }
                Stage::Sort => sort_by_total_desc(&mut rows),
                Stage::Limit { n } => rows.truncate(*n),
                _ => {}
            }
        }
        Ok(rows)
    }

    /// A copy with the format fixed against the context's defaults.
    fn resolved(&self, ctx: &TallyContext) -> Pipeline {
        Pipeline {
            format: Some(self.record_format(ctx.default_delimiter())),
            ..self.clone()
        }
    }

    fn limit(&self) -> Option<usize> {
        self.result_stages().find_map(|stage| match stage {
            Stage::Limit { n } => Some(*n),
            _ => None,
        })
    }

    fn require_aggregate(&self) -> Result<&AggregateSpec> {
        self.aggregate_spec().ok_or_else(|| {
            TallyError::InvalidPlan("pipeline has no aggregate stage".to_string())
        })
    }

    fn describe(&self) -> String {
        self.stages()
            .iter()
            .map(Stage::name)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

fn log_stats(stats: &RunStats) {
    if stats.dropped() > 0 {
        warn!(
            "Dropped {} of {} records ({} malformed, {} unparseable, {} late)",
            stats.dropped(),
            stats.lines_read,
            stats.malformed,
            stats.unparseable,
            stats.late
        );
    }
}

/// Sequential fold over the lines of one partition.
struct PartitionFold<'a> {
    pipeline: &'a Pipeline,
    format: RecordFormat,
    watermark: Option<i64>,
    stats: RunStats,
}

impl<'a> PartitionFold<'a> {
    fn new(pipeline: &'a Pipeline, watermark: Option<i64>) -> Self {
        Self {
            pipeline,
            format: pipeline.format().cloned().unwrap_or_default(),
            watermark,
            stats: RunStats::default(),
        }
    }

    fn transform(mut self, lines: &[String]) -> Result<(Vec<Record>, RunStats)> {
        let mut records = Vec::new();
        for line in lines {
            if let Some(record) = self.prepare(line)? {
                records.push(record);
            }
        }
        Ok((records, self.stats))
    }

    fn aggregate(mut self, spec: &AggregateSpec, lines: &[String]) -> Result<(Aggregate, RunStats)> {
        let mut aggregate = Aggregate::new();
        for line in lines {
            if let Some(record) = self.prepare(line)? {
                self.fold(spec, &record, line, &mut aggregate)?;
            }
        }
        Ok((aggregate, self.stats))
    }

    /// Parse a line and run the per-record stages. Blank lines are skipped.
    fn prepare(&mut self, line: &str) -> Result<Option<Record>> {
        self.stats.lines_read += 1;
        if line.trim().is_empty() {
            return Ok(None);
        }
        let mut record = match self.format.parse_line(line) {
            Ok(record) => record,
            Err(e) => return self.reject(e, line),
        };
        for stage in self.pipeline.record_stages() {
            match stage {
                Stage::Filter(predicate) => {
                    if !predicate.test(&record) {
                        self.stats.filtered += 1;
                        return Ok(None);
                    }
                }
                Stage::Select { fields } => match record.select(fields) {
                    Ok(selected) => record = selected,
                    Err(e) => return self.reject(e, line),
                },
                _ => {}
            }
        }
        Ok(Some(record))
    }

    fn fold(
        &mut self,
        spec: &AggregateSpec,
        record: &Record,
        line: &str,
        into: &mut Aggregate,
    ) -> Result<()> {
        let parts = match spec
            .key_fields
            .iter()
            .map(|&i| record.field(i).map(str::to_string))
            .collect::<Result<Vec<_>>>()
        {
            Ok(parts) => parts,
            Err(e) => {
                self.reject::<()>(e, line)?;
                return Ok(());
            }
        };
        let Some(value) = self.value(spec, record, line)? else {
            return Ok(());
        };

        let Some(window) = &spec.window else {
            return into.add_value(spec.combiner, Key::new(parts), value);
        };
        let Some(event_time) = self.event_time(spec, window, record, line)? else {
            return Ok(());
        };
        self.stats.max_event_time = Some(
            self.stats
                .max_event_time
                .map_or(event_time, |max| max.max(event_time)),
        );

        let mut accepted = false;
        for time_window in window.windows_for(event_time) {
            if self.watermark.is_some_and(|watermark| time_window.end <= watermark) {
                continue;
            }
            accepted = true;
            into.add_value(spec.combiner, Key::windowed(time_window, parts.clone()), value)?;
        }
        if !accepted {
            self.stats.late += 1;
            debug!("Dropping late record {:?}", line);
        }
        Ok(())
    }

    fn value(&mut self, spec: &AggregateSpec, record: &Record, line: &str) -> Result<Option<i64>> {
        let raw = match spec.value {
            ValueSource::One => return Ok(Some(1)),
            ValueSource::Field(index) => match record.field(index) {
                Ok(raw) => raw,
                Err(e) => return self.reject(e, line),
            },
        };
        match raw.trim().parse::<i64>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => match spec.conversion {
                ConversionPolicy::Drop => {
                    self.stats.unparseable += 1;
                    debug!("Dropping record with non-numeric value {:?}", raw);
                    Ok(None)
                }
                ConversionPolicy::Zero => Ok(Some(0)),
                ConversionPolicy::Fail => Err(TallyError::Conversion {
                    value: raw.to_string(),
                }),
            },
        }
    }

    fn event_time(
        &mut self,
        spec: &AggregateSpec,
        window: &WindowSpec,
        record: &Record,
        line: &str,
    ) -> Result<Option<i64>> {
        let raw = match record.field(window.time_field) {
            Ok(raw) => raw,
            Err(e) => return self.reject(e, line),
        };
        match window.parse_event_time(raw) {
            Some(t) => Ok(Some(t)),
            None if spec.conversion == ConversionPolicy::Fail => Err(TallyError::Conversion {
                value: raw.to_string(),
            }),
            None => {
                self.stats.unparseable += 1;
                debug!("Dropping record with unparseable event time {:?}", raw);
                Ok(None)
            }
        }
    }

    /// Apply the short-record policy to a record that could not be read.
    fn reject<T>(&mut self, error: TallyError, line: &str) -> Result<Option<T>> {
        match self.pipeline.short_records() {
            ShortRecordPolicy::Drop if error.is_record_level() => {
                self.stats.malformed += 1;
                debug!("Dropping malformed record {:?}: {}", line, error);
                Ok(None)
            }
            _ => Err(error),
        }
    }
}
