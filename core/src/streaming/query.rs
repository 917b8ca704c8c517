//! Streaming queries: a pipeline run repeatedly over micro-batches.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::sort_by_total_desc;
use crate::context::TallyContext;
use crate::error::{Result, TallyError};
use crate::key::Key;
use crate::pipeline::{Output, Pipeline, RunStats, Stage};
use crate::shuffle::{Aggregator, Combiner};
use crate::streaming::sinks::StreamSink;
use crate::streaming::sources::MicroBatchSource;
use crate::streaming::state::{MemoryStateStore, StateStore};
use crate::streaming::trigger::{OutputMode, Trigger};

/// How long a zero-interval trigger waits before polling an idle source
/// again.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Rows emitted for one micro-batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    pub batch_id: u64,
    pub output_mode: OutputMode,
    pub rows: Output,
    pub stats: RunStats,
    /// Event-time watermark after the batch, in seconds.
    pub watermark: Option<i64>,
}

/// Totals for a finished [`StreamingQuery::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub batches: u64,
    pub rows_emitted: u64,
    pub stats: RunStats,
    pub watermark: Option<i64>,
}

/// Builder for [`StreamingQuery`]; checks the pipeline can run on a stream.
#[derive(Debug)]
pub struct StreamingQueryBuilder {
    pipeline: Pipeline,
    output_mode: OutputMode,
    trigger: Trigger,
    watermark_delay: Option<Duration>,
    name: Option<String>,
    state: Option<Box<dyn StateStore>>,
}

impl StreamingQueryBuilder {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            output_mode: OutputMode::default(),
            trigger: Trigger::default(),
            watermark_delay: None,
            name: None,
            state: None,
        }
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// How far behind the largest event time seen a window may still
    /// receive data.
    pub fn watermark(mut self, delay: Duration) -> Self {
        self.watermark_delay = Some(delay);
        self
    }

    pub fn query_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn state_store(mut self, store: Box<dyn StateStore>) -> Self {
        self.state = Some(store);
        self
    }

    pub fn build(self) -> Result<StreamingQuery> {
        self.validate()?;
        Ok(StreamingQuery {
            id: Uuid::new_v4(),
            name: self.name,
            pipeline: self.pipeline,
            output_mode: self.output_mode,
            trigger: self.trigger,
            watermark_delay: self.watermark_delay,
            state: self
                .state
                .unwrap_or_else(|| Box::new(MemoryStateStore::new())),
            watermark: None,
            next_batch_id: 0,
        })
    }

    fn validate(&self) -> Result<()> {
        for stage in self.pipeline.stages() {
            match stage {
                Stage::Regroup(_) => {
                    return Err(unsupported(
                        "multiple streaming aggregations are not supported",
                    ));
                }
                Stage::Limit { .. } => {
                    return Err(unsupported("limit is not supported on streams"));
                }
                Stage::Sort if self.output_mode != OutputMode::Complete => {
                    return Err(unsupported(format!(
                        "sorting is only supported in complete output mode, not {}",
                        self.output_mode
                    )));
                }
                _ => {}
            }
        }

        let window = self.pipeline.aggregate_spec().map(|spec| spec.window.is_some());
        if self.watermark_delay.is_some() && window != Some(true) {
            return Err(TallyError::InvalidPlan(
                "a watermark needs a windowed aggregation".to_string(),
            ));
        }
        match (self.output_mode, window) {
            (OutputMode::Complete, None) => Err(unsupported(
                "complete output mode needs an aggregation",
            )),
            (OutputMode::Append, Some(windowed)) if !windowed || self.watermark_delay.is_none() => {
                Err(unsupported(
                    "append output mode on an aggregation needs a window and a watermark",
                ))
            }
            _ => Ok(()),
        }
    }
}

fn unsupported(message: impl Into<String>) -> TallyError {
    TallyError::UnsupportedOperation(message.into())
}

/// A pipeline bound to an output mode and trigger, with the state it keeps
/// across micro-batches.
#[derive(Debug)]
pub struct StreamingQuery {
    id: Uuid,
    name: Option<String>,
    pipeline: Pipeline,
    output_mode: OutputMode,
    trigger: Trigger,
    watermark_delay: Option<Duration>,
    state: Box<dyn StateStore>,
    watermark: Option<i64>,
    next_batch_id: u64,
}

impl StreamingQuery {
    pub fn builder(pipeline: Pipeline) -> StreamingQueryBuilder {
        StreamingQueryBuilder::new(pipeline)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    /// Keys currently held in state.
    pub fn state_len(&self) -> usize {
        self.state.len()
    }

    fn display_name(&self) -> String {
        match &self.name {
            Some(name) => format!("'{}' ({})", name, self.id),
            None => self.id.to_string(),
        }
    }

    /// Process one micro-batch and return the rows it emits.
    pub fn process_batch(&mut self, ctx: &TallyContext, lines: Vec<String>) -> Result<BatchOutput> {
        let batch_id = self.next_batch_id;
        let dataset = ctx.parallelize(lines);

        let (rows, stats) = match self.pipeline.aggregate_spec().map(|spec| spec.combiner) {
            Some(combiner) => {
                let (batch, stats) =
                    self.pipeline
                        .aggregate_dataset(ctx, &dataset, self.watermark)?;
                let touched = self.update_state(batch.into_entries(), combiner)?;
                self.advance_watermark(&stats);
                (Output::Ranked(self.emit(touched)), stats)
            }
            None => {
                let (records, stats) = self.pipeline.transform_dataset(ctx, &dataset)?;
                (Output::Records(records), stats)
            }
        };

        if stats.late > 0 {
            warn!(
                "Batch {} of query {} dropped {} late records",
                batch_id,
                self.display_name(),
                stats.late
            );
        }
        debug!(
            "Batch {} read {} lines and emitted {} rows; {} keys in state",
            batch_id,
            stats.lines_read,
            rows.len(),
            self.state.len()
        );

        self.next_batch_id += 1;
        Ok(BatchOutput {
            batch_id,
            output_mode: self.output_mode,
            rows,
            stats,
            watermark: self.watermark,
        })
    }

    /// Merge a batch aggregate into state; returns the new totals of the
    /// keys it touched. State is left unchanged if any merge fails.
    fn update_state(
        &mut self,
        batch: impl Iterator<Item = (Key, i64)>,
        combiner: Combiner,
    ) -> Result<Vec<(Key, i64)>> {
        let touched = batch
            .map(|(key, partial)| {
                let total = match self.state.get(&key) {
                    Some(previous) => combiner
                        .merge_combiners(previous, partial)
                        .ok_or_else(|| TallyError::Overflow {
                            key: key.to_string(),
                        })?,
                    None => partial,
                };
                Ok((key, total))
            })
            .collect::<Result<Vec<_>>>()?;
        for (key, total) in &touched {
            self.state.put(key.clone(), *total);
        }
        Ok(touched)
    }

    fn advance_watermark(&mut self, stats: &RunStats) {
        let (Some(delay), Some(max_event_time)) = (self.watermark_delay, stats.max_event_time)
        else {
            return;
        };
        let candidate = max_event_time - delay.as_secs() as i64;
        let advanced = self.watermark.map_or(candidate, |current| current.max(candidate));
        if self.watermark != Some(advanced) {
            debug!("Watermark advanced to {}", advanced);
        }
        self.watermark = Some(advanced);
    }

    fn emit(&mut self, mut touched: Vec<(Key, i64)>) -> Vec<(Key, i64)> {
        match self.output_mode {
            OutputMode::Complete => {
                let mut rows = self.state.entries();
                if self.pipeline.has_sort() {
                    sort_by_total_desc(&mut rows);
                } else {
                    rows.sort_by(|a, b| a.0.cmp(&b.0));
                }
                rows
            }
            OutputMode::Update => {
                touched.sort_by(|a, b| a.0.cmp(&b.0));
                self.evict_finalized();
                touched
            }
            OutputMode::Append => self.evict_finalized(),
        }
    }

    /// Remove windows that ended at or before the watermark and return them
    /// in key order.
    fn evict_finalized(&mut self) -> Vec<(Key, i64)> {
        let Some(watermark) = self.watermark else {
            return Vec::new();
        };
        let mut finalized: Vec<(Key, i64)> = self
            .state
            .entries()
            .into_iter()
            .filter(|(key, _)| key.window().is_some_and(|w| w.end <= watermark))
            .collect();
        for (key, _) in &finalized {
            self.state.remove(key);
        }
        finalized.sort_by(|a, b| a.0.cmp(&b.0));
        finalized
    }

    /// Drive the query until the source is exhausted, the trigger says stop,
    /// or `cancel` fires. Each batch runs on the blocking pool.
    pub async fn run(
        self,
        ctx: Arc<TallyContext>,
        source: &mut dyn MicroBatchSource,
        sink: &mut dyn StreamSink,
        cancel: CancellationToken,
    ) -> Result<QuerySummary> {
        if !sink.supports(self.output_mode) {
            return Err(unsupported(format!(
                "{} does not support {} output mode",
                sink.description(),
                self.output_mode
            )));
        }
        info!(
            "Starting streaming query {} from {} with trigger {:?} in {} mode",
            self.display_name(),
            source.description(),
            self.trigger,
            self.output_mode
        );

        let mut summary = QuerySummary {
            id: self.id,
            name: self.name.clone(),
            ..QuerySummary::default()
        };
        let mut driver = BatchDriver {
            query: Some(self),
            ctx,
            summary: &mut summary,
        };

        let trigger = driver.trigger()?;
        match trigger {
            Trigger::Once => {
                if let Some(lines) = source.next_batch().await? {
                    driver.run_batch(lines, sink).await?;
                }
            }
            Trigger::AvailableNow => {
                while !cancel.is_cancelled() {
                    match source.next_batch().await? {
                        Some(lines) if !lines.is_empty() => driver.run_batch(lines, sink).await?,
                        _ => break,
                    }
                }
            }
            Trigger::ProcessingTime(interval) if interval.is_zero() => loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = source.next_batch() => next?,
                };
                match next {
                    None => break,
                    Some(lines) if lines.is_empty() => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(IDLE_POLL) => {}
                        }
                    }
                    Some(lines) => driver.run_batch(lines, sink).await?,
                }
            },
            Trigger::ProcessingTime(interval) => {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let next = tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = source.next_batch() => next?,
                    };
                    match next {
                        None => break,
                        Some(lines) if lines.is_empty() => continue,
                        Some(lines) => driver.run_batch(lines, sink).await?,
                    }
                }
            }
        }

        if let Some(query) = driver.query.take() {
            driver.summary.watermark = query.watermark;
        }
        sink.close().await?;
        info!(
            "Streaming query {} stopped after {} batches, {} rows emitted",
            summary.id, summary.batches, summary.rows_emitted
        );
        Ok(summary)
    }
}

/// Moves the query onto the blocking pool for each batch and back.
struct BatchDriver<'a> {
    query: Option<StreamingQuery>,
    ctx: Arc<TallyContext>,
    summary: &'a mut QuerySummary,
}

impl BatchDriver<'_> {
    fn trigger(&self) -> Result<Trigger> {
        self.query
            .as_ref()
            .map(StreamingQuery::trigger)
            .ok_or_else(|| TallyError::ContextError("streaming query is gone".to_string()))
    }

    async fn run_batch(&mut self, lines: Vec<String>, sink: &mut dyn StreamSink) -> Result<()> {
        let mut query = self
            .query
            .take()
            .ok_or_else(|| TallyError::ContextError("streaming query is gone".to_string()))?;
        let ctx = Arc::clone(&self.ctx);
        let (query, output) = tokio::task::spawn_blocking(move || {
            let output = query.process_batch(&ctx, lines);
            (query, output)
        })
        .await
        .map_err(|e| TallyError::ContextError(format!("batch task failed: {}", e)))?;
        self.query = Some(query);

        let output = output?;
        self.summary.batches += 1;
        self.summary.rows_emitted += output.rows.len() as u64;
        self.summary.stats.merge(&output.stats);
        sink.emit(&output).await
    }
}
