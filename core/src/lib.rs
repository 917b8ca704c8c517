//! Tally Core - keyed aggregation pipelines over text records
//!
//! This is the core module of the Tally project. It parses raw lines into
//! records, folds them into per-key totals in parallel on a local worker
//! pool, and runs the same pipelines over micro-batch streams.

pub mod aggregate;
pub mod context;
pub mod dataset;
pub mod error;
pub mod key;
pub mod pipeline;
pub mod record;
pub mod scheduler;
pub mod shuffle;
pub mod source;
pub mod streaming;
pub mod window;
pub mod writer;

pub use aggregate::Aggregate;
pub use context::TallyContext;
pub use dataset::Dataset;
pub use error::{Result, TallyError};
pub use key::Key;
pub use pipeline::{
    AggregateSpec, ConversionPolicy, Output, Pipeline, PipelineBuilder, PipelineOutput, Predicate,
    RunStats, ShortRecordPolicy, Stage, ValueSource,
};
pub use record::{Record, RecordFormat};
pub use shuffle::Combiner;
pub use source::Source;
pub use streaming::{OutputMode, StreamingQuery, Trigger};
pub use window::{TimeWindow, WindowSpec};
pub use writer::{FileFormat, SaveMode, WriteOptions, WriteSummary};
