//! Micro-batch streaming.
//!
//! A [`StreamingQuery`] runs a pipeline over each micro-batch pulled from a
//! [`MicroBatchSource`], keeps aggregation state across batches, and hands
//! the rows selected by its [`OutputMode`] to a [`StreamSink`].

pub mod query;
pub mod sinks;
pub mod sources;
pub mod state;
pub mod trigger;

pub use query::{BatchOutput, QuerySummary, StreamingQuery, StreamingQueryBuilder};
pub use sinks::{ConsoleSink, FileSink, MemorySink, StreamSink};
pub use sources::{FileStreamSource, MemorySource, MicroBatchSource, SocketSource};
pub use state::{MemoryStateStore, StateStore};
pub use trigger::{OutputMode, Trigger};
