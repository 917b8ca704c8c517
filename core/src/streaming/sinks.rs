//! Micro-batch sinks.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::pipeline::render_table;
use crate::streaming::query::BatchOutput;
use crate::streaming::trigger::OutputMode;
use crate::writer::{write_rows, FileFormat, SaveMode, WriteOptions};

/// Receives the rows emitted by every micro-batch.
#[async_trait]
pub trait StreamSink: Send {
    async fn emit(&mut self, batch: &BatchOutput) -> Result<()>;

    /// Whether the sink can take rows produced in `mode`.
    fn supports(&self, mode: OutputMode) -> bool;

    fn description(&self) -> String;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Prints every batch as a table.
pub struct ConsoleSink {
    out: Box<dyn Write + Send>,
    max_rows: usize,
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out, max_rows: 20 }
    }

    /// Rows shown per batch.
    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }
}

#[async_trait]
impl StreamSink for ConsoleSink {
    async fn emit(&mut self, batch: &BatchOutput) -> Result<()> {
        let separator = "-".repeat(43);
        writeln!(self.out, "{}", separator)?;
        writeln!(self.out, "Batch: {}", batch.batch_id)?;
        writeln!(self.out, "{}", separator)?;
        let table = render_table(
            &batch.rows.default_columns(),
            &batch.rows.to_rows(),
            self.max_rows,
        );
        write!(self.out, "{}", table)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    fn supports(&self, _mode: OutputMode) -> bool {
        true
    }

    fn description(&self) -> String {
        "console sink".to_string()
    }
}

/// Keeps every emitted batch in memory, readable through a shared handle.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<BatchOutput>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the collected batches.
    pub fn handle(&self) -> Arc<Mutex<Vec<BatchOutput>>> {
        Arc::clone(&self.batches)
    }

    pub async fn batches(&self) -> Vec<BatchOutput> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl StreamSink for MemorySink {
    async fn emit(&mut self, batch: &BatchOutput) -> Result<()> {
        self.batches.lock().await.push(batch.clone());
        Ok(())
    }

    fn supports(&self, mode: OutputMode) -> bool {
        matches!(mode, OutputMode::Append | OutputMode::Complete)
    }

    fn description(&self) -> String {
        "memory sink".to_string()
    }
}

/// Appends every batch as new part files under one directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    options: WriteOptions,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            options: WriteOptions::new(path).format(format).mode(SaveMode::Append),
        }
    }

    /// Use `options` for every batch; the save mode is always append.
    pub fn with_options(options: WriteOptions) -> Self {
        Self {
            options: options.mode(SaveMode::Append),
        }
    }
}

#[async_trait]
impl StreamSink for FileSink {
    async fn emit(&mut self, batch: &BatchOutput) -> Result<()> {
        if batch.rows.is_empty() {
            return Ok(());
        }
        let rows = batch.rows.to_rows();
        let columns = batch.rows.default_columns();
        let options = self.options.clone();
        let summary = tokio::task::spawn_blocking(move || write_rows(&rows, &columns, &options))
            .await
            .map_err(|e| crate::error::TallyError::ContextError(format!("write task failed: {}", e)))??;
        debug!(
            "Batch {} appended {} rows in {} files",
            batch.batch_id,
            summary.rows_written,
            summary.files.len()
        );
        Ok(())
    }

    fn supports(&self, mode: OutputMode) -> bool {
        mode == OutputMode::Append
    }

    fn description(&self) -> String {
        format!("file sink {}", self.options.path.display())
    }
}
