//! The main context for a tally application.

use std::sync::Arc;
use std::time::Instant;

use tally_common::TallyConfig;
use tracing::info;
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::record::RecordFormat;
use crate::scheduler::LocalScheduler;
use crate::source::Source;

/// `TallyContext` is the main entry point for running pipelines.
///
/// It is created once with [`TallyContext::init`], passed by reference to
/// every pipeline run, and torn down with [`TallyContext::shutdown`]. It
/// owns the worker pool that partitions are executed on.
#[derive(Debug, Clone)]
pub struct TallyContext {
    id: Uuid,
    config: TallyConfig,
    parallelism: usize,
    scheduler: Arc<LocalScheduler>,
    started_at: Instant,
}

impl TallyContext {
    /// Validate the configuration and start the worker pool.
    pub fn init(config: TallyConfig) -> Result<Self> {
        config.validate()?;
        let parallelism = config.parallelism()?;
        let scheduler = Arc::new(LocalScheduler::new(parallelism)?);
        let id = Uuid::new_v4();
        info!(
            "Initialized context '{}' ({}) with {} worker threads",
            config.app_name, id, parallelism
        );
        Ok(Self {
            id,
            config,
            parallelism,
            scheduler,
            started_at: Instant::now(),
        })
    }

    /// A context named `app_name` with `parallelism` worker threads.
    pub fn local(app_name: &str, parallelism: usize) -> Result<Self> {
        let config = TallyConfig::builder()
            .app_name(app_name)
            .master(format!("local[{}]", parallelism.max(1)))
            .build()?;
        Self::init(config)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn app_name(&self) -> &str {
        &self.config.app_name
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Delimiter for pipelines that do not set a record format.
    pub fn default_delimiter(&self) -> char {
        self.config.default_delimiter
    }

    /// Number of worker threads and default partition count.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn scheduler(&self) -> &LocalScheduler {
        &self.scheduler
    }

    /// Wrap in-memory lines as a dataset with the default partition count.
    pub fn parallelize(&self, lines: Vec<String>) -> Dataset {
        Dataset::from_lines_with_partitions(lines, self.parallelism)
    }

    /// Read a source into a dataset with the default partition count.
    pub fn load(&self, source: &Source, format: &RecordFormat) -> Result<Dataset> {
        let lines = source.read_lines(format)?;
        Ok(self.parallelize(lines))
    }

    /// Stop the context. The worker pool shuts down once the last clone is
    /// dropped.
    pub fn shutdown(self) {
        info!(
            "Shutting down context '{}' ({}) after {:?}",
            self.config.app_name,
            self.id,
            self.started_at.elapsed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_from_config() {
        let config = TallyConfig::builder()
            .app_name("WriteAPIs")
            .master("local[3]")
            .build()
            .unwrap();
        let ctx = TallyContext::init(config).unwrap();
        assert_eq!(ctx.app_name(), "WriteAPIs");
        assert_eq!(ctx.parallelism(), 3);
        assert_eq!(ctx.scheduler().num_threads(), 3);
        ctx.shutdown();
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = TallyConfig {
            master: "mesos://somewhere".to_string(),
            ..TallyConfig::default()
        };
        assert!(TallyContext::init(config).is_err());
    }

    #[test]
    fn test_parallelize_uses_parallelism() {
        let ctx = TallyContext::local("parallelize", 2).unwrap();
        let dataset = ctx.parallelize(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(dataset.num_partitions(), 2);
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn test_load_source() {
        let ctx = TallyContext::local("load", 1).unwrap();
        let dataset = ctx
            .load(&Source::lines(["x,1", "y,2"]), &RecordFormat::default())
            .unwrap();
        assert_eq!(dataset.lines(), &["x,1", "y,2"]);
    }
}
