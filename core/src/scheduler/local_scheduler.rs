//! Local Task Scheduler
//!
//! This module provides a local task scheduler that owns a Rayon thread pool
//! and executes one task per partition in parallel on a single machine.

use crate::error::{Result, TallyError};
use rayon::prelude::*;
use std::fmt::Debug;

/// Task represents a unit of work bound to one partition
pub struct Task<T> {
    pub partition: usize,
    pub compute_fn: ComputeFn<T>,
}

/// Type alias for the boxed per-partition computation
pub type ComputeFn<T> = Box<dyn FnOnce(usize) -> Result<T> + Send>;

impl<T> Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("partition", &self.partition)
            .field("compute_fn", &"<function>")
            .finish()
    }
}

impl<T> Task<T> {
    pub fn new<F>(partition: usize, compute_fn: F) -> Self
    where
        F: FnOnce(usize) -> Result<T> + Send + 'static,
    {
        Self {
            partition,
            compute_fn: Box::new(compute_fn),
        }
    }

    pub fn execute(self) -> Result<T> {
        (self.compute_fn)(self.partition)
    }
}

/// LocalScheduler manages parallel execution of tasks using Rayon
pub struct LocalScheduler {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

impl Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

impl LocalScheduler {
    /// Create a new LocalScheduler with its own pool of `num_threads` workers
    pub fn new(num_threads: usize) -> Result<Self> {
        let num_threads = num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("tally-worker-{}", i))
            .build()
            .map_err(|e| TallyError::ContextError(format!("failed to build worker pool: {}", e)))?;
        Ok(Self { pool, num_threads })
    }

    /// Get the number of threads
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Execute tasks in parallel; results come back in task order
    pub fn execute_tasks<T>(&self, tasks: Vec<Task<T>>) -> Result<Vec<T>>
    where
        T: Send,
    {
        self.pool
            .install(|| tasks.into_par_iter().map(Task::execute).collect())
    }

    /// Execute tasks and reduce their results. The reduction keeps task
    /// order, so `reduce_fn` only needs to be associative.
    pub fn execute_and_reduce<T, G>(
        &self,
        tasks: Vec<Task<T>>,
        identity: impl Fn() -> T + Send + Sync,
        reduce_fn: G,
    ) -> Result<T>
    where
        T: Send,
        G: Fn(T, T) -> Result<T> + Send + Sync,
    {
        self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(Task::execute)
                .reduce(
                    || Ok(identity()),
                    |acc, item| match (acc, item) {
                        (Ok(a), Ok(b)) => reduce_fn(a, b),
                        (Err(e), _) | (_, Err(e)) => Err(e),
                    },
                )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_tasks_preserves_order() {
        let scheduler = LocalScheduler::new(4).unwrap();
        let tasks = (0..8)
            .map(|p| Task::new(p, |index| Ok(index * 10)))
            .collect();
        assert_eq!(
            scheduler.execute_tasks(tasks).unwrap(),
            vec![0, 10, 20, 30, 40, 50, 60, 70]
        );
    }

    #[test]
    fn test_execute_and_reduce_concatenates_in_order() {
        let scheduler = LocalScheduler::new(3).unwrap();
        let tasks = (0..5)
            .map(|p| Task::new(p, |index| Ok(vec![index])))
            .collect();
        let result = scheduler
            .execute_and_reduce(tasks, Vec::new, |mut a, b| {
                a.extend(b);
                Ok(a)
            })
            .unwrap();
        assert_eq!(result, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_task_error_propagates() {
        let scheduler = LocalScheduler::new(2).unwrap();
        let tasks: Vec<Task<usize>> = vec![
            Task::new(0, Ok),
            Task::new(1, |_| Err(TallyError::ContextError("boom".to_string()))),
        ];
        assert!(scheduler.execute_tasks(tasks).is_err());
    }

    #[test]
    fn test_zero_threads_clamped() {
        assert_eq!(LocalScheduler::new(0).unwrap().num_threads(), 1);
    }
}
