//! Bounded worker pool for the frame-level stages.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::Result;

/// Runs fallible per-item work either sequentially or on a dedicated
/// rayon pool, preserving input order in the output.
pub struct TaskExecutor {
    pool: Option<ThreadPool>,
}

impl TaskExecutor {
    /// A worker count of 0 or 1 disables the pool entirely; results are
    /// then bit-identical to a plain sequential loop by construction.
    pub fn new(n_workers: usize) -> Result<TaskExecutor> {
        let pool = if n_workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_workers)
                .build()
                .map_err(|e| crate::Error::InvalidConfig(format!("worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(TaskExecutor { pool })
    }

    pub fn n_workers(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Apply `work` to every item, failing fast on the first error.
    ///
    /// Output order matches input order regardless of worker count.
    pub fn map<T, U, F>(&self, items: &[T], work: F) -> Result<Vec<U>>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> Result<U> + Sync,
    {
        match &self.pool {
            Some(pool) if items.len() > 1 => {
                pool.install(|| items.par_iter().map(&work).collect())
            }
            _ => items.iter().map(&work).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_sequential_preserves_order() {
        let exec = TaskExecutor::new(1).unwrap();
        let items: Vec<i64> = (0..100).collect();
        let out = exec.map(&items, |&x| Ok(x * 2)).unwrap();
        assert_eq!(out, items.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_preserves_order() {
        let exec = TaskExecutor::new(4).unwrap();
        let items: Vec<i64> = (0..1000).collect();
        let out = exec.map(&items, |&x| Ok(x + 1)).unwrap();
        assert_eq!(out, items.iter().map(|x| x + 1).collect::<Vec<_>>());
    }

    #[test]
    fn test_error_propagates() {
        let exec = TaskExecutor::new(4).unwrap();
        let items: Vec<i64> = (0..100).collect();
        let result = exec.map(&items, |&x| {
            if x == 57 {
                Err(Error::InvalidConfig("boom".into()))
            } else {
                Ok(x)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_workers_is_sequential() {
        let exec = TaskExecutor::new(0).unwrap();
        assert_eq!(exec.n_workers(), 1);
    }

    #[test]
    fn test_pool_uses_requested_width() {
        let exec = TaskExecutor::new(3).unwrap();
        assert_eq!(exec.n_workers(), 3);
    }
}
