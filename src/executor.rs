//! Parallel execution of independent per-block tasks.

use anyhow::Result;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use std::{num::NonZeroUsize, ops::Deref, sync::Arc};

/// A thread pool for data-parallel work over independent blocks.
#[derive(Debug)]
pub struct TaskPool {
    pool: ThreadPool,
    num_threads: NonZeroUsize,
}

impl TaskPool {
    pub fn new(num_threads: NonZeroUsize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.get())
            .build()
            .unwrap();

        Self { pool, num_threads }
    }

    pub fn with_available_parallelism() -> Self {
        let num_threads = std::thread::available_parallelism()
            .unwrap_or_else(|_| NonZeroUsize::new(4).unwrap());
        Self::new(num_threads)
    }

    pub fn num_threads(&self) -> NonZeroUsize {
        self.num_threads
    }

    /// Applies the given task to every item in parallel and gathers the
    /// results in item order. Tasks must not share mutable state; each may
    /// capture read-only [`Broadcast`] values. Fails if any task fails.
    pub fn parallel_map<I, R, F>(&self, items: Vec<I>, task: F) -> Result<Vec<R>>
    where
        I: Send,
        R: Send,
        F: Fn(I) -> Result<R> + Send + Sync,
    {
        self.pool
            .install(|| items.into_par_iter().map(task).collect())
    }
}

/// A read-only handle to a value shared with every task of a parallel
/// phase. Never mutated after creation; later phases re-broadcast a new
/// value wholesale instead of updating an existing handle.
#[derive(Debug)]
pub struct Broadcast<T>(Arc<T>);

impl<T> Broadcast<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for Broadcast<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::bail;

    fn small_pool() -> TaskPool {
        TaskPool::new(NonZeroUsize::new(2).unwrap())
    }

    #[test]
    fn parallel_map_preserves_item_order() {
        let pool = small_pool();
        let results = pool
            .parallel_map((0..100).collect(), |item: u64| Ok(item * 2))
            .unwrap();
        assert_eq!(results, (0..100).map(|item| item * 2).collect::<Vec<_>>());
    }

    #[test]
    fn parallel_map_propagates_task_failure() {
        let pool = small_pool();
        let result = pool.parallel_map((0..100).collect(), |item: u64| {
            if item == 63 {
                bail!("Task failed");
            }
            Ok(item)
        });
        assert!(result.is_err());
    }

    #[test]
    fn broadcast_values_are_shared_read_only() {
        let pool = small_pool();
        let broadcast = Broadcast::new(vec![10_u64, 20, 30]);
        let results = pool
            .parallel_map((0..3).collect(), {
                let broadcast = broadcast.clone();
                move |item: usize| Ok(broadcast[item])
            })
            .unwrap();
        assert_eq!(results, vec![10, 20, 30]);
    }
}
