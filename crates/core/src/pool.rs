//! Bounded worker pool and batch partitioning
//!
//! Bulk operations fan out over a fixed-size admission pool. A worker holds
//! a [`WorkerPermit`] for the duration of one batch; the permit is released
//! when dropped, on every exit path including panics. The pool itself never
//! fails; failures belong to the work it admits.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admission-controlled pool bounding concurrent workers
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool admitting at most `capacity` concurrent workers
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot and take it
    ///
    /// Blocks the submitting task while the pool is saturated. The semaphore
    /// is never closed, so acquisition cannot fail.
    pub async fn acquire(&self) -> WorkerPermit {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .expect("worker pool semaphore is never closed");
        WorkerPermit { _permit: permit }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free; test observability only, racy by nature
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Admission ticket for one unit of work; the slot frees on drop
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

/// A contiguous slice `[start, end)` of the input assigned to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub start: usize,
    pub end: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Items assigned to each worker for `total` items over `pool_size` slots
///
/// `total / pool_size`, floored to `min_batch` so tiny inputs do not fan out
/// into per-item workers; otherwise over-allocated by one to cover the tail
/// lost to integer truncation.
pub fn batch_size(total: usize, pool_size: usize, min_batch: usize) -> usize {
    let each = total / pool_size.max(1);
    if each <= min_batch {
        min_batch.max(1)
    } else {
        each + 1
    }
}

/// Cut `[0, total)` into contiguous batches sized by [`batch_size`]
///
/// The final batch is truncated to the remaining count. The returned batches
/// exactly cover the input range with no gaps or overlaps.
pub fn partition(total: usize, pool_size: usize, min_batch: usize) -> Vec<Batch> {
    let each = batch_size(total, pool_size, min_batch);
    let mut batches = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + each).min(total);
        batches.push(Batch { start, end });
        start = end;
    }
    batches
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_batch_size_floor() {
        // 3 keys over 50 workers must not spawn 50 workers
        assert_eq!(batch_size(3, 50, 10), 10);
        assert_eq!(batch_size(500, 50, 10), 10);
    }

    #[test]
    fn test_batch_size_over_allocates() {
        // 5000 / 50 = 100 > 10, so each worker takes 101
        assert_eq!(batch_size(5000, 50, 10), 101);
        assert_eq!(batch_size(1000, 4, 10), 251);
    }

    #[test]
    fn test_batch_size_zero_pool() {
        // degenerate pool size is clamped rather than dividing by zero
        assert_eq!(batch_size(100, 0, 10), 101);
    }

    #[test]
    fn test_partition_exact_cover() {
        for total in [1usize, 3, 10, 11, 99, 100, 101, 5000] {
            for pool in [1usize, 4, 50] {
                for min_batch in [1usize, 10] {
                    let batches = partition(total, pool, min_batch);
                    let each = batch_size(total, pool, min_batch);
                    assert_eq!(batches.len(), total.div_ceil(each));

                    // no gap, no overlap, exact cover of [0, total)
                    let mut expected_start = 0;
                    for batch in &batches {
                        assert_eq!(batch.start, expected_start);
                        assert!(batch.end > batch.start);
                        expected_start = batch.end;
                    }
                    assert_eq!(expected_start, total);
                }
            }
        }
    }

    #[test]
    fn test_partition_empty() {
        assert!(partition(0, 50, 10).is_empty());
    }

    #[test]
    fn test_partition_single_batch() {
        let batches = partition(7, 50, 10);
        assert_eq!(batches, vec![Batch { start: 0, end: 7 }]);
    }

    #[tokio::test]
    async fn test_pool_bounds_active_workers() {
        let pool = WorkerPool::new(4);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let permit = pool.acquire().await;
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 4);
        assert_eq!(pool.available(), 4);
    }

    #[tokio::test]
    async fn test_permit_released_on_panic() {
        let pool = WorkerPool::new(1);
        let permit = pool.acquire().await;

        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("worker died");
        });
        assert!(handle.await.is_err());

        // the slot must come back even though the worker panicked
        let _again = pool.acquire().await;
    }
}
