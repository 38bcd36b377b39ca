use crate::error::{HistoError, Result};
use crate::pool::{BinBufferPool, BinLease};
use std::collections::VecDeque;
use std::sync::Arc;

/// Sum two partial histograms into a new lease, both inputs go back to the pool
pub fn merge_pair(
    left: BinLease<u64>,
    right: BinLease<u64>,
    pool: &Arc<BinBufferPool<u64>>,
) -> Result<BinLease<u64>> {
    if left.len() != right.len() {
        return Err(HistoError::PoolInvariant(format!(
            "can not merge histograms of {} and {} bins",
            left.len(),
            right.len()
        )));
    }
    let mut merged = pool.acquire(left.len());
    for ((out, a), b) in merged.iter_mut().zip(left.iter()).zip(right.iter()) {
        *out = a + b;
    }
    Ok(merged)
}

/// FIFO of partial results waiting to be merged
#[derive(Default)]
pub struct MergeQueue {
    pending: VecDeque<BinLease<u64>>,
}

impl MergeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bins: BinLease<u64>) {
        self.pending.push_back(bins);
    }

    /// Pop the two results at the front of the queue, if there are two
    pub fn take_pair(&mut self) -> Option<(BinLease<u64>, BinLease<u64>)> {
        if self.pending.len() < 2 {
            return None;
        }
        let left = self.pending.pop_front()?;
        let right = self.pending.pop_front()?;
        Some((left, right))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Release everything still queued
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// The final result, only if exactly one is left
    pub fn into_single(mut self) -> Option<BinLease<u64>> {
        if self.pending.len() == 1 {
            self.pending.pop_front()
        } else {
            None
        }
    }
}

/// Merge all results on the current thread, in the same pairwise order the parallel
/// reducer uses
pub fn reduce_sequential(
    results: Vec<BinLease<u64>>,
    pool: &Arc<BinBufferPool<u64>>,
) -> Result<Option<BinLease<u64>>> {
    let mut queue = MergeQueue::new();
    for bins in results {
        queue.push(bins);
    }
    while let Some((left, right)) = queue.take_pair() {
        queue.push(merge_pair(left, right, pool)?);
    }
    Ok(queue.into_single())
}
