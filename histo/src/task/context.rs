use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use log::{debug, info};

use super::merge::{merge_pair, MergeQueue};
use super::partition::{partition, Slice};
use super::worker::count_slice;
use crate::codec::decode_payload;
use crate::config::{BinRange, HistogramConfig};
use crate::error::{HistoError, Result};
use crate::header::{PayloadDescriptor, SampleType};
use crate::output::write_histogram_file;
use crate::pool::{BinBufferPool, BinLease};

/// Set by the first failing task, tasks that have not started yet skip their work
#[derive(Default)]
struct CancelFlag(AtomicBool);

impl CancelFlag {
    fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run a task body, turning a panic into an error the reducer can report
fn guarded<T, F: FnOnce() -> Result<T>>(body: F) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            msg.to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Err(HistoError::TaskPanic(message))
    })
}

/// The final merged histogram
#[derive(Debug)]
pub struct Histogram {
    bins: BinLease<u64>,
    sample_count: usize,
}

impl Histogram {
    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Sum of all bins
    pub fn total(&self) -> u64 {
        self.bins.total()
    }

    /// Number of samples the header declared
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

/// What a completed run reports back to the caller
#[derive(Clone, Debug)]
pub struct RunReport {
    pub total_samples: u64,
    pub bins: usize,
    pub elapsed: Duration,
}

/// A histogram computation over one input file
pub struct HistogramTask {
    config: HistogramConfig,
    range: BinRange,
    parallelism: usize,
    pool: Arc<BinBufferPool<u64>>,
}

impl HistogramTask {
    /// Create a task with a pool of its own
    pub fn new(config: HistogramConfig) -> Result<Self> {
        Self::with_pool(config, BinBufferPool::new())
    }

    /// Create a task that leases its bins from the given pool
    pub fn with_pool(config: HistogramConfig, pool: Arc<BinBufferPool<u64>>) -> Result<Self> {
        let range = config.bin_range()?;
        let parallelism = config.parallelism();
        Ok(Self {
            config,
            range,
            parallelism,
            pool,
        })
    }

    pub fn config(&self) -> &HistogramConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BinBufferPool<u64>> {
        &self.pool
    }

    /// Parse, decode and count the input file.
    ///
    /// Counting tasks run on the rayon thread pool while the calling thread drives the
    /// merge queue, so this must not be called from inside a rayon worker.
    pub fn compute(&self) -> Result<Histogram> {
        let (descriptor, mut reader) = PayloadDescriptor::open(&self.config.input)?;
        descriptor.encoding().ensure_supported()?;
        if descriptor.sample_count() == 0 {
            return Err(HistoError::format(format!(
                "{} declares an empty payload",
                self.config.input.display()
            )));
        }
        info!(
            "Input {}: {} samples of {}, {} encoded",
            self.config.input.display(),
            descriptor.sample_count(),
            descriptor.sample_type().name(),
            descriptor.encoding().name()
        );

        let payload = decode_payload(&mut reader, &descriptor, self.parallelism)?;
        let width = descriptor.sample_type().width();
        let slices = partition(&payload, self.parallelism, width);
        info!(
            "Decoded {} bytes into {} buffers, total number of counting tasks: {}",
            payload.len(),
            payload.buffers().len(),
            slices.len()
        );

        let bins = self.count_and_merge(&slices, descriptor.sample_type())?;
        let histogram = Histogram {
            bins,
            sample_count: descriptor.sample_count(),
        };

        if histogram.total() != descriptor.sample_count() as u64 {
            return Err(HistoError::PoolInvariant(format!(
                "histogram holds {} samples but {} were decoded",
                histogram.total(),
                descriptor.sample_count()
            )));
        }
        Ok(histogram)
    }

    fn count_and_merge(
        &self,
        slices: &[Slice<'_>],
        sample_type: SampleType,
    ) -> Result<BinLease<u64>> {
        let pool = &self.pool;
        let range = &self.range;
        self.fork_join(slices.len(), |task_id| {
            let slice = &slices[task_id];
            debug!(
                "Task {} begin: buffer {} bytes {}..{}",
                task_id,
                slice.buffer(),
                slice.offset(),
                slice.offset() + slice.len()
            );
            count_slice(slice, sample_type, range, pool)
        })
    }

    /// Run `tasks` leaf jobs on the rayon pool and merge their partial histograms.
    ///
    /// Every spawned job sends exactly one message, a panic included, so the receive
    /// loop always terminates.
    fn fork_join<F>(&self, tasks: usize, leaf: F) -> Result<BinLease<u64>>
    where
        F: Fn(usize) -> Result<BinLease<u64>> + Sync,
    {
        let cancel = CancelFlag::default();
        let (tx, rx) = mpsc::channel::<Result<BinLease<u64>>>();
        let pool = &self.pool;
        let leaf = &leaf;

        rayon::in_place_scope(|scope| {
            for task_id in 0..tasks {
                let tx = tx.clone();
                let cancel = &cancel;
                scope.spawn(move |_| {
                    let result = if cancel.is_cancelled() {
                        Err(HistoError::Cancelled)
                    } else {
                        guarded(|| leaf(task_id))
                    };
                    // The receiver outlives the scope
                    let _ = tx.send(result);
                });
            }

            let mut queue = MergeQueue::new();
            let mut outstanding = tasks;
            let mut first_error = None;

            while outstanding > 0 {
                let result = match rx.recv() {
                    Ok(result) => result,
                    Err(_) => break,
                };
                outstanding -= 1;
                match result {
                    Ok(bins) if first_error.is_none() => {
                        queue.push(bins);
                        if let Some((left, right)) = queue.take_pair() {
                            outstanding += 1;
                            let tx = tx.clone();
                            let cancel = &cancel;
                            scope.spawn(move |_| {
                                let result = if cancel.is_cancelled() {
                                    Err(HistoError::Cancelled)
                                } else {
                                    guarded(|| merge_pair(left, right, pool))
                                };
                                let _ = tx.send(result);
                            });
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        cancel.cancel();
                        queue.clear();
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => queue.into_single().ok_or_else(|| {
                    HistoError::PoolInvariant("no partial histogram left to report".to_string())
                }),
            }
        })
    }

    /// Compute the histogram and write it to the configured output path
    pub fn run(&self) -> Result<RunReport> {
        let begin = Instant::now();
        let histogram = self.compute()?;
        write_histogram_file(&self.config.output, histogram.bins())?;
        let report = RunReport {
            total_samples: histogram.total(),
            bins: histogram.len(),
            elapsed: begin.elapsed(),
        };
        info!(
            "Histogram of {} samples written to {}, Duration: {}ms",
            report.total_samples,
            self.config.output.display(),
            report.elapsed.as_millis()
        );
        Ok(report)
    }

    /// Tear the task down, reporting bins that were never handed back to the pool
    pub fn close(self) -> Result<()> {
        self.pool.shutdown()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    type TestResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

    fn task_with_bins(bins: usize) -> TestResult<HistogramTask> {
        let config = HistogramConfig {
            bins,
            min: 0,
            max: bins as u32 - 1,
            threads: Some(2),
            ..Default::default()
        };
        Ok(HistogramTask::new(config)?)
    }

    #[test]
    fn test_fork_join_merges_every_leaf() -> TestResult<()> {
        let task = task_with_bins(8)?;
        let merged = task.fork_join(5, |task_id| {
            let mut bins = task.pool().acquire(8);
            bins[task_id] += task_id as u64 + 1;
            Ok(bins)
        })?;
        assert_eq!(&merged[..], &[1, 2, 3, 4, 5, 0, 0, 0]);
        drop(merged);
        assert_eq!(task.pool().leased(), 0);
        Ok(())
    }

    #[test]
    fn test_panicking_leaf_fails_the_run() -> TestResult<()> {
        let task = task_with_bins(4)?;
        let err = task
            .fork_join(6, |task_id| {
                if task_id == 3 {
                    panic!("counting task {} blew up", task_id);
                }
                Ok(task.pool().acquire(4))
            })
            .unwrap_err();
        assert_eq!(err.kind(), "TaskPanic");
        assert!(err.to_string().contains("counting task 3 blew up"));
        assert_eq!(task.pool().leased(), 0);
        task.close()?;
        Ok(())
    }

    #[test]
    fn test_leaf_error_is_reported_once() -> TestResult<()> {
        let task = task_with_bins(4)?;
        let err = task
            .fork_join(4, |task_id| {
                if task_id % 2 == 1 {
                    return Err(HistoError::decode("bad chunk"));
                }
                Ok(task.pool().acquire(4))
            })
            .unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
        assert_eq!(task.pool().leased(), 0);
        Ok(())
    }

    #[test]
    fn test_guarded_keeps_string_payloads() {
        let err = guarded::<(), _>(|| panic!("{}", String::from("formatted"))).unwrap_err();
        assert_eq!(err.kind(), "TaskPanic");
        assert!(err.to_string().contains("formatted"));
        assert_eq!(guarded(|| Ok(7)).ok(), Some(7));
    }
}
