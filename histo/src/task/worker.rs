use super::partition::Slice;
use crate::config::BinRange;
use crate::error::{HistoError, Result};
use crate::header::SampleType;
use crate::pool::{BinBufferPool, BinLease};
use std::sync::Arc;

/// How a fixed width sample is read out of the payload
trait Sample {
    const WIDTH: usize;
    fn decode(bytes: &[u8]) -> i64;
}

struct U8Sample;

impl Sample for U8Sample {
    const WIDTH: usize = 1;
    #[inline(always)]
    fn decode(bytes: &[u8]) -> i64 {
        bytes[0] as i64
    }
}

/// Two byte samples are read in host byte order
struct I16Sample;

impl Sample for I16Sample {
    const WIDTH: usize = 2;
    #[inline(always)]
    fn decode(bytes: &[u8]) -> i64 {
        i16::from_ne_bytes([bytes[0], bytes[1]]) as i64
    }
}

fn count_samples<S: Sample>(data: &[u8], range: &BinRange, bins: &mut [u64]) -> Result<()> {
    let samples = data.chunks_exact(S::WIDTH);
    debug_assert!(samples.remainder().is_empty());
    for sample in samples {
        let index = range.clamp_index(S::decode(sample));
        match bins.get_mut(index) {
            Some(counter) => *counter += 1,
            None => {
                return Err(HistoError::BinIndexOutOfRange {
                    index,
                    bins: bins.len(),
                })
            }
        }
    }
    Ok(())
}

/// Count one slice into a freshly leased histogram.
///
/// The worker touches nothing but its own slice and its own lease.
pub fn count_slice(
    slice: &Slice<'_>,
    sample_type: SampleType,
    range: &BinRange,
    pool: &Arc<BinBufferPool<u64>>,
) -> Result<BinLease<u64>> {
    let mut bins = pool.acquire(range.bins());
    match sample_type {
        SampleType::UnsignedChar => count_samples::<U8Sample>(slice.data(), range, &mut bins)?,
        SampleType::Short => count_samples::<I16Sample>(slice.data(), range, &mut bins)?,
    }
    Ok(bins)
}
