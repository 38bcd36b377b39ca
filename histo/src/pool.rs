//! The recyclable bin buffer pool.
//!
//! Every counting worker and every merge step needs a zeroed counter buffer of the
//! configured bin count. Instead of hitting the allocator once per task, buffers are
//! leased from a [BinBufferPool] and handed back when the [BinLease] is dropped.
//! The pool is the only piece of shared mutable state in the engine; its mutex is
//! taken once per lease and once per release, never per sample.

use crate::error::{HistoError, Result};
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::ops::{Add, Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};

/// The alignment of every bin buffer
pub const CACHE_LINE_SIZE: usize = 64;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u64 {}
}

/// An unsigned counter type that can back a histogram bin.
///
/// The all-zero bit pattern must be the value zero, which is why the trait is sealed.
pub trait BinCounter:
    sealed::Sealed + Copy + Eq + Debug + Add<Output = Self> + Send + Sync + 'static
{
    fn as_u64(self) -> u64;
}

impl BinCounter for u64 {
    fn as_u64(self) -> u64 {
        self
    }
}

/// A zero initialized, cache line aligned heap buffer
struct AlignedBuffer<T: BinCounter> {
    ptr: NonNull<T>,
    len: usize,
}

// The buffer owns its memory exclusively, just like a Box<[T]>
unsafe impl<T: BinCounter> Send for AlignedBuffer<T> {}
unsafe impl<T: BinCounter> Sync for AlignedBuffer<T> {}

impl<T: BinCounter> AlignedBuffer<T> {
    fn layout(len: usize) -> Layout {
        let size = len
            .checked_mul(std::mem::size_of::<T>())
            .expect("bin buffer size overflows")
            .max(CACHE_LINE_SIZE);
        Layout::from_size_align(size, CACHE_LINE_SIZE).expect("invalid bin buffer layout")
    }

    fn zeroed(len: usize) -> Self {
        let layout = Self::layout(len);
        // Safety: the layout is never zero sized
        let raw = unsafe { alloc_zeroed(layout) } as *mut T;
        let ptr = NonNull::new(raw).unwrap_or_else(|| handle_alloc_error(layout));
        Self { ptr, len }
    }

    fn clear(&mut self) {
        // Safety: zero bytes are a valid zero for every BinCounter
        unsafe { std::ptr::write_bytes(self.ptr.as_ptr(), 0, self.len) }
    }

    fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: BinCounter> Drop for AlignedBuffer<T> {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, Self::layout(self.len)) }
    }
}

struct PoolState<T: BinCounter> {
    available: HashMap<usize, Vec<AlignedBuffer<T>>>,
    leased: HashSet<u64>,
    next_id: u64,
    allocated: usize,
}

/// A pool of counter buffers keyed by buffer length, the element type is `T`
pub struct BinBufferPool<T: BinCounter> {
    state: Mutex<PoolState<T>>,
}

impl<T: BinCounter> BinBufferPool<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PoolState {
                available: HashMap::new(),
                leased: HashSet::new(),
                next_id: 0,
                allocated: 0,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, PoolState<T>> {
        // A panic while holding the lock can only come from the release assertion,
        // which is fatal anyway, so the state is still usable for reporting
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lease a zeroed buffer of exactly `len` counters
    pub fn acquire(self: &Arc<Self>, len: usize) -> BinLease<T> {
        let (id, recycled) = {
            let mut state = self.state();
            let recycled = state.available.get_mut(&len).and_then(Vec::pop);
            if recycled.is_none() {
                state.allocated += 1;
            }
            let id = state.next_id;
            state.next_id += 1;
            state.leased.insert(id);
            (id, recycled)
        };
        let buffer = match recycled {
            Some(mut buffer) => {
                buffer.clear();
                buffer
            }
            None => AlignedBuffer::zeroed(len),
        };
        BinLease {
            pool: self.clone(),
            id,
            buffer: Some(buffer),
        }
    }

    fn release(&self, id: u64, buffer: AlignedBuffer<T>) {
        let mut state = self.state();
        assert!(
            state.leased.remove(&id),
            "bin buffer lease {} released twice or never issued by this pool",
            id
        );
        state.available.entry(buffer.len).or_default().push(buffer);
    }

    /// Number of buffers currently leased out
    pub fn leased(&self) -> usize {
        self.state().leased.len()
    }

    /// Number of recycled buffers of the given length waiting to be leased
    pub fn available(&self, len: usize) -> usize {
        self.state().available.get(&len).map_or(0, Vec::len)
    }

    /// Total number of buffers this pool ever allocated
    pub fn allocated(&self) -> usize {
        self.state().allocated
    }

    /// Tear down the pool, reporting leaked leases
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.state();
        if !state.leased.is_empty() {
            return Err(HistoError::PoolInvariant(format!(
                "{} bin buffer(s) still leased at pool teardown",
                state.leased.len()
            )));
        }
        state.available.clear();
        Ok(())
    }
}

/// A scope bound lease over a pooled buffer, released when dropped
pub struct BinLease<T: BinCounter> {
    pool: Arc<BinBufferPool<T>>,
    id: u64,
    buffer: Option<AlignedBuffer<T>>,
}

impl<T: BinCounter> BinLease<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.iter().map(|v| v.as_u64()).sum()
    }
}

impl<T: BinCounter> Deref for BinLease<T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        match self.buffer.as_ref() {
            Some(buffer) => buffer.as_slice(),
            None => &[],
        }
    }
}

impl<T: BinCounter> DerefMut for BinLease<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl<T: BinCounter> Debug for BinLease<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinLease")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: BinCounter> Drop for BinLease<T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(self.id, buffer);
        }
    }
}
