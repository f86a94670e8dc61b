//! Size-bucketed byte-buffer pool and a generic typed object pool
//! (spec §4.1). Grounded on the free-list shape of
//! `t51core/src/networking/chunkpool.rs` (pop-or-allocate, push-to-reclaim),
//! generalized to the spec's bucketed sizing and leak counters. Both pools
//! are explicit, constructible values rather than global singletons
//! (spec §9 "Global mutable state" — "make them either explicit
//! dependencies (preferred)").

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Buffer bucket sizes (spec §6).
pub const BUCKET_SIZES: [usize; 4] = [256, 1024, 4096, 16384];

#[derive(Default)]
struct Counters {
    total_created: AtomicUsize,
    total_rented: AtomicUsize,
    total_returned: AtomicUsize,
}

impl Counters {
    fn snapshot(&self, available: usize) -> PoolStats {
        let total_created = self.total_created.load(Ordering::Relaxed);
        PoolStats {
            available,
            total_created,
            total_rented: self.total_rented.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            leaks: total_created.saturating_sub(available),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PoolStats {
    pub available: usize,
    pub total_created: usize,
    pub total_rented: usize,
    pub total_returned: usize,
    pub leaks: usize,
}

struct Bucket {
    size: usize,
    free: Mutex<Vec<Vec<u8>>>,
    counters: Counters,
}

impl Bucket {
    fn new(size: usize) -> Bucket {
        Bucket {
            size,
            free: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    fn rent(bucket: &Arc<Bucket>, requested: usize) -> PooledBuffer {
        bucket.counters.total_rented.fetch_add(1, Ordering::Relaxed);

        let buf = {
            let mut free = bucket.free.lock().unwrap();
            free.pop()
        };

        let mut buf = match buf {
            Some(buf) => buf,
            None => {
                bucket.counters.total_created.fetch_add(1, Ordering::Relaxed);
                vec![0u8; bucket.size]
            }
        };
        buf.truncate(requested);
        buf.resize(requested, 0);

        PooledBuffer {
            data: buf,
            bucket: Some(Arc::clone(bucket)),
        }
    }

    fn reclaim(&self, mut buf: Vec<u8>) {
        buf.clear();
        buf.resize(self.size, 0);
        self.free.lock().unwrap().push(buf);
        self.counters.total_returned.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.free.lock().unwrap().len())
    }
}

/// Size-bucketed pool of byte buffers. `rent(n)` returns the smallest
/// bucket `>= n`, or an unpooled allocation for `n` larger than the
/// largest bucket. `Return` of a buffer whose capacity doesn't match one
/// of the buckets is a silent no-op (spec §4.1 "Failure modes").
pub struct BufferPool {
    buckets: [Arc<Bucket>; BUCKET_SIZES.len()],
}

impl BufferPool {
    pub fn new() -> BufferPool {
        let mut buckets = Vec::with_capacity(BUCKET_SIZES.len());
        for size in BUCKET_SIZES {
            buckets.push(Arc::new(Bucket::new(size)));
        }
        BufferPool {
            buckets: buckets.try_into().unwrap_or_else(|_| unreachable!()),
        }
    }

    /// Rent a buffer of at least `n` bytes. Buffers larger than the
    /// biggest bucket are allocated fresh and not pooled on return.
    pub fn rent(&self, n: usize) -> PooledBuffer {
        match self.buckets.iter().find(|b| b.size >= n) {
            Some(bucket) => Bucket::rent(bucket, n),
            None => PooledBuffer {
                data: vec![0u8; n],
                bucket: None,
            },
        }
    }

    /// Per-bucket stats, in ascending size order.
    pub fn stats(&self) -> [PoolStats; BUCKET_SIZES.len()] {
        let mut out = [PoolStats {
            available: 0,
            total_created: 0,
            total_rented: 0,
            total_returned: 0,
            leaks: 0,
        }; BUCKET_SIZES.len()];
        for (slot, bucket) in out.iter_mut().zip(self.buckets.iter()) {
            *slot = bucket.stats();
        }
        out
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new()
    }
}

/// An owned, pool-backed byte buffer. Returned to its bucket automatically
/// on drop, in addition to the explicit `release` affordance — so a
/// dropped connection can never leak a buffer back into the pool's
/// `leaks` counter.
pub struct PooledBuffer {
    data: Vec<u8>,
    bucket: Option<Arc<Bucket>>,
}

impl PooledBuffer {
    /// A buffer not backed by any pool (e.g. oversize rents). Useful in
    /// tests and for payloads assembled outside the hot path.
    pub fn unpooled(data: Vec<u8>) -> PooledBuffer {
        PooledBuffer { data, bucket: None }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(bucket) = self.bucket.take() {
            bucket.reclaim(std::mem::take(&mut self.data));
        }
    }
}

/// A resettable element type usable with `ObjectPool<T>`. `reset` must
/// clear all fields except any externally managed payload reference the
/// caller chose to keep (spec §4.1).
pub trait Poolable: Send {
    fn new() -> Self;
    fn reset(&mut self);
}

struct ObjectPoolInner<T> {
    free: Mutex<Vec<T>>,
    max_size: usize,
    counters: Counters,
}

/// Typed object pool configured with `(initial_size, max_size)`.
pub struct ObjectPool<T: Poolable> {
    inner: Arc<ObjectPoolInner<T>>,
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(initial_size: usize, max_size: usize) -> ObjectPool<T> {
        let mut free = Vec::with_capacity(initial_size);
        for _ in 0..initial_size {
            free.push(T::new());
        }
        let counters = Counters::default();
        counters
            .total_created
            .fetch_add(initial_size, Ordering::Relaxed);

        ObjectPool {
            inner: Arc::new(ObjectPoolInner {
                free: Mutex::new(free),
                max_size,
                counters,
            }),
        }
    }

    /// Rent a pre-existing element if available, else allocate a fresh one.
    pub fn rent(&self) -> Pooled<T> {
        self.inner.counters.total_rented.fetch_add(1, Ordering::Relaxed);

        let item = {
            let mut free = self.inner.free.lock().unwrap();
            free.pop()
        };
        let item = item.unwrap_or_else(|| {
            self.inner.counters.total_created.fetch_add(1, Ordering::Relaxed);
            T::new()
        });

        Pooled {
            item: Some(item),
            pool: Arc::clone(&self.inner),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.inner
            .counters
            .snapshot(self.inner.free.lock().unwrap().len())
    }
}

impl<T: Poolable> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        ObjectPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A rented element. Runs `T::reset` and re-inserts it into the pool on
/// drop, discarding it instead if `max_size` would be exceeded.
pub struct Pooled<T: Poolable> {
    item: Option<T>,
    pool: Arc<ObjectPoolInner<T>>,
}

impl<T: Poolable> Deref for Pooled<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.item.as_ref().expect("item taken before drop")
    }
}

impl<T: Poolable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("item taken before drop")
    }
}

impl<T: Poolable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(mut item) = self.item.take() {
            item.reset();
            self.pool.counters.total_returned.fetch_add(1, Ordering::Relaxed);

            let mut free = self.pool.free.lock().unwrap();
            if free.len() < self.pool.max_size {
                free.push(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_pool_returns_smallest_fitting_bucket() {
        let pool = BufferPool::new();
        let buf = pool.rent(100);
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.bucket.as_ref().unwrap().size, 256);
    }

    #[test]
    fn buffer_pool_oversize_is_unpooled() {
        let pool = BufferPool::new();
        let buf = pool.rent(20_000);
        assert_eq!(buf.len(), 20_000);
        assert!(buf.bucket.is_none());
        let stats = pool.stats();
        assert!(stats.iter().all(|s| s.total_created == 0));
    }

    #[test]
    fn rent_return_keeps_counters_consistent() {
        let pool = BufferPool::new();
        let before = pool.stats()[0];
        {
            let _buf = pool.rent(10);
        }
        let after = pool.stats()[0];
        assert_eq!(after.available, before.available);
        assert_eq!(after.total_rented, before.total_rented + 1);
        assert_eq!(after.total_returned, before.total_returned + 1);
    }

    struct Widget {
        value: u32,
    }

    impl Poolable for Widget {
        fn new() -> Self {
            Widget { value: 0 }
        }
        fn reset(&mut self) {
            self.value = 0;
        }
    }

    #[test]
    fn object_pool_rent_return_roundtrip() {
        let pool: ObjectPool<Widget> = ObjectPool::new(2, 8);
        let before = pool.stats();
        {
            let mut w = pool.rent();
            w.value = 42;
        }
        let after = pool.stats();
        assert_eq!(after.available, before.available);
        assert_eq!(after.total_rented, before.total_rented + 1);
        assert_eq!(after.total_returned, before.total_returned + 1);
        assert!(after.total_created >= after.available);
    }

    #[test]
    fn object_pool_discards_past_max_size() {
        let pool: ObjectPool<Widget> = ObjectPool::new(0, 1);
        let a = pool.rent();
        let b = pool.rent();
        drop(a);
        drop(b);
        assert_eq!(pool.stats().available, 1);
    }
}
