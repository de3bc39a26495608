//! Bucket sources: abstract factories for [`Bucket`] (spec §3).

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::{Bucket, BucketStorageDyn, FreshStorage};
use crate::error::{Error, Result};

/// Abstract factory for buckets of a fixed element type.
///
/// Implementations are required to be thread-safe: buckets may be created
/// on one thread and destroyed (returning storage to a pool) on another,
/// concurrently with other creations and destructions (spec §5).
pub trait BucketSource<T: Copy + Default + Send + Sync + 'static>: Send + Sync {
    /// Obtain a bucket with `size` elements, zero-initialized.
    fn bucket_of_size(&self, size: usize) -> Result<Bucket<T>>;

    /// Whether buckets from this source may have a [`Bucket::const_view`]
    /// taken while still being filled by the owner (spec §3 "sharable
    /// source"). All buckets in this crate in fact support this
    /// mechanically (views always share the backing `Arc`); this flag
    /// instead tracks the *construction-time contract* `acquire_full_buckets`
    /// enforces: a source must declare itself sharable before a live
    /// downstream other than the null sink may be attached to it.
    fn supports_shared_views(&self) -> bool;
}

/// Every request allocates fresh storage; extractable as
/// [`super::FreshStorage<T>`]. Thread-safe (it holds no mutable state).
#[derive(Debug, Default, Clone, Copy)]
pub struct FreshBucketSource;

impl<T: Copy + Default + Send + Sync + 'static> BucketSource<T> for FreshBucketSource {
    fn bucket_of_size(&self, size: usize) -> Result<Bucket<T>> {
        Ok(Bucket::from_vec(vec![T::default(); size]))
    }

    fn supports_shared_views(&self) -> bool {
        true
    }
}

struct RecyclingState<T> {
    outstanding: usize,
    free: Vec<Vec<T>>,
}

struct RecyclingInner<T> {
    state: Mutex<RecyclingState<T>>,
    condvar: Condvar,
    max_outstanding: usize,
    blocking: bool,
    clear_on_recycle: bool,
    sharable: bool,
}

/// Storage returned by [`RecyclingBucketSource`]. Deliberately not `pub` at
/// the crate root (only reachable as `source::RecycledStorage` without a
/// re-export), so a caller can never name it as the `S` in
/// `extract_storage::<S>()` from outside this module — the same
/// "non-extractable because the type is private" property the original
/// gets from an anonymous/unnamed storage type (spec §3 "Storage is
/// private (non-extractable)").
struct RecycledStorage<T> {
    data: Vec<T>,
    source: Arc<RecyclingInner<T>>,
}

impl<T: Send + Sync + 'static> BucketStorageDyn<T> for RecycledStorage<T> {
    fn as_slice(&self) -> &[T] {
        &self.data
    }
    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any + Send + Sync> {
        self
    }
}

impl<T> Drop for RecycledStorage<T> {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        {
            let mut state = self.source.state.lock();
            state.outstanding -= 1;
            state.free.push(data);
        }
        self.source.condvar.notify_one();
    }
}

/// Maintains a free list up to a configurable maximum outstanding bucket
/// count (spec §3 "recycling source", §5 "blocking recycling source").
pub struct RecyclingBucketSource<T> {
    inner: Arc<RecyclingInner<T>>,
}

impl<T> Clone for RecyclingBucketSource<T> {
    fn clone(&self) -> Self {
        RecyclingBucketSource {
            inner: self.inner.clone(),
        }
    }
}

/// Builder for [`RecyclingBucketSource`] (the two independent flags plus
/// the outstanding-bucket cap and the shared-view capability).
pub struct RecyclingBucketSourceBuilder {
    max_outstanding: usize,
    blocking: bool,
    clear_on_recycle: bool,
    sharable: bool,
}

impl RecyclingBucketSourceBuilder {
    /// Start building a source with the given outstanding-bucket cap.
    pub fn new(max_outstanding: usize) -> Self {
        RecyclingBucketSourceBuilder {
            max_outstanding,
            blocking: false,
            clear_on_recycle: false,
            sharable: false,
        }
    }

    /// When the pool is exhausted, block until a bucket is returned instead
    /// of signaling exhaustion.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Zero-fill recycled storage before handing it out again.
    pub fn clear_on_recycle(mut self, clear_on_recycle: bool) -> Self {
        self.clear_on_recycle = clear_on_recycle;
        self
    }

    /// Declare this source sharable (spec §3 "sharable source"), required
    /// by `acquire_full_buckets` unless its live downstream is the null
    /// sink.
    pub fn sharable(mut self, sharable: bool) -> Self {
        self.sharable = sharable;
        self
    }

    /// Build the source.
    pub fn build<T>(self) -> RecyclingBucketSource<T> {
        RecyclingBucketSource {
            inner: Arc::new(RecyclingInner {
                state: Mutex::new(RecyclingState {
                    outstanding: 0,
                    free: Vec::new(),
                }),
                condvar: Condvar::new(),
                max_outstanding: self.max_outstanding,
                blocking: self.blocking,
                clear_on_recycle: self.clear_on_recycle,
                sharable: self.sharable,
            }),
        }
    }
}

impl<T: Copy + Default + Send + Sync + 'static> BucketSource<T> for RecyclingBucketSource<T> {
    fn bucket_of_size(&self, size: usize) -> Result<Bucket<T>> {
        let mut vec = {
            let mut state = self.inner.state.lock();
            loop {
                if let Some(v) = state.free.pop() {
                    state.outstanding += 1;
                    break v;
                }
                if state.outstanding < self.inner.max_outstanding {
                    state.outstanding += 1;
                    break Vec::new();
                }
                if self.inner.blocking {
                    self.inner.condvar.wait(&mut state);
                    continue;
                }
                return Err(Error::unexpected("recycling bucket source exhausted")
                    .with_context("max_outstanding", self.inner.max_outstanding));
            }
        };
        if self.inner.clear_on_recycle {
            vec.iter_mut().for_each(|x| *x = T::default());
        }
        vec.resize(size, T::default());
        let storage = RecycledStorage {
            data: vec,
            source: self.inner.clone(),
        };
        Ok(Bucket::from_storage(Box::new(storage), 0..size))
    }

    fn supports_shared_views(&self) -> bool {
        self.inner.sharable
    }
}

/// Wraps a caller-supplied buffer as a one-shot bucket, for integrating
/// externally managed memory (e.g. received from an FFI boundary) into a
/// pipeline without copying. Not a [`BucketSource`]: it produces exactly
/// one bucket.
pub struct ExternalBucketSource;

impl ExternalBucketSource {
    /// Wrap `data` as a fresh, extractable bucket (as [`FreshStorage<T>`]).
    pub fn wrap<T: Copy + Default + Send + Sync + 'static>(data: Vec<T>) -> Bucket<T> {
        Bucket::from_vec(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_source_allocates_zeroed() {
        let src = FreshBucketSource;
        let b: Bucket<u16> = src.bucket_of_size(4).unwrap();
        assert_eq!(b.to_vec(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn recycling_source_reuses_storage() {
        let src: RecyclingBucketSource<u16> = RecyclingBucketSourceBuilder::new(1).build();
        {
            let b = src.bucket_of_size(4).unwrap();
            b.set(0, 7);
        }
        // the bucket above was dropped, returning its storage to the pool.
        let b2 = src.bucket_of_size(4).unwrap();
        assert_eq!(b2.get(0), 7);
    }

    #[test]
    fn recycling_source_clear_on_recycle() {
        let src: RecyclingBucketSource<u16> = RecyclingBucketSourceBuilder::new(1)
            .clear_on_recycle(true)
            .build();
        {
            let b = src.bucket_of_size(4).unwrap();
            b.set(0, 7);
        }
        let b2 = src.bucket_of_size(4).unwrap();
        assert_eq!(b2.get(0), 0);
    }

    #[test]
    fn recycling_source_exhaustion_non_blocking() {
        let src: RecyclingBucketSource<u16> = RecyclingBucketSourceBuilder::new(1).build();
        let _b1 = src.bucket_of_size(4).unwrap();
        let err = src.bucket_of_size(4).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unexpected);
    }

    #[test]
    fn recycling_source_blocking_wakes_on_return() {
        use std::thread;
        use std::time::Duration;

        let src: RecyclingBucketSource<u16> = RecyclingBucketSourceBuilder::new(1).blocking(true).build();
        let b1 = src.bucket_of_size(4).unwrap();
        let src2 = src.clone();
        let handle = thread::spawn(move || src2.bucket_of_size(4).unwrap());

        thread::sleep(Duration::from_millis(20));
        drop(b1);
        let _b2 = handle.join().unwrap();
    }
}
