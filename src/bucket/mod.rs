//! Buckets: value-semantic, pluggable-storage containers for bulk payloads
//! (spec §3).
//!
//! A [`Bucket<T>`] is backed by `Arc<parking_lot::Mutex<Box<dyn
//! BucketStorageDyn<T>>>>` plus a visible `Range<usize>`. This replaces the
//! original's raw back-pointer from a view to its parent (recovered via
//! pointer arithmetic) with reference counting: a [`BucketView`] keeps the
//! backing allocation alive for as long as it exists, so "a view must not
//! outlive its parent" becomes unrepresentable instead of merely
//! documented (spec §9 asks for exactly this kind of unsafe-free
//! re-encoding of the storage trait object).

pub mod source;

use std::any::Any;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Object-safe storage backing a bucket's elements.
///
/// Implementations own a `Vec<T>` (or, for the recycling source, a `Vec<T>`
/// plus a handle back to the pool it is returned to on drop). `as_any`/
/// `into_any` let [`Bucket::extract_storage`] recover the concrete type.
pub trait BucketStorageDyn<T>: Send + Sync {
    /// Every element currently allocated (not just the bucket's visible
    /// range: a bucket's `range` narrows this further).
    fn as_slice(&self) -> &[T];
    /// Mutable access to every element currently allocated.
    fn as_mut_slice(&mut self) -> &mut [T];
    /// Type-erase for [`Bucket::with_storage`].
    fn as_any(&self) -> &dyn Any;
    /// Type-erase for [`Bucket::extract_storage`], consuming self.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

/// Storage owned outright by a bucket obtained from a fresh-allocation
/// source, or produced by `Bucket::clone` (spec: "copying allocates fresh
/// storage ... and does not carry over the source's storage object").
///
/// This is the type to name when calling `extract_storage::<FreshStorage<T>>`
/// on a bucket sourced from [`source::FreshBucketSource`].
#[derive(Debug)]
pub struct FreshStorage<T>(pub Vec<T>);

impl<T: Send + Sync + 'static> BucketStorageDyn<T> for FreshStorage<T> {
    fn as_slice(&self) -> &[T] {
        &self.0
    }
    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.0
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

struct EmptyStorage;

impl<T: Send + Sync + 'static> BucketStorageDyn<T> for EmptyStorage {
    fn as_slice(&self) -> &[T] {
        &[]
    }
    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut []
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

type Shared<T> = Arc<Mutex<Box<dyn BucketStorageDyn<T>>>>;

/// A value-semantic, pluggable-storage bucket of `T` (spec §3).
///
/// `Clone` performs a deep copy into freshly allocated [`FreshStorage`],
/// matching the original's copy constructor. Moving (ordinary Rust move)
/// transfers both the data and the storage object; there is no observable
/// "moved-from but still valid" state to preserve, since Rust statically
/// prevents further use of a moved-from value.
pub struct Bucket<T: Copy + Default + 'static> {
    data: Shared<T>,
    range: Range<usize>,
    has_storage: bool,
}

impl<T: Copy + Default + Send + Sync + 'static> Default for Bucket<T> {
    /// An empty bucket with no storage (spec §3: "a default-constructed
    /// bucket is empty and has no storage").
    fn default() -> Self {
        Bucket {
            data: Arc::new(Mutex::new(Box::new(EmptyStorage))),
            range: 0..0,
            has_storage: false,
        }
    }
}

impl<T: Copy + Default + Send + Sync + 'static> Bucket<T> {
    pub(crate) fn from_storage(storage: Box<dyn BucketStorageDyn<T>>, range: Range<usize>) -> Self {
        Bucket {
            data: Arc::new(Mutex::new(storage)),
            range,
            has_storage: true,
        }
    }

    /// Build a bucket owning a freshly allocated, unshared `Vec<T>`.
    pub fn from_vec(data: Vec<T>) -> Self {
        let len = data.len();
        Self::from_storage(Box::new(FreshStorage(data)), 0..len)
    }

    /// Number of elements currently visible through this bucket.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// True if this bucket has no visible elements.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Copy out the element at `index` (within the visible range).
    pub fn get(&self, index: usize) -> T {
        self.with_slice(|s| s[index])
    }

    /// Overwrite the element at `index` (within the visible range).
    pub fn set(&self, index: usize, value: T) {
        self.with_mut_slice(|s| s[index] = value)
    }

    /// Copy the visible range out as an owned `Vec<T>`.
    pub fn to_vec(&self) -> Vec<T> {
        self.with_slice(|s| s.to_vec())
    }

    /// Run `f` with read access to the visible range.
    ///
    /// This is the efficient primitive: histogram application loops use it
    /// to lock once and operate on a plain slice rather than locking per
    /// element.
    pub fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let guard = self.data.lock();
        f(&guard.as_slice()[self.range.clone()])
    }

    /// Run `f` with mutable access to the visible range.
    pub fn with_mut_slice<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        let mut guard = self.data.lock();
        f(&mut guard.as_mut_slice()[self.range.clone()])
    }

    /// Contract the visible span in place (spec §3 `shrink`). Elements
    /// outside the new span become inaccessible through `self`, but remain
    /// visible through views taken before the shrink.
    pub fn shrink(&mut self, start: usize, count: usize) {
        let new_start = self.range.start + start;
        let new_end = new_start + count;
        assert!(new_end <= self.range.end, "shrink out of bounds");
        self.range = new_start..new_end;
    }

    /// A read-only view over `self.range[start..start+count]`, sharing
    /// memory with `self` (spec §3 "sub-bucket").
    pub fn sub_view(&self, start: usize, count: usize) -> BucketView<T> {
        let new_start = self.range.start + start;
        let new_end = new_start + count;
        assert!(new_end <= self.range.end, "sub_view out of bounds");
        BucketView {
            data: self.data.clone(),
            range: new_start..new_end,
        }
    }

    /// A read-only view over the whole visible range, sharing memory with
    /// `self` (spec §3 "const view").
    pub fn const_view(&self) -> BucketView<T> {
        BucketView {
            data: self.data.clone(),
            range: self.range.clone(),
        }
    }

    /// Run `f` with the concrete storage type, if it matches and this
    /// bucket is not shared with an outstanding view (spec §3 `storage<S>`).
    pub fn with_storage<S: 'static, R>(&self, f: impl FnOnce(&S) -> R) -> Result<R> {
        if !self.has_storage {
            return Err(Error::bad_storage_cast("bucket has no storage"));
        }
        let guard = self.data.lock();
        guard
            .as_any()
            .downcast_ref::<S>()
            .map(f)
            .ok_or_else(|| Error::bad_storage_cast("storage type mismatch"))
    }

    /// Take ownership of the concrete storage object, if it matches and no
    /// view derived from this bucket is still alive (spec §3
    /// `extract_storage<S>`; spec §8 "extract_storage succeeds exactly once
    /// on a non-view bucket; afterwards the bucket is empty" — in Rust, the
    /// bucket is consumed by this call rather than left empty).
    pub fn extract_storage<S: 'static>(self) -> Result<S> {
        if !self.has_storage {
            return Err(Error::bad_storage_cast("bucket has no storage"));
        }
        let boxed_mutex = Arc::try_unwrap(self.data).map_err(|_| {
            Error::bad_storage_cast("cannot extract storage: an outstanding view shares this bucket")
        })?;
        let storage = boxed_mutex.into_inner();
        storage
            .into_any()
            .downcast::<S>()
            .map(|b| *b)
            .map_err(|_| Error::bad_storage_cast("storage type mismatch"))
    }
}

impl<T: Copy + Default + Send + Sync + 'static> Clone for Bucket<T> {
    /// Deep copy into freshly allocated storage (spec §3, §8: "`B ==
    /// copy(B)` and `copy(B)` does not share storage with B").
    fn clone(&self) -> Self {
        Bucket::from_vec(self.to_vec())
    }
}

impl<T: Copy + Default + Send + Sync + PartialEq + 'static> PartialEq for Bucket<T> {
    fn eq(&self, other: &Self) -> bool {
        self.to_vec() == other.to_vec()
    }
}
impl<T: Copy + Default + Send + Sync + Eq + 'static> Eq for Bucket<T> {}

impl<T: Copy + Default + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for Bucket<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("len", &self.len())
            .field("data", &self.to_vec())
            .finish()
    }
}

/// A read-only view sharing memory with a parent [`Bucket`] (spec §3
/// "sub-bucket or ... const view"). Has no storage of its own and cannot
/// extract one.
pub struct BucketView<T: Copy + Default + 'static> {
    data: Shared<T>,
    range: Range<usize>,
}

impl<T: Copy + Default + Send + Sync + 'static> BucketView<T> {
    /// Number of elements visible through this view.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// True if the view has no visible elements.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Copy out the element at `index`.
    pub fn get(&self, index: usize) -> T {
        self.with_slice(|s| s[index])
    }

    /// Copy the visible range out as an owned `Vec<T>`.
    pub fn to_vec(&self) -> Vec<T> {
        self.with_slice(|s| s.to_vec())
    }

    /// Run `f` with read access to the visible range.
    pub fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let guard = self.data.lock();
        f(&guard.as_slice()[self.range.clone()])
    }
}

impl<T: Copy + Default + Send + Sync + 'static> Clone for BucketView<T> {
    /// Cheap: another view sharing the same memory, not a deep copy.
    fn clone(&self) -> Self {
        BucketView {
            data: self.data.clone(),
            range: self.range.clone(),
        }
    }
}

impl<T: Copy + Default + Send + Sync + PartialEq + 'static> PartialEq for BucketView<T> {
    fn eq(&self, other: &Self) -> bool {
        self.to_vec() == other.to_vec()
    }
}
impl<T: Copy + Default + Send + Sync + PartialEq + 'static> PartialEq<Bucket<T>> for BucketView<T> {
    fn eq(&self, other: &Bucket<T>) -> bool {
        self.to_vec() == other.to_vec()
    }
}
impl<T: Copy + Default + Send + Sync + Eq + 'static> Eq for BucketView<T> {}

impl<T: Copy + Default + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for BucketView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketView")
            .field("len", &self.len())
            .field("data", &self.to_vec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bucket_has_no_storage() {
        let b: Bucket<u16> = Bucket::default();
        assert!(b.is_empty());
        assert!(b.with_storage::<FreshStorage<u16>, _>(|_| ()).is_err());
    }

    #[test]
    fn clone_is_deep_copy() {
        let b = Bucket::from_vec(vec![1u16, 2, 3]);
        let c = b.clone();
        assert_eq!(b, c);
        c.set(0, 99);
        assert_eq!(b.get(0), 1);
        assert_eq!(c.get(0), 99);
    }

    #[test]
    fn sub_view_sees_parent_data_before_shrink() {
        let mut b = Bucket::from_vec(vec![10u16, 20, 30, 40]);
        let view = b.sub_view(1, 2);
        assert_eq!(view.to_vec(), vec![20, 30]);
        b.shrink(0, 1);
        // the view, taken before the shrink, is unaffected.
        assert_eq!(view.to_vec(), vec![20, 30]);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn extract_storage_fails_with_outstanding_view() {
        let b = Bucket::from_vec(vec![1u16, 2]);
        let _view = b.const_view();
        assert!(b.extract_storage::<FreshStorage<u16>>().is_err());
    }

    #[test]
    fn extract_storage_succeeds_and_matches_type() {
        let b = Bucket::from_vec(vec![1u16, 2, 3]);
        let storage = b.extract_storage::<FreshStorage<u16>>().unwrap();
        assert_eq!(storage.0, vec![1, 2, 3]);
    }

    #[test]
    fn extract_storage_wrong_type_is_bad_cast() {
        let b = Bucket::from_vec(vec![1u16, 2, 3]);
        let err = b.extract_storage::<FreshStorage<u32>>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadStorageCast);
    }
}
