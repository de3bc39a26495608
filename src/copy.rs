//! `copy_to_buckets`/`copy_to_full_buckets`: copy data from device-shaped
//! payload events into pooled bucket storage (spec §4.2, grounded on
//! `copy_to_buckets.hpp`). Used to integrate a push-style device API (one
//! that calls our handler with acquired data) as a pipeline source that can
//! be buffered.
//!
//! `Event` names the one event type whose contents are copied (anything
//! convertible to `&[T]`, e.g. a raw byte chunk from a driver callback);
//! every other event type is passed through unchanged. Rust cannot give a
//! struct both a generic `impl<E> HandleEvent<E>` passthrough and a
//! specific `impl HandleEvent<Event>` without the two overlapping for some
//! instantiation, so (as in [`crate::batch::BatchBinIncrements`]) dispatch
//! is done at runtime via [`std::any::Any`] inside one blanket impl.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bucket::source::BucketSource;
use crate::bucket::{Bucket, BucketView};
use crate::error::Result;
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};

/// Copies the contents of each `Event` into a bucket of matching size and
/// forwards it; every other event type passes through unchanged.
pub struct CopyToBuckets<T, Event, D> {
    source: Arc<dyn BucketSource<T>>,
    downstream: D,
    _marker: PhantomData<Event>,
}

/// Build a [`CopyToBuckets`] processor.
pub fn copy_to_buckets<T, Event, D>(source: Arc<dyn BucketSource<T>>, downstream: D) -> CopyToBuckets<T, Event, D>
where
    T: Copy + Default + Send + Sync + 'static,
{
    CopyToBuckets {
        source,
        downstream,
        _marker: PhantomData,
    }
}

impl<T, Event, D: Flush> Flush for CopyToBuckets<T, Event, D> {
    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }
}

impl<T, Event, D: Introspect> Introspect for CopyToBuckets<T, Event, D> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "copy_to_buckets")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<T, Event, D, E> HandleEvent<E> for CopyToBuckets<T, Event, D>
where
    T: Copy + Default + Send + Sync + 'static,
    Event: AsRef<[T]> + 'static,
    E: 'static,
    D: HandleEvent<Bucket<T>> + HandleEvent<E>,
{
    fn handle_ref(&mut self, event: &E) -> Result<()> {
        let any_event: &dyn Any = event;
        if let Some(chunk) = any_event.downcast_ref::<Event>() {
            let slice = chunk.as_ref();
            let bucket = self.source.bucket_of_size(slice.len())?;
            bucket.with_mut_slice(|dst| dst.copy_from_slice(slice));
            return self.downstream.handle_owned(bucket);
        }
        self.downstream.handle_ref(event)
    }
    fn handle_owned(&mut self, event: E) -> Result<()> {
        self.handle_ref(&event)
    }
}

/// Copies `Event` contents into fixed-size buckets, providing a live const
/// view of each incremental write alongside the eventually-full batch
/// bucket. The two streams share underlying storage, so `live_downstream`
/// must use a bucket source supporting shared views (spec §3 "sharable
/// source").
///
/// If `live_downstream` signals end-of-processing mid-bucket, the partial
/// bucket is still flushed to `batch_downstream` before the error
/// propagates, and likewise if `batch_downstream` signals end-of-processing,
/// `live_downstream` is flushed before the error propagates. This means
/// some data can be observed on both streams (documented as intended, not a
/// bug to fix: spec §9).
pub struct CopyToFullBuckets<T, Event, L, B> {
    source: Arc<dyn BucketSource<T>>,
    batch_size: usize,
    bucket: Option<Bucket<T>>,
    filled: usize,
    live_downstream: L,
    batch_downstream: B,
    _marker: PhantomData<Event>,
}

/// Build a [`CopyToFullBuckets`] processor. Fails if `batch_size == 0` or
/// `source` does not support shared views (spec §4.2).
pub fn copy_to_full_buckets<T, Event, L, B>(
    source: Arc<dyn BucketSource<T>>,
    batch_size: usize,
    live_downstream: L,
    batch_downstream: B,
) -> Result<CopyToFullBuckets<T, Event, L, B>>
where
    T: Copy + Default + Send + Sync + 'static,
{
    if batch_size == 0 {
        return Err(crate::error::Error::invalid_argument(
            "copy_to_full_buckets: batch_size must be nonzero",
        ));
    }
    if !source.supports_shared_views() {
        return Err(crate::error::Error::invalid_argument(
            "copy_to_full_buckets: source must support shared views",
        ));
    }
    Ok(CopyToFullBuckets {
        source,
        batch_size,
        bucket: None,
        filled: 0,
        live_downstream,
        batch_downstream,
        _marker: PhantomData,
    })
}

impl<T, Event, L, B> CopyToFullBuckets<T, Event, L, B>
where
    T: Copy + Default + Send + Sync + 'static,
{
    fn emit_live(&mut self, start: usize, count: usize) -> Result<()>
    where
        L: HandleEvent<BucketView<T>>,
        B: HandleEvent<Bucket<T>> + Flush,
    {
        if count == 0 {
            return Ok(());
        }
        let view = self.bucket.as_ref().unwrap().sub_view(start, count);
        match self.live_downstream.handle_owned(view) {
            Ok(()) => Ok(()),
            Err(e) if e.is_end_of_processing() => {
                let mut owned = self.bucket.take().unwrap();
                owned.shrink(0, start + count);
                self.batch_downstream.handle_owned(owned)?;
                self.batch_downstream.flush()?;
                self.filled = 0;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn emit_batch(&mut self, bucket: Bucket<T>) -> Result<()>
    where
        L: Flush,
        B: HandleEvent<Bucket<T>>,
    {
        match self.batch_downstream.handle_owned(bucket) {
            Ok(()) => Ok(()),
            Err(e) if e.is_end_of_processing() => {
                self.live_downstream.flush()?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn flush_batch(&mut self) -> Result<()>
    where
        B: HandleEvent<Bucket<T>> + Flush,
    {
        if let Some(mut bkt) = self.bucket.take() {
            if self.filled > 0 {
                bkt.shrink(0, self.filled);
                self.batch_downstream.handle_owned(bkt)?;
            }
        }
        self.filled = 0;
        self.batch_downstream.flush()
    }

    fn handle_chunk(&mut self, slice: &[T]) -> Result<()>
    where
        L: HandleEvent<BucketView<T>> + Flush,
        B: HandleEvent<Bucket<T>> + Flush,
    {
        let mut remaining = slice;
        while !remaining.is_empty() {
            if self.filled == 0 && self.bucket.is_none() {
                self.bucket = Some(self.source.bucket_of_size(self.batch_size)?);
            }
            let copy_size = remaining.len().min(self.batch_size - self.filled);
            {
                let start = self.filled;
                let bkt = self.bucket.as_ref().unwrap();
                bkt.with_mut_slice(|dst| dst[start..start + copy_size].copy_from_slice(&remaining[..copy_size]));
            }
            self.emit_live(self.filled, copy_size)?;
            self.filled += copy_size;
            if self.filled == self.batch_size {
                let full = self.bucket.take().unwrap();
                self.emit_batch(full)?;
                self.filled = 0;
            }
            remaining = &remaining[copy_size..];
        }
        Ok(())
    }
}

impl<T, Event, L, B> Flush for CopyToFullBuckets<T, Event, L, B>
where
    T: Copy + Default + Send + Sync + 'static,
    L: Flush,
    B: HandleEvent<Bucket<T>> + Flush,
{
    fn flush(&mut self) -> Result<()> {
        match self.live_downstream.flush() {
            Ok(()) => self.flush_batch(),
            Err(e) if e.is_end_of_processing() => {
                self.flush_batch()?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

impl<T, Event, L, B: Introspect> Introspect for CopyToFullBuckets<T, Event, L, B>
where
    L: Introspect,
{
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "copy_to_full_buckets")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.live_downstream.introspect_graph();
        g.extend(self.batch_downstream.introspect_graph());
        g.insert(0, self.introspect_node());
        g
    }
}

impl<T, Event, L, B, E> HandleEvent<E> for CopyToFullBuckets<T, Event, L, B>
where
    T: Copy + Default + Send + Sync + 'static,
    Event: AsRef<[T]> + 'static,
    E: 'static,
    L: HandleEvent<BucketView<T>> + HandleEvent<E> + Flush,
    B: HandleEvent<Bucket<T>> + Flush,
{
    fn handle_ref(&mut self, event: &E) -> Result<()> {
        let any_event: &dyn Any = event;
        if let Some(chunk) = any_event.downcast_ref::<Event>() {
            return self.handle_chunk(chunk.as_ref());
        }
        match self.live_downstream.handle_ref(event) {
            Ok(()) => Ok(()),
            Err(e) if e.is_end_of_processing() => {
                self.flush_batch()?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
    fn handle_owned(&mut self, event: E) -> Result<()> {
        self.handle_ref(&event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::source::FreshBucketSource;

    #[derive(Default)]
    struct Collector {
        received: Vec<Vec<u8>>,
        flushed: bool,
    }
    impl Flush for Collector {
        fn flush(&mut self) -> Result<()> {
            self.flushed = true;
            Ok(())
        }
    }
    impl HandleEvent<Bucket<u8>> for Collector {
        fn handle_ref(&mut self, event: &Bucket<u8>) -> Result<()> {
            self.received.push(event.to_vec());
            Ok(())
        }
        fn handle_owned(&mut self, event: Bucket<u8>) -> Result<()> {
            self.received.push(event.to_vec());
            Ok(())
        }
    }
    impl HandleEvent<BucketView<u8>> for Collector {
        fn handle_ref(&mut self, event: &BucketView<u8>) -> Result<()> {
            self.received.push(event.to_vec());
            Ok(())
        }
        fn handle_owned(&mut self, event: BucketView<u8>) -> Result<()> {
            self.received.push(event.to_vec());
            Ok(())
        }
    }
    impl HandleEvent<i32> for Collector {
        fn handle_ref(&mut self, _event: &i32) -> Result<()> {
            Ok(())
        }
        fn handle_owned(&mut self, _event: i32) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Clone)]
    struct Chunk(Vec<u8>);
    impl AsRef<[u8]> for Chunk {
        fn as_ref(&self) -> &[u8] {
            &self.0
        }
    }

    #[test]
    fn copy_to_buckets_copies_and_passes_through() {
        let mut p = copy_to_buckets::<u8, Chunk, _>(Arc::new(FreshBucketSource), Collector::default());
        p.handle_owned(Chunk(vec![1, 2, 3])).unwrap();
        p.handle_owned(7i32).unwrap();
        p.flush().unwrap();
        assert_eq!(p.downstream.received, vec![vec![1, 2, 3]]);
        assert!(p.downstream.flushed);
    }

    #[test]
    fn copy_to_full_buckets_batches_to_fixed_size() {
        let live = Collector::default();
        let batch = Collector::default();
        let mut p =
            copy_to_full_buckets::<u8, Chunk, _, _>(Arc::new(FreshBucketSource), 3, live, batch).unwrap();
        p.handle_owned(Chunk(vec![1, 2, 3, 4, 5])).unwrap();
        p.flush().unwrap();
        assert_eq!(p.live_downstream.received, vec![vec![1, 2, 3], vec![4, 5]]);
        assert_eq!(p.batch_downstream.received, vec![vec![1, 2, 3], vec![4, 5]]);
        assert!(p.live_downstream.flushed);
        assert!(p.batch_downstream.flushed);
    }

    #[test]
    fn copy_to_full_buckets_rejects_zero_batch_size() {
        let err = copy_to_full_buckets::<u8, Chunk, _, _>(
            Arc::new(FreshBucketSource),
            0,
            Collector::default(),
            Collector::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
