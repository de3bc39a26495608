//! `batch`/`unbatch`: accumulate elements into buckets and the inverse
//! (spec §4.2, grounded on `batch_unbatch.hpp`).

use crate::bucket::source::BucketSource;
use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};

/// Accumulates elements of type `T` into a bucket of `batch_size`, emitting
/// it by value once full and then starting a new one. `flush()` emits any
/// remainder, shrunk to the number of elements actually accumulated.
pub struct Batch<T: Copy + Default + Send + Sync + 'static, S, D> {
    source: S,
    batch_size: usize,
    current: Option<Bucket<T>>,
    filled: usize,
    downstream: D,
}

/// Build a [`Batch`] processor. Fails if `batch_size == 0` (spec §4.2).
pub fn batch<T, S, D>(source: S, batch_size: usize, downstream: D) -> Result<Batch<T, S, D>>
where
    T: Copy + Default + Send + Sync + 'static,
    S: BucketSource<T>,
{
    if batch_size == 0 {
        return Err(Error::invalid_argument("batch: batch_size must be nonzero"));
    }
    Ok(Batch {
        source,
        batch_size,
        current: None,
        filled: 0,
        downstream,
    })
}

impl<T, S, D> Batch<T, S, D>
where
    T: Copy + Default + Send + Sync + 'static,
    S: BucketSource<T>,
{
    fn ensure_bucket(&mut self) -> Result<()> {
        if self.current.is_none() {
            self.current = Some(self.source.bucket_of_size(self.batch_size)?);
            self.filled = 0;
        }
        Ok(())
    }

    fn push(&mut self, value: T) -> Result<()>
    where
        D: HandleEvent<Bucket<T>>,
    {
        self.ensure_bucket()?;
        {
            let bucket = self.current.as_ref().unwrap();
            bucket.set(self.filled, value);
        }
        self.filled += 1;
        if self.filled == self.batch_size {
            let full = self.current.take().unwrap();
            self.downstream.handle_owned(full)?;
        }
        Ok(())
    }
}

impl<T, S, D> Flush for Batch<T, S, D>
where
    T: Copy + Default + Send + Sync + 'static,
    S: BucketSource<T>,
    D: HandleEvent<Bucket<T>> + Flush,
{
    fn flush(&mut self) -> Result<()> {
        if let Some(mut bucket) = self.current.take() {
            bucket.shrink(0, self.filled);
            self.downstream.handle_owned(bucket)?;
            self.filled = 0;
        }
        self.downstream.flush()
    }
}

impl<T, S, D: Introspect> Introspect for Batch<T, S, D>
where
    T: Copy + Default + Send + Sync + 'static,
{
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "batch")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<T, S, D> HandleEvent<T> for Batch<T, S, D>
where
    T: Copy + Default + Send + Sync + 'static,
    S: BucketSource<T>,
    D: HandleEvent<Bucket<T>>,
{
    fn handle_ref(&mut self, event: &T) -> Result<()> {
        self.push(*event)
    }
    fn handle_owned(&mut self, event: T) -> Result<()> {
        self.push(event)
    }
}

/// Iterates a bucket's visible range and forwards each element individually
/// (spec §4.2 `unbatch<Event>`).
pub struct Unbatch<T: Copy + Default + Send + Sync + 'static, D> {
    downstream: D,
    _marker: std::marker::PhantomData<T>,
}

/// Build an [`Unbatch`] processor.
pub fn unbatch<T: Copy + Default + Send + Sync + 'static, D>(downstream: D) -> Unbatch<T, D> {
    Unbatch {
        downstream,
        _marker: std::marker::PhantomData,
    }
}

impl<T: Copy + Default + Send + Sync + 'static, D: Flush> Flush for Unbatch<T, D> {
    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }
}

impl<T: Copy + Default + Send + Sync + 'static, D: Introspect> Introspect for Unbatch<T, D> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "unbatch")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<T, D> HandleEvent<Bucket<T>> for Unbatch<T, D>
where
    T: Copy + Default + Send + Sync + 'static,
    D: HandleEvent<T>,
{
    fn handle_ref(&mut self, event: &Bucket<T>) -> Result<()> {
        event.with_slice(|s| {
            for &v in s {
                self.downstream.handle_ref(&v)?;
            }
            Ok(())
        })
    }
    fn handle_owned(&mut self, event: Bucket<T>) -> Result<()> {
        // `T: Copy` here plays the role of "container received by rvalue and
        // its elements are non-const": every element is forwarded by move
        // (trivial for Copy types), matching the original's dual-overload
        // `unbatch` without needing a second method.
        event.with_slice(|s| {
            for &v in s {
                self.downstream.handle_owned(v)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::source::FreshBucketSource;

    #[derive(Default)]
    struct Collector {
        received: Vec<i32>,
        flushed: bool,
    }
    impl Flush for Collector {
        fn flush(&mut self) -> Result<()> {
            self.flushed = true;
            Ok(())
        }
    }
    impl HandleEvent<i32> for Collector {
        fn handle_ref(&mut self, event: &i32) -> Result<()> {
            self.received.push(*event);
            Ok(())
        }
        fn handle_owned(&mut self, event: i32) -> Result<()> {
            self.received.push(event);
            Ok(())
        }
    }
    #[derive(Default)]
    struct BucketCollector {
        received: Vec<Vec<i32>>,
    }
    impl Flush for BucketCollector {
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }
    impl HandleEvent<Bucket<i32>> for BucketCollector {
        fn handle_ref(&mut self, event: &Bucket<i32>) -> Result<()> {
            self.received.push(event.to_vec());
            Ok(())
        }
        fn handle_owned(&mut self, event: Bucket<i32>) -> Result<()> {
            self.received.push(event.to_vec());
            Ok(())
        }
    }

    #[test]
    fn batch_then_unbatch_round_trip() {
        let mut b2 = batch(FreshBucketSource, 3, BucketCollector::default()).unwrap();
        for v in [42, 43, 44, 45] {
            b2.handle_owned(v).unwrap();
        }
        b2.flush().unwrap();
        assert_eq!(b2.downstream.received, vec![vec![42, 43, 44], vec![45]]);

        let mut u = unbatch::<i32, _>(Collector::default());
        for chunk in &b2.downstream.received {
            u.handle_owned(Bucket::from_vec(chunk.clone())).unwrap();
        }
        u.flush().unwrap();
        assert_eq!(u.downstream.received, vec![42, 43, 44, 45]);
        assert!(u.downstream.flushed);
    }

    #[test]
    fn batch_rejects_zero_size() {
        assert!(batch::<i32, _, _>(FreshBucketSource, 0, Collector::default()).is_err());
    }
}
