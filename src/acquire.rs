//! `acquire`/`acquire_full_buckets`: pull data from a device driver into
//! buckets (spec §4.3, §5, grounded on `acquire.hpp`).
//!
//! These processors integrate a pull-style device API (one where *we* call
//! into the driver to fill a buffer) as a pipeline source. All work happens
//! inside `flush()`: the reader is polled in a loop until it signals end of
//! stream, an external halt is requested via [`AcquireAccess`], or an error
//! occurs. A read that doesn't fill the batch sleeps briefly so as not to
//! busy-loop a slow device.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::bucket::source::BucketSource;
use crate::bucket::{Bucket, BucketView};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};

/// Chosen short enough that its effect is unnoticeable in a live display,
/// and long enough that hardware buffers are unlikely to overflow between
/// polls for typical devices.
const SLOW_ACQUISITION_SLEEP: Duration = Duration::from_millis(10);

/// Reads up to `buffer.len()` elements of device data. Returns `Ok(Some(n))`
/// with the number of elements actually read (possibly 0, meaning "no data
/// available right now"), or `Ok(None)` at end of stream.
pub trait Reader<T> {
    /// Perform one read into `buffer`.
    fn read(&mut self, buffer: &mut [T]) -> Result<Option<usize>>;
}

impl<T, F: FnMut(&mut [T]) -> Result<Option<usize>>> Reader<T> for F {
    fn read(&mut self, buffer: &mut [T]) -> Result<Option<usize>> {
        self(buffer)
    }
}

/// A reader over an already-empty stream: every read is end of stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReader;
impl<T> Reader<T> for NullReader {
    fn read(&mut self, _buffer: &mut [T]) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// A reader that waits indefinitely without producing data (every read
/// returns 0, never end of stream); useful for testing halt behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct StuckReader;
impl<T> Reader<T> for StuckReader {
    fn read(&mut self, _buffer: &mut [T]) -> Result<Option<usize>> {
        Ok(Some(0))
    }
}

struct HaltState {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

/// External handle to halt an in-progress acquisition (spec §4.3, §4.6).
///
/// Obtained from a [`Context`] by the name given to [`acquire`] or
/// [`acquire_full_buckets`]. Calling [`AcquireAccess::halt`] makes the
/// processor's `flush()` return `Err` with
/// [`crate::error::ErrorKind::AcquisitionHalted`] without flushing
/// downstream, typically used for user-initiated cancellation.
///
/// `halt` does not block; the acquisition may not have actually stopped
/// (and `flush()` may not have returned) by the time it returns.
#[derive(Clone)]
pub struct AcquireAccess {
    state: Arc<HaltState>,
}

impl AcquireAccess {
    /// Request that the acquisition stop reading further data.
    pub fn halt(&self) {
        *self.state.mutex.lock() = true;
        self.state.condvar.notify_one();
    }
}

fn wait_if_partial(state: &HaltState, read: usize, bsize: usize, start_time: Instant) -> bool {
    let mut halted = state.mutex.lock();
    if read < bsize {
        let deadline = start_time + SLOW_ACQUISITION_SLEEP;
        state.condvar.wait_until(&mut halted, deadline);
    }
    *halted
}

/// Acquires data into buckets, one (generally partially filled) bucket per
/// successful read (spec §4.3).
pub struct Acquire<T, R, S, D> {
    reader: R,
    source: S,
    batch_size: usize,
    halt: Arc<HaltState>,
    downstream: D,
    _marker: std::marker::PhantomData<T>,
}

/// Build an [`Acquire`] processor, registering its [`AcquireAccess`] under
/// `name` in `context`.
pub fn acquire<T, R, S, D>(
    reader: R,
    source: S,
    batch_size: usize,
    context: &Context,
    name: impl Into<String>,
    downstream: D,
) -> Result<Acquire<T, R, S, D>>
where
    T: Copy + Default + Send + Sync + 'static,
    S: BucketSource<T>,
{
    if batch_size == 0 {
        return Err(Error::invalid_argument("acquire: batch_size must be nonzero"));
    }
    let halt = Arc::new(HaltState {
        mutex: Mutex::new(false),
        condvar: Condvar::new(),
    });
    context.register(name, AcquireAccess { state: halt.clone() })?;
    Ok(Acquire {
        reader,
        source,
        batch_size,
        halt,
        downstream,
        _marker: std::marker::PhantomData,
    })
}

impl<T, R, S, D> Flush for Acquire<T, R, S, D>
where
    T: Copy + Default + Send + Sync + 'static,
    R: Reader<T>,
    S: BucketSource<T>,
    D: HandleEvent<Bucket<T>> + Flush,
{
    fn flush(&mut self) -> Result<()> {
        loop {
            if *self.halt.mutex.lock() {
                return Err(Error::acquisition_halted());
            }
            let start_time = Instant::now();
            let mut bucket = self.source.bucket_of_size(self.batch_size)?;
            let read = bucket.with_mut_slice(|s| self.reader.read(s))?;
            let Some(read) = read else {
                return self.downstream.flush();
            };
            if read > 0 {
                bucket.shrink(0, read);
                self.downstream.handle_owned(bucket)?;
            }
            if wait_if_partial(&self.halt, read, self.batch_size, start_time) {
                return Err(Error::acquisition_halted());
            }
        }
    }
}

impl<T, R, S, D: Introspect> Introspect for Acquire<T, R, S, D> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "acquire")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

/// Acquires data into fixed-size buckets, providing a live const view of
/// each read alongside the eventually-full batch bucket (spec §4.3, §5).
/// See [`crate::copy::CopyToFullBuckets`] for the shared two-downstream
/// double-emission behavior reproduced here on end-of-processing.
pub struct AcquireFullBuckets<T, R, S, L, B> {
    reader: R,
    source: S,
    batch_size: usize,
    halt: Arc<HaltState>,
    live_downstream: L,
    batch_downstream: B,
    _marker: std::marker::PhantomData<T>,
}

/// Build an [`AcquireFullBuckets`] processor, registering its
/// [`AcquireAccess`] under `name` in `context`. `source` must support
/// shared views (spec §3 "sharable source").
pub fn acquire_full_buckets<T, R, S, L, B>(
    reader: R,
    source: S,
    batch_size: usize,
    context: &Context,
    name: impl Into<String>,
    live_downstream: L,
    batch_downstream: B,
) -> Result<AcquireFullBuckets<T, R, S, L, B>>
where
    T: Copy + Default + Send + Sync + 'static,
    S: BucketSource<T>,
{
    if batch_size == 0 {
        return Err(Error::invalid_argument(
            "acquire_full_buckets: batch_size must be nonzero",
        ));
    }
    if !source.supports_shared_views() {
        return Err(Error::invalid_argument(
            "acquire_full_buckets: source must support shared views",
        ));
    }
    let halt = Arc::new(HaltState {
        mutex: Mutex::new(false),
        condvar: Condvar::new(),
    });
    context.register(name, AcquireAccess { state: halt.clone() })?;
    Ok(AcquireFullBuckets {
        reader,
        source,
        batch_size,
        halt,
        live_downstream,
        batch_downstream,
        _marker: std::marker::PhantomData,
    })
}

impl<T, R, S, L, B> AcquireFullBuckets<T, R, S, L, B>
where
    T: Copy + Default + Send + Sync + 'static,
    S: BucketSource<T>,
{
    fn emit_live(&mut self, bucket: &Bucket<T>, start: usize, count: usize) -> Result<()>
    where
        L: HandleEvent<BucketView<T>>,
        B: HandleEvent<Bucket<T>> + Flush,
    {
        if count == 0 {
            return Ok(());
        }
        let view = bucket.sub_view(start, count);
        match self.live_downstream.handle_owned(view) {
            Ok(()) => Ok(()),
            Err(e) if e.is_end_of_processing() => {
                let mut owned = bucket.clone();
                owned.shrink(0, start + count);
                self.batch_downstream.handle_owned(owned)?;
                self.batch_downstream.flush()?;
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

    fn flush_downstreams(&mut self, bucket: Option<Bucket<T>>, filled: usize) -> Result<()>
    where
        L: Flush,
        B: HandleEvent<Bucket<T>> + Flush,
    {
        let live_result = self.live_downstream.flush();
        if let Some(mut bucket) = bucket {
            if filled > 0 {
                bucket.shrink(0, filled);
                self.batch_downstream.handle_owned(bucket)?;
            }
        }
        self.batch_downstream.flush()?;
        live_result
    }
}

impl<T, R, S, L, B> Flush for AcquireFullBuckets<T, R, S, L, B>
where
    T: Copy + Default + Send + Sync + 'static,
    R: Reader<T>,
    S: BucketSource<T>,
    L: HandleEvent<BucketView<T>> + Flush,
    B: HandleEvent<Bucket<T>> + Flush,
{
    fn flush(&mut self) -> Result<()> {
        let mut bucket: Option<Bucket<T>> = None;
        let mut filled = 0usize;
        loop {
            if *self.halt.mutex.lock() {
                return Err(Error::acquisition_halted());
            }
            let start_time = Instant::now();
            if bucket.is_none() {
                bucket = Some(self.source.bucket_of_size(self.batch_size)?);
                filled = 0;
            }
            let read = {
                let bkt = bucket.as_ref().unwrap();
                let read = bkt.with_mut_slice(|s| self.reader.read(&mut s[filled..]))?;
                read
            };
            let Some(read) = read else {
                return self.flush_downstreams(bucket, filled);
            };
            self.emit_live(bucket.as_ref().unwrap(), filled, read)?;
            filled += read;
            if filled == self.batch_size {
                let full = bucket.take().unwrap();
                self.emit_batch(full)?;
            }
            if wait_if_partial(&self.halt, filled, self.batch_size, start_time) {
                return Err(Error::acquisition_halted());
            }
        }
    }
}

impl<T, R, S, L: Introspect, B: Introspect> Introspect for AcquireFullBuckets<T, R, S, L, B> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "acquire_full_buckets")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.live_downstream.introspect_graph();
        g.extend(self.batch_downstream.introspect_graph());
        g.insert(0, self.introspect_node());
        g
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

    fn fixed_reader(data: Vec<u8>) -> impl FnMut(&mut [u8]) -> Result<Option<usize>> {
        let mut remaining = data;
        move |buf: &mut [u8]| {
            if remaining.is_empty() {
                return Ok(None);
            }
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            remaining.drain(..n);
            Ok(Some(n))
        }
    }

    #[test]
    fn acquire_reads_until_end_of_stream() {
        let ctx = Context::create();
        let mut p = acquire::<u8, _, _, _>(
            fixed_reader(vec![1, 2, 3, 4, 5]),
            FreshBucketSource,
            3,
            &ctx,
            "acq",
            Collector::default(),
        )
        .unwrap();
        p.flush().unwrap();
        assert_eq!(p.downstream.received, vec![vec![1, 2, 3], vec![4, 5]]);
        assert!(p.downstream.flushed);
    }

    #[test]
    fn acquire_halt_stops_without_flushing_downstream() {
        let ctx = Context::create();
        let p = acquire::<u8, _, _, _>(StuckReader, FreshBucketSource, 4, &ctx, "acq2", Collector::default()).unwrap();
        let access: AcquireAccess = ctx.access("acq2").unwrap();
        access.halt();
        let mut p = p;
        let err = p.flush().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AcquisitionHalted);
        assert!(!p.downstream.flushed);
    }

    #[test]
    fn acquire_full_buckets_emits_live_and_batch() {
        let ctx = Context::create();
        let mut p = acquire_full_buckets::<u8, _, _, _, _>(
            fixed_reader(vec![1, 2, 3, 4, 5]),
            FreshBucketSource,
            3,
            &ctx,
            "acqf",
            Collector::default(),
            Collector::default(),
        )
        .unwrap();
        p.flush().unwrap();
        assert_eq!(p.live_downstream.received, vec![vec![1, 2, 3], vec![4, 5]]);
        assert_eq!(p.batch_downstream.received, vec![vec![1, 2, 3], vec![4, 5]]);
        assert!(p.live_downstream.flushed);
        assert!(p.batch_downstream.flushed);
    }
}
