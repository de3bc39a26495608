//! `histogram`: a single bin-array accumulator with no scan axis (spec
//! §4.5.1). The simplest member of the histogramming engine; `scan_histograms`
//! (in [`super::scan`]) generalizes this to multiple elements per scan.

use std::marker::PhantomData;

use super::apply;
use super::policy::HistogramPolicy;
use crate::bucket::source::BucketSource;
use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::events::{BinIncrementCluster, ConcludingHistogramArray, Warning};
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};
use crate::types::DataTypes;

/// State for [`single_histogram`]. `ResetEvent` is the event type that
/// triggers a reset; it is dispatched at runtime via [`std::any::Any`] in
/// the same manner as `batch_bin_increments`' start/stop events, since a
/// generic type parameter cannot also be given its own non-overlapping
/// `impl<...> HandleEvent<ResetEvent>` alongside a blanket `impl<E>` on
/// stable Rust.
pub struct SingleHistogram<DT: DataTypes, ResetEvent, S, D> {
    source: S,
    num_bins: usize,
    max_per_bin: DT::Bin,
    policy: HistogramPolicy,
    bins: Option<Bucket<DT::Bin>>,
    saturated_this_round: bool,
    applied_since_reset: bool,
    downstream: D,
    _marker: PhantomData<ResetEvent>,
}

/// Build a [`SingleHistogram`] processor.
pub fn single_histogram<DT, ResetEvent, S, D>(
    source: S,
    num_bins: usize,
    max_per_bin: DT::Bin,
    policy: HistogramPolicy,
    downstream: D,
) -> Result<SingleHistogram<DT, ResetEvent, S, D>>
where
    DT: DataTypes,
    S: BucketSource<DT::Bin>,
{
    policy.validate()?;
    if num_bins == 0 {
        return Err(Error::invalid_argument("histogram: num_bins must be nonzero"));
    }
    Ok(SingleHistogram {
        source,
        num_bins,
        max_per_bin,
        policy,
        bins: None,
        saturated_this_round: false,
        applied_since_reset: false,
        downstream,
        _marker: PhantomData,
    })
}

impl<DT, ResetEvent, S, D> SingleHistogram<DT, ResetEvent, S, D>
where
    DT: DataTypes,
    S: BucketSource<DT::Bin>,
    D: HandleEvent<ConcludingHistogramArray<DT>> + HandleEvent<Warning>,
{
    fn ensure_bins(&mut self) -> Result<()> {
        if self.bins.is_none() {
            self.bins = Some(self.source.bucket_of_size(self.num_bins)?);
        }
        Ok(())
    }

    /// Emit a concluding event carrying the current array by value if the
    /// policy requests it, then drop the array so the next increment
    /// allocates fresh storage.
    fn emit_concluding(&mut self) -> Result<()> {
        if self.policy.emits_concluding() {
            if let Some(bins) = self.bins.take() {
                self.downstream.handle_owned(ConcludingHistogramArray { bins })?;
            }
        } else {
            self.bins = None;
        }
        self.applied_since_reset = false;
        self.saturated_this_round = false;
        Ok(())
    }

    fn apply_cluster(&mut self, cluster: &[DT::BinIndex]) -> Result<()> {
        self.ensure_bins()?;
        let bins = self.bins.as_ref().expect("just ensured");

        if self.policy.is_saturate() {
            let saturated = bins.with_mut_slice(|s| apply::apply_saturating(s, cluster, self.max_per_bin));
            if saturated && !self.saturated_this_round {
                self.saturated_this_round = true;
                self.downstream.handle_owned(Warning {
                    message: "histogram: bin saturated at max_per_bin".to_string(),
                })?;
            }
            self.applied_since_reset = true;
            return Ok(());
        }

        let overflow_at = bins.with_slice(|s| apply::would_overflow(s, cluster, self.max_per_bin));
        if overflow_at.is_none() {
            bins.with_mut_slice(|s| apply::apply_unchecked(s, cluster));
            self.applied_since_reset = true;
            return Ok(());
        }

        if self.policy.is_error() {
            return Err(Error::histogram_overflow(
                "histogram: increment would exceed max_per_bin",
            ));
        }
        if self.policy.is_stop() {
            self.emit_concluding()?;
            self.downstream.flush()?;
            return Err(Error::end_of_processing("histogram: stop-on-overflow"));
        }

        debug_assert!(self.policy.is_reset());
        if !self.applied_since_reset {
            return Err(Error::histogram_overflow(
                "histogram: reset-on-overflow recursion guard, overflow on first cluster of round",
            ));
        }
        self.emit_concluding()?;
        self.apply_cluster(cluster)
    }
}

impl<DT, ResetEvent, S, D> Flush for SingleHistogram<DT, ResetEvent, S, D>
where
    DT: DataTypes,
    S: BucketSource<DT::Bin>,
    D: Flush + HandleEvent<ConcludingHistogramArray<DT>> + HandleEvent<Warning>,
{
    fn flush(&mut self) -> Result<()> {
        self.emit_concluding()?;
        self.downstream.flush()
    }
}

impl<DT, ResetEvent, S, D> Introspect for SingleHistogram<DT, ResetEvent, S, D>
where
    DT: DataTypes,
    D: Introspect,
{
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "histogram")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<DT, ResetEvent, S, D, E> HandleEvent<E> for SingleHistogram<DT, ResetEvent, S, D>
where
    DT: DataTypes,
    ResetEvent: 'static,
    E: 'static,
    S: BucketSource<DT::Bin>,
    D: HandleEvent<ConcludingHistogramArray<DT>> + HandleEvent<Warning>,
{
    fn handle_ref(&mut self, event: &E) -> Result<()> {
        use std::any::Any;
        let any_event: &dyn Any = event;
        if let Some(cluster_event) = any_event.downcast_ref::<BinIncrementCluster<DT>>() {
            let cluster = cluster_event.bin_indices.to_vec();
            return self.apply_cluster(&cluster);
        }
        if any_event.downcast_ref::<ResetEvent>().is_some() {
            return self.emit_concluding();
        }
        Ok(())
    }
    fn handle_owned(&mut self, event: E) -> Result<()> {
        self.handle_ref(&event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::source::FreshBucketSource;
    use crate::types::DefaultDataTypes;

    #[derive(Default)]
    struct Collector {
        concluding: Vec<Vec<u16>>,
        warnings: Vec<String>,
        flushed: usize,
    }
    impl Flush for Collector {
        fn flush(&mut self) -> Result<()> {
            self.flushed += 1;
            Ok(())
        }
    }
    impl HandleEvent<ConcludingHistogramArray<DefaultDataTypes>> for Collector {
        fn handle_ref(&mut self, event: &ConcludingHistogramArray<DefaultDataTypes>) -> Result<()> {
            self.concluding.push(event.bins.to_vec());
            Ok(())
        }
        fn handle_owned(&mut self, event: ConcludingHistogramArray<DefaultDataTypes>) -> Result<()> {
            self.concluding.push(event.bins.to_vec());
            Ok(())
        }
    }
    impl HandleEvent<Warning> for Collector {
        fn handle_ref(&mut self, event: &Warning) -> Result<()> {
            self.warnings.push(event.message.clone());
            Ok(())
        }
        fn handle_owned(&mut self, event: Warning) -> Result<()> {
            self.warnings.push(event.message);
            Ok(())
        }
    }

    struct Reset;

    fn cluster(indices: &[u16]) -> BinIncrementCluster<DefaultDataTypes> {
        BinIncrementCluster {
            bin_indices: Bucket::from_vec(indices.to_vec()),
        }
    }

    #[test]
    fn saturate_warns_once_per_round() {
        let mut h: SingleHistogram<DefaultDataTypes, Reset, _, _> = single_histogram(
            FreshBucketSource,
            2,
            3,
            HistogramPolicy::SATURATE_ON_OVERFLOW,
            Collector::default(),
        )
        .unwrap();
        h.handle_owned(cluster(&[0, 0, 0, 0])).unwrap();
        h.handle_owned(cluster(&[0, 0])).unwrap();
        assert_eq!(h.downstream.warnings.len(), 1);
    }

    #[test]
    fn error_on_overflow_is_fatal() {
        let mut h: SingleHistogram<DefaultDataTypes, Reset, _, _> = single_histogram(
            FreshBucketSource,
            1,
            1,
            HistogramPolicy::ERROR_ON_OVERFLOW,
            Collector::default(),
        )
        .unwrap();
        h.handle_owned(cluster(&[0])).unwrap();
        let err = h.handle_owned(cluster(&[0])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::HistogramOverflow);
    }

    #[test]
    fn reset_on_overflow_recursion_guard() {
        let mut h: SingleHistogram<DefaultDataTypes, Reset, _, _> = single_histogram(
            FreshBucketSource,
            1,
            1,
            HistogramPolicy::RESET_ON_OVERFLOW,
            Collector::default(),
        )
        .unwrap();
        // two increments to the same bin of width 1, on the very first cluster.
        let err = h.handle_owned(cluster(&[0, 0])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::HistogramOverflow);
    }

    #[test]
    fn reset_on_overflow_emits_concluding_and_retries() {
        let mut h: SingleHistogram<DefaultDataTypes, Reset, _, _> = single_histogram(
            FreshBucketSource,
            1,
            1,
            HistogramPolicy::RESET_ON_OVERFLOW | HistogramPolicy::EMIT_CONCLUDING_EVENTS,
            Collector::default(),
        )
        .unwrap();
        h.handle_owned(cluster(&[0])).unwrap();
        h.handle_owned(cluster(&[0])).unwrap(); // overflows, rolls back, retries on fresh bucket
        assert_eq!(h.downstream.concluding, vec![vec![1u16]]);
    }

    #[test]
    fn stop_on_overflow_flushes_and_ends() {
        let mut h: SingleHistogram<DefaultDataTypes, Reset, _, _> = single_histogram(
            FreshBucketSource,
            1,
            1,
            HistogramPolicy::STOP_ON_OVERFLOW | HistogramPolicy::EMIT_CONCLUDING_EVENTS,
            Collector::default(),
        )
        .unwrap();
        h.handle_owned(cluster(&[0])).unwrap();
        let err = h.handle_owned(cluster(&[0])).unwrap_err();
        assert!(err.is_end_of_processing());
        assert_eq!(h.downstream.concluding, vec![vec![1u16]]);
        assert_eq!(h.downstream.flushed, 1);
    }

    #[test]
    fn explicit_reset_event_emits_concluding() {
        let mut h: SingleHistogram<DefaultDataTypes, Reset, _, _> = single_histogram(
            FreshBucketSource,
            2,
            10,
            HistogramPolicy::ERROR_ON_OVERFLOW | HistogramPolicy::EMIT_CONCLUDING_EVENTS,
            Collector::default(),
        )
        .unwrap();
        h.handle_owned(cluster(&[0, 1, 1])).unwrap();
        h.handle_owned(Reset).unwrap();
        assert_eq!(h.downstream.concluding, vec![vec![1u16, 2]]);
    }
}
