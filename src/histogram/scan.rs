//! `scan_histograms`: a multi-element, multi-scan bin array (spec §4.5.2),
//! the hardest processor in the histogramming engine. Generalizes
//! [`super::single::SingleHistogram`] with a scan axis: the array holds
//! `num_elements * num_bins` cells, one cluster is applied per element per
//! scan, and multiple scans within a round accumulate into the same cells.

use std::marker::PhantomData;

use super::apply;
use super::journal::ClusterJournal;
use super::policy::HistogramPolicy;
use crate::bucket::source::BucketSource;
use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::events::{BinIncrementCluster, ConcludingHistogramArray, HistogramArray, HistogramArrayProgress, Warning};
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};
use crate::types::DataTypes;

/// State for [`scan_histograms`]. `ResetEvent` is dispatched at runtime via
/// [`std::any::Any`], for the same reason as in
/// [`super::single::SingleHistogram`].
pub struct ScanHistograms<DT: DataTypes, ResetEvent, S, D> {
    source: S,
    num_elements: usize,
    num_bins: usize,
    max_per_bin: DT::Bin,
    policy: HistogramPolicy,
    bins: Option<Bucket<DT::Bin>>,
    current_slot: usize,
    is_first_scan_of_round: bool,
    saturated_this_round: bool,
    journal: Option<ClusterJournal<DT::BinIndex>>,
    downstream: D,
    _marker: PhantomData<ResetEvent>,
}

/// Build a [`ScanHistograms`] processor.
pub fn scan_histograms<DT, ResetEvent, S, D>(
    source: S,
    num_elements: usize,
    num_bins: usize,
    max_per_bin: DT::Bin,
    policy: HistogramPolicy,
    downstream: D,
) -> Result<ScanHistograms<DT, ResetEvent, S, D>>
where
    DT: DataTypes,
    S: BucketSource<DT::Bin>,
{
    policy.validate()?;
    if num_elements == 0 {
        return Err(Error::invalid_argument("scan_histograms: num_elements must be nonzero"));
    }
    if num_bins == 0 {
        return Err(Error::invalid_argument("scan_histograms: num_bins must be nonzero"));
    }
    let journal = (policy.emits_concluding() || policy.is_reset()).then(ClusterJournal::new);
    Ok(ScanHistograms {
        source,
        num_elements,
        num_bins,
        max_per_bin,
        policy,
        bins: None,
        current_slot: 0,
        is_first_scan_of_round: true,
        saturated_this_round: false,
        journal,
        downstream,
        _marker: PhantomData,
    })
}

impl<DT, ResetEvent, S, D> ScanHistograms<DT, ResetEvent, S, D>
where
    DT: DataTypes,
    S: BucketSource<DT::Bin>,
    D: HandleEvent<ConcludingHistogramArray<DT>> + HandleEvent<HistogramArray<DT>> + HandleEvent<HistogramArrayProgress<DT>> + HandleEvent<Warning>,
{
    /// Obtain a bucket of `num_elements * num_bins` cells from the source
    /// and, unless `no_clear_new_bucket` is set, zero it explicitly: the
    /// source's "zero-initialized" contract holds for fresh storage but not
    /// for a recycling source with `clear_on_recycle` off, which can hand
    /// back a bucket carrying a previous round's values (spec §4.5.2 step
    /// 1). A bucket is only ever (re)allocated at the start of a round (by
    /// `ensure_bins` lazily, or by `allocate_fresh_bucket` on a
    /// reset-on-overflow retry), so this is exactly the "first scan of a
    /// round" case the flag names.
    fn fresh_bucket(&self) -> Result<Bucket<DT::Bin>> {
        let bucket = self.source.bucket_of_size(self.num_elements * self.num_bins)?;
        if !self.policy.skips_clearing_new_bucket() {
            bucket.with_mut_slice(|full| full.iter_mut().for_each(|b| *b = Default::default()));
        }
        Ok(bucket)
    }

    fn ensure_bins(&mut self) -> Result<()> {
        if self.bins.is_none() {
            self.bins = Some(self.fresh_bucket()?);
        }
        Ok(())
    }

    fn slot_bounds(&self, j: usize) -> (usize, usize) {
        (j * self.num_bins, (j + 1) * self.num_bins)
    }

    fn journal_push(&mut self, cluster: &[DT::BinIndex]) {
        if let Some(journal) = &mut self.journal {
            journal.push(cluster);
        }
    }

    /// Undo every cluster logged for the current scan, restoring the bucket
    /// to its state at the start of the scan (spec §4.5.4 invariant).
    fn rollback_current_scan(&self) {
        let (Some(journal), Some(bins)) = (&self.journal, &self.bins) else {
            return;
        };
        let num_bins = self.num_bins;
        bins.with_mut_slice(|full| {
            for (j, cluster) in journal.iter_rev() {
                let start = j * num_bins;
                apply::undo(&mut full[start..start + num_bins], cluster);
            }
        });
    }

    /// Re-apply every cluster logged for the current scan onto the (fresh,
    /// zeroed) current bucket.
    fn replay_current_scan(&self) {
        let (Some(journal), Some(bins)) = (&self.journal, &self.bins) else {
            return;
        };
        let num_bins = self.num_bins;
        bins.with_mut_slice(|full| {
            for (j, cluster) in journal.iter() {
                let start = j * num_bins;
                apply::apply_unchecked(&mut full[start..start + num_bins], cluster);
            }
        });
    }

    /// Emit a concluding event carrying the current bucket by value if the
    /// policy requests it (the bucket must already reflect rollback, if
    /// any, before this is called), then drop it.
    fn emit_concluding_take_current(&mut self) -> Result<()> {
        if self.policy.emits_concluding() {
            if let Some(bins) = self.bins.take() {
                self.downstream.handle_owned(ConcludingHistogramArray { bins })?;
            }
        } else {
            self.bins = None;
        }
        Ok(())
    }

    /// Replace the current bucket with a fresh one for a reset-on-overflow
    /// retry. This puts the processor back in the same state as the start
    /// of a round (empty bucket, nothing applied yet), so the recursion
    /// guard in [`Self::apply_to_slot`] must treat it as such: re-arm
    /// `is_first_scan_of_round` so an overflow that recurs on this fresh
    /// bucket is fatal instead of retrying forever.
    fn allocate_fresh_bucket(&mut self) -> Result<()> {
        self.bins = Some(self.fresh_bucket()?);
        self.is_first_scan_of_round = true;
        Ok(())
    }

    /// Apply `cluster` to element slot `j`, handling overflow per policy.
    /// May recurse exactly once (reset-on-overflow retry onto a fresh
    /// bucket).
    fn apply_to_slot(&mut self, j: usize, cluster: &[DT::BinIndex]) -> Result<()> {
        let (start, end) = self.slot_bounds(j);
        let bins = self.bins.as_ref().expect("ensured by caller");

        if self.policy.is_saturate() {
            let saturated = bins.with_mut_slice(|full| apply::apply_saturating(&mut full[start..end], cluster, self.max_per_bin));
            if saturated && !self.saturated_this_round {
                self.saturated_this_round = true;
                self.downstream.handle_owned(Warning {
                    message: "scan_histograms: bin saturated at max_per_bin".to_string(),
                })?;
            }
            self.journal_push(cluster);
            return Ok(());
        }

        let overflow_at = bins.with_slice(|full| apply::would_overflow(&full[start..end], cluster, self.max_per_bin));
        if overflow_at.is_none() {
            bins.with_mut_slice(|full| apply::apply_unchecked(&mut full[start..end], cluster));
            self.journal_push(cluster);
            return Ok(());
        }

        if self.policy.is_error() {
            return Err(Error::histogram_overflow(
                "scan_histograms: increment would exceed max_per_bin",
            ));
        }
        if self.policy.is_stop() {
            self.rollback_current_scan();
            self.emit_concluding_take_current()?;
            self.downstream.flush()?;
            return Err(Error::end_of_processing("scan_histograms: stop-on-overflow"));
        }

        debug_assert!(self.policy.is_reset());
        if self.is_first_scan_of_round {
            return Err(Error::histogram_overflow(
                "scan_histograms: reset-on-overflow recursion guard, overflow on first scan of round",
            ));
        }
        self.rollback_current_scan();
        self.emit_concluding_take_current()?;
        self.allocate_fresh_bucket()?;
        self.replay_current_scan();
        self.apply_to_slot(j, cluster)
    }

    /// Reset as if the reset event had been received: emit a concluding
    /// event (if requested) over the rolled-back partial scan, then start a
    /// fresh round.
    fn reset(&mut self) -> Result<()> {
        self.rollback_current_scan();
        self.emit_concluding_take_current()?;
        if let Some(journal) = &mut self.journal {
            journal.clear();
        }
        self.current_slot = 0;
        self.is_first_scan_of_round = true;
        self.saturated_this_round = false;
        Ok(())
    }

    fn handle_cluster(&mut self, cluster: &[DT::BinIndex]) -> Result<()> {
        self.ensure_bins()?;
        let j = self.current_slot;

        if self.policy.clears_every_scan() {
            let (start, end) = self.slot_bounds(j);
            self.bins
                .as_ref()
                .expect("ensured above")
                .with_mut_slice(|full| full[start..end].iter_mut().for_each(|b| *b = Default::default()));
        }

        self.apply_to_slot(j, cluster)?;

        let filled_count = (j + 1) * self.num_bins;
        let view = self.bins.as_ref().expect("ensured above").const_view();
        self.downstream.handle_owned(HistogramArrayProgress { filled_count, bins: view })?;

        if j + 1 == self.num_elements {
            let view = self.bins.as_ref().expect("ensured above").const_view();
            self.downstream.handle_owned(HistogramArray { bins: view })?;
            self.is_first_scan_of_round = false;
            if let Some(journal) = &mut self.journal {
                journal.clear();
            }
            self.current_slot = 0;
            if self.policy.resets_after_scan() {
                self.reset()?;
            }
        } else {
            self.current_slot = j + 1;
        }
        Ok(())
    }
}

impl<DT, ResetEvent, S, D> Flush for ScanHistograms<DT, ResetEvent, S, D>
where
    DT: DataTypes,
    S: BucketSource<DT::Bin>,
    D: Flush
        + HandleEvent<ConcludingHistogramArray<DT>>
        + HandleEvent<HistogramArray<DT>>
        + HandleEvent<HistogramArrayProgress<DT>>
        + HandleEvent<Warning>,
{
    fn flush(&mut self) -> Result<()> {
        self.reset()?;
        self.downstream.flush()
    }
}

impl<DT, ResetEvent, S, D> Introspect for ScanHistograms<DT, ResetEvent, S, D>
where
    DT: DataTypes,
    D: Introspect,
{
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "scan_histograms")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<DT, ResetEvent, S, D, E> HandleEvent<E> for ScanHistograms<DT, ResetEvent, S, D>
where
    DT: DataTypes,
    ResetEvent: 'static,
    E: 'static,
    S: BucketSource<DT::Bin>,
    D: HandleEvent<ConcludingHistogramArray<DT>>
        + HandleEvent<HistogramArray<DT>>
        + HandleEvent<HistogramArrayProgress<DT>>
        + HandleEvent<Warning>,
{
    fn handle_ref(&mut self, event: &E) -> Result<()> {
        use std::any::Any;
        let any_event: &dyn Any = event;
        if let Some(cluster_event) = any_event.downcast_ref::<BinIncrementCluster<DT>>() {
            let cluster = cluster_event.bin_indices.to_vec();
            return self.handle_cluster(&cluster);
        }
        if any_event.downcast_ref::<ResetEvent>().is_some() {
            return self.reset();
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
        progress: Vec<(usize, Vec<u16>)>,
        arrays: Vec<Vec<u16>>,
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
    impl HandleEvent<HistogramArray<DefaultDataTypes>> for Collector {
        fn handle_ref(&mut self, event: &HistogramArray<DefaultDataTypes>) -> Result<()> {
            self.arrays.push(event.bins.to_vec());
            Ok(())
        }
        fn handle_owned(&mut self, event: HistogramArray<DefaultDataTypes>) -> Result<()> {
            self.arrays.push(event.bins.to_vec());
            Ok(())
        }
    }
    impl HandleEvent<HistogramArrayProgress<DefaultDataTypes>> for Collector {
        fn handle_ref(&mut self, event: &HistogramArrayProgress<DefaultDataTypes>) -> Result<()> {
            self.progress.push((event.filled_count, event.bins.to_vec()));
            Ok(())
        }
        fn handle_owned(&mut self, event: HistogramArrayProgress<DefaultDataTypes>) -> Result<()> {
            self.progress.push((event.filled_count, event.bins.to_vec()));
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

    /// End-to-end scenario 2: saturate-on-overflow warning once per round.
    #[test]
    fn saturate_warns_once_then_completes_scan() {
        let mut h: ScanHistograms<DefaultDataTypes, Reset, _, _> = scan_histograms(
            FreshBucketSource,
            2,
            2,
            3,
            HistogramPolicy::SATURATE_ON_OVERFLOW,
            Collector::default(),
        )
        .unwrap();
        h.handle_owned(cluster(&[0, 0, 0, 0, 0, 1, 1, 1, 1])).unwrap();
        assert_eq!(h.downstream.warnings.len(), 1);
        assert_eq!(h.downstream.progress.last().unwrap(), &(2, vec![3u16, 3, 0, 0]));

        h.handle_owned(cluster(&[0, 0, 1, 1, 1, 1])).unwrap();
        assert_eq!(h.downstream.warnings.len(), 1, "no second warning this round");
        assert_eq!(h.downstream.progress.last().unwrap(), &(4, vec![3u16, 3, 2, 3]));
        assert_eq!(h.downstream.arrays.last().unwrap(), &vec![3u16, 3, 2, 3]);
    }

    /// End-to-end scenario 3: reset-on-overflow with emit-concluding.
    #[test]
    fn reset_on_overflow_emits_concluding_mid_round() {
        let mut h: ScanHistograms<DefaultDataTypes, Reset, _, _> = scan_histograms(
            FreshBucketSource,
            2,
            2,
            3,
            HistogramPolicy::RESET_ON_OVERFLOW | HistogramPolicy::EMIT_CONCLUDING_EVENTS,
            Collector::default(),
        )
        .unwrap();
        // scan 0 fills [3, 0, 3, 0]
        h.handle_owned(cluster(&[0, 0, 0])).unwrap();
        h.handle_owned(cluster(&[0, 0, 0])).unwrap();
        assert_eq!(h.downstream.arrays.last().unwrap(), &vec![3u16, 0, 3, 0]);

        // scan 1, slot 0: {0,0,0,1,1} would push bin0 from 3 to 6 -> overflow.
        h.handle_owned(cluster(&[0, 0, 0, 1, 1])).unwrap();
        assert_eq!(h.downstream.concluding, vec![vec![3u16, 0, 3, 0]]);
        assert_eq!(h.downstream.progress.last().unwrap(), &(2, vec![3u16, 2, 0, 0]));
    }

    /// End-to-end scenario 4: reset-on-overflow, single-scan overflow is fatal.
    #[test]
    fn reset_on_overflow_first_scan_is_fatal() {
        let mut h: ScanHistograms<DefaultDataTypes, Reset, _, _> = scan_histograms(
            FreshBucketSource,
            2,
            2,
            3,
            HistogramPolicy::RESET_ON_OVERFLOW | HistogramPolicy::EMIT_CONCLUDING_EVENTS,
            Collector::default(),
        )
        .unwrap();
        let err = h.handle_owned(cluster(&[0, 0, 0, 0])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::HistogramOverflow);
    }

    /// End-to-end scenario 5: stop-on-overflow flushes and ends.
    #[test]
    fn stop_on_overflow_flushes_and_ends() {
        let mut h: ScanHistograms<DefaultDataTypes, Reset, _, _> = scan_histograms(
            FreshBucketSource,
            2,
            2,
            3,
            HistogramPolicy::STOP_ON_OVERFLOW | HistogramPolicy::EMIT_CONCLUDING_EVENTS,
            Collector::default(),
        )
        .unwrap();
        let err = h.handle_owned(cluster(&[0, 0, 0, 0, 0])).unwrap_err();
        assert!(err.is_end_of_processing());
        assert_eq!(h.downstream.concluding, vec![vec![0u16, 0, 0, 0]]);
        assert_eq!(h.downstream.flushed, 1);
    }

    #[test]
    fn clear_every_scan_does_not_accumulate() {
        let mut h: ScanHistograms<DefaultDataTypes, Reset, _, _> = scan_histograms(
            FreshBucketSource,
            1,
            2,
            10,
            HistogramPolicy::ERROR_ON_OVERFLOW | HistogramPolicy::CLEAR_EVERY_SCAN,
            Collector::default(),
        )
        .unwrap();
        h.handle_owned(cluster(&[0, 0])).unwrap();
        assert_eq!(h.downstream.arrays.last().unwrap(), &vec![2u16, 0]);
        h.handle_owned(cluster(&[1])).unwrap();
        // cleared before applying, so the earlier [2, 0] does not persist.
        assert_eq!(h.downstream.arrays.last().unwrap(), &vec![0u16, 1]);
    }

    /// Flush mid-scan rolls the incomplete scan's contribution back before
    /// emitting the concluding event, leaving only completed-scan totals
    /// (spec §4.5.2 "roll back the partial scan using the journal").
    #[test]
    fn flush_rolls_back_partial_scan_before_concluding() {
        let mut h: ScanHistograms<DefaultDataTypes, Reset, _, _> = scan_histograms(
            FreshBucketSource,
            2,
            2,
            10,
            HistogramPolicy::ERROR_ON_OVERFLOW | HistogramPolicy::EMIT_CONCLUDING_EVENTS,
            Collector::default(),
        )
        .unwrap();
        h.handle_owned(cluster(&[0])).unwrap();
        h.handle_owned(cluster(&[1, 1])).unwrap();
        assert_eq!(h.downstream.arrays.last().unwrap(), &vec![1u16, 0, 0, 2]);

        h.handle_owned(cluster(&[0])).unwrap(); // partial scan 1, slot 0 only
        h.flush().unwrap();
        assert_eq!(h.downstream.concluding, vec![vec![1u16, 0, 0, 2]]);
        assert_eq!(h.downstream.flushed, 1);
    }
}
