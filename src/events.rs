//! Core event vocabulary and bulk-payload events (spec §3), generic over a
//! [`DataTypes`] set.

use std::fmt;

use crate::bucket::{Bucket, BucketView};
use crate::types::DataTypes;

/// Events that carry an abstime field that [`crate::processor::time_delay`]
/// can shift.
pub trait HasAbsTime<DT: DataTypes> {
    /// Current abstime value.
    fn abstime(&self) -> DT::AbsTime;
    /// Overwrite the abstime value.
    fn set_abstime(&mut self, value: DT::AbsTime);
}

macro_rules! impl_has_abstime {
    ($ty:ident) => {
        impl<DT: DataTypes> HasAbsTime<DT> for $ty<DT> {
            fn abstime(&self) -> DT::AbsTime {
                self.abstime
            }
            fn set_abstime(&mut self, value: DT::AbsTime) {
                self.abstime = value;
            }
        }
    };
}

/// Watermark event with no payload (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeReached<DT: DataTypes> {
    /// Time at which the watermark was reached.
    pub abstime: DT::AbsTime,
}
impl_has_abstime!(TimeReached);

/// One count on a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Detection<DT: DataTypes> {
    /// Time of detection.
    pub abstime: DT::AbsTime,
    /// Channel the detection occurred on.
    pub channel: DT::Channel,
}
impl_has_abstime!(Detection);

/// A detection with a measured delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeCorrelatedDetection<DT: DataTypes> {
    /// Time of detection.
    pub abstime: DT::AbsTime,
    /// Channel the detection occurred on.
    pub channel: DT::Channel,
    /// Measured delay relative to a reference (e.g. sync pulse).
    pub difftime: DT::DiffTime,
}
impl_has_abstime!(TimeCorrelatedDetection);

/// A synchronization tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Marker<DT: DataTypes> {
    /// Time the marker was observed.
    pub abstime: DT::AbsTime,
    /// Marker channel.
    pub channel: DT::Channel,
}
impl_has_abstime!(Marker);

/// Boundary marker on either side of a gap in the data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataLost<DT: DataTypes> {
    /// Time the gap was observed.
    pub abstime: DT::AbsTime,
}
impl_has_abstime!(DataLost);

/// Start of a bracketed lost interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeginLostInterval<DT: DataTypes> {
    /// Time the interval began.
    pub abstime: DT::AbsTime,
}
impl_has_abstime!(BeginLostInterval);

/// End of a bracketed lost interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndLostInterval<DT: DataTypes> {
    /// Time the interval ended.
    pub abstime: DT::AbsTime,
}
impl_has_abstime!(EndLostInterval);

/// A known number of counts lost on a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LostCounts<DT: DataTypes> {
    /// Time the loss was reported.
    pub abstime: DT::AbsTime,
    /// Channel the counts were lost on.
    pub channel: DT::Channel,
    /// Number of counts known to be lost.
    pub count: DT::Count,
}
impl_has_abstime!(LostCounts);

/// A non-fatal, pass-through-by-convention diagnostic.
///
/// Has no abstime: it does not implement [`HasAbsTime`], so
/// [`crate::processor::time_delay`] does not accept it, matching the
/// original's template that requires a `.macrotime` member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    /// Human-readable diagnostic text.
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A periodic count snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkCounts<DT: DataTypes> {
    /// Time the snapshot was taken.
    pub abstime: DT::AbsTime,
    /// Channel the counts belong to.
    pub channel: DT::Channel,
    /// Number of counts in the snapshot.
    pub count: DT::Count,
}
impl_has_abstime!(BulkCounts);

/// A temporal cluster of bin indices to add, carried by bucket (spec §3,
/// §4.4 `batch_bin_increments`).
#[derive(Debug, PartialEq, Eq)]
pub struct BinIncrementCluster<DT: DataTypes> {
    /// The bin indices making up this cluster.
    pub bin_indices: Bucket<DT::BinIndex>,
}

/// A cluster consumed by a single histogram slot (spec §4.2
/// `batch_bin_increment_clusters`/`unbatch_bin_increment_clusters`).
#[derive(Debug, PartialEq, Eq)]
pub struct BinIncrementBatch<DT: DataTypes> {
    /// The bin indices making up this batch.
    pub bin_indices: Bucket<DT::BinIndex>,
}

/// A partial-scan snapshot emitted by `scan_histograms` (spec §4.5.2).
///
/// `bins` is a read-only [`BucketView`] rather than a [`Bucket`]: the array
/// is still owned and being filled by the `scan_histograms` processor, so
/// the receiver must not be able to extract its storage or mutate it.
#[derive(Debug, PartialEq, Eq)]
pub struct HistogramArrayProgress<DT: DataTypes> {
    /// Number of bin cells filled so far in the current scan, counting
    /// completed elements and the in-progress element.
    pub filled_count: usize,
    /// Const view of the whole bin array as currently filled.
    pub bins: BucketView<DT::Bin>,
}

/// A completed scan emitted by `scan_histograms` (spec §4.5.2). Read-only
/// for the same reason as [`HistogramArrayProgress`]: the array keeps
/// accumulating across scans within a round.
#[derive(Debug, PartialEq, Eq)]
pub struct HistogramArray<DT: DataTypes> {
    /// Const view of the completed bin array.
    pub bins: BucketView<DT::Bin>,
}

/// A finalized array emitted on reset or stop; its storage is extractable
/// (spec §3, §4.5.2).
#[derive(Debug, PartialEq, Eq)]
pub struct ConcludingHistogramArray<DT: DataTypes> {
    /// The finalized bin array, carried by value so its storage can be
    /// extracted by the receiver.
    pub bins: Bucket<DT::Bin>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DefaultDataTypes;

    #[test]
    fn time_delay_field_access() {
        let mut d = Detection::<DefaultDataTypes> {
            abstime: 10,
            channel: 1,
        };
        assert_eq!(HasAbsTime::<DefaultDataTypes>::abstime(&d), 10);
        d.set_abstime(20);
        assert_eq!(d.abstime, 20);
    }

    #[test]
    fn warning_display() {
        let w = Warning {
            message: "slow reader".to_string(),
        };
        assert_eq!(w.to_string(), "slow reader");
    }
}
