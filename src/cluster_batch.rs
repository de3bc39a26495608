//! `batch_bin_increment_clusters`/`unbatch_bin_increment_clusters`: an
//! encoding-aware analogue of [`crate::batch`] specialized for
//! [`crate::events::BinIncrementCluster`], avoiding a per-cluster
//! allocation (spec §4.2, grounded on
//! `batch_unbatch_bin_increment_clusters.hpp`).
//!
//! Each cluster is encoded into a shared flat buffer as a length prefix
//! followed by its bin indices; `unbatch_bin_increment_clusters` walks that
//! same layout back into individual [`BinIncrementCluster`] events.

use crate::bucket::source::BucketSource;
use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::events::{BinIncrementBatch, BinIncrementCluster};
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};
use crate::types::{DataTypes, Integer};

fn encode_cluster<B: Integer>(dest: &mut [B], used: &mut usize, cluster: &[B]) -> bool {
    let needed = cluster.len() + 1;
    if *used + needed > dest.len() {
        return false;
    }
    let Some(len) = B::try_from_i64(cluster.len() as i64) else {
        return false;
    };
    dest[*used] = len;
    dest[*used + 1..*used + 1 + cluster.len()].copy_from_slice(cluster);
    *used += needed;
    true
}

/// Decodes a flat length-prefixed buffer of bin indices back into
/// individual clusters.
pub struct ClusterDecoder<'a, B> {
    remaining: &'a [B],
}

impl<'a, B: Integer> ClusterDecoder<'a, B> {
    /// Wrap `data` (the flat encoded buffer) for decoding.
    pub fn new(data: &'a [B]) -> Self {
        ClusterDecoder { remaining: data }
    }
}

impl<'a, B: Integer> Iterator for ClusterDecoder<'a, B> {
    type Item = &'a [B];

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.remaining.split_first()?;
        let len = len.to_i64() as usize;
        let (cluster, rest) = rest.split_at(len);
        self.remaining = rest;
        Some(cluster)
    }
}

/// Collects [`BinIncrementCluster`] events into encoded
/// [`BinIncrementBatch`] buckets. Must be paired with
/// [`unbatch_bin_increment_clusters`].
pub struct BatchBinIncrementClusters<DT: DataTypes, S, D> {
    source: S,
    bucket_size: usize,
    batch_size: usize,
    current: Option<Bucket<DT::BinIndex>>,
    used: usize,
    cluster_count: usize,
    downstream: D,
}

/// Build a [`BatchBinIncrementClusters`] processor. `bucket_size` must be
/// large enough that every cluster (plus its length prefix) fits in a
/// single bucket, or handling that cluster fails. `batch_size == 0` means
/// "limit only by bucket size" (spec §4.2).
pub fn batch_bin_increment_clusters<DT: DataTypes, S, D>(
    source: S,
    bucket_size: usize,
    batch_size: usize,
    downstream: D,
) -> Result<BatchBinIncrementClusters<DT, S, D>>
where
    S: BucketSource<DT::BinIndex>,
{
    if bucket_size == 0 {
        return Err(Error::invalid_argument(
            "batch_bin_increment_clusters: bucket_size must be nonzero",
        ));
    }
    Ok(BatchBinIncrementClusters {
        source,
        bucket_size,
        batch_size,
        current: None,
        used: 0,
        cluster_count: 0,
        downstream,
    })
}

impl<DT: DataTypes, S, D> BatchBinIncrementClusters<DT, S, D>
where
    S: BucketSource<DT::BinIndex>,
{
    fn emit_current(&mut self) -> Result<()>
    where
        D: HandleEvent<BinIncrementBatch<DT>>,
    {
        if self.cluster_count > 0 {
            let mut bucket = self.current.take().unwrap();
            bucket.shrink(0, self.used);
            self.downstream.handle_owned(BinIncrementBatch { bin_indices: bucket })?;
        }
        self.current = None;
        self.used = 0;
        self.cluster_count = 0;
        Ok(())
    }

    fn push(&mut self, cluster: &[DT::BinIndex]) -> Result<()>
    where
        D: HandleEvent<BinIncrementBatch<DT>>,
    {
        if self.current.is_none() {
            self.current = Some(self.source.bucket_of_size(self.bucket_size)?);
        }
        let fits = {
            let bucket = self.current.as_ref().unwrap();
            bucket.with_mut_slice(|dst| encode_cluster(dst, &mut self.used, cluster))
        };
        if !fits {
            self.emit_current()?;
            self.current = Some(self.source.bucket_of_size(self.bucket_size)?);
            let fits = {
                let bucket = self.current.as_ref().unwrap();
                bucket.with_mut_slice(|dst| encode_cluster(dst, &mut self.used, cluster))
            };
            if !fits {
                return Err(Error::invalid_argument(
                    "bin increment cluster does not fit in maximum bucket size",
                ));
            }
        }
        self.cluster_count += 1;
        if self.batch_size != 0 && self.cluster_count == self.batch_size {
            self.emit_current()?;
        }
        Ok(())
    }
}

impl<DT: DataTypes, S, D> Flush for BatchBinIncrementClusters<DT, S, D>
where
    S: BucketSource<DT::BinIndex>,
    D: HandleEvent<BinIncrementBatch<DT>> + Flush,
{
    fn flush(&mut self) -> Result<()> {
        self.emit_current()?;
        self.downstream.flush()
    }
}

impl<DT: DataTypes, S, D: Introspect> Introspect for BatchBinIncrementClusters<DT, S, D> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "batch_bin_increment_clusters")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<DT: DataTypes, S, D> HandleEvent<BinIncrementCluster<DT>> for BatchBinIncrementClusters<DT, S, D>
where
    S: BucketSource<DT::BinIndex>,
    D: HandleEvent<BinIncrementBatch<DT>>,
{
    fn handle_ref(&mut self, event: &BinIncrementCluster<DT>) -> Result<()> {
        event.bin_indices.with_slice(|s| self.push(s))
    }
    fn handle_owned(&mut self, event: BinIncrementCluster<DT>) -> Result<()> {
        self.handle_ref(&event)
    }
}

/// Splits [`BinIncrementBatch`] buckets back into individual
/// [`BinIncrementCluster`] events. Must be paired with
/// [`batch_bin_increment_clusters`].
pub struct UnbatchBinIncrementClusters<DT: DataTypes, D> {
    downstream: D,
    _marker: std::marker::PhantomData<DT>,
}

/// Build an [`UnbatchBinIncrementClusters`] processor.
pub fn unbatch_bin_increment_clusters<DT: DataTypes, D>(downstream: D) -> UnbatchBinIncrementClusters<DT, D> {
    UnbatchBinIncrementClusters {
        downstream,
        _marker: std::marker::PhantomData,
    }
}

impl<DT: DataTypes, D: Flush> Flush for UnbatchBinIncrementClusters<DT, D> {
    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }
}

impl<DT: DataTypes, D: Introspect> Introspect for UnbatchBinIncrementClusters<DT, D> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "unbatch_bin_increment_clusters")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<DT: DataTypes, D> HandleEvent<BinIncrementBatch<DT>> for UnbatchBinIncrementClusters<DT, D>
where
    D: HandleEvent<BinIncrementCluster<DT>>,
{
    fn handle_ref(&mut self, event: &BinIncrementBatch<DT>) -> Result<()> {
        event.bin_indices.with_slice(|flat| {
            for cluster in ClusterDecoder::new(flat) {
                self.downstream.handle_owned(BinIncrementCluster {
                    bin_indices: Bucket::from_vec(cluster.to_vec()),
                })?;
            }
            Ok(())
        })
    }
    fn handle_owned(&mut self, event: BinIncrementBatch<DT>) -> Result<()> {
        self.handle_ref(&event)
    }
}
