//! Concrete bin mappers (spec §4.4).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::BinMapper;
use crate::error::{Error, Result};
use crate::types::{DataTypes, Integer};

/// `bin = (datapoint - offset) / bin_width`, optionally clamping
/// out-of-range results instead of dropping them. Supports negative
/// `bin_width` (reverses direction).
pub struct LinearBinMapper<DT: DataTypes> {
    offset: DT::DataPoint,
    bin_width: i64,
    max_bin_index: DT::BinIndex,
    clamp: bool,
}

impl<DT: DataTypes> LinearBinMapper<DT> {
    /// `bin_width` may be negative; zero is rejected.
    pub fn new(offset: DT::DataPoint, bin_width: i64, max_bin_index: DT::BinIndex) -> Result<Self> {
        if bin_width == 0 {
            return Err(Error::invalid_argument("LinearBinMapper: bin_width must be nonzero"));
        }
        Ok(LinearBinMapper {
            offset,
            bin_width,
            max_bin_index,
            clamp: false,
        })
    }

    /// Clamp out-of-range datapoints to the nearest valid bin instead of
    /// dropping them.
    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp = clamp;
        self
    }
}

impl<DT: DataTypes> BinMapper<DT> for LinearBinMapper<DT> {
    fn map(&mut self, datapoint: DT::DataPoint) -> Option<DT::BinIndex> {
        let delta = datapoint.to_i64() - self.offset.to_i64();
        let raw_bin = delta.div_euclid(self.bin_width);
        let max = self.max_bin_index.to_i64();
        if raw_bin < 0 || raw_bin > max {
            if self.clamp {
                let clamped = raw_bin.clamp(0, max);
                return DT::BinIndex::try_from_i64(clamped);
            }
            return None;
        }
        DT::BinIndex::try_from_i64(raw_bin)
    }

    fn num_bins(&self) -> Option<DT::BinIndex> {
        DT::BinIndex::try_from_i64(self.max_bin_index.to_i64() + 1)
    }
}

/// A [`LinearBinMapper`] specialized for power-of-2 input/output widths,
/// with an optional bit-flip (spec §4.4 "Power-of-2").
pub struct PowerOf2BinMapper<DT: DataTypes> {
    input_bits: u32,
    output_bits: u32,
    flip: bool,
    _marker: std::marker::PhantomData<DT>,
}

impl<DT: DataTypes> PowerOf2BinMapper<DT> {
    /// `input_bits` must be >= `output_bits`; the low `input_bits -
    /// output_bits` bits of the datapoint are discarded.
    pub fn new(input_bits: u32, output_bits: u32) -> Result<Self> {
        if output_bits > input_bits {
            return Err(Error::invalid_argument(
                "PowerOf2BinMapper: output_bits must not exceed input_bits",
            ));
        }
        Ok(PowerOf2BinMapper {
            input_bits,
            output_bits,
            flip: false,
            _marker: std::marker::PhantomData,
        })
    }

    /// Flip (complement) the resulting bin index within its width.
    pub fn with_flip(mut self, flip: bool) -> Self {
        self.flip = flip;
        self
    }
}

impl<DT: DataTypes> BinMapper<DT> for PowerOf2BinMapper<DT> {
    fn map(&mut self, datapoint: DT::DataPoint) -> Option<DT::BinIndex> {
        let value = datapoint.to_i64();
        let input_max = (1i64 << self.input_bits) - 1;
        if value < 0 || value > input_max {
            return None;
        }
        let shift = self.input_bits - self.output_bits;
        let mut bin = value >> shift;
        if self.flip {
            let output_mask = (1i64 << self.output_bits) - 1;
            bin = (!bin) & output_mask;
        }
        DT::BinIndex::try_from_i64(bin)
    }

    fn num_bins(&self) -> Option<DT::BinIndex> {
        DT::BinIndex::try_from_i64(1i64 << self.output_bits)
    }
}

/// Dynamically assigns a new bin index to each distinct datapoint seen, up
/// to `max_bin_index + 1` distinct values, failing to produce further bins
/// once exhausted (spec §4.4 "Unique"). Exposes its accumulated mapping via
/// an access handle for out-of-graph callers (spec §4.6).
pub struct UniqueBinMapper<DT: DataTypes> {
    max_bin_index: DT::BinIndex,
    mapping: Arc<Mutex<HashMap<i64, DT::BinIndex>>>,
}

/// A handle onto a [`UniqueBinMapper`]'s accumulated mapping, usable from
/// outside the processing graph (spec §4.6 `context.access`).
#[derive(Clone)]
pub struct UniqueBinMapperAccess<DT: DataTypes> {
    mapping: Arc<Mutex<HashMap<i64, DT::BinIndex>>>,
}

impl<DT: DataTypes> UniqueBinMapperAccess<DT> {
    /// Snapshot of the datapoint-to-bin-index mapping assigned so far.
    pub fn mapping(&self) -> HashMap<i64, DT::BinIndex> {
        self.mapping.lock().unwrap().clone()
    }
}

impl<DT: DataTypes> UniqueBinMapper<DT> {
    /// Construct a mapper able to assign up to `max_bin_index + 1` distinct
    /// bins.
    pub fn new(max_bin_index: DT::BinIndex) -> Self {
        UniqueBinMapper {
            max_bin_index,
            mapping: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Obtain an access handle onto this mapper's mapping.
    pub fn access(&self) -> UniqueBinMapperAccess<DT> {
        UniqueBinMapperAccess {
            mapping: self.mapping.clone(),
        }
    }
}

impl<DT: DataTypes> BinMapper<DT> for UniqueBinMapper<DT> {
    fn map(&mut self, datapoint: DT::DataPoint) -> Option<DT::BinIndex> {
        let key = datapoint.to_i64();
        let mut mapping = self.mapping.lock().unwrap();
        if let Some(existing) = mapping.get(&key) {
            return Some(*existing);
        }
        let next_index = mapping.len() as i64;
        if next_index > self.max_bin_index.to_i64() {
            return None;
        }
        let bin_index = DT::BinIndex::try_from_i64(next_index)?;
        mapping.insert(key, bin_index);
        Some(bin_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DefaultDataTypes;

    #[test]
    fn linear_mapper_basic() {
        let mut m = LinearBinMapper::<DefaultDataTypes>::new(0, 10, 9).unwrap();
        assert_eq!(m.map(0), Some(0));
        assert_eq!(m.map(15), Some(1));
        assert_eq!(m.map(-1), None);
        assert_eq!(m.map(100), None); // bin 10 > max_bin_index 9
    }

    #[test]
    fn linear_mapper_negative_width_reverses() {
        let mut m = LinearBinMapper::<DefaultDataTypes>::new(100, -10, 9).unwrap();
        assert_eq!(m.map(100), Some(0));
        assert_eq!(m.map(90), Some(1));
    }

    #[test]
    fn linear_mapper_clamp() {
        let mut m = LinearBinMapper::<DefaultDataTypes>::new(0, 10, 3)
            .unwrap()
            .with_clamp(true);
        assert_eq!(m.map(-100), Some(0));
        assert_eq!(m.map(1000), Some(3));
    }

    #[test]
    fn power_of_2_mapper() {
        let mut m = PowerOf2BinMapper::<DefaultDataTypes>::new(12, 4).unwrap();
        assert_eq!(m.map(0), Some(0));
        assert_eq!(m.map(0xFFF), Some(0xF));
        assert_eq!(m.map(-1), None);
    }

    #[test]
    fn unique_mapper_assigns_and_exhausts() {
        let mut m = UniqueBinMapper::<DefaultDataTypes>::new(1); // 2 distinct values max
        assert_eq!(m.map(10), Some(0));
        assert_eq!(m.map(20), Some(1));
        assert_eq!(m.map(10), Some(0));
        assert_eq!(m.map(30), None);
        let access = m.access();
        assert_eq!(access.mapping().len(), 2);
    }
}
