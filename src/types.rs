//! Data-type sets: the compile-time bundle of integer widths used on a
//! particular pipeline (spec §3).

use std::fmt::Debug;

/// An integer type usable for one of the fields of a [`DataTypes`] set.
///
/// All of Rust's built-in integer types implement this; the conversions
/// through `i64` are exact for every width up to 64 bits signed, which
/// covers every field the spec defines (abstime is the widest, at signed
/// 64-bit).
pub trait Integer: Copy + Clone + Eq + Ord + Debug + Default + Send + Sync + 'static {
    /// Widen to `i64` for arithmetic shared across data-type sets.
    fn to_i64(self) -> i64;

    /// Narrow from `i64`, returning `None` if the value does not fit.
    fn try_from_i64(value: i64) -> Option<Self>;

    /// Saturating addition, used by overflow policies that clamp.
    fn saturating_add(self, rhs: Self) -> Self;
}

macro_rules! impl_integer_for {
    ($($t:ty),* $(,)?) => {
        $(
            impl Integer for $t {
                fn to_i64(self) -> i64 {
                    self as i64
                }

                fn try_from_i64(value: i64) -> Option<Self> {
                    <$t>::try_from(value).ok()
                }

                fn saturating_add(self, rhs: Self) -> Self {
                    <$t>::saturating_add(self, rhs)
                }
            }
        )*
    };
}

impl_integer_for!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

/// Compile-time bundle of the integer widths used on a particular pipeline
/// (spec §3).
///
/// A custom data-type set is simply another zero-sized type implementing
/// this trait with different associated types.
pub trait DataTypes: Clone + Debug + Send + Sync + 'static {
    /// Timestamp in device-native tick units.
    type AbsTime: Integer;
    /// Measured time delay (e.g. photon arrival relative to sync).
    type DiffTime: Integer;
    /// Detector/marker identifier.
    type Channel: Integer;
    /// Count of events (e.g. lost counts, bulk counts).
    type Count: Integer;
    /// Raw numeric measurement prior to binning.
    type DataPoint: Integer;
    /// Ordinal of a bin within a histogram.
    type BinIndex: Integer;
    /// Integer count type stored in a histogram cell.
    type Bin: Integer;
}

/// The default data-type set used unless a pipeline overrides it:
/// abstime i64, difftime i32, channel i32, count u32, datapoint i32,
/// bin-index u16, bin u16.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultDataTypes;

impl DataTypes for DefaultDataTypes {
    type AbsTime = i64;
    type DiffTime = i32;
    type Channel = i32;
    type Count = u32;
    type DataPoint = i32;
    type BinIndex = u16;
    type Bin = u16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_roundtrip() {
        assert_eq!(i32::try_from_i64(42i32.to_i64()), Some(42i32));
        assert_eq!(u16::try_from_i64(-1), None);
        assert_eq!(u16::try_from_i64(70_000), None);
        assert_eq!(u16::try_from_i64(1234), Some(1234u16));
    }

    #[test]
    fn saturating_add_clamps() {
        assert_eq!(250u8.saturating_add(10), 255u8);
    }
}
