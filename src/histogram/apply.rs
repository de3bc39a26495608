//! Shared bin-increment application logic used by both `histogram` and
//! `scan_histograms` (spec §4.5.3). Kept separate from both processors
//! since the overflow arithmetic is identical while their event-emission
//! behavior around it differs.

use crate::types::Integer;

/// Check whether applying `cluster` to `slice` (each bin index increments
/// its cell by one, in order, duplicates accumulating) would exceed
/// `max_per_bin` anywhere, or names a bin index outside `slice` at all (a
/// bin index out of range can never be safely applied, so it is treated as
/// an unconditional overflow rather than silently ignored). Does not mutate
/// `slice`. Returns the index within `cluster` of the first increment that
/// would overflow, if any.
///
/// Checking before mutating (rather than applying until the first overflow
/// and then rolling back element-by-element) is what makes "roll back the
/// current scan using the journal" exact: a cluster that overflows is never
/// partially committed to the live bucket in the first place.
pub(crate) fn would_overflow<Bin: Integer, BinIndex: Integer>(
    slice: &[Bin],
    cluster: &[BinIndex],
    max_per_bin: Bin,
) -> Option<usize> {
    let mut pending = std::collections::HashMap::new();
    let max = max_per_bin.to_i64();
    for (ci, bin_index) in cluster.iter().enumerate() {
        let idx = bin_index.to_i64() as usize;
        let Some(base) = slice.get(idx).map(|b| b.to_i64()) else {
            return Some(ci);
        };
        let delta = pending.entry(idx).or_insert(0i64);
        *delta += 1;
        if base + *delta > max {
            return Some(ci);
        }
    }
    None
}

/// Apply every increment in `cluster` to `slice`. Caller must have already
/// confirmed (via [`would_overflow`] returning `None`) that this does not
/// exceed `max_per_bin` anywhere; an out-of-range bin index is silently
/// skipped rather than panicking, as a defensive guard against that
/// precondition being violated (the same `get_mut` guard [`apply_saturating`]
/// uses, which has no preceding `would_overflow` check to rely on).
pub(crate) fn apply_unchecked<Bin: Integer, BinIndex: Integer>(slice: &mut [Bin], cluster: &[BinIndex]) {
    for bin_index in cluster {
        let idx = bin_index.to_i64() as usize;
        let Some(cell) = slice.get_mut(idx) else { continue };
        let next = cell.to_i64() + 1;
        *cell = Bin::try_from_i64(next).expect("checked by would_overflow");
    }
}

/// Apply every increment in `cluster` to `slice`, clamping any cell at
/// `max_per_bin` instead of exceeding it. Returns `true` if at least one
/// increment was clamped. An out-of-range bin index is silently skipped
/// (there is no cell to clamp), the same guard [`apply_unchecked`] uses.
pub(crate) fn apply_saturating<Bin: Integer, BinIndex: Integer>(
    slice: &mut [Bin],
    cluster: &[BinIndex],
    max_per_bin: Bin,
) -> bool {
    let max = max_per_bin.to_i64();
    let mut saturated = false;
    for bin_index in cluster {
        let idx = bin_index.to_i64() as usize;
        let Some(cell) = slice.get_mut(idx) else { continue };
        let next = cell.to_i64() + 1;
        if next > max {
            saturated = true;
            *cell = max_per_bin;
        } else {
            *cell = Bin::try_from_i64(next).expect("next <= max_per_bin fits Bin");
        }
    }
    saturated
}

/// Undo every increment in `cluster` against `slice`, in reverse order.
/// Used to roll back a scan from the journal. Guards out-of-range indices
/// the same way [`apply_unchecked`]/[`apply_saturating`] do; reachable only
/// if a cluster journaled by one of them also skipped an index.
pub(crate) fn undo<Bin: Integer, BinIndex: Integer>(slice: &mut [Bin], cluster: &[BinIndex]) {
    for bin_index in cluster.iter().rev() {
        let idx = bin_index.to_i64() as usize;
        let Some(cell) = slice.get_mut(idx) else { continue };
        let next = cell.to_i64() - 1;
        *cell = Bin::try_from_i64(next).expect("undo stays within range");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_detected_without_mutating() {
        let slice = [2u16, 0u16];
        let cluster = [0u16, 0u16]; // two increments to bin 0, max 3 -> fine; max 2 -> overflow on 2nd
        assert_eq!(would_overflow(&slice, &cluster, 2), Some(1));
        assert_eq!(would_overflow(&slice, &cluster, 3), None);
        assert_eq!(slice, [2, 0]); // unchanged
    }

    #[test]
    fn apply_then_undo_round_trips() {
        let mut slice = [0u16, 0u16, 0u16];
        let cluster = [0u16, 1, 1, 2];
        apply_unchecked(&mut slice, &cluster);
        assert_eq!(slice, [1, 2, 1]);
        undo(&mut slice, &cluster);
        assert_eq!(slice, [0, 0, 0]);
    }

    #[test]
    fn saturating_clamps_and_reports() {
        let mut slice = [2u16];
        let cluster = [0u16, 0, 0];
        let saturated = apply_saturating(&mut slice, &cluster, 3);
        assert!(saturated);
        assert_eq!(slice, [3]);
    }
}
