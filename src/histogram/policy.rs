//! Overflow policy bits (spec §4.5.3), realized as independently-combinable
//! `bitflags` rather than the original's tag types combined with `|`.

use bitflags::bitflags;

bitflags! {
    /// What to do when an increment would exceed `max_per_bin`, plus
    /// independent behavior flags that may be combined with any policy
    /// except where noted (spec §4.5.3).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HistogramPolicy: u8 {
        /// About-to-overflow increment raises a fatal error.
        const ERROR_ON_OVERFLOW = 1 << 0;
        /// About-to-overflow increment rolls back the scan, emits a
        /// concluding event if requested, flushes downstream, and raises
        /// end-of-processing.
        const STOP_ON_OVERFLOW = 1 << 1;
        /// About-to-overflow increment clamps at `max_per_bin` and emits one
        /// warning per round.
        const SATURATE_ON_OVERFLOW = 1 << 2;
        /// About-to-overflow increment rolls back the scan (using the
        /// journal), starts a fresh bucket, replays the journal, and
        /// retries. Fatal if it is the first scan of the round.
        const RESET_ON_OVERFLOW = 1 << 3;
        /// Roll back the partial scan and emit a concluding event on
        /// reset/overflow. Not compatible with `SATURATE_ON_OVERFLOW`.
        const EMIT_CONCLUDING_EVENTS = 1 << 4;
        /// Perform a reset automatically whenever a scan completes.
        const RESET_AFTER_SCAN = 1 << 5;
        /// Zero the current element's slot before applying each scan's
        /// increments, rather than accumulating across scans.
        const CLEAR_EVERY_SCAN = 1 << 6;
        /// Skip zero-filling unfilled slots when a fresh bucket is
        /// allocated for the first scan of a round.
        const NO_CLEAR_NEW_BUCKET = 1 << 7;
    }
}

impl HistogramPolicy {
    /// Exactly one of the four overflow-behavior bits must be set.
    pub fn validate(self) -> crate::error::Result<()> {
        let overflow_bits = HistogramPolicy::ERROR_ON_OVERFLOW
            | HistogramPolicy::STOP_ON_OVERFLOW
            | HistogramPolicy::SATURATE_ON_OVERFLOW
            | HistogramPolicy::RESET_ON_OVERFLOW;
        let set = self & overflow_bits;
        if set.bits().count_ones() != 1 {
            return Err(crate::error::Error::invalid_argument(
                "HistogramPolicy: exactly one overflow behavior bit must be set",
            ));
        }
        if self.contains(HistogramPolicy::SATURATE_ON_OVERFLOW)
            && self.contains(HistogramPolicy::EMIT_CONCLUDING_EVENTS)
        {
            return Err(crate::error::Error::invalid_argument(
                "HistogramPolicy: EMIT_CONCLUDING_EVENTS is not compatible with SATURATE_ON_OVERFLOW",
            ));
        }
        Ok(())
    }

    /// True if increments clamp instead of raising/rolling back.
    pub fn is_saturate(self) -> bool {
        self.contains(HistogramPolicy::SATURATE_ON_OVERFLOW)
    }
    /// True if overflow is fatal immediately.
    pub fn is_error(self) -> bool {
        self.contains(HistogramPolicy::ERROR_ON_OVERFLOW)
    }
    /// True if overflow stops the stream.
    pub fn is_stop(self) -> bool {
        self.contains(HistogramPolicy::STOP_ON_OVERFLOW)
    }
    /// True if overflow triggers a reset-and-replay.
    pub fn is_reset(self) -> bool {
        self.contains(HistogramPolicy::RESET_ON_OVERFLOW)
    }
    /// True if concluding events should be emitted on reset/stop.
    pub fn emits_concluding(self) -> bool {
        self.contains(HistogramPolicy::EMIT_CONCLUDING_EVENTS)
    }
    /// True if a reset should be performed whenever a scan completes.
    pub fn resets_after_scan(self) -> bool {
        self.contains(HistogramPolicy::RESET_AFTER_SCAN)
    }
    /// True if each scan starts from a cleared slot.
    pub fn clears_every_scan(self) -> bool {
        self.contains(HistogramPolicy::CLEAR_EVERY_SCAN)
    }
    /// True if a fresh bucket skips zero-filling unfilled slots.
    pub fn skips_clearing_new_bucket(self) -> bool {
        self.contains(HistogramPolicy::NO_CLEAR_NEW_BUCKET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_exactly_one_overflow_bit() {
        assert!(HistogramPolicy::empty().validate().is_err());
        assert!((HistogramPolicy::ERROR_ON_OVERFLOW | HistogramPolicy::STOP_ON_OVERFLOW)
            .validate()
            .is_err());
        assert!(HistogramPolicy::ERROR_ON_OVERFLOW.validate().is_ok());
    }

    #[test]
    fn saturate_incompatible_with_emit_concluding() {
        let p = HistogramPolicy::SATURATE_ON_OVERFLOW | HistogramPolicy::EMIT_CONCLUDING_EVENTS;
        assert!(p.validate().is_err());
    }
}
