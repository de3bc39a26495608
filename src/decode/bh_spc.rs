//! Becker-Hickl standard FIFO ("SPC") 32-bit record format (spec §8
//! end-to-end scenario 6, grounded on `tests/bh_spc.cpp` and
//! `examples/BHSPCFile.hpp`).
//!
//! Each record packs a 12-bit macrotime, a 4-bit routing (channel) field, a
//! 12-bit ADC value, and four flag bits, least-significant-bit first:
//!
//! ```text
//! bit:  31      30    29   28     27..16   15..12    11..0
//!       invalid mtov  gap  marker adc(12)  routing(4) macrotime(12)
//! ```
//!
//! A dedicated "multiple macrotime overflow" record (`invalid` and `mtov`
//! both set, `marker` clear) reinterprets the low 28 bits as a single
//! overflow count instead of the three packed fields, letting one record
//! resynchronize the macrotime after more overflows than a single-record
//! `mtov` flag can represent.
use crate::error::{Error, Result};
use crate::events::{DataLost, Marker, TimeCorrelatedDetection, TimeReached};
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};
use crate::types::DataTypes;

const MACROTIME_BITS: u32 = 12;
const ROUTING_BITS: u32 = 4;
const ADC_BITS: u32 = 12;
const MACROTIME_MASK: u32 = (1 << MACROTIME_BITS) - 1;
const ROUTING_MASK: u32 = (1 << ROUTING_BITS) - 1;
const ADC_MASK: u32 = (1 << ADC_BITS) - 1;
const OVERFLOW_PERIOD: i64 = 1 << MACROTIME_BITS;

/// One raw 32-bit Becker-Hickl SPC record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub struct BhSpcEvent(pub u32);

/// Reinterpret a raw little-endian byte buffer (as produced by a `.spc` file
/// or any `OutputStream`-shaped source) as a slice of [`BhSpcEvent`] records,
/// without copying.
pub fn records_from_bytes(bytes: &[u8]) -> Result<&[BhSpcEvent]> {
    bytemuck::try_cast_slice(bytes).map_err(|_| Error::invalid_argument("byte buffer is not a whole number of 4-byte SPC records"))
}

impl BhSpcEvent {
    /// 12-bit macrotime field (meaningless on a multi-overflow record).
    pub fn macrotime(self) -> u16 {
        (self.0 & MACROTIME_MASK) as u16
    }

    /// 4-bit routing (channel) field.
    pub fn routing_signals(self) -> u8 {
        ((self.0 >> MACROTIME_BITS) & ROUTING_MASK) as u8
    }

    /// 12-bit ADC value.
    pub fn adc_value(self) -> u16 {
        ((self.0 >> (MACROTIME_BITS + ROUTING_BITS)) & ADC_MASK) as u16
    }

    /// The low 28 bits read as a single overflow count, valid only when
    /// [`Self::is_multiple_macrotime_overflow`].
    pub fn multiple_macrotime_overflow_count(self) -> u32 {
        self.0 & 0x0fff_ffff
    }

    /// Bit 28.
    pub fn marker_flag(self) -> bool {
        self.0 & (1 << 28) != 0
    }

    /// Bit 29.
    pub fn gap_flag(mut self, value: bool) -> Self {
        if value {
            self.0 |= 1 << 29;
        } else {
            self.0 &= !(1 << 29);
        }
        self
    }

    /// Read the gap flag set by [`Self::gap_flag`].
    pub fn is_gap(self) -> bool {
        self.0 & (1 << 29) != 0
    }

    /// Bit 30.
    pub fn macrotime_overflow_flag(self) -> bool {
        self.0 & (1 << 30) != 0
    }

    /// Bit 31.
    pub fn invalid_flag(self) -> bool {
        self.0 & (1 << 31) != 0
    }

    /// `invalid && macrotime_overflow && !marker`: a dedicated multi-overflow
    /// resync record rather than an ordinary (possibly invalid) photon.
    pub fn is_multiple_macrotime_overflow(self) -> bool {
        self.invalid_flag() && self.macrotime_overflow_flag() && !self.marker_flag()
    }

    /// Build a valid photon record.
    pub fn make_photon(macrotime: u16, adc: u16, routing: u8, mtov: bool) -> Self {
        let mut bits = (macrotime as u32 & MACROTIME_MASK)
            | ((routing as u32 & ROUTING_MASK) << MACROTIME_BITS)
            | ((adc as u32 & ADC_MASK) << (MACROTIME_BITS + ROUTING_BITS));
        if mtov {
            bits |= 1 << 30;
        }
        BhSpcEvent(bits)
    }

    /// Build an invalid photon record (overflowed ADC on some devices).
    pub fn make_invalid_photon(macrotime: u16, adc: u16) -> Self {
        let bits = (macrotime as u32 & MACROTIME_MASK)
            | ((adc as u32 & ADC_MASK) << (MACROTIME_BITS + ROUTING_BITS))
            | (1 << 31);
        BhSpcEvent(bits)
    }

    /// Build a marker record (routing bits select which marker lines fired).
    pub fn make_marker(macrotime: u16, routing: u8, mtov: bool) -> Self {
        let mut bits = (macrotime as u32 & MACROTIME_MASK) | ((routing as u32 & ROUTING_MASK) << MACROTIME_BITS) | (1 << 31) | (1 << 28);
        if mtov {
            bits |= 1 << 30;
        }
        BhSpcEvent(bits)
    }

    /// Build a dedicated multiple-macrotime-overflow record.
    pub fn make_multiple_macrotime_overflow(count: u32) -> Self {
        BhSpcEvent((count & 0x0fff_ffff) | (1 << 31) | (1 << 30))
    }
}

/// Running macrotime state and overflow bookkeeping, shared by
/// [`decode_bh_spc`]'s processor so each record's 12-bit macrotime can be
/// widened to a full abstime.
struct Overflow {
    base: i64,
}

impl Overflow {
    fn resolve(&mut self, event: BhSpcEvent) -> i64 {
        if event.is_multiple_macrotime_overflow() {
            self.base += OVERFLOW_PERIOD * i64::from(event.multiple_macrotime_overflow_count());
            self.base
        } else {
            if event.macrotime_overflow_flag() {
                self.base += OVERFLOW_PERIOD;
            }
            self.base + i64::from(event.macrotime())
        }
    }
}

/// Decodes a stream of [`BhSpcEvent`] records into the common event
/// vocabulary (spec §8 end-to-end scenario 6).
pub struct DecodeBhSpc<DT: DataTypes, D> {
    overflow: Overflow,
    downstream: D,
    _marker: std::marker::PhantomData<DT>,
}

/// Build a [`DecodeBhSpc`] processor.
pub fn decode_bh_spc<DT: DataTypes, D>(downstream: D) -> DecodeBhSpc<DT, D> {
    DecodeBhSpc {
        overflow: Overflow { base: 0 },
        downstream,
        _marker: std::marker::PhantomData,
    }
}

impl<DT: DataTypes, D: Flush> Flush for DecodeBhSpc<DT, D> {
    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }
}

impl<DT: DataTypes, D: Introspect> Introspect for DecodeBhSpc<DT, D> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "decode_bh_spc")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

fn widen<DT: DataTypes>(value: i64) -> Result<DT::AbsTime> {
    DT::AbsTime::try_from_i64(value).ok_or_else(|| Error::unexpected("decoded abstime does not fit the configured abstime type"))
}

impl<DT, D> HandleEvent<BhSpcEvent> for DecodeBhSpc<DT, D>
where
    DT: DataTypes,
    D: HandleEvent<TimeReached<DT>> + HandleEvent<TimeCorrelatedDetection<DT>> + HandleEvent<Marker<DT>> + HandleEvent<DataLost<DT>>,
{
    fn handle_ref(&mut self, event: &BhSpcEvent) -> Result<()> {
        self.handle_owned(*event)
    }

    fn handle_owned(&mut self, event: BhSpcEvent) -> Result<()> {
        use crate::types::Integer;

        let abstime = widen::<DT>(self.overflow.resolve(event))?;

        if event.is_gap() {
            self.downstream.handle_owned(DataLost { abstime })?;
        }

        if event.is_multiple_macrotime_overflow() {
            return self.downstream.handle_owned(TimeReached { abstime });
        }

        if event.invalid_flag() {
            if event.marker_flag() {
                let routing = event.routing_signals();
                for bit in 0..4u8 {
                    if routing & (1 << bit) != 0 {
                        let channel = DT::Channel::try_from_i64(i64::from(bit))
                            .ok_or_else(|| Error::unexpected("marker channel does not fit the configured channel type"))?;
                        self.downstream.handle_owned(Marker { abstime, channel })?;
                    }
                }
                Ok(())
            } else {
                self.downstream.handle_owned(TimeReached { abstime })
            }
        } else {
            let channel = DT::Channel::try_from_i64(i64::from(event.routing_signals()))
                .ok_or_else(|| Error::unexpected("channel does not fit the configured channel type"))?;
            let difftime = DT::DiffTime::try_from_i64(i64::from(event.adc_value()))
                .ok_or_else(|| Error::unexpected("difftime does not fit the configured difftime type"))?;
            self.downstream.handle_owned(TimeCorrelatedDetection { abstime, channel, difftime })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::DefaultDataTypes;

    #[derive(Debug, PartialEq, Eq, Clone)]
    enum Seen {
        TimeReached(i64),
        Detection(i64, i32, i32),
        Marker(i64, i32),
        DataLost(i64),
    }

    #[derive(Default)]
    struct Collector {
        seen: Vec<Seen>,
    }
    impl Flush for Collector {
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }
    impl HandleEvent<TimeReached<DefaultDataTypes>> for Collector {
        fn handle_ref(&mut self, e: &TimeReached<DefaultDataTypes>) -> Result<()> {
            self.handle_owned(*e)
        }
        fn handle_owned(&mut self, e: TimeReached<DefaultDataTypes>) -> Result<()> {
            self.seen.push(Seen::TimeReached(e.abstime));
            Ok(())
        }
    }
    impl HandleEvent<TimeCorrelatedDetection<DefaultDataTypes>> for Collector {
        fn handle_ref(&mut self, e: &TimeCorrelatedDetection<DefaultDataTypes>) -> Result<()> {
            self.handle_owned(*e)
        }
        fn handle_owned(&mut self, e: TimeCorrelatedDetection<DefaultDataTypes>) -> Result<()> {
            self.seen.push(Seen::Detection(e.abstime, e.channel, e.difftime));
            Ok(())
        }
    }
    impl HandleEvent<Marker<DefaultDataTypes>> for Collector {
        fn handle_ref(&mut self, e: &Marker<DefaultDataTypes>) -> Result<()> {
            self.handle_owned(*e)
        }
        fn handle_owned(&mut self, e: Marker<DefaultDataTypes>) -> Result<()> {
            self.seen.push(Seen::Marker(e.abstime, e.channel));
            Ok(())
        }
    }
    impl HandleEvent<DataLost<DefaultDataTypes>> for Collector {
        fn handle_ref(&mut self, e: &DataLost<DefaultDataTypes>) -> Result<()> {
            self.handle_owned(*e)
        }
        fn handle_owned(&mut self, e: DataLost<DefaultDataTypes>) -> Result<()> {
            self.seen.push(Seen::DataLost(e.abstime));
            Ok(())
        }
    }

    #[test]
    fn photon_with_no_overflow() {
        let mut d = decode_bh_spc::<DefaultDataTypes, _>(Collector::default());
        d.handle_owned(BhSpcEvent::make_photon(42, 123, 5, false)).unwrap();
        assert_eq!(d.downstream.seen, vec![Seen::Detection(42, 5, 123)]);
    }

    #[test]
    fn gap_flag_emits_data_lost_before_the_main_event() {
        let mut d = decode_bh_spc::<DefaultDataTypes, _>(Collector::default());
        d.handle_owned(BhSpcEvent::make_photon(42, 123, 5, false).gap_flag(true)).unwrap();
        assert_eq!(d.downstream.seen, vec![Seen::DataLost(42), Seen::Detection(42, 5, 123)]);
    }

    #[test]
    fn invalid_photon_is_time_reached() {
        let mut d = decode_bh_spc::<DefaultDataTypes, _>(Collector::default());
        d.handle_owned(BhSpcEvent::make_invalid_photon(42, 123)).unwrap();
        assert_eq!(d.downstream.seen, vec![Seen::TimeReached(42)]);
    }

    #[test]
    fn marker_emits_one_event_per_set_routing_bit() {
        let mut d = decode_bh_spc::<DefaultDataTypes, _>(Collector::default());
        d.handle_owned(BhSpcEvent::make_marker(42, 5, false)).unwrap();
        assert_eq!(d.downstream.seen, vec![Seen::Marker(42, 0), Seen::Marker(42, 2)]);
    }

    #[test]
    fn records_from_bytes_rejects_partial_trailing_record() {
        let record = BhSpcEvent::make_photon(42, 123, 5, false);
        let mut bytes = record.0.to_le_bytes().to_vec();
        bytes.push(0);
        assert!(records_from_bytes(&bytes).is_err());
    }

    #[test]
    fn records_from_bytes_reinterprets_le_u32s() {
        let records = [BhSpcEvent::make_photon(1, 2, 3, false), BhSpcEvent::make_marker(4, 5, false)];
        let mut bytes = Vec::new();
        for r in &records {
            bytes.extend_from_slice(&r.0.to_le_bytes());
        }
        assert_eq!(records_from_bytes(&bytes).unwrap(), &records);
    }

    #[test]
    fn multi_overflow_then_photon_widens_macrotime() {
        // spec end-to-end scenario 6: multi-overflow record count=3, then a
        // photon record with mtov=true, macrotime=42, adc=123, routing=5.
        let mut d = decode_bh_spc::<DefaultDataTypes, _>(Collector::default());
        d.handle_owned(BhSpcEvent::make_multiple_macrotime_overflow(3)).unwrap();
        d.handle_owned(BhSpcEvent::make_photon(42, 123, 5, true)).unwrap();
        assert_eq!(
            d.downstream.seen,
            vec![Seen::TimeReached(4096 * 3), Seen::Detection(4096 * 4 + 42, 5, 123)]
        );
    }
}
