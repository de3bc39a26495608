//! Scheduled output events triggered by input events (spec ambient table
//! "Timing generators", grounded on `tests/generate.cpp`; no corresponding
//! header survived the distillation pack, so behavior is reconstructed from
//! the test cases alone).
//!
//! A [`TimingGenerator`] is armed by a trigger event and then offers, via
//! `peek`/`pop`, a queue of future abstimes at which the owning [`Generate`]
//! processor should synthesize and emit an output event. Re-triggering
//! replaces whatever was previously scheduled, matching
//! `one_shot_timing_generator`/`linear_timing_generator`'s observed
//! "overlapping trigger" behavior in the test file.
use std::any::Any;

use crate::error::Result;
use crate::events::HasAbsTime;
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};
use crate::types::DataTypes;

/// Schedules future output abstimes in response to trigger events.
pub trait TimingGenerator<DT: DataTypes> {
    /// Arm (or re-arm, discarding anything previously scheduled) from a
    /// trigger observed at `time`.
    fn trigger(&mut self, time: DT::AbsTime);
    /// The next scheduled abstime, if any remain.
    fn peek(&self) -> Option<DT::AbsTime>;
    /// Consume the abstime returned by the most recent `peek`.
    fn pop(&mut self);
}

/// Never schedules anything; `generate` built on this is a pure pass-through.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTimingGenerator;

impl<DT: DataTypes> TimingGenerator<DT> for NullTimingGenerator {
    fn trigger(&mut self, _time: DT::AbsTime) {}
    fn peek(&self) -> Option<DT::AbsTime> {
        None
    }
    fn pop(&mut self) {}
}

/// Build a [`NullTimingGenerator`].
pub fn null_timing_generator() -> NullTimingGenerator {
    NullTimingGenerator
}

/// Schedules exactly one output, `delay` ticks after each trigger.
#[derive(Clone, Debug)]
pub struct OneShotTimingGenerator<DT: DataTypes> {
    delay: DT::AbsTime,
    pending: Option<DT::AbsTime>,
}

/// Build a [`OneShotTimingGenerator`] with the given delay.
pub fn one_shot_timing_generator<DT: DataTypes>(delay: DT::AbsTime) -> OneShotTimingGenerator<DT> {
    OneShotTimingGenerator { delay, pending: None }
}

impl<DT: DataTypes> TimingGenerator<DT> for OneShotTimingGenerator<DT> {
    fn trigger(&mut self, time: DT::AbsTime) {
        self.pending = Some(time.saturating_add(self.delay));
    }
    fn peek(&self) -> Option<DT::AbsTime> {
        self.pending
    }
    fn pop(&mut self) {
        self.pending = None;
    }
}

/// Schedules `count` outputs spaced `interval` ticks apart, the first
/// `delay` ticks after each trigger.
#[derive(Clone, Debug)]
pub struct LinearTimingGenerator<DT: DataTypes> {
    delay: DT::AbsTime,
    interval: DT::AbsTime,
    count: usize,
    pending: Option<DT::AbsTime>,
    remaining: usize,
}

/// Build a [`LinearTimingGenerator`].
pub fn linear_timing_generator<DT: DataTypes>(
    delay: DT::AbsTime,
    interval: DT::AbsTime,
    count: usize,
) -> LinearTimingGenerator<DT> {
    LinearTimingGenerator {
        delay,
        interval,
        count,
        pending: None,
        remaining: 0,
    }
}

impl<DT: DataTypes> TimingGenerator<DT> for LinearTimingGenerator<DT> {
    fn trigger(&mut self, time: DT::AbsTime) {
        self.remaining = self.count;
        self.pending = if self.count == 0 {
            None
        } else {
            Some(time.saturating_add(self.delay))
        };
    }
    fn peek(&self) -> Option<DT::AbsTime> {
        if self.remaining == 0 {
            None
        } else {
            self.pending
        }
    }
    fn pop(&mut self) {
        if let Some(t) = self.pending {
            self.remaining -= 1;
            self.pending = Some(t.saturating_add(self.interval));
        }
    }
}

/// A [`OneShotTimingGenerator`] whose delay is supplied per-trigger instead
/// of fixed at construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct DynamicOneShotTimingGenerator<DT: DataTypes> {
    pending: Option<DT::AbsTime>,
}

impl<DT: DataTypes> DynamicOneShotTimingGenerator<DT> {
    /// Arm with an explicit `(time, delay)` pair.
    pub fn trigger(&mut self, time: DT::AbsTime, delay: DT::AbsTime) {
        self.pending = Some(time.saturating_add(delay));
    }
    /// The next scheduled abstime, if any.
    pub fn peek(&self) -> Option<DT::AbsTime> {
        self.pending
    }
    /// Consume the abstime returned by the most recent `peek`.
    pub fn pop(&mut self) {
        self.pending = None;
    }
}

/// Build a [`DynamicOneShotTimingGenerator`].
pub fn dynamic_one_shot_timing_generator<DT: DataTypes>() -> DynamicOneShotTimingGenerator<DT> {
    DynamicOneShotTimingGenerator::default()
}

/// A [`LinearTimingGenerator`] whose delay/interval/count are supplied
/// per-trigger instead of fixed at construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct DynamicLinearTimingGenerator<DT: DataTypes> {
    interval: DT::AbsTime,
    pending: Option<DT::AbsTime>,
    remaining: usize,
}

impl<DT: DataTypes> DynamicLinearTimingGenerator<DT> {
    /// Arm with an explicit `(time, delay, interval, count)` tuple.
    pub fn trigger(&mut self, time: DT::AbsTime, delay: DT::AbsTime, interval: DT::AbsTime, count: usize) {
        self.interval = interval;
        self.remaining = count;
        self.pending = if count == 0 { None } else { Some(time.saturating_add(delay)) };
    }
    /// The next scheduled abstime, if any remain.
    pub fn peek(&self) -> Option<DT::AbsTime> {
        if self.remaining == 0 {
            None
        } else {
            self.pending
        }
    }
    /// Consume the abstime returned by the most recent `peek`.
    pub fn pop(&mut self) {
        if let Some(t) = self.pending {
            self.remaining -= 1;
            self.pending = Some(t.saturating_add(self.interval));
        }
    }
}

/// Build a [`DynamicLinearTimingGenerator`].
pub fn dynamic_linear_timing_generator<DT: DataTypes>() -> DynamicLinearTimingGenerator<DT> {
    DynamicLinearTimingGenerator::default()
}

/// Emits a synthetic `Output` event, scheduled by `generator`, whenever a
/// `Trigger` event is observed or a later event's abstime reaches a
/// scheduled time; all events (including `Trigger` and the synthesized
/// `Output`) pass through to `downstream` unchanged (spec ambient table
/// "Timing generators", grounded on `tests/generate.cpp`).
///
/// `Trigger` is distinguished from every other handled event type at run
/// time via a downcast, the same technique used by
/// [`crate::binning::BatchBinIncrements`] to special-case one concrete type
/// inside an otherwise-generic handler — needed here because Rust cannot
/// express "any event type except this one" as a second blanket impl
/// without an overlap error.
pub struct Generate<DT: DataTypes, Trigger, Output, G, D> {
    generator: G,
    downstream: D,
    _marker: std::marker::PhantomData<(DT, Trigger, Output)>,
}

/// Build a [`Generate`] processor. `Trigger` and `Output` are fixed by type
/// annotation at the call site, e.g.
/// `generate::<DefaultDataTypes, TriggerEvent, OutputEvent, _, _>(gen, downstream)`.
pub fn generate<DT: DataTypes, Trigger, Output, G, D>(generator: G, downstream: D) -> Generate<DT, Trigger, Output, G, D> {
    Generate {
        generator,
        downstream,
        _marker: std::marker::PhantomData,
    }
}

impl<DT: DataTypes, Trigger, Output, G, D: Flush> Flush for Generate<DT, Trigger, Output, G, D> {
    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }
}

impl<DT: DataTypes, Trigger, Output, G, D: Introspect> Introspect for Generate<DT, Trigger, Output, G, D> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "generate")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<DT, Trigger, Output, G, D, Ev> HandleEvent<Ev> for Generate<DT, Trigger, Output, G, D>
where
    DT: DataTypes,
    Trigger: 'static,
    Output: HasAbsTime<DT> + Default,
    G: TimingGenerator<DT>,
    D: HandleEvent<Ev> + HandleEvent<Output>,
    Ev: HasAbsTime<DT> + Clone + 'static,
{
    fn handle_ref(&mut self, event: &Ev) -> Result<()> {
        self.handle_owned(event.clone())
    }

    fn handle_owned(&mut self, event: Ev) -> Result<()> {
        if (&event as &dyn Any).is::<Trigger>() {
            self.generator.trigger(event.abstime());
            return self.downstream.handle_owned(event);
        }
        let now = event.abstime();
        while let Some(t) = self.generator.peek() {
            if t > now {
                break;
            }
            let mut out = Output::default();
            out.set_abstime(t);
            self.downstream.handle_owned(out)?;
            self.generator.pop();
        }
        self.downstream.handle_owned(event)
    }
}
