//! Small pass-through processors built directly on [`HandleEvent`]/[`Flush`]
//! (spec §0.1 supplemented features, grounded on `prepend_append.hpp`,
//! `time_delay.hpp`, `split.hpp`, `discard.hpp`).

use super::{Flush, HandleEvent, Introspect, NodeInfo};
use crate::error::Result;
use crate::events::HasAbsTime;
use crate::types::DataTypes;

/// Inserts `event` at the start of the stream, before the first event
/// passed through; all events pass through unchanged (spec §0.1).
pub struct Prepend<Event, D> {
    event: Option<Event>,
    downstream: D,
}

/// Build a [`Prepend`] processor.
pub fn prepend<Event, D>(event: Event, downstream: D) -> Prepend<Event, D> {
    Prepend {
        event: Some(event),
        downstream,
    }
}

impl<Event, D> Prepend<Event, D> {
    fn emit_once(&mut self) -> Result<()>
    where
        D: HandleEvent<Event>,
    {
        if let Some(event) = self.event.take() {
            self.downstream.handle_owned(event)?;
        }
        Ok(())
    }
}

impl<Event, D: Flush> Flush for Prepend<Event, D> {
    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }
}

impl<Event, D: Introspect> Introspect for Prepend<Event, D> {
    fn introspect_node(&self) -> NodeInfo {
        super::node_info_of(self, "prepend")
    }
    fn introspect_graph(&self) -> super::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<Event, D, E> HandleEvent<E> for Prepend<Event, D>
where
    D: HandleEvent<E> + HandleEvent<Event>,
{
    fn handle_ref(&mut self, event: &E) -> Result<()> {
        self.emit_once()?;
        self.downstream.handle_ref(event)
    }
    fn handle_owned(&mut self, event: E) -> Result<()> {
        self.emit_once()?;
        self.downstream.handle_owned(event)
    }
}

/// Inserts `event` just before flush; all events pass through unchanged.
/// Has no effect if processing ends via `end-of-processing` raised
/// downstream rather than a flush reaching this node (spec §0.1).
pub struct Append<Event, D> {
    event: Event,
    downstream: D,
}

/// Build an [`Append`] processor.
pub fn append<Event, D>(event: Event, downstream: D) -> Append<Event, D> {
    Append { event, downstream }
}

impl<Event: Clone, D: Flush + HandleEvent<Event>> Flush for Append<Event, D> {
    fn flush(&mut self) -> Result<()> {
        self.downstream.handle_owned(self.event.clone())?;
        self.downstream.flush()
    }
}

impl<Event, D: Introspect> Introspect for Append<Event, D> {
    fn introspect_node(&self) -> NodeInfo {
        super::node_info_of(self, "append")
    }
    fn introspect_graph(&self) -> super::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<Event, D, E> HandleEvent<E> for Append<Event, D>
where
    D: HandleEvent<E>,
{
    fn handle_ref(&mut self, event: &E) -> Result<()> {
        self.downstream.handle_ref(event)
    }
    fn handle_owned(&mut self, event: E) -> Result<()> {
        self.downstream.handle_owned(event)
    }
}

/// Applies a fixed `abstime` offset to every event that carries one,
/// leaving other event types (e.g. [`crate::events::Warning`], which has no
/// abstime field) unaffected by this processor's own logic but still
/// requiring the downstream to accept them directly, since `TimeDelay` only
/// implements [`HandleEvent`] for [`HasAbsTime`] types (spec §0.1, grounded
/// on `time_delay.hpp`'s unconstrained `handle_event` template, which
/// likewise only compiles for events with a `.macrotime` member).
pub struct TimeDelay<DT: DataTypes, D> {
    delta: DT::AbsTime,
    downstream: D,
}

/// Build a [`TimeDelay`] processor with the given offset (may be negative
/// for signed abstime types).
pub fn time_delay<DT: DataTypes, D>(delta: DT::AbsTime, downstream: D) -> TimeDelay<DT, D> {
    TimeDelay { delta, downstream }
}

impl<DT: DataTypes, D: Flush> Flush for TimeDelay<DT, D> {
    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }
}

impl<DT: DataTypes, D: Introspect> Introspect for TimeDelay<DT, D> {
    fn introspect_node(&self) -> NodeInfo {
        super::node_info_of(self, "time_delay")
    }
    fn introspect_graph(&self) -> super::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<DT: DataTypes, D, Ev> HandleEvent<Ev> for TimeDelay<DT, D>
where
    Ev: HasAbsTime<DT> + Clone,
    D: HandleEvent<Ev>,
{
    fn handle_ref(&mut self, event: &Ev) -> Result<()> {
        let mut copy = event.clone();
        copy.set_abstime(copy.abstime().saturating_add(self.delta));
        self.downstream.handle_owned(copy)
    }
    fn handle_owned(&mut self, mut event: Ev) -> Result<()> {
        event.set_abstime(event.abstime().saturating_add(self.delta));
        self.downstream.handle_owned(event)
    }
}

/// Routes events to one of two downstreams by (compile-time) event type
/// (spec §0.1, grounded on `split.hpp`). Which event types route to
/// `downstream1` is fixed per call site with [`route_second`]; every other
/// concrete event type used in the pipeline must be routed explicitly with
/// [`route_first`], mirroring how `split_events`'s `if constexpr` branch is
/// resolved once per concrete `AnyEvent` at that template's instantiation.
pub struct Split<D0, D1> {
    downstream0: D0,
    downstream1: D1,
}

/// Build a [`Split`] processor. Use [`route_first`]/[`route_second`] to
/// wire up which concrete event types go to which side.
pub fn split<D0, D1>(downstream0: D0, downstream1: D1) -> Split<D0, D1> {
    Split {
        downstream0,
        downstream1,
    }
}

impl<D0: Flush, D1: Flush> Flush for Split<D0, D1> {
    fn flush(&mut self) -> Result<()> {
        self.downstream0.flush()?;
        self.downstream1.flush()
    }
}

impl<D0: Introspect, D1: Introspect> Introspect for Split<D0, D1> {
    fn introspect_node(&self) -> NodeInfo {
        super::node_info_of(self, "split")
    }
    fn introspect_graph(&self) -> super::Graph {
        let mut g = self.downstream0.introspect_graph();
        g.extend(self.downstream1.introspect_graph());
        g.insert(0, self.introspect_node());
        g
    }
}

/// Implements `HandleEvent<$event>` on `Split<D0, D1>`, routing to
/// `downstream0`, for each listed concrete event type.
#[macro_export]
macro_rules! route_first {
    ($($event:ty),+ $(,)?) => {
        $(
            impl<D0, D1> $crate::processor::HandleEvent<$event> for $crate::processor::Split<D0, D1>
            where
                D0: $crate::processor::HandleEvent<$event>,
            {
                fn handle_ref(&mut self, event: &$event) -> $crate::error::Result<()> {
                    self.route0_ref(event)
                }
                fn handle_owned(&mut self, event: $event) -> $crate::error::Result<()> {
                    self.route0_owned(event)
                }
            }
        )+
    };
}

/// Implements `HandleEvent<$event>` on `Split<D0, D1>`, routing to
/// `downstream1`, for each listed concrete event type.
#[macro_export]
macro_rules! route_second {
    ($($event:ty),+ $(,)?) => {
        $(
            impl<D0, D1> $crate::processor::HandleEvent<$event> for $crate::processor::Split<D0, D1>
            where
                D1: $crate::processor::HandleEvent<$event>,
            {
                fn handle_ref(&mut self, event: &$event) -> $crate::error::Result<()> {
                    self.route1_ref(event)
                }
                fn handle_owned(&mut self, event: $event) -> $crate::error::Result<()> {
                    self.route1_owned(event)
                }
            }
        )+
    };
}

impl<D0, D1> Split<D0, D1> {
    /// Forward `event` by reference to `downstream0`. Exposed for
    /// [`route_first`]'s generated impls.
    pub fn route0_ref<E>(&mut self, event: &E) -> Result<()>
    where
        D0: HandleEvent<E>,
    {
        self.downstream0.handle_ref(event)
    }

    /// Forward `event` by value to `downstream0`.
    pub fn route0_owned<E>(&mut self, event: E) -> Result<()>
    where
        D0: HandleEvent<E>,
    {
        self.downstream0.handle_owned(event)
    }

    /// Forward `event` by reference to `downstream1`. Exposed for
    /// [`route_second`]'s generated impls.
    pub fn route1_ref<E>(&mut self, event: &E) -> Result<()>
    where
        D1: HandleEvent<E>,
    {
        self.downstream1.handle_ref(event)
    }

    /// Forward `event` by value to `downstream1`.
    pub fn route1_owned<E>(&mut self, event: E) -> Result<()>
    where
        D1: HandleEvent<E>,
    {
        self.downstream1.handle_owned(event)
    }
}

/// Sinks every event type, doing nothing (spec §0.1, grounded on
/// `discard.hpp`'s `discard_any`).
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardAny;

/// Build a [`DiscardAny`] sink.
pub fn discard_any() -> DiscardAny {
    DiscardAny
}

impl Flush for DiscardAny {
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Introspect for DiscardAny {
    fn introspect_node(&self) -> NodeInfo {
        super::node_info_of(self, "discard_any")
    }
    fn introspect_graph(&self) -> super::Graph {
        vec![self.introspect_node()]
    }
}

impl<E> HandleEvent<E> for DiscardAny {
    fn handle_ref(&mut self, _event: &E) -> Result<()> {
        Ok(())
    }
    fn handle_owned(&mut self, _event: E) -> Result<()> {
        Ok(())
    }
}

/// Sinks a specified set of event types, doing nothing for each; use
/// [`discard_events`] to declare which types (spec §0.1, grounded on
/// `discard.hpp`'s `discard_all<Es>`).
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardAll;

/// Build a [`DiscardAll`] sink.
pub fn discard_all() -> DiscardAll {
    DiscardAll
}

impl Flush for DiscardAll {
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Introspect for DiscardAll {
    fn introspect_node(&self) -> NodeInfo {
        super::node_info_of(self, "discard_all")
    }
    fn introspect_graph(&self) -> super::Graph {
        vec![self.introspect_node()]
    }
}

/// Implements `HandleEvent<$event>` (a no-op) on `DiscardAll` for each
/// listed concrete event type.
#[macro_export]
macro_rules! discard_events {
    ($($event:ty),+ $(,)?) => {
        $(
            impl $crate::processor::HandleEvent<$event> for $crate::processor::DiscardAll {
                fn handle_ref(&mut self, _event: &$event) -> $crate::error::Result<()> { Ok(()) }
                fn handle_owned(&mut self, _event: $event) -> $crate::error::Result<()> { Ok(()) }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DefaultDataTypes;

    #[derive(Default)]
    struct Collector<T> {
        received: Vec<T>,
        flushed: bool,
    }

    impl<T> Flush for Collector<T> {
        fn flush(&mut self) -> Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    impl<T: Clone> HandleEvent<T> for Collector<T> {
        fn handle_ref(&mut self, event: &T) -> Result<()> {
            self.received.push(event.clone());
            Ok(())
        }
        fn handle_owned(&mut self, event: T) -> Result<()> {
            self.received.push(event);
            Ok(())
        }
    }

    #[test]
    fn prepend_emits_once_before_first_event() {
        let mut p = prepend(0i32, Collector::<i32>::default());
        p.handle_owned(1).unwrap();
        p.handle_owned(2).unwrap();
        p.flush().unwrap();
        assert_eq!(p.downstream.received, vec![0, 1, 2]);
    }

    #[test]
    fn append_emits_only_on_flush() {
        let mut p = append(99i32, Collector::<i32>::default());
        p.handle_owned(1).unwrap();
        assert!(p.downstream.received == vec![1]);
        p.flush().unwrap();
        assert_eq!(p.downstream.received, vec![1, 99]);
    }

    #[test]
    fn time_delay_shifts_abstime() {
        use crate::events::Detection;
        let mut p = time_delay::<DefaultDataTypes, _>(100, Collector::<Detection<DefaultDataTypes>>::default());
        p.handle_owned(Detection {
            abstime: 5,
            channel: 1,
        })
        .unwrap();
        assert_eq!(p.downstream.received[0].abstime, 105);
    }

    route_second!(i32);

    #[test]
    fn split_routes_by_event_type() {
        let mut p = split(Collector::<i64>::default(), Collector::<i32>::default());
        p.handle_owned(1i32).unwrap();
        p.flush().unwrap();
        assert_eq!(p.downstream1.received, vec![1]);
        assert!(p.downstream0.received.is_empty());
    }

    discard_events!(i32, i64);

    #[test]
    fn discard_all_swallows_listed_types() {
        let mut d = discard_all();
        d.handle_owned(1i32).unwrap();
        d.handle_owned(2i64).unwrap();
        d.flush().unwrap();
    }

    #[test]
    fn discard_any_swallows_everything() {
        let mut d = discard_any();
        d.handle_owned("anything").unwrap();
        d.flush().unwrap();
    }
}
