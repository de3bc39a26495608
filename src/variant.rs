//! Tagged-union event type, used as the queued item in [`crate::buffer`]
//! (spec §4.8, grounded on `variant_event.hpp`).
//!
//! Rust's `enum` already is the tagged union the original hand-rolls, so
//! [`variant_event`] is a thin macro that, given a name and a list of
//! concrete event types, generates an enum with one variant per type and a
//! pair of `dispatch_ref`/`dispatch_owned` inherent methods that forward to
//! whichever `HandleEvent` impl on a caller-supplied downstream matches the
//! active alternative. This is an inherent method rather than a blanket
//! `impl<D> HandleEvent<Variant> for D`: several processors in this crate
//! (e.g. [`crate::processor::DiscardAny`]) already carry their own blanket
//! `impl<E> HandleEvent<E> for Self`, and a second blanket impl keyed only
//! on the variant's own member bounds would conflict with those for any
//! downstream that happens to satisfy both (coherence overlap, not
//! resolvable without specialization). [`variant_or_single`] collapses to a
//! plain type alias when given exactly one event type, avoiding a
//! discriminant entirely in that case — the same optimization the original
//! documents explicitly.
#[macro_export]
macro_rules! variant_event {
    ($vis:vis enum $name:ident { $($variant:ident($event:ty)),+ $(,)? }) => {
        #[derive(Clone, Debug, PartialEq, Eq)]
        $vis enum $name {
            $($variant($event)),+
        }

        $(
            impl From<$event> for $name {
                fn from(event: $event) -> Self {
                    $name::$variant(event)
                }
            }
        )+

        impl $name {
            /// Forward to whichever `handle_ref` on `downstream` matches
            /// the active alternative.
            $vis fn dispatch_ref<D>(&self, downstream: &mut D) -> $crate::error::Result<()>
            where
                D: $($crate::processor::HandleEvent<$event> +)+ Sized,
            {
                match self {
                    $($name::$variant(e) => $crate::processor::HandleEvent::<$event>::handle_ref(downstream, e)),+
                }
            }

            /// Forward to whichever `handle_owned` on `downstream` matches
            /// the active alternative.
            $vis fn dispatch_owned<D>(self, downstream: &mut D) -> $crate::error::Result<()>
            where
                D: $($crate::processor::HandleEvent<$event> +)+ Sized,
            {
                match self {
                    $($name::$variant(e) => $crate::processor::HandleEvent::<$event>::handle_owned(downstream, e)),+
                }
            }
        }
    };
}

/// Like [`variant_event`], but collapses to `pub type $name = $event;` when
/// given exactly one event type (spec §4.8 "avoiding a tag byte in the
/// common case"). In that case the plain event type is already dispatched
/// by the ordinary `HandleEvent` impl on the downstream, so no
/// `dispatch_ref`/`dispatch_owned` wrapper is generated.
#[macro_export]
macro_rules! variant_or_single {
    ($vis:vis enum $name:ident { $variant:ident($event:ty) }) => {
        $vis type $name = $event;
    };
    ($vis:vis enum $name:ident { $($variant:ident($event:ty)),+ $(,)? }) => {
        $crate::variant_event! {
            $vis enum $name { $($variant($event)),+ }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::processor::{Flush, HandleEvent};

    variant_event! {
        enum Item {
            A(i32),
            B(i64),
        }
    }

    variant_or_single! {
        enum Solo { Only(i32) }
    }

    #[derive(Default)]
    struct Collector {
        ints: Vec<i32>,
        longs: Vec<i64>,
    }
    impl Flush for Collector {
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }
    impl HandleEvent<i32> for Collector {
        fn handle_ref(&mut self, event: &i32) -> Result<()> {
            self.ints.push(*event);
            Ok(())
        }
        fn handle_owned(&mut self, event: i32) -> Result<()> {
            self.ints.push(event);
            Ok(())
        }
    }
    impl HandleEvent<i64> for Collector {
        fn handle_ref(&mut self, event: &i64) -> Result<()> {
            self.longs.push(*event);
            Ok(())
        }
        fn handle_owned(&mut self, event: i64) -> Result<()> {
            self.longs.push(event);
            Ok(())
        }
    }

    #[test]
    fn dispatches_by_active_alternative() {
        let mut c = Collector::default();
        Item::from(1i32).dispatch_owned(&mut c).unwrap();
        Item::from(2i64).dispatch_owned(&mut c).unwrap();
        assert_eq!(c.ints, vec![1]);
        assert_eq!(c.longs, vec![2]);
        assert_eq!(Item::A(1), Item::A(1));
        assert_ne!(Item::A(1), Item::B(1));
    }

    #[test]
    fn single_member_collapses_to_bare_type() {
        let solo: Solo = 7i32;
        assert_eq!(solo, 7i32);
    }
}
