//! Type-erased processor wrapper (spec §4.7, grounded on
//! `processor_traits.hpp`'s `is_processor_v` plus the original's
//! `handle(E const&)`/`handle(E&&)` virtual-dispatch idiom).
//!
//! Rust has no variadic generics to directly translate the original's
//! type-list template parameter, so [`type_erased_processor`] is a macro:
//! given a wrapper name and a fixed list of event types, it generates a
//! sealed object-safe trait bundling [`crate::processor::Flush`],
//! [`crate::processor::Introspect`] and one [`crate::processor::HandleEvent`]
//! bound per listed type, a `Box<dyn Trait>` wrapper implementing the same
//! bounds by forwarding, and an `assign` method accepting any concrete
//! processor matching the bundle — the "supports assignment from any
//! concrete processor" requirement.
#[macro_export]
macro_rules! type_erased_processor {
    ($vis:vis $name:ident, $trait_name:ident, [$($event:ty),+ $(,)?]) => {
        $vis trait $trait_name:
            $crate::processor::Flush
            + $crate::processor::Introspect
            $(+ $crate::processor::HandleEvent<$event>)+
        {
        }

        impl<T> $trait_name for T
        where
            T: $crate::processor::Flush
                + $crate::processor::Introspect
                $(+ $crate::processor::HandleEvent<$event>)+,
        {
        }

        /// Polymorphic wrapper over any processor implementing the event
        /// set fixed at this macro invocation.
        $vis struct $name {
            inner: Box<dyn $trait_name>,
        }

        impl $name {
            /// Erase `processor`'s concrete type.
            $vis fn new<P: $trait_name + 'static>(processor: P) -> Self {
                $name {
                    inner: Box::new(processor),
                }
            }

            /// Replace the wrapped processor with a different concrete
            /// type implementing the same event set.
            $vis fn assign<P: $trait_name + 'static>(&mut self, processor: P) {
                self.inner = Box::new(processor);
            }
        }

        impl $crate::processor::Flush for $name {
            fn flush(&mut self) -> $crate::error::Result<()> {
                self.inner.flush()
            }
        }

        impl $crate::processor::Introspect for $name {
            fn introspect_node(&self) -> $crate::processor::NodeInfo {
                self.inner.introspect_node()
            }
            fn introspect_graph(&self) -> $crate::processor::Graph {
                self.inner.introspect_graph()
            }
        }

        $(
            impl $crate::processor::HandleEvent<$event> for $name {
                fn handle_ref(&mut self, event: &$event) -> $crate::error::Result<()> {
                    $crate::processor::HandleEvent::<$event>::handle_ref(&mut *self.inner, event)
                }
                fn handle_owned(&mut self, event: $event) -> $crate::error::Result<()> {
                    $crate::processor::HandleEvent::<$event>::handle_owned(&mut *self.inner, event)
                }
            }
        )+
    };
}
