//! The processor contract (spec §4.1) and the small leaf processors built
//! directly on top of it (§0.1): `prepend`, `append`, `time_delay`, `split`,
//! `discard_all`, `discard_any`.

mod leaves;

pub use leaves::{
    append, discard_all, discard_any, prepend, split, time_delay, Append, DiscardAll, DiscardAny,
    Prepend, Split, TimeDelay,
};

use crate::error::Result;

/// Every processor handles `flush()` exactly once, forwarding it to its
/// downstream(s) at the end of its own handler.
///
/// The null sink at the end of a chain rejects a second flush with an
/// [`crate::error::ErrorKind::Unexpected`] error (a double flush is a logic
/// bug, not a recoverable condition).
pub trait Flush {
    /// Flush this processor, then forward to downstream. Must be called
    /// exactly once.
    fn flush(&mut self) -> Result<()>;
}

/// A processor that accepts event type `E`.
///
/// Rust has no implicit reference/value-category overloading, so the C++
/// pair `handle(Event const&)` / `handle(Event&&)` becomes two differently
/// named methods. A processor that merely propagates `E` downstream
/// preserves value-category by forwarding each through the matching method
/// on `Downstream`; a processor that computes a new value from `E` builds it
/// and always forwards through `handle_owned` (spec §4.1, "value-category
/// forwarding").
pub trait HandleEvent<E> {
    /// Handle `event` received by shared reference, without taking
    /// ownership of it.
    fn handle_ref(&mut self, event: &E) -> Result<()>;

    /// Handle `event` received by value.
    fn handle_owned(&mut self, event: E) -> Result<()>;
}

/// Identity of one node in the processor graph, for logging and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    /// Human-readable type name, e.g. `"batch<BinIndex>"`.
    pub type_name: &'static str,
    /// Address of the processor instance, used only to distinguish nodes
    /// with the same type name in a printed graph.
    pub address: usize,
}

/// The downstream graph rooted at a processor, in upstream-to-downstream
/// order, as used by `introspect_graph()` (spec §4.1).
pub type Graph = Vec<NodeInfo>;

/// Minimal introspection: a node can describe itself and splice itself onto
/// the front of its downstream's graph.
pub trait Introspect {
    /// This node's own identity.
    fn introspect_node(&self) -> NodeInfo;

    /// This node's identity followed by its downstream graph.
    fn introspect_graph(&self) -> Graph;
}

/// Helper for leaf/pass-through processors: build a [`NodeInfo`] from a
/// `&self` reference, using its address as the distinguishing id.
pub fn node_info_of<T>(value: &T, type_name: &'static str) -> NodeInfo {
    NodeInfo {
        type_name,
        address: value as *const T as usize,
    }
}
