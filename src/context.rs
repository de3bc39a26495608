//! Out-of-band access to processor state after it has been moved into a
//! pipeline (spec §4.6, grounded on `context.hpp`).
//!
//! The original recovers a tracked object's address from its embedded
//! tracker via `offsetof` pointer arithmetic, because the object keeps
//! moving as it is wrapped by outer processors. In Rust, a processor that
//! wants to expose a live handle (e.g. [`crate::acquire::AcquireAccess`])
//! instead shares an `Arc` between itself and the handle at construction
//! time, before the processor is ever moved into a pipeline; the handle
//! then stays valid regardless of where the processor ends up. [`Context`]
//! is reduced accordingly to a name-keyed registry of such handles, with no
//! need to recover an address later.
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Registry mediating access to named objects within a processing graph.
///
/// Handles are registered once (typically by the constructor of the
/// processor being tracked) and retrieved later by name, from anywhere
/// holding a reference to the same `Context`.
#[derive(Default)]
pub struct Context {
    entries: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl Context {
    /// Create a fresh, empty context.
    pub fn create() -> Arc<Context> {
        Arc::new(Context::default())
    }

    /// Register `access` under `name`. Fails if `name` is already in use
    /// (spec: "name must be unique within a given context, and may not be
    /// reused even after the tracked object is gone").
    pub fn register<Access: Send + Sync + 'static>(&self, name: impl Into<String>, access: Access) -> Result<()> {
        let name = name.into();
        let mut entries = self.entries.lock();
        if entries.contains_key(&name) {
            return Err(Error::invalid_argument(format!(
                "cannot create tracker for existing name: {name}"
            )));
        }
        entries.insert(name, Box::new(access));
        Ok(())
    }

    /// Retrieve a clone of the access handle registered under `name`.
    pub fn access<Access: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<Access> {
        let entries = self.entries.lock();
        let boxed = entries
            .get(name)
            .ok_or_else(|| Error::invalid_argument(format!("no tracked object named: {name}")))?;
        boxed
            .downcast_ref::<Access>()
            .cloned()
            .ok_or_else(|| Error::bad_storage_cast("access type mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Handle(Arc<Mutex<i32>>);

    #[test]
    fn register_then_access_round_trips() {
        let ctx = Context::create();
        let handle = Handle(Arc::new(Mutex::new(0)));
        ctx.register("thing", handle.clone()).unwrap();
        *handle.0.lock() = 42;
        let retrieved: Handle = ctx.access("thing").unwrap();
        assert_eq!(*retrieved.0.lock(), 42);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let ctx = Context::create();
        ctx.register("thing", Handle(Arc::new(Mutex::new(0)))).unwrap();
        let err = ctx.register("thing", Handle(Arc::new(Mutex::new(0)))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let ctx = Context::create();
        let err = ctx.access::<Handle>("missing").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
