//! # tcspc-core
//!
//! Composable, statically-typed streaming pipelines for time-correlated
//! single-photon counting (TCSPC) event processing.
//!
//! A pipeline is built by nesting processors, innermost (closest to the
//! data source) first: each processor implements
//! [`processor::HandleEvent<E>`] for the event types it accepts and
//! forwards whatever it produces to the `downstream` it was constructed
//! with. Feeding a pipeline is just calling `handle_owned`/`handle_ref` on
//! its outermost processor; `flush()` propagates to every downstream in
//! turn, exactly once.
//!
//! ## Modules
//!
//! - [`types`] — the [`types::DataTypes`] bundle of integer widths a
//!   pipeline is instantiated over.
//! - [`events`] — the shared event vocabulary, generic over a
//!   [`types::DataTypes`] set.
//! - [`error`] — [`error::Error`]/[`error::ErrorKind`] used throughout.
//! - [`bucket`] — pooled, pluggable-storage containers for bulk payloads.
//! - [`processor`] — the [`processor::HandleEvent`]/[`processor::Flush`]/
//!   [`processor::Introspect`] contract and the small leaf processors built
//!   directly on it.
//! - [`batch`] — accumulate elements into buckets and the inverse.
//! - [`cluster_batch`] — the encoding-aware analogue of [`batch`] for
//!   clustered bin increments.
//! - [`binning`] — bin mappers and the processors built on them.
//! - [`histogram`] — the histogramming engine.
//! - [`copy`] — integrate a push-style device API as a buffered source.
//! - [`acquire`] — integrate a pull-style device API as a source.
//! - [`context`] — out-of-band access to processor state after it has been
//!   moved into a pipeline.
//! - [`type_erased`] — type-erased processor wrapper for graphs whose shape
//!   is chosen at runtime.
//! - [`variant`] — tagged-union event types for multi-event-type pipeline
//!   edges.
//! - [`timing`] — synthetic trigger-event generators.
//! - [`buffer`] — decouple producer and consumer loop bodies, optionally
//!   across a thread boundary.
//! - [`decode`] — device-format record decoders.
//! - [`io`] — the output-stream abstraction and binary-stream sink.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use tcspc_core::decode::bh_spc::{decode_bh_spc, BhSpcEvent};
//! use tcspc_core::error::Result;
//! use tcspc_core::events::{DataLost, Marker, TimeCorrelatedDetection, TimeReached};
//! use tcspc_core::processor::{Flush, HandleEvent};
//! use tcspc_core::types::DefaultDataTypes;
//!
//! #[derive(Clone, Default)]
//! struct Collector(Arc<Mutex<Vec<(i64, i32, i32)>>>);
//! impl Flush for Collector {
//!     fn flush(&mut self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! impl HandleEvent<TimeReached<DefaultDataTypes>> for Collector {
//!     fn handle_ref(&mut self, e: &TimeReached<DefaultDataTypes>) -> Result<()> {
//!         self.handle_owned(*e)
//!     }
//!     fn handle_owned(&mut self, _: TimeReached<DefaultDataTypes>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! impl HandleEvent<TimeCorrelatedDetection<DefaultDataTypes>> for Collector {
//!     fn handle_ref(&mut self, e: &TimeCorrelatedDetection<DefaultDataTypes>) -> Result<()> {
//!         self.handle_owned(*e)
//!     }
//!     fn handle_owned(&mut self, e: TimeCorrelatedDetection<DefaultDataTypes>) -> Result<()> {
//!         self.0.lock().unwrap().push((e.abstime, e.channel, e.difftime));
//!         Ok(())
//!     }
//! }
//! impl HandleEvent<Marker<DefaultDataTypes>> for Collector {
//!     fn handle_ref(&mut self, e: &Marker<DefaultDataTypes>) -> Result<()> {
//!         self.handle_owned(*e)
//!     }
//!     fn handle_owned(&mut self, _: Marker<DefaultDataTypes>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! impl HandleEvent<DataLost<DefaultDataTypes>> for Collector {
//!     fn handle_ref(&mut self, e: &DataLost<DefaultDataTypes>) -> Result<()> {
//!         self.handle_owned(*e)
//!     }
//!     fn handle_owned(&mut self, _: DataLost<DefaultDataTypes>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let collected = Collector::default();
//! let mut pipeline = decode_bh_spc::<DefaultDataTypes, _>(collected.clone());
//! pipeline.handle_owned(BhSpcEvent::make_photon(42, 123, 5, false))?;
//! pipeline.flush()?;
//! assert_eq!(*collected.0.lock().unwrap(), vec![(42, 5, 123)]);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod acquire;
pub mod batch;
pub mod binning;
pub mod bucket;
pub mod buffer;
pub mod cluster_batch;
pub mod context;
pub mod copy;
pub mod decode;
pub mod error;
pub mod events;
pub mod histogram;
pub mod io;
pub mod processor;
pub mod timing;
pub mod type_erased;
pub mod types;
pub mod variant;
