//! The histogramming engine (spec §4.5): [`single_histogram`] for a plain
//! bin-array, [`scan_histograms`] for a multi-element array accumulated
//! over repeated scans, and the overflow-policy vocabulary shared by both.

mod apply;
pub mod journal;
pub mod policy;
mod scan;
mod single;

pub use journal::ClusterJournal;
pub use policy::HistogramPolicy;
pub use scan::{scan_histograms, ScanHistograms};
pub use single::{single_histogram, SingleHistogram};
