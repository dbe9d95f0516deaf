//! Training-data export
//!
//! Appends every relayed record to a CSV file for offline model fitting.
//! The exporter is an ordinary hub subscriber: same queue bound, same
//! eviction rule. When it stops, the relay carries on without it.

pub mod training;

pub use training::{csv_row, TrainingExporter, CSV_HEADER};
