//! Read-side views derived from the record store.

pub mod stats;

pub use stats::RecordStats;
