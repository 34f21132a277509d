//! # Payveil App
//!
//! Orchestration layer of the confidential value lifecycle: the
//! [`LifecycleController`] drives create, decrypt and refresh against the
//! effect traits in `payveil-core`, keeps the [`RecordStore`] in sync with
//! the ledger, and publishes progress on the [`OperationStatusReporter`].
//!
//! A session owns one controller; presentation code reads the store and
//! subscribes to the status channel but never mutates either.

pub mod controller;
pub mod status;
pub mod store;
pub mod views;

pub use controller::LifecycleController;
pub use status::{OperationStatus, OperationStatusReporter, StatusSnapshot, StatusTicket};
pub use store::{LedgerSnapshot, ReadStamp, RecordStore, ReplaceOutcome, StoreView};
pub use views::RecordStats;
