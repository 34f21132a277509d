//! # Payveil Core - Layer 1: Confidential Record Foundation
//!
//! Shared vocabulary for the confidential value lifecycle:
//! - Record identifiers, actors, ciphertext handles
//! - The ledger-derived `ConfidentialRecord` and its disclosure state
//! - Effect traits for the external collaborators (encryption gateway,
//!   ledger client, decryption verifier)
//! - The lifecycle error taxonomy and runtime configuration
//!
//! ## Design Principles
//!
//! - **Ledger is authoritative**: local records are only ever built from
//!   ledger reads; nothing here mutates a record in place.
//! - **Opaque collaborators**: ciphertext construction, proof generation and
//!   transaction signing stay behind the effect traits.
//! - **Disclosure by construction**: a clear value can only exist on a record
//!   whose disclosure has been verified.

pub mod config;
pub mod effects;
pub mod errors;
pub mod types;

pub use config::LifecycleConfig;
pub use errors::{ErrorCategory, LifecycleError};
pub use types::{
    ActorId, ConfidentialRecord, ContractContext, CreateRecordInput, Disclosure, EncryptedHandle,
    LifecycleStatus, OperationKind, RecordId, ValidatedCreate,
};
