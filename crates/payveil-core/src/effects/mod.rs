//! Effect traits for the external collaborators.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: supplied by the embedding application (wallet-bound
//!   ledger client, homomorphic encryption SDK); `payveil-testkit` provides
//!   deterministic in-memory handlers
//! - **Usage**: `payveil-app` lifecycle controller
//!
//! Every method is a suspension point. Callers must not assume synchronous
//! completion and must tolerate being dropped mid-call.

pub mod decryption;
pub mod encryption;
pub mod ledger;

pub use decryption::{
    ClearValues, DecryptionBundle, DecryptionEffects, DecryptionError, ProofSubmitter,
};
pub use encryption::{EncryptedInput, EncryptionEffects, EncryptionError};
pub use ledger::{
    CreateRecordCall, FinalityOutcome, LedgerCall, LedgerEffects, LedgerError, RecordFields,
    RejectReason, TxHandle,
};
