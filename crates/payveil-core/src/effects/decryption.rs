//! Decryption verifier effect.
//!
//! The verifier obtains clear values for a set of handles off-ledger and
//! hands the encoded bundle plus proof to a caller-supplied
//! [`ProofSubmitter`], which posts them to the ledger.

use super::ledger::{LedgerError, TxHandle};
use crate::types::{ContractContext, EncryptedHandle};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Clear values keyed by the handle they were decrypted from.
pub type ClearValues = BTreeMap<EncryptedHandle, u64>;

/// Decryption result handed to the submit callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionBundle {
    /// Decoded clear values
    pub clear_values: ClearValues,
    /// Encoded clear values exactly as the contract expects them
    pub encoded_clear_values: Vec<u8>,
    /// Proof that the clear values match the stored ciphertexts
    pub proof: Vec<u8>,
}

/// Callback that posts a decryption proof to the ledger.
#[async_trait]
pub trait ProofSubmitter: Send + Sync {
    /// Submit `bundle` and return the pending transaction.
    async fn submit_proof(&self, bundle: &DecryptionBundle) -> Result<TxHandle, LedgerError>;
}

/// Decryption verifier errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptionError {
    /// Off-ledger decryption or proof generation failed
    #[error("Verification failed: {reason}")]
    VerificationFailed {
        /// Reason for the failure
        reason: String,
    },
    /// The submit callback failed
    #[error("Proof submission failed: {0}")]
    Submission(#[from] LedgerError),
}

/// Produces clear values and a proof for ledger-held ciphertexts.
#[async_trait]
pub trait DecryptionEffects: Send + Sync {
    /// Decrypt `handles` under `context`, then call `submitter` exactly once
    /// with the resulting bundle.
    async fn verify(
        &self,
        handles: &[EncryptedHandle],
        context: &ContractContext,
        submitter: &dyn ProofSubmitter,
    ) -> Result<ClearValues, DecryptionError>;
}
