//! Encryption gateway effect.

use crate::types::{ActorId, ContractContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Ciphertext plus input proof, ready to be carried by a ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    /// Encrypted payload
    pub payload: Vec<u8>,
    /// Proof binding the payload to (context, actor)
    pub proof: Vec<u8>,
}

/// Encryption gateway errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionError {
    /// The encryption engine has not finished initializing
    #[error("Encryption engine not initialized")]
    NotInitialized,
    /// Ciphertext or proof construction failed
    #[error("Encryption failed: {reason}")]
    Failed {
        /// Reason for the failure
        reason: String,
    },
}

/// Turns a plaintext integer into an (encrypted payload, proof) pair bound to
/// a contract context and the submitting actor.
#[async_trait]
pub trait EncryptionEffects: Send + Sync {
    /// Encrypt `plaintext` for submission by `actor` under `context`.
    async fn encrypt(
        &self,
        context: &ContractContext,
        actor: &ActorId,
        plaintext: u64,
    ) -> Result<EncryptedInput, EncryptionError>;
}
