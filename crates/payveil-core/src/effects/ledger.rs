//! Ledger client effect.
//!
//! Read, submit, and finality operations against the contract holding the
//! confidential records. Submission is irrevocable: once `submit` returns a
//! handle the transaction may confirm even if nobody awaits it.

use super::encryption::EncryptedInput;
use crate::types::{ActorId, EncryptedHandle, LifecycleStatus, RecordId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Raw record fields as returned by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    /// Owner label
    pub owner_display_name: String,
    /// Plaintext rate
    pub public_rate: u64,
    /// Plaintext hours
    pub public_hours: u64,
    /// Description
    pub description: String,
    /// Submitting actor
    pub creator: ActorId,
    /// Creation time (ms since epoch)
    pub created_at_ms: u64,
    /// Whether a decryption proof has been accepted
    pub is_verified: bool,
    /// Clear value slot; meaningful only when `is_verified`
    pub decrypted_value: u64,
    /// Persisted display lifecycle
    pub lifecycle_status: LifecycleStatus,
}

/// Handle of a submitted, not yet final, transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(String);

impl TxHandle {
    /// Wrap a transaction hash.
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Borrow the raw hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arguments of the record-creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecordCall {
    /// Caller-assigned id
    pub record_id: RecordId,
    /// Owner label
    pub owner_display_name: String,
    /// Encrypted rate plus input proof
    pub encrypted_rate: EncryptedInput,
    /// Plaintext rate
    pub public_rate: u64,
    /// Plaintext hours
    pub public_hours: u64,
    /// Description
    pub description: String,
}

/// State-changing contract calls issued by the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum LedgerCall {
    /// Create a record in one atomic transaction
    CreateRecord(CreateRecordCall),
    /// Submit a decryption proof for a record
    VerifyDecryption {
        /// Target record
        record_id: RecordId,
        /// Encoded clear-value bundle produced by the verifier
        clear_values: Vec<u8>,
        /// Decryption proof
        proof: Vec<u8>,
    },
    /// Change the persisted display lifecycle
    SetLifecycleStatus {
        /// Target record
        record_id: RecordId,
        /// Requested status
        status: LifecycleStatus,
    },
}

impl LedgerCall {
    /// Contract method name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRecord(_) => "createRecord",
            Self::VerifyDecryption { .. } => "verifyDecryption",
            Self::SetLifecycleStatus { .. } => "setLifecycleStatus",
        }
    }

    /// Record targeted by the call.
    pub fn record_id(&self) -> &RecordId {
        match self {
            Self::CreateRecord(call) => &call.record_id,
            Self::VerifyDecryption { record_id, .. } | Self::SetLifecycleStatus { record_id, .. } => {
                record_id
            }
        }
    }
}

/// Why the network or the actor refused a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    /// The actor declined to sign
    UserCancelled,
    /// The record was verified by someone else first
    AlreadyVerified,
    /// Any other revert
    Reverted(String),
}

impl RejectReason {
    /// Classify a raw revert or wallet message.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("user rejected") || lower.contains("user denied") {
            Self::UserCancelled
        } else if lower.contains("already verified") {
            Self::AlreadyVerified
        } else {
            Self::Reverted(message.to_string())
        }
    }

    /// Re-classify a generic revert whose message names a known condition.
    pub fn normalize(self) -> Self {
        match self {
            Self::Reverted(message) => Self::from_message(&message),
            other => other,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserCancelled => write!(f, "rejected by user"),
            Self::AlreadyVerified => write!(f, "data already verified"),
            Self::Reverted(message) => write!(f, "{message}"),
        }
    }
}

/// Result of waiting for a transaction to become irreversible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalityOutcome {
    /// Transaction is final
    Finalized,
    /// Transaction was refused
    Rejected(RejectReason),
    /// The wait hit its bound; the transaction may still confirm
    TimedOut,
}

/// Ledger client errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The network or the actor refused a submission
    #[error("Transaction rejected: {0}")]
    Rejected(RejectReason),
    /// No record with this id exists on the ledger
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),
    /// The contract could not be reached
    #[error("Ledger unavailable: {reason}")]
    Unavailable {
        /// Reason the ledger is unavailable
        reason: String,
    },
    /// Any other transport or decoding failure
    #[error("Ledger transport error: {reason}")]
    Transport {
        /// Reason for the failure
        reason: String,
    },
}

/// Read, submit and finality operations on the record contract.
#[async_trait]
pub trait LedgerEffects: Send + Sync {
    /// Enumerate all record ids in ledger order.
    async fn read_all_ids(&self) -> Result<Vec<RecordId>, LedgerError>;

    /// Read the public fields of one record.
    async fn read_record(&self, id: &RecordId) -> Result<RecordFields, LedgerError>;

    /// Read the ciphertext handle of one record.
    async fn read_encrypted_handle(&self, id: &RecordId) -> Result<EncryptedHandle, LedgerError>;

    /// Sign and broadcast a call. Returns once the transaction is pending.
    async fn submit(&self, call: LedgerCall) -> Result<TxHandle, LedgerError>;

    /// Wait at most `timeout` for `tx` to become final.
    async fn await_finality(
        &self,
        tx: &TxHandle,
        timeout: Duration,
    ) -> Result<FinalityOutcome, LedgerError>;

    /// Probe whether the contract answers.
    async fn is_available(&self) -> Result<bool, LedgerError>;
}
