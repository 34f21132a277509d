//! Lifecycle error taxonomy
//!
//! One error type for every controller operation. Variants map one-to-one
//! to the failure classes the status channel distinguishes; `Display` is the
//! human-readable text shown to the user.

use crate::effects::{DecryptionError, EncryptionError, LedgerError, RejectReason, TxHandle};
use crate::types::{LifecycleStatus, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// High-level error categories for frontend handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad input, never reached a collaborator
    Input,
    /// Encryption or decryption-proof failure
    Crypto,
    /// Ledger refused or could not serve the request
    Ledger,
    /// A finality wait hit its bound
    Timeout,
    /// Local state disagrees with a fresh ledger read
    Consistency,
}

impl ErrorCategory {
    /// Whether the user can fix this by changing their input.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::Input)
    }

    /// Whether retrying later may succeed without any change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Ledger | Self::Timeout | Self::Consistency)
    }

    /// Short label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Crypto => "Crypto",
            Self::Ledger => "Ledger",
            Self::Timeout => "Timeout",
            Self::Consistency => "Consistency",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn rejection_message(reason: &RejectReason) -> String {
    match reason {
        RejectReason::UserCancelled => "Transaction rejected by user".to_string(),
        other => format!("Submission failed: {other}"),
    }
}

/// Errors surfaced by lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum LifecycleError {
    /// Input rejected before any collaborator call
    #[error("Invalid input: {message}")]
    Validation {
        /// What was wrong
        message: String,
    },

    /// The encryption gateway failed; nothing was submitted
    #[error("Encryption failed: {reason}")]
    EncryptionFailed {
        /// Gateway failure reason
        reason: String,
    },

    /// The network or the actor refused the transaction
    #[error("{}", rejection_message(.reason))]
    SubmissionRejected {
        /// Classified rejection reason
        reason: RejectReason,
    },

    /// The finality wait timed out; the transaction may still confirm
    #[error("Transaction {tx} not final after {timeout_ms}ms; it may still confirm")]
    FinalityTimeout {
        /// Pending transaction
        tx: TxHandle,
        /// Bound that was hit
        timeout_ms: u64,
    },

    /// Off-ledger decryption or proof generation failed
    #[error("Decryption failed: {reason}")]
    VerificationFailed {
        /// Verifier failure reason
        reason: String,
    },

    /// Another actor verified the record first (a success alias)
    #[error("Record {record_id} is already verified")]
    AlreadyVerified {
        /// Record that was already verified
        record_id: RecordId,
    },

    /// Cached state diverged from a fresh ledger read
    #[error("Ledger state for {record_id} diverged from local cache: {detail}")]
    ConsistencyFault {
        /// Affected record
        record_id: RecordId,
        /// What diverged
        detail: String,
    },

    /// The record is not in the local store
    #[error("Unknown record {record_id}")]
    UnknownRecord {
        /// Requested id
        record_id: RecordId,
    },

    /// The lifecycle status transition is not allowed
    #[error("Cannot move {record_id} from {from} to {to}")]
    InvalidTransition {
        /// Target record
        record_id: RecordId,
        /// Current status
        from: LifecycleStatus,
        /// Requested status
        to: LifecycleStatus,
    },

    /// A read path failed as a whole
    #[error("Failed to load data: {reason}")]
    LedgerUnavailable {
        /// Ledger failure reason
        reason: String,
    },
}

impl LifecycleError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a consistency fault
    pub fn consistency(record_id: RecordId, detail: impl Into<String>) -> Self {
        Self::ConsistencyFault {
            record_id,
            detail: detail.into(),
        }
    }

    /// Create a verification failure
    pub fn verification(reason: impl Into<String>) -> Self {
        Self::VerificationFailed {
            reason: reason.into(),
        }
    }

    /// Map a ledger submission failure for `record_id`.
    ///
    /// Generic reverts are re-classified so that an "already verified"
    /// revert is recognised regardless of how the client reported it.
    pub fn from_submission(err: LedgerError, record_id: &RecordId) -> Self {
        match err {
            LedgerError::Rejected(reason) => Self::from_rejection(reason, record_id),
            other => Self::LedgerUnavailable {
                reason: other.to_string(),
            },
        }
    }

    /// Map a rejection reason for `record_id`.
    pub fn from_rejection(reason: RejectReason, record_id: &RecordId) -> Self {
        match reason.normalize() {
            RejectReason::AlreadyVerified => Self::AlreadyVerified {
                record_id: record_id.clone(),
            },
            reason => Self::SubmissionRejected { reason },
        }
    }

    /// Error category for UI routing.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } | Self::UnknownRecord { .. } | Self::InvalidTransition { .. } => {
                ErrorCategory::Input
            }
            Self::EncryptionFailed { .. } | Self::VerificationFailed { .. } => ErrorCategory::Crypto,
            Self::SubmissionRejected { .. }
            | Self::AlreadyVerified { .. }
            | Self::LedgerUnavailable { .. } => ErrorCategory::Ledger,
            Self::FinalityTimeout { .. } => ErrorCategory::Timeout,
            Self::ConsistencyFault { .. } => ErrorCategory::Consistency,
        }
    }

    /// Whether the error is reported as a success.
    #[must_use]
    pub fn is_success_alias(&self) -> bool {
        matches!(self, Self::AlreadyVerified { .. })
    }

    /// Whether the actor explicitly declined to sign.
    #[must_use]
    pub fn is_user_cancellation(&self) -> bool {
        matches!(
            self,
            Self::SubmissionRejected {
                reason: RejectReason::UserCancelled
            }
        )
    }

    /// Human-readable text for the status channel.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

impl From<EncryptionError> for LifecycleError {
    fn from(err: EncryptionError) -> Self {
        let reason = match err {
            EncryptionError::NotInitialized => "encryption engine not initialized".to_string(),
            EncryptionError::Failed { reason } => reason,
        };
        Self::EncryptionFailed { reason }
    }
}

impl From<LedgerError> for LifecycleError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(reason) => Self::SubmissionRejected {
                reason: reason.normalize(),
            },
            other => Self::LedgerUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

impl LifecycleError {
    /// Map a verifier failure for `record_id`.
    pub fn from_decryption(err: DecryptionError, record_id: &RecordId) -> Self {
        match err {
            DecryptionError::VerificationFailed { reason } => Self::VerificationFailed { reason },
            DecryptionError::Submission(err) => Self::from_submission(err, record_id),
        }
    }
}
