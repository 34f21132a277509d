//! Confidential record model.
//!
//! A `ConfidentialRecord` is a read-only projection of ledger state. It is
//! rebuilt from scratch on every refresh and never edited field by field.

use super::identifiers::{ActorId, EncryptedHandle, RecordId};
use crate::effects::ledger::RecordFields;
use crate::errors::LifecycleError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display lifecycle of a record. Orthogonal to disclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Record is live (initial state)
    #[default]
    Active,
    /// Record is temporarily suspended
    Paused,
    /// Record is closed; terminal
    Completed,
}

impl LifecycleStatus {
    /// Whether an explicit transition from `self` to `target` is allowed.
    ///
    /// Same-state requests are accepted (and treated as no-ops by callers).
    pub fn can_transition_to(self, target: LifecycleStatus) -> bool {
        use LifecycleStatus::*;
        match (self, target) {
            (a, b) if a == b => true,
            (Active, Paused) | (Paused, Active) => true,
            (Active, Completed) | (Paused, Completed) => true,
            _ => false,
        }
    }

    /// Whether no further transition can leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Short label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for LifecycleStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            other => Err(LifecycleError::validation(format!(
                "unknown lifecycle status '{other}'"
            ))),
        }
    }
}

/// Disclosure state of the encrypted value.
///
/// `Verified` is terminal: the ledger has accepted a decryption proof and the
/// clear value is public from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Disclosure {
    /// Only the ciphertext exists; no proof accepted yet
    #[default]
    Sealed,
    /// A decryption proof was accepted on the ledger
    Verified {
        /// The proven clear value
        value: u64,
    },
}

impl Disclosure {
    /// Whether a proof has been accepted.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// The disclosed value, if verified.
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Verified { value } => Some(*value),
            Self::Sealed => None,
        }
    }
}

/// A ledger-stored entity with public and encrypted fields.
///
/// The disclosed value is only reachable through [`Disclosure`], so a record
/// holds a clear value exactly when it is verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentialRecord {
    /// Stable identifier
    pub id: RecordId,
    /// Free-text owner label (not confidential)
    pub owner_display_name: String,
    /// Plaintext rate, always visible
    pub public_rate: u64,
    /// Plaintext hours, always visible
    pub public_hours: u64,
    /// Free-text description
    pub description: String,
    /// Reference to the stored ciphertext
    pub encrypted_handle: EncryptedHandle,
    /// Submitting actor
    pub creator: ActorId,
    /// Creation time (ms since epoch), immutable
    pub created_at_ms: u64,
    /// Display lifecycle
    pub lifecycle_status: LifecycleStatus,
    disclosure: Disclosure,
}

impl ConfidentialRecord {
    /// Project ledger fields into a record.
    ///
    /// The ledger reports a raw `decrypted_value` slot even for unverified
    /// records (typically zero); it is only trusted when `is_verified` is set.
    pub fn from_ledger(id: RecordId, fields: RecordFields, handle: EncryptedHandle) -> Self {
        let disclosure = if fields.is_verified {
            Disclosure::Verified {
                value: fields.decrypted_value,
            }
        } else {
            Disclosure::Sealed
        };

        Self {
            id,
            owner_display_name: fields.owner_display_name,
            public_rate: fields.public_rate,
            public_hours: fields.public_hours,
            description: fields.description,
            encrypted_handle: handle,
            creator: fields.creator,
            created_at_ms: fields.created_at_ms,
            lifecycle_status: fields.lifecycle_status,
            disclosure,
        }
    }

    /// Whether the ledger has accepted a decryption proof for this record.
    pub fn verified(&self) -> bool {
        self.disclosure.is_verified()
    }

    /// The disclosed clear value; `Some` exactly when `verified()`.
    pub fn decrypted_value(&self) -> Option<u64> {
        self.disclosure.value()
    }

    /// Disclosure state.
    pub fn disclosure(&self) -> Disclosure {
        self.disclosure
    }
}

/// Kind of user-triggered lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Record creation
    Create,
    /// Decryption and on-ledger verification
    Decrypt,
    /// Lifecycle status transition
    Transition,
    /// Full snapshot refresh
    Refresh,
    /// Contract availability probe
    Availability,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Decrypt => "decrypt",
            Self::Transition => "transition",
            Self::Refresh => "refresh",
            Self::Availability => "availability",
        };
        f.write_str(label)
    }
}

/// User input for record creation, as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecordInput {
    /// Owner label; must not be blank
    pub owner_display_name: String,
    /// Confidential rate; must be non-negative
    pub rate: i64,
    /// Public hours; must be non-negative
    pub hours: i64,
    /// Free-text description
    #[serde(default)]
    pub description: String,
}

impl CreateRecordInput {
    /// Create an input.
    pub fn new(
        owner_display_name: impl Into<String>,
        rate: i64,
        hours: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            owner_display_name: owner_display_name.into(),
            rate,
            hours,
            description: description.into(),
        }
    }

    /// Check the input constraints without touching any collaborator.
    pub fn validate(&self) -> Result<ValidatedCreate, LifecycleError> {
        let owner_display_name = self.owner_display_name.trim();
        if owner_display_name.is_empty() {
            return Err(LifecycleError::validation("owner name must not be empty"));
        }
        let rate = u64::try_from(self.rate)
            .map_err(|_| LifecycleError::validation(format!("rate must be >= 0, got {}", self.rate)))?;
        let hours = u64::try_from(self.hours).map_err(|_| {
            LifecycleError::validation(format!("hours must be >= 0, got {}", self.hours))
        })?;

        Ok(ValidatedCreate {
            owner_display_name: owner_display_name.to_string(),
            rate,
            hours,
            description: self.description.clone(),
        })
    }
}

/// Creation input that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCreate {
    /// Trimmed, non-empty owner label
    pub owner_display_name: String,
    /// Non-negative rate
    pub rate: u64,
    /// Non-negative hours
    pub hours: u64,
    /// Free-text description
    pub description: String,
}
