//! Identifier newtypes.
//!
//! All identifiers are opaque strings as far as the lifecycle is concerned.
//! Only `RecordId::generate` and `EncryptedHandle::from_bytes` impose a
//! format, and readers never parse it back.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a confidential record.
///
/// Assigned by the creator before submission. Generated ids carry 128 bits
/// of randomness so concurrent creators cannot collide; ids read back from
/// the ledger are taken verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an id read from the ledger.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, collision-resistant id: `<prefix>-<uuid v4>`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4().simple()))
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of the actor submitting ledger calls (an account address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Wrap an actor address.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// An actor is authenticated when the session produced a non-blank address.
    pub fn is_authenticated(&self) -> bool {
        !self.0.trim().is_empty()
    }

    /// Borrow the raw address.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for display: `0x1234…abcd`.
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 10 {
            return self.0.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Context (contract address) under which values are encrypted and
/// decryption proofs are produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractContext(String);

impl ContractContext {
    /// Wrap a context string.
    pub fn new(context: impl Into<String>) -> Self {
        Self(context.into())
    }

    /// Borrow the raw context.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a ciphertext held by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedHandle(String);

impl EncryptedHandle {
    /// Wrap a handle read from the ledger.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Build the canonical `0x`-prefixed hex form of a 32-byte handle.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Borrow the raw handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = RecordId::generate("rate");
        let b = RecordId::generate("rate");

        assert!(a.as_str().starts_with("rate-"));
        assert_eq!(a.as_str().len(), "rate-".len() + 32);
        assert_ne!(a, b);
    }

    #[test]
    fn blank_actor_is_not_authenticated() {
        assert!(!ActorId::new("").is_authenticated());
        assert!(!ActorId::new("   ").is_authenticated());
        assert!(ActorId::new("0xabc").is_authenticated());
    }

    #[test]
    fn actor_short_form() {
        let actor = ActorId::new("0x1234567890abcdef1234567890abcdef12345678");
        assert_eq!(actor.short(), "0x1234…5678");
        assert_eq!(ActorId::new("0xabc").short(), "0xabc");
    }

    #[test]
    fn handle_from_bytes_is_hex() {
        let handle = EncryptedHandle::from_bytes([0xab; 32]);
        assert_eq!(handle.as_str().len(), 66);
        assert!(handle.as_str().starts_with("0xabab"));
    }
}
