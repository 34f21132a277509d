//! # Payveil Testkit
//!
//! Deterministic in-memory collaborators for the confidential value
//! lifecycle: a record contract ([`InMemoryLedger`]), an encryption gateway
//! ([`MockEncryption`]) and a decryption verifier ([`MockVerifier`]).
//!
//! Every mock counts its calls and exposes scripting hooks so tests can
//! assert which external interactions did or did not happen.

pub mod encryption;
pub mod ledger;
pub mod verifier;

pub use encryption::{decode_ciphertext, encode_ciphertext, MockEncryption};
pub use ledger::{InMemoryLedger, ScriptedFinality};
pub use verifier::MockVerifier;

use payveil_core::ActorId;

/// Address used as the default authenticated actor in tests.
pub const TEST_ACTOR: &str = "0x00000000000000000000000000000000000a11ce";

/// The three collaborators wired to one ledger.
#[derive(Debug, Clone)]
pub struct MockCollaborators {
    /// Shared ledger
    pub ledger: InMemoryLedger,
    /// Encryption gateway
    pub encryption: MockEncryption,
    /// Verifier reading from `ledger`
    pub verifier: MockVerifier,
}

impl MockCollaborators {
    /// Fresh collaborators signing as [`TEST_ACTOR`].
    pub fn new() -> Self {
        let ledger = InMemoryLedger::connected_as(test_actor());
        let verifier = MockVerifier::new(ledger.clone());
        Self {
            ledger,
            encryption: MockEncryption::new(),
            verifier,
        }
    }

    /// Collaborators for a second actor on the same ledger.
    pub fn for_actor(&self, actor: ActorId) -> Self {
        let ledger = self.ledger.as_actor(actor);
        let verifier = MockVerifier::new(ledger.clone());
        Self {
            ledger,
            encryption: MockEncryption::new(),
            verifier,
        }
    }
}

impl Default for MockCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

/// The default authenticated actor.
pub fn test_actor() -> ActorId {
    ActorId::new(TEST_ACTOR)
}
