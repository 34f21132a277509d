//! Mock encryption gateway.
//!
//! Ciphertexts are a tagged, reversible encoding of the plaintext so that
//! [`MockVerifier`](crate::MockVerifier) can recover the value from whatever
//! the ledger stored. Nothing here is confidential.

use async_trait::async_trait;
use parking_lot::Mutex;
use payveil_core::effects::{EncryptedInput, EncryptionEffects, EncryptionError};
use payveil_core::{ActorId, ContractContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CIPHERTEXT_TAG: &[u8; 4] = b"PVE1";

/// Encode `plaintext` the way [`MockEncryption`] does.
pub fn encode_ciphertext(plaintext: u64) -> Vec<u8> {
    let mut payload = CIPHERTEXT_TAG.to_vec();
    payload.extend_from_slice(&plaintext.to_be_bytes());
    payload
}

/// Recover the plaintext from a [`MockEncryption`] payload.
pub fn decode_ciphertext(payload: &[u8]) -> Option<u64> {
    let body = payload.strip_prefix(CIPHERTEXT_TAG.as_slice())?;
    let bytes: [u8; 8] = body.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

#[derive(Debug, Default)]
struct EncryptionState {
    initialized: bool,
    fail_next: Option<EncryptionError>,
}

/// Deterministic encryption gateway with failure scripting.
#[derive(Debug, Clone)]
pub struct MockEncryption {
    state: Arc<Mutex<EncryptionState>>,
    calls: Arc<AtomicUsize>,
}

impl MockEncryption {
    /// An initialized gateway.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EncryptionState {
                initialized: true,
                fail_next: None,
            })),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A gateway whose engine never finished loading.
    pub fn uninitialized() -> Self {
        let gateway = Self::new();
        gateway.state.lock().initialized = false;
        gateway
    }

    /// Fail the next call with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(EncryptionError::Failed {
            reason: reason.into(),
        });
    }

    /// Number of `encrypt` calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockEncryption {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncryptionEffects for MockEncryption {
    async fn encrypt(
        &self,
        context: &ContractContext,
        actor: &ActorId,
        plaintext: u64,
    ) -> Result<EncryptedInput, EncryptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            if !state.initialized {
                return Err(EncryptionError::NotInitialized);
            }
            if let Some(err) = state.fail_next.take() {
                return Err(err);
            }
        }

        let proof = format!("{context}:{actor}").into_bytes();
        Ok(EncryptedInput {
            payload: encode_ciphertext(plaintext),
            proof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn payload_decodes_to_plaintext() {
        let gateway = MockEncryption::new();
        let input = gateway
            .encrypt(&ContractContext::new("ctx"), &ActorId::new("0xabc"), 75_000)
            .await
            .unwrap();
        assert_eq!(decode_ciphertext(&input.payload), Some(75_000));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed() {
        let gateway = MockEncryption::new();
        gateway.fail_next("engine offline");
        let context = ContractContext::new("ctx");
        let actor = ActorId::new("0xabc");

        assert_matches!(
            gateway.encrypt(&context, &actor, 1).await,
            Err(EncryptionError::Failed { .. })
        );
        assert!(gateway.encrypt(&context, &actor, 1).await.is_ok());
    }

    #[test]
    fn foreign_payload_does_not_decode() {
        assert_eq!(decode_ciphertext(b"nope"), None);
        assert_eq!(decode_ciphertext(b"PVE1\x00"), None);
    }
}
