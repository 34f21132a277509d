//! Mock decryption verifier.
//!
//! Decrypts by looking the ciphertext up on the [`InMemoryLedger`] and
//! decoding it, then hands a bundle to the caller's submitter like a relayer
//! would.

use crate::encryption::decode_ciphertext;
use crate::ledger::InMemoryLedger;
use async_trait::async_trait;
use parking_lot::Mutex;
use payveil_core::effects::{
    ClearValues, DecryptionBundle, DecryptionEffects, DecryptionError, ProofSubmitter,
};
use payveil_core::{ContractContext, EncryptedHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct VerifierState {
    fail_next: Option<String>,
    skip_submission: bool,
    submit_twice: bool,
    override_value: Option<u64>,
}

/// Relayer stand-in backed by an [`InMemoryLedger`].
#[derive(Debug, Clone)]
pub struct MockVerifier {
    ledger: InMemoryLedger,
    state: Arc<Mutex<VerifierState>>,
    calls: Arc<AtomicUsize>,
}

impl MockVerifier {
    /// A verifier reading ciphertexts from `ledger`.
    pub fn new(ledger: InMemoryLedger) -> Self {
        Self {
            ledger,
            state: Arc::new(Mutex::new(VerifierState::default())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next verification before anything is submitted.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }

    /// Return clear values without ever calling the submitter.
    pub fn set_skip_submission(&self, skip: bool) {
        self.state.lock().skip_submission = skip;
    }

    /// Call the submitter twice per verification, as a retrying relayer might.
    pub fn set_submit_twice(&self, twice: bool) {
        self.state.lock().submit_twice = twice;
    }

    /// Report `value` instead of the decrypted one.
    pub fn set_override_value(&self, value: Option<u64>) {
        self.state.lock().override_value = value;
    }

    /// Number of `verify` calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecryptionEffects for MockVerifier {
    async fn verify(
        &self,
        handles: &[EncryptedHandle],
        _context: &ContractContext,
        submitter: &dyn ProofSubmitter,
    ) -> Result<ClearValues, DecryptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (fail_next, skip_submission, submit_twice, override_value) = {
            let mut state = self.state.lock();
            (
                state.fail_next.take(),
                state.skip_submission,
                state.submit_twice,
                state.override_value,
            )
        };
        if let Some(reason) = fail_next {
            return Err(DecryptionError::VerificationFailed { reason });
        }

        let mut clear_values = ClearValues::new();
        let mut encoded_clear_values = Vec::with_capacity(handles.len() * 8);
        for handle in handles {
            let value = self
                .ledger
                .ciphertext(handle)
                .as_deref()
                .and_then(decode_ciphertext)
                .ok_or_else(|| DecryptionError::VerificationFailed {
                    reason: format!("no ciphertext behind {handle}"),
                })?;
            let value = override_value.unwrap_or(value);
            encoded_clear_values.extend_from_slice(&value.to_be_bytes());
            clear_values.insert(handle.clone(), value);
        }

        if !skip_submission {
            let bundle = DecryptionBundle {
                clear_values: clear_values.clone(),
                encoded_clear_values,
                proof: format!("proof:{}", handles.len()).into_bytes(),
            };
            submitter.submit_proof(&bundle).await?;
            if submit_twice {
                submitter.submit_proof(&bundle).await?;
            }
        }
        Ok(clear_values)
    }
}
