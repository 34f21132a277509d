//! Selective disclosure: off-ledger decrypt, on-ledger verify.
//!
//! The verifier calls back into [`LedgerProofSubmitter`] to post its proof.
//! The submitter posts at most once per operation, so a verifier that
//! retries its callback, even concurrently, cannot produce a second
//! `verifyDecryption`.

use super::in_flight::{Admission, DecryptOutput};
use super::LifecycleController;
use crate::status::StatusTicket;
use async_trait::async_trait;
use futures::FutureExt;
use payveil_core::effects::{
    DecryptionBundle, LedgerCall, LedgerEffects, LedgerError, ProofSubmitter, TxHandle,
};
use payveil_core::{ConfidentialRecord, EncryptedHandle, LifecycleError, OperationKind, RecordId};
use tokio::sync::Mutex;

impl LifecycleController {
    /// Disclose a record's confidential value.
    ///
    /// Verified records answer from the store without touching any
    /// collaborator. Otherwise the value is decrypted, its proof verified on
    /// the ledger, and the store refreshed. Concurrent calls for the same
    /// record share one operation and one ledger submission.
    pub async fn decrypt(&self, record_id: &RecordId) -> Result<u64, LifecycleError> {
        let Some(record) = self.inner.store.get(record_id) else {
            let err = LifecycleError::UnknownRecord {
                record_id: record_id.clone(),
            };
            self.inner
                .status
                .report_error(OperationKind::Decrypt, err.user_message());
            return Err(err);
        };

        if let Some(value) = record.decrypted_value() {
            tracing::debug!(%record_id, "record already verified; answering from store");
            return Ok(value);
        }

        let controller = self.clone();
        let id = record_id.clone();
        let cached_handle = record.encrypted_handle;
        let (operation, admission) = self.inner.in_flight.join_or_start(record_id, move |guard| {
            async move {
                let _guard = guard;
                controller.verify_disclosure(&id, &cached_handle).await
            }
            .boxed()
        });
        if admission == Admission::Joined {
            tracing::debug!(%record_id, "joining decrypt already in flight");
        }
        operation.await
    }

    async fn verify_disclosure(
        &self,
        record_id: &RecordId,
        cached_handle: &EncryptedHandle,
    ) -> DecryptOutput {
        let ticket = self
            .inner
            .status
            .begin(OperationKind::Decrypt, "Decrypting and verifying value...");

        let err = match self.run_verification(record_id, cached_handle, &ticket).await {
            Ok(value) => {
                tracing::info!(%record_id, "value disclosed and verified");
                ticket.succeed("Decryption verified successfully");
                return Ok(value);
            }
            Err(err) => err,
        };

        if err.is_success_alias() {
            tracing::info!(%record_id, "record verified by another actor; re-reading");
            return match self.settle_already_verified(record_id).await {
                Ok(value) => {
                    ticket.succeed("Value is already verified");
                    Ok(value)
                }
                Err(err) => {
                    ticket.fail(err.user_message());
                    Err(err)
                }
            };
        }

        tracing::warn!(%record_id, error = %err, "decrypt failed");
        ticket.fail(err.user_message());
        Err(err)
    }

    async fn run_verification(
        &self,
        record_id: &RecordId,
        cached_handle: &EncryptedHandle,
        ticket: &StatusTicket,
    ) -> DecryptOutput {
        let handle = self
            .inner
            .ledger
            .read_encrypted_handle(record_id)
            .await
            .map_err(LifecycleError::from)?;
        if &handle != cached_handle {
            return Err(LifecycleError::consistency(
                record_id.clone(),
                format!("encrypted handle is {handle}, cache holds {cached_handle}"),
            ));
        }

        let submitter = LedgerProofSubmitter::new(self.inner.ledger.as_ref(), record_id);
        let clear_values = self
            .inner
            .verifier
            .verify(std::slice::from_ref(&handle), &self.inner.context, &submitter)
            .await
            .map_err(|err| LifecycleError::from_decryption(err, record_id))?;

        let value = clear_values.get(&handle).copied().ok_or_else(|| {
            LifecycleError::verification(format!("no clear value returned for {handle}"))
        })?;
        let tx = submitter
            .into_submitted()
            .ok_or_else(|| LifecycleError::verification("decryption proof was never submitted"))?;

        ticket.update("Verifying decryption on ledger...");
        self.await_final(&tx, record_id).await?;

        let Some(records) = self.reload_after_write(record_id).await else {
            return Ok(value);
        };
        match find(&records, record_id).and_then(ConfidentialRecord::decrypted_value) {
            Some(stored) if stored == value => Ok(value),
            Some(stored) => Err(LifecycleError::consistency(
                record_id.clone(),
                format!("ledger holds {stored}, verifier produced {value}"),
            )),
            None => Err(LifecycleError::consistency(
                record_id.clone(),
                "record is not verified after its proof was finalized",
            )),
        }
    }

    /// Another actor won the race: the ledger value is authoritative.
    async fn settle_already_verified(&self, record_id: &RecordId) -> DecryptOutput {
        let records = self.reload().await?;
        find(&records, record_id)
            .and_then(ConfidentialRecord::decrypted_value)
            .ok_or_else(|| {
                LifecycleError::consistency(
                    record_id.clone(),
                    "ledger reported already verified but the record is not",
                )
            })
    }
}

fn find<'a>(records: &'a [ConfidentialRecord], id: &RecordId) -> Option<&'a ConfidentialRecord> {
    records.iter().find(|record| &record.id == id)
}

/// Posts the verifier's proof as a `verifyDecryption` call for one record.
///
/// The lock is held across the submission so concurrent callbacks queue
/// behind the first one and replay its handle.
pub(crate) struct LedgerProofSubmitter<'a> {
    ledger: &'a dyn LedgerEffects,
    record_id: &'a RecordId,
    submitted: Mutex<Option<TxHandle>>,
}

impl<'a> LedgerProofSubmitter<'a> {
    pub(crate) fn new(ledger: &'a dyn LedgerEffects, record_id: &'a RecordId) -> Self {
        Self {
            ledger,
            record_id,
            submitted: Mutex::new(None),
        }
    }

    pub(crate) fn into_submitted(self) -> Option<TxHandle> {
        self.submitted.into_inner()
    }
}

#[async_trait]
impl ProofSubmitter for LedgerProofSubmitter<'_> {
    async fn submit_proof(&self, bundle: &DecryptionBundle) -> Result<TxHandle, LedgerError> {
        let mut submitted = self.submitted.lock().await;
        if let Some(tx) = submitted.as_ref() {
            tracing::debug!(record_id = %self.record_id, %tx, "proof already submitted");
            return Ok(tx.clone());
        }

        let call = LedgerCall::VerifyDecryption {
            record_id: self.record_id.clone(),
            clear_values: bundle.encoded_clear_values.clone(),
            proof: bundle.proof.clone(),
        };
        let tx = self.ledger.submit(call).await?;
        tracing::debug!(record_id = %self.record_id, %tx, "decryption proof submitted");
        *submitted = Some(tx.clone());
        Ok(tx)
    }
}
