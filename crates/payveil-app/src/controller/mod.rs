//! # Lifecycle Controller
//!
//! Owns the per-record disclosure state machine and is the only writer of
//! the [`RecordStore`].
//!
//! ```text
//! Sealed --decrypt(success)------------------> Verified
//! Sealed --decrypt(already verified by other)-> Verified
//! Sealed --decrypt(failure)------------------> Sealed   (error reported)
//! Verified: terminal
//! ```
//!
//! ## Protocol rules
//!
//! - Ledger calls are irrevocable once submitted; nothing is rolled back and
//!   nothing is resubmitted automatically.
//! - Every finality wait is bounded by the configured timeout; a timeout is
//!   reported as such, never as a rejection.
//! - The store is refreshed from the ledger after every successful write and
//!   is only ever replaced wholesale.
//! - At most one decrypt per record is in flight; concurrent callers share
//!   its result.

mod create;
mod decrypt;
mod in_flight;

use crate::status::OperationStatusReporter;
use crate::store::{RecordStore, ReplaceOutcome};
use futures::future::join_all;
use in_flight::InFlightDecrypts;
use payveil_core::effects::{
    DecryptionEffects, EncryptionEffects, FinalityOutcome, LedgerCall, LedgerEffects, LedgerError,
    TxHandle,
};
use payveil_core::{
    ConfidentialRecord, ContractContext, LifecycleConfig, LifecycleError, LifecycleStatus,
    OperationKind, RecordId,
};
use std::sync::Arc;

struct ControllerInner {
    config: LifecycleConfig,
    context: ContractContext,
    encryption: Arc<dyn EncryptionEffects>,
    ledger: Arc<dyn LedgerEffects>,
    verifier: Arc<dyn DecryptionEffects>,
    store: RecordStore,
    status: OperationStatusReporter,
    in_flight: Arc<InFlightDecrypts>,
}

/// Orchestrates create, decrypt, refresh and status transitions.
///
/// Cheap to clone; clones share the store, the status channel and the
/// in-flight registry. Create one per session and drop it at session end.
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<ControllerInner>,
}

impl LifecycleController {
    /// Create a controller with a fresh store and status channel.
    pub fn new(
        config: LifecycleConfig,
        encryption: Arc<dyn EncryptionEffects>,
        ledger: Arc<dyn LedgerEffects>,
        verifier: Arc<dyn DecryptionEffects>,
    ) -> Self {
        let status = OperationStatusReporter::from_config(&config);
        Self::with_parts(config, encryption, ledger, verifier, RecordStore::new(), status)
    }

    /// Create a controller over an existing store and status channel.
    pub fn with_parts(
        config: LifecycleConfig,
        encryption: Arc<dyn EncryptionEffects>,
        ledger: Arc<dyn LedgerEffects>,
        verifier: Arc<dyn DecryptionEffects>,
        store: RecordStore,
        status: OperationStatusReporter,
    ) -> Self {
        let context = config.context();
        Self {
            inner: Arc::new(ControllerInner {
                config,
                context,
                encryption,
                ledger,
                verifier,
                store,
                status,
                in_flight: Arc::new(InFlightDecrypts::default()),
            }),
        }
    }

    /// The record store this controller maintains.
    pub fn store(&self) -> &RecordStore {
        &self.inner.store
    }

    /// The status channel this controller drives.
    pub fn status(&self) -> &OperationStatusReporter {
        &self.inner.status
    }

    /// Active configuration.
    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    /// Number of decrypt operations currently in flight.
    pub fn decrypts_in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Reload every record from the ledger and replace the store.
    ///
    /// Records that fail to load are logged and skipped. Returns the store
    /// content after the refresh, in ledger order.
    pub async fn refresh_all(&self) -> Result<Vec<ConfidentialRecord>, LifecycleError> {
        match self.reload().await {
            Ok(_) => Ok(self.inner.store.records()),
            Err(err) => {
                self.inner
                    .status
                    .report_error(OperationKind::Refresh, err.user_message());
                Err(err)
            }
        }
    }

    /// Probe whether the record contract answers.
    pub async fn check_availability(&self) -> Result<bool, LifecycleError> {
        match self.inner.ledger.is_available().await {
            Ok(true) => {
                tracing::info!("record contract is available");
                self.inner
                    .status
                    .report_success(OperationKind::Availability, "Contract is available");
                Ok(true)
            }
            Ok(false) => {
                tracing::warn!("record contract reports unavailable");
                self.inner
                    .status
                    .report_error(OperationKind::Availability, "Availability check failed");
                Ok(false)
            }
            Err(err) => {
                tracing::warn!(error = %err, "availability probe failed");
                self.inner
                    .status
                    .report_error(OperationKind::Availability, "Availability check failed");
                Err(LifecycleError::from(err))
            }
        }
    }

    /// Move a record's display lifecycle to `target` through the ledger.
    ///
    /// Same-state requests succeed without a ledger call. Completed records
    /// cannot move.
    pub async fn transition_status(
        &self,
        record_id: &RecordId,
        target: LifecycleStatus,
    ) -> Result<LifecycleStatus, LifecycleError> {
        let status = &self.inner.status;
        let Some(record) = self.inner.store.get(record_id) else {
            let err = LifecycleError::UnknownRecord {
                record_id: record_id.clone(),
            };
            status.report_error(OperationKind::Transition, err.user_message());
            return Err(err);
        };

        let current = record.lifecycle_status;
        if current == target {
            return Ok(current);
        }
        if !current.can_transition_to(target) {
            let err = LifecycleError::InvalidTransition {
                record_id: record_id.clone(),
                from: current,
                to: target,
            };
            status.report_error(OperationKind::Transition, err.user_message());
            return Err(err);
        }

        let ticket = status.begin(
            OperationKind::Transition,
            format!("Moving record to {target}..."),
        );
        let call = LedgerCall::SetLifecycleStatus {
            record_id: record_id.clone(),
            status: target,
        };
        let result = async {
            let tx = self.submit(call).await?;
            ticket.update("Waiting for transaction confirmation...");
            self.await_final(&tx, record_id).await
        }
        .await;

        if let Err(err) = result {
            tracing::warn!(%record_id, error = %err, "status transition failed");
            ticket.fail(err.user_message());
            return Err(err);
        }

        let applied = self
            .reload_after_write(record_id)
            .await
            .and_then(|records| records.into_iter().find(|record| &record.id == record_id))
            .map_or(target, |record| record.lifecycle_status);
        tracing::info!(%record_id, from = %current, to = %applied, "status transition finalized");
        ticket.succeed(format!("Record is now {applied}"));
        Ok(applied)
    }

    /// Sign and broadcast a call.
    async fn submit(&self, call: LedgerCall) -> Result<TxHandle, LifecycleError> {
        let record_id = call.record_id().clone();
        let name = call.name();
        tracing::debug!(%record_id, call = name, "submitting ledger call");
        let tx = self
            .inner
            .ledger
            .submit(call)
            .await
            .map_err(|err| LifecycleError::from_submission(err, &record_id))?;
        tracing::debug!(%record_id, call = name, %tx, "ledger call pending");
        Ok(tx)
    }

    /// Wait for `tx` to become final within the configured bound.
    async fn await_final(&self, tx: &TxHandle, record_id: &RecordId) -> Result<(), LifecycleError> {
        let timeout = self.inner.config.finality_timeout();
        let timed_out = || LifecycleError::FinalityTimeout {
            tx: tx.clone(),
            timeout_ms: self.inner.config.finality_timeout_ms,
        };

        let outcome = tokio::time::timeout(timeout, self.inner.ledger.await_finality(tx, timeout))
            .await
            .map_err(|_| timed_out())?
            .map_err(|err| LifecycleError::from_submission(err, record_id))?;

        match outcome {
            FinalityOutcome::Finalized => {
                tracing::debug!(%record_id, %tx, "transaction final");
                Ok(())
            }
            FinalityOutcome::Rejected(reason) => {
                tracing::debug!(%record_id, %tx, %reason, "transaction rejected");
                Err(LifecycleError::from_rejection(reason, record_id))
            }
            FinalityOutcome::TimedOut => {
                tracing::warn!(%record_id, %tx, "finality wait timed out; transaction may still confirm");
                Err(timed_out())
            }
        }
    }

    /// Read one record (fields and handle) from the ledger.
    async fn read_record(&self, id: &RecordId) -> Result<ConfidentialRecord, LedgerError> {
        let fields = self.inner.ledger.read_record(id).await?;
        let handle = self.inner.ledger.read_encrypted_handle(id).await?;
        Ok(ConfidentialRecord::from_ledger(id.clone(), fields, handle))
    }

    /// Read the full ledger state and install it unless a later read won.
    ///
    /// The read is sequenced before its first ledger call, so a slow read
    /// that started earlier can never replace one that started after it.
    /// Returns what this read saw, which may differ from the store content
    /// when a later read was installed first.
    async fn reload(&self) -> Result<Vec<ConfidentialRecord>, LifecycleError> {
        let stamp = self.inner.store.begin_read();
        let ids = self
            .inner
            .ledger
            .read_all_ids()
            .await
            .map_err(|err| LifecycleError::LedgerUnavailable {
                reason: err.to_string(),
            })?;

        let reads = join_all(ids.iter().map(|id| self.read_record(id))).await;
        let mut records = Vec::with_capacity(reads.len());
        for (id, read) in ids.iter().zip(reads) {
            match read {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(record_id = %id, error = %err, "skipping record that failed to load");
                }
            }
        }

        let snapshot = stamp.seal(records.clone());
        match self.inner.store.replace_all(snapshot) {
            ReplaceOutcome::Applied { seq } => {
                tracing::debug!(seq, records = self.inner.store.len(), "record store refreshed");
            }
            ReplaceOutcome::Stale { seq, current } => {
                tracing::debug!(seq, current, "discarding snapshot older than installed one");
            }
        }
        Ok(records)
    }

    /// Refresh after a finalized write; a failure here does not undo the write.
    async fn reload_after_write(&self, record_id: &RecordId) -> Option<Vec<ConfidentialRecord>> {
        match self.reload().await {
            Ok(records) => Some(records),
            Err(err) => {
                tracing::warn!(%record_id, error = %err, "refresh after finalized write failed");
                None
            }
        }
    }
}
