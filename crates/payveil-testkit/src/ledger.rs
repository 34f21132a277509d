//! In-memory record contract.
//!
//! Behaves like the deployed contract as seen through a wallet client:
//! calls are accepted into a pending pool by `submit` and only take effect
//! when `await_finality` finalizes them. Handles created with
//! [`InMemoryLedger::as_actor`] share one ledger, which lets tests play
//! several actors against the same records.
//!
//! Scripting hooks cover the failure modes the lifecycle must survive:
//! rejected submissions, rejected or timed-out finality, a finality wait
//! that never returns, slow or unreadable records, and records verified by
//! another actor behind the caller's back.

use crate::encryption::decode_ciphertext;
use async_trait::async_trait;
use parking_lot::Mutex;
use payveil_core::effects::{
    CreateRecordCall, FinalityOutcome, LedgerCall, LedgerEffects, LedgerError, RecordFields,
    RejectReason, TxHandle,
};
use payveil_core::{ActorId, EncryptedHandle, LifecycleStatus, RecordId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const GENESIS_MS: u64 = 1_700_000_000_000;
const ALREADY_VERIFIED_REVERT: &str = "execution reverted: Data already verified";

/// Scripted result for the next finality wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFinality {
    /// Apply the call and report it final
    Finalize,
    /// Drop the call and report the rejection
    Reject(RejectReason),
    /// Report a timeout; the call stays pending
    TimeOut,
    /// Never return
    Hang,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    fields: RecordFields,
    handle: EncryptedHandle,
    ciphertext: Vec<u8>,
}

#[derive(Debug, Clone)]
struct PendingTx {
    call: LedgerCall,
    sender: ActorId,
}

#[derive(Debug, Default)]
struct LedgerState {
    order: Vec<RecordId>,
    records: HashMap<RecordId, StoredRecord>,
    handles: HashMap<EncryptedHandle, RecordId>,
    pending: HashMap<TxHandle, PendingTx>,
    submitted: Vec<LedgerCall>,
    next_tx: u64,
    next_handle: u64,
    clock_ms: u64,
    id_reads: usize,
    record_reads: usize,
    handle_reads: usize,
    available: bool,
    fail_submit: VecDeque<LedgerError>,
    finality_script: VecDeque<ScriptedFinality>,
    fail_enumeration: bool,
    unreadable: HashSet<RecordId>,
    preempt_verification: HashSet<RecordId>,
    held_reads: HashSet<RecordId>,
    waiting_reads: usize,
}

/// Shared in-memory ledger with a per-handle signing actor.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    finality_gate: Arc<watch::Sender<bool>>,
    read_gate: Arc<watch::Sender<bool>>,
    signer: ActorId,
}

impl InMemoryLedger {
    /// An empty, available ledger with a default signer.
    pub fn new() -> Self {
        Self::connected_as(crate::test_actor())
    }

    /// An empty ledger whose submissions are signed by `signer`.
    pub fn connected_as(signer: ActorId) -> Self {
        let (gate, _) = watch::channel(true);
        let (read_gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                clock_ms: GENESIS_MS,
                available: true,
                ..LedgerState::default()
            })),
            finality_gate: Arc::new(gate),
            read_gate: Arc::new(read_gate),
            signer,
        }
    }

    /// Another client of the same ledger, signing as `signer`.
    pub fn as_actor(&self, signer: ActorId) -> Self {
        Self {
            state: self.state.clone(),
            finality_gate: self.finality_gate.clone(),
            read_gate: self.read_gate.clone(),
            signer,
        }
    }

    /// Actor signing this client's submissions.
    pub fn signer(&self) -> &ActorId {
        &self.signer
    }

    // Scripting

    /// Reject the next submission with `err`.
    pub fn fail_next_submit(&self, err: LedgerError) {
        self.state.lock().fail_submit.push_back(err);
    }

    /// Script the outcome of the next finality wait. Waits without a script
    /// finalize.
    pub fn script_finality(&self, outcome: ScriptedFinality) {
        self.state.lock().finality_script.push_back(outcome);
    }

    /// Make `read_all_ids` fail until cleared.
    pub fn set_enumeration_failing(&self, failing: bool) {
        self.state.lock().fail_enumeration = failing;
    }

    /// Make reads of one record fail until cleared.
    pub fn set_unreadable(&self, id: &RecordId, unreadable: bool) {
        let mut state = self.state.lock();
        if unreadable {
            state.unreadable.insert(id.clone());
        } else {
            state.unreadable.remove(id);
        }
    }

    /// Set the answer of the availability probe.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Let another actor verify `id` right before this ledger sees the next
    /// verification submission for it.
    pub fn preempt_next_verification(&self, id: &RecordId) {
        self.state.lock().preempt_verification.insert(id.clone());
    }

    /// Hold every finality wait until [`resume_finality`](Self::resume_finality).
    pub fn pause_finality(&self) {
        self.finality_gate.send_replace(false);
    }

    /// Release held finality waits.
    pub fn resume_finality(&self) {
        self.finality_gate.send_replace(true);
    }

    /// Hold the next field read of `id` until [`release_reads`](Self::release_reads).
    pub fn hold_next_read(&self, id: &RecordId) {
        self.state.lock().held_reads.insert(id.clone());
        self.read_gate.send_replace(false);
    }

    /// Release held reads.
    pub fn release_reads(&self) {
        self.read_gate.send_replace(true);
    }

    // Direct manipulation

    /// Verify `id` as some other actor would, bypassing the pending pool.
    pub fn verify_externally(&self, id: &RecordId) -> Result<u64, LedgerError> {
        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))?;
        let value = decode_ciphertext(&record.ciphertext).ok_or_else(|| LedgerError::Transport {
            reason: "stored ciphertext is not decodable".to_string(),
        })?;
        record.fields.is_verified = true;
        record.fields.decrypted_value = value;
        Ok(value)
    }

    /// Re-encrypt `id` under a fresh handle without changing its value.
    pub fn rotate_handle(&self, id: &RecordId) -> Result<EncryptedHandle, LedgerError> {
        let mut state = self.state.lock();
        let handle = state.allocate_handle();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))?;
        let previous = std::mem::replace(&mut record.handle, handle.clone());
        state.handles.remove(&previous);
        state.handles.insert(handle.clone(), id.clone());
        Ok(handle)
    }

    /// Finalize a call whose wait previously timed out.
    pub fn confirm_pending(&self, tx: &TxHandle) -> Result<(), RejectReason> {
        let mut state = self.state.lock();
        match state.pending.remove(tx) {
            Some(pending) => state.apply(pending),
            None => Err(RejectReason::Reverted(format!("unknown transaction {tx}"))),
        }
    }

    // Inspection

    /// Ciphertext currently stored behind `handle`.
    pub fn ciphertext(&self, handle: &EncryptedHandle) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let id = state.handles.get(handle)?;
        state.records.get(id).map(|record| record.ciphertext.clone())
    }

    /// Raw fields of `id` as the contract holds them.
    pub fn record_fields(&self, id: &RecordId) -> Option<RecordFields> {
        self.state.lock().records.get(id).map(|record| record.fields.clone())
    }

    /// Number of records on the ledger.
    pub fn record_count(&self) -> usize {
        self.state.lock().order.len()
    }

    /// Every call accepted by `submit`, in order.
    pub fn submitted(&self) -> Vec<LedgerCall> {
        self.state.lock().submitted.clone()
    }

    /// Number of accepted submissions of the named contract method.
    pub fn submissions_of(&self, name: &str) -> usize {
        self.state
            .lock()
            .submitted
            .iter()
            .filter(|call| call.name() == name)
            .count()
    }

    /// Transactions submitted but neither finalized nor rejected.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Total number of read calls (ids, records and handles).
    pub fn read_count(&self) -> usize {
        let state = self.state.lock();
        state.id_reads + state.record_reads + state.handle_reads
    }

    /// Number of reads currently held.
    pub fn held_read_count(&self) -> usize {
        self.state.lock().waiting_reads
    }

    /// Total number of ledger interactions, reads and submissions.
    pub fn interaction_count(&self) -> usize {
        self.read_count() + self.state.lock().submitted.len()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerState {
    fn allocate_handle(&mut self) -> EncryptedHandle {
        self.next_handle += 1;
        let mut bytes = [0u8; 32];
        bytes[0] = 0xfe;
        bytes[24..].copy_from_slice(&self.next_handle.to_be_bytes());
        EncryptedHandle::from_bytes(bytes)
    }

    fn allocate_tx(&mut self) -> TxHandle {
        self.next_tx += 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&self.next_tx.to_be_bytes());
        TxHandle::new(format!("0x{}", hex::encode(bytes)))
    }

    /// Checks run at submission time, like a gas estimate would.
    fn precheck(&mut self, call: &LedgerCall) -> Result<(), LedgerError> {
        match call {
            LedgerCall::CreateRecord(create) => {
                if self.records.contains_key(&create.record_id) {
                    return Err(LedgerError::Rejected(RejectReason::Reverted(
                        "execution reverted: Record already exists".to_string(),
                    )));
                }
            }
            LedgerCall::VerifyDecryption { record_id, .. } => {
                if self.preempt_verification.remove(record_id) {
                    let record = self
                        .records
                        .get_mut(record_id)
                        .ok_or_else(|| LedgerError::RecordNotFound(record_id.clone()))?;
                    if let Some(value) = decode_ciphertext(&record.ciphertext) {
                        record.fields.is_verified = true;
                        record.fields.decrypted_value = value;
                    }
                }
                let record = self
                    .records
                    .get(record_id)
                    .ok_or_else(|| LedgerError::RecordNotFound(record_id.clone()))?;
                if record.fields.is_verified {
                    return Err(LedgerError::Rejected(RejectReason::Reverted(
                        ALREADY_VERIFIED_REVERT.to_string(),
                    )));
                }
            }
            LedgerCall::SetLifecycleStatus { record_id, .. } => {
                if !self.records.contains_key(record_id) {
                    return Err(LedgerError::RecordNotFound(record_id.clone()));
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, pending: PendingTx) -> Result<(), RejectReason> {
        match pending.call {
            LedgerCall::CreateRecord(create) => self.apply_create(create, pending.sender),
            LedgerCall::VerifyDecryption {
                record_id,
                clear_values,
                proof,
            } => self.apply_verification(&record_id, &clear_values, &proof),
            LedgerCall::SetLifecycleStatus { record_id, status } => {
                self.apply_status(&record_id, status)
            }
        }
    }

    fn apply_create(&mut self, create: CreateRecordCall, sender: ActorId) -> Result<(), RejectReason> {
        if self.records.contains_key(&create.record_id) {
            return Err(RejectReason::Reverted("Record already exists".to_string()));
        }
        if decode_ciphertext(&create.encrypted_rate.payload).is_none() {
            return Err(RejectReason::Reverted("invalid encrypted input".to_string()));
        }

        self.clock_ms += 1_000;
        let handle = self.allocate_handle();
        let fields = RecordFields {
            owner_display_name: create.owner_display_name,
            public_rate: create.public_rate,
            public_hours: create.public_hours,
            description: create.description,
            creator: sender,
            created_at_ms: self.clock_ms,
            is_verified: false,
            decrypted_value: 0,
            lifecycle_status: LifecycleStatus::Active,
        };
        self.handles.insert(handle.clone(), create.record_id.clone());
        self.order.push(create.record_id.clone());
        self.records.insert(
            create.record_id,
            StoredRecord {
                fields,
                handle,
                ciphertext: create.encrypted_rate.payload,
            },
        );
        Ok(())
    }

    fn apply_verification(
        &mut self,
        record_id: &RecordId,
        clear_values: &[u8],
        proof: &[u8],
    ) -> Result<(), RejectReason> {
        let record = self
            .records
            .get_mut(record_id)
            .ok_or_else(|| RejectReason::Reverted(format!("Record {record_id} not found")))?;
        if record.fields.is_verified {
            return Err(RejectReason::Reverted(ALREADY_VERIFIED_REVERT.to_string()));
        }

        let claimed = clear_values
            .get(..8)
            .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
            .map(u64::from_be_bytes);
        let stored = decode_ciphertext(&record.ciphertext);
        if proof.is_empty() || claimed.is_none() || claimed != stored {
            return Err(RejectReason::Reverted("invalid decryption proof".to_string()));
        }

        record.fields.is_verified = true;
        record.fields.decrypted_value = claimed.unwrap_or_default();
        Ok(())
    }

    fn apply_status(&mut self, record_id: &RecordId, status: LifecycleStatus) -> Result<(), RejectReason> {
        let record = self
            .records
            .get_mut(record_id)
            .ok_or_else(|| RejectReason::Reverted(format!("Record {record_id} not found")))?;
        let current = record.fields.lifecycle_status;
        if !current.can_transition_to(status) {
            return Err(RejectReason::Reverted(format!(
                "invalid status transition {current} -> {status}"
            )));
        }
        record.fields.lifecycle_status = status;
        Ok(())
    }
}

#[async_trait]
impl LedgerEffects for InMemoryLedger {
    async fn read_all_ids(&self) -> Result<Vec<RecordId>, LedgerError> {
        let mut state = self.state.lock();
        state.id_reads += 1;
        if state.fail_enumeration {
            return Err(LedgerError::Unavailable {
                reason: "record enumeration failed".to_string(),
            });
        }
        Ok(state.order.clone())
    }

    async fn read_record(&self, id: &RecordId) -> Result<RecordFields, LedgerError> {
        let held = {
            let mut state = self.state.lock();
            let held = state.held_reads.remove(id);
            if held {
                state.waiting_reads += 1;
            }
            held
        };
        if held {
            let mut gate = self.read_gate.subscribe();
            let released = gate.wait_for(|open| *open).await.is_ok();
            self.state.lock().waiting_reads -= 1;
            if !released {
                return Err(LedgerError::Transport {
                    reason: "ledger client shut down".to_string(),
                });
            }
        }

        let mut state = self.state.lock();
        state.record_reads += 1;
        if state.unreadable.contains(id) {
            return Err(LedgerError::Transport {
                reason: format!("failed to decode record {id}"),
            });
        }
        state
            .records
            .get(id)
            .map(|record| record.fields.clone())
            .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))
    }

    async fn read_encrypted_handle(&self, id: &RecordId) -> Result<EncryptedHandle, LedgerError> {
        let mut state = self.state.lock();
        state.handle_reads += 1;
        if state.unreadable.contains(id) {
            return Err(LedgerError::Transport {
                reason: format!("failed to read handle of {id}"),
            });
        }
        state
            .records
            .get(id)
            .map(|record| record.handle.clone())
            .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))
    }

    async fn submit(&self, call: LedgerCall) -> Result<TxHandle, LedgerError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_submit.pop_front() {
            tracing::debug!(call = call.name(), error = %err, "scripted submission failure");
            return Err(err);
        }
        state.precheck(&call)?;

        let tx = state.allocate_tx();
        state.submitted.push(call.clone());
        state.pending.insert(
            tx.clone(),
            PendingTx {
                call,
                sender: self.signer.clone(),
            },
        );
        Ok(tx)
    }

    async fn await_finality(
        &self,
        tx: &TxHandle,
        _timeout: Duration,
    ) -> Result<FinalityOutcome, LedgerError> {
        let mut gate = self.finality_gate.subscribe();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        if !opened {
            return Err(LedgerError::Unavailable {
                reason: "ledger shut down".to_string(),
            });
        }

        let script = self.state.lock().finality_script.pop_front();
        match script.unwrap_or(ScriptedFinality::Finalize) {
            ScriptedFinality::Hang => {
                futures::future::pending::<()>().await;
                Ok(FinalityOutcome::TimedOut)
            }
            ScriptedFinality::TimeOut => Ok(FinalityOutcome::TimedOut),
            ScriptedFinality::Reject(reason) => {
                self.state.lock().pending.remove(tx);
                Ok(FinalityOutcome::Rejected(reason))
            }
            ScriptedFinality::Finalize => {
                let mut state = self.state.lock();
                let pending = state.pending.remove(tx).ok_or_else(|| LedgerError::Transport {
                    reason: format!("unknown transaction {tx}"),
                })?;
                Ok(match state.apply(pending) {
                    Ok(()) => FinalityOutcome::Finalized,
                    Err(reason) => FinalityOutcome::Rejected(reason),
                })
            }
        }
    }

    async fn is_available(&self) -> Result<bool, LedgerError> {
        Ok(self.state.lock().available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::encode_ciphertext;
    use assert_matches::assert_matches;
    use payveil_core::effects::EncryptedInput;

    fn create_call(id: &str, rate: u64) -> LedgerCall {
        LedgerCall::CreateRecord(CreateRecordCall {
            record_id: RecordId::new(id),
            owner_display_name: "Alice".to_string(),
            encrypted_rate: EncryptedInput {
                payload: encode_ciphertext(rate),
                proof: vec![1],
            },
            public_rate: rate,
            public_hours: 40,
            description: "Q1".to_string(),
        })
    }

    async fn finalize(ledger: &InMemoryLedger, call: LedgerCall) -> FinalityOutcome {
        let tx = ledger.submit(call).await.unwrap();
        ledger.await_finality(&tx, Duration::from_secs(1)).await.unwrap()
    }

    #[tokio::test]
    async fn create_only_lands_on_finality() {
        let ledger = InMemoryLedger::new();
        let tx = ledger.submit(create_call("r1", 50)).await.unwrap();
        assert!(ledger.read_all_ids().await.unwrap().is_empty());
        assert_eq!(ledger.pending_count(), 1);

        let outcome = ledger.await_finality(&tx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, FinalityOutcome::Finalized);
        let fields = ledger.read_record(&RecordId::new("r1")).await.unwrap();
        assert_eq!(fields.creator, *ledger.signer());
        assert!(!fields.is_verified);
    }

    #[tokio::test]
    async fn rejected_finality_leaves_nothing() {
        let ledger = InMemoryLedger::new();
        ledger.script_finality(ScriptedFinality::Reject(RejectReason::UserCancelled));
        let outcome = finalize(&ledger, create_call("r1", 50)).await;
        assert_eq!(outcome, FinalityOutcome::Rejected(RejectReason::UserCancelled));
        assert_eq!(ledger.record_count(), 0);
        assert_eq!(ledger.pending_count(), 0);
    }

    #[tokio::test]
    async fn verification_requires_matching_value() {
        let ledger = InMemoryLedger::new();
        finalize(&ledger, create_call("r1", 75_000)).await;
        let id = RecordId::new("r1");

        let wrong = LedgerCall::VerifyDecryption {
            record_id: id.clone(),
            clear_values: 1u64.to_be_bytes().to_vec(),
            proof: vec![1],
        };
        assert_matches!(finalize(&ledger, wrong).await, FinalityOutcome::Rejected(_));

        let right = LedgerCall::VerifyDecryption {
            record_id: id.clone(),
            clear_values: 75_000u64.to_be_bytes().to_vec(),
            proof: vec![1],
        };
        assert_eq!(finalize(&ledger, right).await, FinalityOutcome::Finalized);
        assert_eq!(ledger.record_fields(&id).unwrap().decrypted_value, 75_000);
    }

    #[tokio::test]
    async fn second_verification_reverts_as_already_verified() {
        let ledger = InMemoryLedger::new();
        finalize(&ledger, create_call("r1", 9)).await;
        let id = RecordId::new("r1");
        ledger.verify_externally(&id).unwrap();

        let err = ledger
            .submit(LedgerCall::VerifyDecryption {
                record_id: id,
                clear_values: 9u64.to_be_bytes().to_vec(),
                proof: vec![1],
            })
            .await
            .unwrap_err();
        assert_matches!(err, LedgerError::Rejected(reason)
            if reason.clone().normalize() == RejectReason::AlreadyVerified);
    }

    #[tokio::test]
    async fn completed_status_is_terminal() {
        let ledger = InMemoryLedger::new();
        finalize(&ledger, create_call("r1", 9)).await;
        let id = RecordId::new("r1");
        let set = |status| LedgerCall::SetLifecycleStatus {
            record_id: id.clone(),
            status,
        };

        assert_eq!(
            finalize(&ledger, set(LifecycleStatus::Completed)).await,
            FinalityOutcome::Finalized
        );
        assert_matches!(
            finalize(&ledger, set(LifecycleStatus::Active)).await,
            FinalityOutcome::Rejected(_)
        );
    }

    #[tokio::test]
    async fn timed_out_call_can_confirm_later() {
        let ledger = InMemoryLedger::new();
        ledger.script_finality(ScriptedFinality::TimeOut);
        let tx = ledger.submit(create_call("r1", 9)).await.unwrap();
        let outcome = ledger.await_finality(&tx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, FinalityOutcome::TimedOut);
        assert_eq!(ledger.record_count(), 0);

        ledger.confirm_pending(&tx).unwrap();
        assert_eq!(ledger.record_count(), 1);
    }

    #[tokio::test]
    async fn actors_share_state() {
        let alice = InMemoryLedger::new();
        let bob = alice.as_actor(ActorId::new("0xb0b"));
        finalize(&bob, create_call("r1", 9)).await;

        let fields = alice.read_record(&RecordId::new("r1")).await.unwrap();
        assert_eq!(fields.creator.as_str(), "0xb0b");
    }

    #[tokio::test]
    async fn held_read_waits_for_release() {
        let ledger = InMemoryLedger::new();
        finalize(&ledger, create_call("r1", 9)).await;
        let id = RecordId::new("r1");
        ledger.hold_next_read(&id);

        let (held, ()) = tokio::join!(ledger.read_record(&id), async {
            while ledger.held_read_count() == 0 {
                tokio::task::yield_now().await;
            }
            // Only the first read is held.
            assert!(ledger.read_record(&id).await.is_ok());
            ledger.release_reads();
        });

        assert_eq!(held.unwrap().public_rate, 9);
        assert_eq!(ledger.held_read_count(), 0);
    }
}
