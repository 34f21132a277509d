//! Record store
//!
//! In-memory cache of confidential records keyed by id, in ledger
//! enumeration order. The store is only ever replaced wholesale with a
//! ledger snapshot; readers hold an `Arc` to an immutable view, so a refresh
//! can never be observed half-applied.
//!
//! Every ledger read takes a monotonically increasing sequence number before
//! it issues its first call. A snapshot older than the one already installed
//! is discarded, so a read that started earlier never overwrites one that
//! started later. Independently of ordering, a verified record never goes
//! back to sealed while its handle is unchanged.

use crate::views::RecordStats;
use indexmap::IndexMap;
use parking_lot::RwLock;
use payveil_core::{ConfidentialRecord, RecordId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sequence number reserved by a ledger read that has not completed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStamp {
    seq: u64,
}

impl ReadStamp {
    /// Sequence number reserved for the read.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Attach the records the read returned.
    pub fn seal(self, records: Vec<ConfidentialRecord>) -> LedgerSnapshot {
        LedgerSnapshot {
            seq: self.seq,
            records,
        }
    }
}

/// Records read from the ledger, ordered by when their read started.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    seq: u64,
    records: Vec<ConfidentialRecord>,
}

impl LedgerSnapshot {
    /// Sequence number reserved when the read started.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Records in ledger order.
    pub fn records(&self) -> &[ConfidentialRecord] {
        &self.records
    }
}

/// Outcome of installing a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The snapshot is now the store content
    Applied {
        /// Installed sequence number
        seq: u64,
    },
    /// A fresher snapshot was already installed; nothing changed
    Stale {
        /// Sequence number of the rejected snapshot
        seq: u64,
        /// Sequence number that stays installed
        current: u64,
    },
}

/// Immutable view of the store at one point in time.
#[derive(Debug, Default)]
pub struct StoreView {
    seq: u64,
    records: IndexMap<RecordId, ConfidentialRecord>,
}

impl StoreView {
    /// Sequence number of the snapshot this view was built from (0 = never refreshed).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Look up a record.
    pub fn get(&self, id: &RecordId) -> Option<&ConfidentialRecord> {
        self.records.get(id)
    }

    /// Records in ledger order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfidentialRecord> {
        self.records.values()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the view holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Shared record cache. Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    view: Arc<RwLock<Arc<StoreView>>>,
    next_seq: Arc<AtomicU64>,
}

impl RecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a sequence number for a ledger read about to start.
    pub fn begin_read(&self) -> ReadStamp {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        ReadStamp { seq }
    }

    /// Stamp records already in hand as a read starting now.
    pub fn stamp(&self, records: Vec<ConfidentialRecord>) -> LedgerSnapshot {
        self.begin_read().seal(records)
    }

    /// Replace the whole content with `snapshot` unless a fresher one is installed.
    ///
    /// A sealed record whose installed copy is verified under the same
    /// handle keeps the verified copy.
    pub fn replace_all(&self, snapshot: LedgerSnapshot) -> ReplaceOutcome {
        let mut guard = self.view.write();
        if guard.seq >= snapshot.seq {
            return ReplaceOutcome::Stale {
                seq: snapshot.seq,
                current: guard.seq,
            };
        }

        let mut records = IndexMap::with_capacity(snapshot.records.len());
        for record in snapshot.records {
            if records.contains_key(&record.id) {
                tracing::warn!(record_id = %record.id, "duplicate record id in ledger snapshot");
            }
            let record = match guard.get(&record.id) {
                Some(installed)
                    if installed.verified()
                        && !record.verified()
                        && installed.encrypted_handle == record.encrypted_handle =>
                {
                    tracing::debug!(record_id = %record.id, "keeping verified copy over sealed read");
                    installed.clone()
                }
                _ => record,
            };
            records.insert(record.id.clone(), record);
        }
        *guard = Arc::new(StoreView {
            seq: snapshot.seq,
            records,
        });
        ReplaceOutcome::Applied { seq: snapshot.seq }
    }

    /// Current immutable view.
    pub fn snapshot(&self) -> Arc<StoreView> {
        self.view.read().clone()
    }

    /// Clone one record out of the current view.
    pub fn get(&self, id: &RecordId) -> Option<ConfidentialRecord> {
        self.snapshot().get(id).cloned()
    }

    /// All records in ledger order.
    pub fn records(&self) -> Vec<ConfidentialRecord> {
        self.snapshot().iter().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Sequence number of the installed snapshot.
    pub fn version(&self) -> u64 {
        self.snapshot().seq()
    }

    /// Case-insensitive match on owner name or description, in store order.
    pub fn search(&self, term: &str) -> Vec<ConfidentialRecord> {
        let needle = term.trim().to_lowercase();
        self.snapshot()
            .iter()
            .filter(|record| {
                needle.is_empty()
                    || record.owner_display_name.to_lowercase().contains(&needle)
                    || record.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    /// Aggregate statistics over the current view.
    pub fn stats(&self) -> RecordStats {
        RecordStats::from_records(self.snapshot().iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payveil_core::effects::RecordFields;
    use payveil_core::{ActorId, EncryptedHandle, LifecycleStatus};
    use proptest::prelude::*;

    fn record(id: &str, owner: &str, description: &str, verified: Option<u64>) -> ConfidentialRecord {
        ConfidentialRecord::from_ledger(
            RecordId::new(id),
            RecordFields {
                owner_display_name: owner.to_string(),
                public_rate: 10,
                public_hours: 5,
                description: description.to_string(),
                creator: ActorId::new("0xabc"),
                created_at_ms: 0,
                is_verified: verified.is_some(),
                decrypted_value: verified.unwrap_or(0),
                lifecycle_status: LifecycleStatus::Active,
            },
            EncryptedHandle::new(format!("0x{id}")),
        )
    }

    #[test]
    fn replace_preserves_ledger_order() {
        let store = RecordStore::new();
        let snapshot = store.stamp(vec![
            record("c", "Carol", "", None),
            record("a", "Alice", "", None),
            record("b", "Bob", "", None),
        ]);
        assert_eq!(store.replace_all(snapshot), ReplaceOutcome::Applied { seq: 1 });

        let ids: Vec<_> = store.records().into_iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn older_snapshot_is_discarded() {
        let store = RecordStore::new();
        let older = store.stamp(vec![record("a", "Alice", "", None)]);
        let newer = store.stamp(vec![record("a", "Alice", "", Some(7))]);

        assert_eq!(store.replace_all(newer), ReplaceOutcome::Applied { seq: 2 });
        assert_eq!(
            store.replace_all(older),
            ReplaceOutcome::Stale { seq: 1, current: 2 }
        );
        assert_eq!(store.get(&RecordId::new("a")).unwrap().decrypted_value(), Some(7));
    }

    #[test]
    fn reads_are_ordered_by_start() {
        let store = RecordStore::new();
        let slow = store.begin_read();
        let fast = store.begin_read();

        let fast_outcome = store.replace_all(fast.seal(vec![record("a", "Alice", "", Some(7))]));
        let slow_outcome = store.replace_all(slow.seal(vec![record("a", "Alice", "", None)]));

        assert_eq!(fast_outcome, ReplaceOutcome::Applied { seq: 2 });
        assert_eq!(slow_outcome, ReplaceOutcome::Stale { seq: 1, current: 2 });
        assert_eq!(store.get(&RecordId::new("a")).unwrap().decrypted_value(), Some(7));
    }

    #[test]
    fn sealed_read_never_hides_verified_record() {
        let store = RecordStore::new();
        store.replace_all(store.stamp(vec![record("a", "Alice", "", Some(7))]));

        let outcome = store.replace_all(store.stamp(vec![
            record("a", "Alice", "", None),
            record("b", "Bob", "", None),
        ]));

        assert_eq!(outcome, ReplaceOutcome::Applied { seq: 2 });
        assert_eq!(store.get(&RecordId::new("a")).unwrap().decrypted_value(), Some(7));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn rotated_handle_replaces_verified_copy() {
        let store = RecordStore::new();
        store.replace_all(store.stamp(vec![record("a", "Alice", "", Some(7))]));

        let mut rotated = record("a", "Alice", "", None);
        rotated.encrypted_handle = EncryptedHandle::new("0xrotated");
        store.replace_all(store.stamp(vec![rotated]));

        assert!(!store.get(&RecordId::new("a")).unwrap().verified());
    }

    #[test]
    fn replace_drops_records_missing_from_snapshot() {
        let store = RecordStore::new();
        let first = store.stamp(vec![record("a", "Alice", "", None), record("b", "Bob", "", None)]);
        store.replace_all(first);
        let second = store.stamp(vec![record("b", "Bob", "", None)]);
        store.replace_all(second);

        assert_eq!(store.len(), 1);
        assert!(store.get(&RecordId::new("a")).is_none());
    }

    #[test]
    fn held_view_is_unaffected_by_replace() {
        let store = RecordStore::new();
        let first = store.stamp(vec![record("a", "Alice", "", None)]);
        store.replace_all(first);
        let view = store.snapshot();

        let second = store.stamp(vec![]);
        store.replace_all(second);

        assert_eq!(view.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn search_matches_name_or_description() {
        let store = RecordStore::new();
        let snapshot = store.stamp(vec![
            record("a", "Alice", "Q1 contract", None),
            record("b", "Bob", "maintenance", None),
            record("c", "Carol", "q1 bonus", None),
        ]);
        store.replace_all(snapshot);

        let ids: Vec<_> = store.search("Q1").into_iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(store.search("bob").len(), 1);
        assert_eq!(store.search("").len(), 3);
        assert!(store.search("zed").is_empty());
    }

    proptest! {
        #[test]
        fn search_results_all_match(term in "[a-zA-Z]{0,3}") {
            let store = RecordStore::new();
            let snapshot = store.stamp(vec![
                record("a", "Alice", "alpha", None),
                record("b", "Bob", "beta", None),
                record("c", "Carol", "gamma", None),
            ]);
            store.replace_all(snapshot);

            let needle = term.to_lowercase();
            for found in store.search(&term) {
                prop_assert!(
                    found.owner_display_name.to_lowercase().contains(&needle)
                        || found.description.to_lowercase().contains(&needle)
                );
            }
        }
    }
}
