//! Aggregate statistics over the record store.

use payveil_core::{ConfidentialRecord, LifecycleStatus};
use serde::Serialize;

/// Summary numbers for a set of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordStats {
    /// Number of records
    pub total: usize,
    /// Records whose lifecycle status is `Active`
    pub active: usize,
    /// Records with a verified disclosure
    pub verified: usize,
    /// Sum of disclosed values over verified records
    pub total_disclosed: u64,
    /// Mean public rate (0.0 when empty)
    pub average_public_rate: f64,
}

impl RecordStats {
    /// Compute statistics over `records`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ConfidentialRecord>) -> Self {
        let mut total = 0usize;
        let mut active = 0usize;
        let mut verified = 0usize;
        let mut total_disclosed = 0u64;
        let mut rate_sum = 0u128;

        for record in records {
            total += 1;
            if record.lifecycle_status == LifecycleStatus::Active {
                active += 1;
            }
            if let Some(value) = record.decrypted_value() {
                verified += 1;
                total_disclosed = total_disclosed.saturating_add(value);
            }
            rate_sum += u128::from(record.public_rate);
        }

        let average_public_rate = if total == 0 {
            0.0
        } else {
            rate_sum as f64 / total as f64
        };

        Self {
            total,
            active,
            verified,
            total_disclosed,
            average_public_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payveil_core::effects::RecordFields;
    use payveil_core::{ActorId, EncryptedHandle, RecordId};

    fn record(rate: u64, status: LifecycleStatus, disclosed: Option<u64>) -> ConfidentialRecord {
        ConfidentialRecord::from_ledger(
            RecordId::generate("t"),
            RecordFields {
                owner_display_name: "x".into(),
                public_rate: rate,
                public_hours: 1,
                description: String::new(),
                creator: ActorId::new("0x1"),
                created_at_ms: 0,
                is_verified: disclosed.is_some(),
                decrypted_value: disclosed.unwrap_or(123),
                lifecycle_status: status,
            },
            EncryptedHandle::new("0x00"),
        )
    }

    #[test]
    fn empty_store_has_zero_average() {
        let stats = RecordStats::from_records(std::iter::empty());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_public_rate, 0.0);
    }

    #[test]
    fn totals_only_count_verified_values() {
        let records = vec![
            record(50, LifecycleStatus::Active, Some(75_000)),
            record(25, LifecycleStatus::Paused, None),
            record(30, LifecycleStatus::Active, Some(1_000)),
        ];
        let stats = RecordStats::from_records(&records);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.verified, 2);
        assert_eq!(stats.total_disclosed, 76_000);
        assert!((stats.average_public_rate - 35.0).abs() < f64::EPSILON);
    }
}
